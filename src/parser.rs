use crate::ast::*;
use crate::error::{Error, ErrorKind, Result};
use crate::lexer::{lex_markup, MarkupToken};
use crate::resource_limits::MAX_DEPTH;
use crate::value::Value;

/// Recursive-descent parser over the markup tokens of one tag or output.
pub struct Parser {
    tokens: Vec<MarkupToken>,
    pos: usize,
    /// Current `[`/`(` nesting inside expressions.
    depth: usize,
}

/// A filter or tag argument: positional, or `name: value`.
pub enum Argument {
    Positional(Expression),
    Keyword(String, Expression),
}

impl Parser {
    /// Strict lexing: unknown characters are a syntax error.
    pub fn new(markup: &str) -> Result<Self> {
        Ok(Self {
            tokens: lex_markup(markup, false)?,
            pos: 0,
            depth: 0,
        })
    }

    /// Lax lexing: unknown characters are skipped.
    pub fn lax(markup: &str) -> Self {
        let tokens = lex_markup(markup, true).unwrap_or_else(|_| vec![MarkupToken::EndOfString]);
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    pub fn peek(&self, n: usize) -> &MarkupToken {
        self.tokens
            .get(self.pos + n)
            .unwrap_or(&MarkupToken::EndOfString)
    }

    pub fn at_end(&self) -> bool {
        matches!(self.peek(0), MarkupToken::EndOfString)
    }

    pub fn consume(&mut self) -> MarkupToken {
        let token = self.peek(0).clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    /// Consume the next token if it has the same kind as `token`.
    pub fn consume_if(&mut self, token: &MarkupToken) -> bool {
        if std::mem::discriminant(self.peek(0)) == std::mem::discriminant(token) {
            self.consume();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &MarkupToken) -> Result<()> {
        if self.consume_if(token) {
            Ok(())
        } else {
            Err(self.unexpected(token.kind_name()))
        }
    }

    fn unexpected(&self, expected: &str) -> Error {
        Error::syntax(format!(
            "Expected {expected} but found {}",
            self.peek(0).kind_name()
        ))
    }

    pub fn expect_end(&mut self) -> Result<()> {
        self.expect(&MarkupToken::EndOfString)
    }

    pub fn consume_id(&mut self) -> Result<String> {
        match self.peek(0) {
            MarkupToken::Id(_) => match self.consume() {
                MarkupToken::Id(name) => Ok(name),
                _ => Err(self.unexpected("id")),
            },
            _ => Err(self.unexpected("id")),
        }
    }

    /// Consume the identifier `name` if it is next.
    pub fn id_is(&mut self, name: &str) -> bool {
        if matches!(self.peek(0), MarkupToken::Id(id) if id == name) {
            self.consume();
            true
        } else {
            false
        }
    }

    /// Parse one expression. Subscripts and ranges nest at most
    /// [`MAX_DEPTH`] deep; deeper input is a stack-level error.
    pub fn expression(&mut self) -> Result<Expression> {
        if self.depth >= MAX_DEPTH {
            return Err(Error::stack_level());
        }
        self.depth += 1;
        let expression = self.primary();
        self.depth -= 1;
        expression
    }

    fn primary(&mut self) -> Result<Expression> {
        match self.consume() {
            MarkupToken::Str(s) => Ok(Expression::Literal(Value::Str(s))),
            MarkupToken::Int(i) => Ok(Expression::Literal(Value::Int(i))),
            MarkupToken::Float(f) => Ok(Expression::Literal(Value::Float(f))),
            MarkupToken::Id(name) => {
                let segments = self.variable_segments()?;
                if segments.is_empty() {
                    if let Some(literal) = literal_keyword(&name) {
                        return Ok(literal);
                    }
                }
                Ok(Expression::Lookup(Box::new(VariableLookup {
                    name: Expression::Literal(Value::Str(name)),
                    segments,
                })))
            }
            MarkupToken::OpenSquare => {
                let name = self.expression()?;
                self.expect(&MarkupToken::CloseSquare)?;
                let segments = self.variable_segments()?;
                Ok(Expression::Lookup(Box::new(VariableLookup { name, segments })))
            }
            MarkupToken::OpenRound => {
                let first = self.expression()?;
                self.expect(&MarkupToken::DotDot)?;
                let last = self.expression()?;
                self.expect(&MarkupToken::CloseRound)?;
                let range = fold_range(first, last);
                let segments = self.variable_segments()?;
                if segments.is_empty() {
                    return Ok(range);
                }
                Ok(Expression::Path(Box::new(range), segments))
            }
            token => {
                // Put it back so callers can report or skip it.
                self.pos = self.pos.saturating_sub(1);
                Err(Error::syntax(format!(
                    "{} is not a valid expression",
                    token.kind_name()
                )))
            }
        }
    }

    fn variable_segments(&mut self) -> Result<Vec<Segment>> {
        let mut segments = Vec::new();
        loop {
            match self.peek(0) {
                MarkupToken::OpenSquare => {
                    self.consume();
                    let key = self.expression()?;
                    self.expect(&MarkupToken::CloseSquare)?;
                    segments.push(Segment { key, command: false });
                }
                MarkupToken::Dot => {
                    self.consume();
                    let name = self.consume_id()?;
                    segments.push(Segment {
                        key: Expression::Literal(Value::Str(name)),
                        command: true,
                    });
                }
                _ => break,
            }
        }
        Ok(segments)
    }

    pub fn argument(&mut self) -> Result<Argument> {
        if matches!(self.peek(0), MarkupToken::Id(_)) && matches!(self.peek(1), MarkupToken::Colon) {
            let name = self.consume_id()?;
            self.consume();
            return Ok(Argument::Keyword(name, self.expression()?));
        }
        Ok(Argument::Positional(self.expression()?))
    }

    /// `| name: arg, arg | name ...`
    pub fn filters(&mut self) -> Result<Vec<FilterCall>> {
        let mut filters = Vec::new();
        while self.consume_if(&MarkupToken::Pipe) {
            let mut call = FilterCall {
                name: self.consume_id()?,
                args: Vec::new(),
                keywords: Vec::new(),
            };
            if self.consume_if(&MarkupToken::Colon) {
                loop {
                    push_argument(&mut call, self.argument()?);
                    if !self.consume_if(&MarkupToken::Comma) {
                        break;
                    }
                }
            }
            filters.push(call);
        }
        Ok(filters)
    }

    pub fn condition(&mut self) -> Result<Condition> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Condition> {
        let mut lhs = self.parse_and()?;
        while self.id_is("or") {
            let rhs = self.parse_and()?;
            lhs = Condition::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Condition> {
        let mut lhs = self.parse_comparison()?;
        while self.id_is("and") {
            let rhs = self.parse_comparison()?;
            lhs = Condition::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Condition> {
        let left = self.expression()?;
        let op = match self.peek(0) {
            MarkupToken::Comparison(op) => Operator::from_symbol(op),
            _ => None,
        };
        match op {
            Some(op) => {
                self.consume();
                let right = self.expression()?;
                Ok(Condition::compare(left, op, right))
            }
            None => Ok(Condition::truthy(left)),
        }
    }

    /// Skip tokens up to the next pipe (or the end).
    fn skip_to_pipe(&mut self) {
        while !matches!(self.peek(0), MarkupToken::Pipe | MarkupToken::EndOfString) {
            self.consume();
        }
    }
}

fn push_argument(call: &mut FilterCall, argument: Argument) {
    match argument {
        Argument::Positional(expr) => call.args.push(expr),
        Argument::Keyword(name, expr) => call.keywords.push((name, expr)),
    }
}

fn literal_keyword(name: &str) -> Option<Expression> {
    Some(match name {
        "nil" | "null" => Expression::Literal(Value::Nil),
        "true" => Expression::Literal(Value::Bool(true)),
        "false" => Expression::Literal(Value::Bool(false)),
        "empty" => Expression::Empty,
        "blank" => Expression::Blank,
        _ => return None,
    })
}

fn literal_integer(expr: &Expression) -> Option<i64> {
    match expr {
        Expression::Literal(Value::Int(i)) => Some(*i),
        #[allow(clippy::cast_possible_truncation)]
        Expression::Literal(Value::Float(f)) => Some(f.trunc() as i64),
        _ => None,
    }
}

fn fold_range(first: Expression, last: Expression) -> Expression {
    match (literal_integer(&first), literal_integer(&last)) {
        (Some(start), Some(end)) => Expression::Literal(Value::Range(start, end)),
        _ => Expression::Range(Box::new(first), Box::new(last)),
    }
}

/// `expr | filter: args ...` with nothing left over.
pub fn parse_variable_strict(markup: &str) -> Result<(Expression, Vec<FilterCall>)> {
    let mut p = Parser::new(markup)?;
    if p.at_end() {
        return Ok((Expression::nil(), Vec::new()));
    }
    let expression = p.expression()?;
    let filters = p.filters()?;
    p.expect_end()?;
    Ok((expression, filters))
}

/// Lax parsing drops what it cannot read, except nesting overflow.
fn recoverable(err: &Error) -> bool {
    err.kind() != ErrorKind::StackLevel
}

/// Best-effort variable parse: unparseable pieces are dropped.
pub fn parse_variable_lax(markup: &str) -> Result<(Expression, Vec<FilterCall>)> {
    let mut p = Parser::lax(markup);
    let expression = match p.peek(0) {
        MarkupToken::Pipe | MarkupToken::EndOfString => Expression::nil(),
        _ => match p.expression() {
            Ok(expression) => expression,
            Err(err) if recoverable(&err) => Expression::nil(),
            Err(err) => return Err(err),
        },
    };

    let mut filters = Vec::new();
    loop {
        p.skip_to_pipe();
        if !p.consume_if(&MarkupToken::Pipe) {
            break;
        }
        let Ok(name) = p.consume_id() else {
            continue;
        };
        let mut call = FilterCall {
            name,
            args: Vec::new(),
            keywords: Vec::new(),
        };
        if p.consume_if(&MarkupToken::Colon) {
            loop {
                match p.peek(0) {
                    MarkupToken::Pipe | MarkupToken::EndOfString => break,
                    MarkupToken::Comma => {
                        p.consume();
                    }
                    _ => match p.argument() {
                        Ok(argument) => push_argument(&mut call, argument),
                        Err(err) if recoverable(&err) => {
                            p.consume();
                        }
                        Err(err) => return Err(err),
                    },
                }
            }
        }
        filters.push(call);
    }
    Ok((expression, filters))
}

pub fn parse_condition_strict(markup: &str) -> Result<Condition> {
    let mut p = Parser::new(markup)?;
    let condition = p.condition()?;
    p.expect_end()?;
    Ok(condition)
}

/// Lax conditions parse as far as they can and ignore what follows.
pub fn parse_condition_lax(markup: &str) -> Result<Condition> {
    Parser::lax(markup).condition()
}

pub fn parse_expression_strict(markup: &str) -> Result<Expression> {
    let mut p = Parser::new(markup)?;
    let expression = p.expression()?;
    p.expect_end()?;
    Ok(expression)
}

pub fn parse_expression_lax(markup: &str) -> Result<Expression> {
    match Parser::lax(markup).expression() {
        Err(err) if recoverable(&err) => Ok(Expression::nil()),
        parsed => parsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lookup(name: &str, segments: Vec<Segment>) -> Expression {
        Expression::Lookup(Box::new(VariableLookup {
            name: Expression::Literal(Value::from(name)),
            segments,
        }))
    }

    #[test]
    fn parses_dotted_and_bracketed_paths() {
        let expr = parse_expression_strict("product.variants[0]['title']").unwrap();
        assert_eq!(
            expr,
            lookup(
                "product",
                vec![
                    Segment { key: Expression::Literal(Value::from("variants")), command: true },
                    Segment { key: Expression::Literal(Value::Int(0)), command: false },
                    Segment { key: Expression::Literal(Value::from("title")), command: false },
                ]
            )
        );
    }

    #[test]
    fn dynamic_subscripts_nest() {
        let expr = parse_expression_strict("a[b.c]").unwrap();
        let Expression::Lookup(lookup) = expr else {
            panic!("expected lookup");
        };
        assert!(matches!(lookup.segments[0].key, Expression::Lookup(_)));
    }

    #[test]
    fn literal_ranges_fold() {
        assert_eq!(
            parse_expression_strict("(1..3)").unwrap(),
            Expression::Literal(Value::Range(1, 3))
        );
        assert!(matches!(
            parse_expression_strict("(1..n)").unwrap(),
            Expression::Range(_, _)
        ));
    }

    #[test]
    fn segments_after_a_range() {
        let expr = parse_expression_strict("(1..5).size").unwrap();
        let Expression::Path(root, segments) = expr else {
            panic!("expected a path");
        };
        assert_eq!(*root, Expression::Literal(Value::Range(1, 5)));
        assert_eq!(segments.len(), 1);
        assert!(segments[0].command);
    }

    #[test]
    fn expression_nesting_is_bounded() {
        let nested = |depth: usize| format!("{}x{}", "a[".repeat(depth), "]".repeat(depth));
        assert!(parse_expression_strict(&nested(MAX_DEPTH - 1)).is_ok());

        let deep = nested(50_000);
        let err = parse_expression_strict(&deep).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StackLevel);
        let err = parse_variable_lax(&deep).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StackLevel);
        let err = parse_expression_lax(&format!("{}1..2{}", "(".repeat(50_000), ")".repeat(50_000))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StackLevel);
    }

    #[test]
    fn keywords_become_literals() {
        assert_eq!(parse_expression_strict("nil").unwrap(), Expression::nil());
        assert_eq!(parse_expression_strict("empty").unwrap(), Expression::Empty);
        assert!(matches!(parse_expression_strict("empty.size").unwrap(), Expression::Lookup(_)));
    }

    #[test]
    fn filters_with_keyword_arguments() {
        let (_, filters) = parse_variable_strict("x | default: 'a', allow_false: true | upcase").unwrap();
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].args.len(), 1);
        assert_eq!(filters[0].keywords[0].0, "allow_false");
        assert_eq!(filters[1].name, "upcase");
    }

    #[test]
    fn trailing_comma_is_strict_only() {
        assert!(parse_variable_strict("x | append: 'a',").is_err());
        let (_, filters) = parse_variable_lax("x | append: 'a',").unwrap();
        assert_eq!(filters[0].args.len(), 1);
    }

    #[test]
    fn lax_variable_skips_junk() {
        let (expr, filters) = parse_variable_lax("name junk | upcase | @@ | downcase").unwrap();
        assert_eq!(expr, Expression::variable("name"));
        let names: Vec<&str> = filters.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["upcase", "downcase"]);
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let condition = parse_condition_strict("a or b and c").unwrap();
        let Condition::Or(_, rhs) = condition else {
            panic!("expected or at the root");
        };
        assert!(matches!(*rhs, Condition::And(_, _)));
    }

    #[test]
    fn chained_comparison_is_strict_error() {
        assert!(parse_condition_strict("1 == 1 == 1").is_err());
        let lax = parse_condition_lax("1 == 1 == 2").unwrap();
        assert!(matches!(lax, Condition::Compare { op: Some((Operator::Eq, _)), .. }));
    }

    #[test]
    fn error_messages_name_tokens() {
        let err = parse_expression_strict("a.").unwrap_err();
        assert_eq!(err.message(), "Expected id but found end_of_string");
    }
}
