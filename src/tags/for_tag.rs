//! `for item in collection` loops and the `forloop` drop.

use crate::ast::Expression;
use crate::block_body::{parse_block, unknown_tag, BlockBody, BlockStep};
use crate::context::{Context, Interrupt};
use crate::drop::{to_liquid, LiquidDrop};
use crate::error::{Error, Result};
use crate::lexer::{MarkupToken, Tokenizer};
use crate::locale::Locale;
use crate::parse_context::{lax_error, ParseContext};
use crate::parser::Parser;
use crate::tags::Tag;
use crate::value::{range_len, Value};

#[derive(Debug, Clone, PartialEq)]
enum Offset {
    Expression(Expression),
    /// Resume where the previous loop over the same collection stopped.
    Continue,
}

#[derive(Debug, Clone, PartialEq)]
struct Header {
    variable: String,
    collection: Expression,
    reversed: bool,
    limit: Option<Expression>,
    offset: Option<Offset>,
}

#[derive(Debug)]
pub struct For {
    header: Header,
    /// `var-collection`, the key for `offset:continue`.
    name: String,
    body: BlockBody,
    else_body: Option<BlockBody>,
    line_number: Option<u32>,
    blank: bool,
}

fn parse_header(parser: &mut Parser, strict: bool, locale: &Locale) -> Result<Header> {
    let variable = parser.consume_id()?;
    if !parser.id_is("in") {
        return Err(Error::syntax(locale.t("errors.syntax.for_invalid_in", &[])));
    }
    let collection = parser.expression()?;
    let reversed = parser.id_is("reversed");
    let mut header = Header {
        variable,
        collection,
        reversed,
        limit: None,
        offset: None,
    };
    while matches!(parser.peek(0), MarkupToken::Id(_)) && matches!(parser.peek(1), MarkupToken::Colon) {
        let key = parser.consume_id()?;
        parser.consume();
        match key.as_str() {
            "offset" if parser.id_is("continue") => header.offset = Some(Offset::Continue),
            "offset" => header.offset = Some(Offset::Expression(parser.expression()?)),
            "limit" => header.limit = Some(parser.expression()?),
            _ if strict => {
                return Err(Error::syntax(locale.t("errors.syntax.for_invalid_attribute", &[])));
            }
            _ => {
                parser.expression()?;
            }
        }
        parser.consume_if(&MarkupToken::Comma);
    }
    if strict {
        parser.expect_end()?;
    }
    Ok(header)
}

/// Source text of the collection, as written after `in`.
fn collection_name(markup: &str) -> &str {
    let mut words = markup.split_whitespace();
    words.find(|word| *word == "in");
    words.next().unwrap_or_default()
}

pub fn parse(
    name: &str,
    markup: &str,
    tokens: &mut Tokenizer<'_>,
    ctx: &mut ParseContext<'_>,
) -> Result<Box<dyn Tag>> {
    let line_number = ctx.line_number();
    let locale = ctx.registry().locale();
    let header = ctx.parse_with_mode(
        markup,
        |m| parse_header(&mut Parser::new(m)?, true, locale),
        |m| {
            parse_header(&mut Parser::lax(m), false, locale).map_err(|err| {
                let invalid_in = locale.t("errors.syntax.for_invalid_in", &[]);
                if err.message() == invalid_in {
                    err
                } else {
                    lax_error(err, locale.t("errors.syntax.for", &[]))
                }
            })
        },
    )?;

    let mut else_seen = false;
    let block = parse_block(name, tokens, ctx, |tag, _markup, ctx| match tag {
        "else" if !else_seen => {
            else_seen = true;
            Ok(BlockStep::NewBody)
        }
        _ => Err(unknown_tag(name, tag, ctx)),
    })?
    .without_blank_text();
    let mut bodies = block.bodies.into_iter();
    let body = bodies.next().unwrap_or_default();
    let else_body = bodies.next();

    Ok(Box::new(For {
        name: format!("{}-{}", header.variable, collection_name(markup)),
        header,
        body,
        else_body,
        line_number,
        blank: block.blank,
    }))
}

/// Lazily indexed slice of the iterated collection.
pub(crate) enum Segment {
    Items(Vec<Value>),
    Range { start: i64, len: usize },
}

impl Segment {
    pub(crate) fn len(&self) -> usize {
        match self {
            Segment::Items(items) => items.len(),
            Segment::Range { len, .. } => *len,
        }
    }

    pub(crate) fn get(&self, index: usize) -> Value {
        match self {
            Segment::Items(items) => items.get(index).cloned().unwrap_or_default(),
            Segment::Range { start, .. } => Value::Int(start.saturating_add(i64::try_from(index).unwrap_or(i64::MAX))),
        }
    }
}

fn clamp_index(value: i64) -> usize {
    usize::try_from(value.max(0)).unwrap_or(usize::MAX)
}

/// Items `from..to` of `collection`, with `to` unbounded when `None`.
fn slice_collection(collection: &Value, from: usize, to: Option<usize>) -> Segment {
    let bounded = |len: usize| {
        let end = to.map_or(len, |to| to.min(len));
        (from.min(end), end)
    };
    match collection {
        Value::Range(start, end) => {
            let len = range_len(*start, *end);
            let (from, to) = bounded(len);
            Segment::Range {
                start: start.saturating_add(i64::try_from(from).unwrap_or(i64::MAX)),
                len: to - from,
            }
        }
        other => {
            let items: Vec<Value> = match other {
                Value::Array(items) => items.clone(),
                Value::Object(map) => map
                    .iter()
                    .map(|(k, v)| Value::Array(vec![Value::Str(k.clone()), v.clone()]))
                    .collect(),
                Value::Str(text) if !text.is_empty() => vec![other.clone()],
                Value::Drop(drop) => drop.items().unwrap_or_default(),
                _ => Vec::new(),
            };
            let (from, to) = bounded(items.len());
            Segment::Items(items[from..to].to_vec())
        }
    }
}

impl For {
    fn integer_attribute(context: &Context<'_>, expression: &Expression) -> Result<Option<i64>> {
        match context.evaluate(expression)?.to_scalar() {
            Value::Nil => Ok(None),
            value => value.to_integer().map(Some),
        }
    }

    fn render_segment(&self, segment: &Segment, context: &mut Context<'_>, output: &mut String) -> Result<()> {
        let length = segment.len();
        let parentloop = context.current_forloop().cloned().unwrap_or_default();
        context.stack(|context| {
            for i in 0..length {
                let index = if self.header.reversed { length - 1 - i } else { i };
                let forloop = Value::drop(ForloopDrop::new(self.name.as_str(), length, i, parentloop.clone()));
                context.set(self.header.variable.clone(), segment.get(index));
                context.set("forloop", forloop.clone());
                context.push_forloop(forloop);
                let rendered = self.body.render(context, output);
                context.pop_forloop();
                rendered?;
                match context.pop_interrupt() {
                    Some(Interrupt::Break) => break,
                    Some(Interrupt::Continue) | None => {}
                }
            }
            Ok(())
        })
    }
}

impl Tag for For {
    fn name(&self) -> &str {
        "for"
    }

    fn line_number(&self) -> Option<u32> {
        self.line_number
    }

    fn blank(&self) -> bool {
        self.blank
    }

    fn render(&self, context: &mut Context<'_>, output: &mut String) -> Result<()> {
        let collection = to_liquid(context.evaluate(&self.header.collection)?);
        let from = match &self.header.offset {
            Some(Offset::Continue) => context.registers().offsets.get(&self.name).copied().unwrap_or(0),
            Some(Offset::Expression(expression)) => {
                Self::integer_attribute(context, expression)?.map_or(0, clamp_index)
            }
            None => 0,
        };
        let to = match &self.header.limit {
            Some(expression) => Self::integer_attribute(context, expression)?
                .map(|limit| from.saturating_add(clamp_index(limit))),
            None => None,
        };
        let segment = slice_collection(&collection, from, to);
        context
            .registers_mut()
            .offsets
            .insert(self.name.clone(), from + segment.len());

        if segment.len() == 0 {
            return match &self.else_body {
                Some(body) => body.render(context, output),
                None => Ok(()),
            };
        }
        self.render_segment(&segment, context, output)
    }
}

/// The `forloop` object visible inside a loop body.
#[derive(Debug)]
pub struct ForloopDrop {
    name: String,
    length: usize,
    index0: usize,
    parentloop: Value,
}

impl ForloopDrop {
    pub(crate) fn new(name: impl Into<String>, length: usize, index0: usize, parentloop: Value) -> Self {
        Self {
            name: name.into(),
            length,
            index0,
            parentloop,
        }
    }
}

impl LiquidDrop for ForloopDrop {
    fn accessors(&self) -> &'static [&'static str] {
        &[
            "name", "length", "index", "index0", "rindex", "rindex0", "first", "last", "parentloop",
        ]
    }

    fn call(&self, name: &str, _context: &Context<'_>) -> Result<Value> {
        let value = match name {
            "name" => Value::from(self.name.as_str()),
            "length" => Value::from(self.length),
            "index" => Value::from(self.index0 + 1),
            "index0" => Value::from(self.index0),
            "rindex" => Value::from(self.length - self.index0),
            "rindex0" => Value::from(self.length - self.index0 - 1),
            "first" => Value::Bool(self.index0 == 0),
            "last" => Value::Bool(self.index0 + 1 == self.length),
            "parentloop" => self.parentloop.clone(),
            _ => Value::Nil,
        };
        Ok(value)
    }

    fn to_output(&self) -> String {
        "ForloopDrop".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(markup: &str) -> Result<Header> {
        parse_header(&mut Parser::new(markup)?, true, &Locale::new())
    }

    #[test]
    fn parses_attributes() {
        let header = header("item in items reversed limit: 2 offset: continue").unwrap();
        assert_eq!(header.variable, "item");
        assert!(header.reversed);
        assert!(header.limit.is_some());
        assert_eq!(header.offset, Some(Offset::Continue));
    }

    #[test]
    fn rejects_unknown_attributes_strictly() {
        let err = header("item in items foo: 1").unwrap_err();
        assert_eq!(err.message(), "Invalid attribute in for loop. Valid attributes are limit and offset");
        let err = header("item of items").unwrap_err();
        assert_eq!(err.message(), "For loops require an 'in' clause");
    }

    #[test]
    fn collection_names() {
        assert_eq!(collection_name("item in products limit:2"), "products");
        assert_eq!(collection_name("i in (1..3)"), "(1..3)");
    }

    #[test]
    fn slices_ranges_without_materializing() {
        let segment = slice_collection(&Value::Range(1, i64::MAX - 1), 2, Some(4));
        assert_eq!(segment.len(), 2);
        assert_eq!(segment.get(0), Value::Int(3));
        let segment = slice_collection(&Value::from(vec![1, 2, 3, 4, 5]), 2, Some(4));
        assert_eq!(segment.len(), 2);
        assert_eq!(segment.get(1), Value::Int(4));
        assert_eq!(slice_collection(&Value::from(vec![1]), 5, None).len(), 0);
    }
}
