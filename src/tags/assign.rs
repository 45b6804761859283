use crate::ast::Variable;
use crate::context::Context;
use crate::error::Result;
use crate::lexer::Tokenizer;
use crate::parse_context::ParseContext;
use crate::tags::Tag;

/// `assign name = expression | filters`, binding in the outermost scope.
#[derive(Debug)]
pub struct Assign {
    to: String,
    from: Variable,
    line_number: Option<u32>,
}

/// A valid assignment target: a variable name, optionally dotted or
/// hyphenated the way loop variables are.
fn valid_target(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '[' | ']' | '\'' | '"'))
}

pub fn parse(
    _name: &str,
    markup: &str,
    _tokens: &mut Tokenizer<'_>,
    ctx: &mut ParseContext<'_>,
) -> Result<Box<dyn Tag>> {
    let line_number = ctx.line_number();
    let Some((to, from)) = markup.split_once('=') else {
        return Err(ctx.syntax_error("errors.syntax.assign", &[]));
    };
    let to = to.trim();
    if !valid_target(to) {
        return Err(ctx.syntax_error("errors.syntax.assign", &[]));
    }
    let from = ctx.parse_variable(from)?;
    Ok(Box::new(Assign {
        to: to.to_string(),
        from,
        line_number,
    }))
}

impl Tag for Assign {
    fn name(&self) -> &str {
        "assign"
    }

    fn line_number(&self) -> Option<u32> {
        self.line_number
    }

    fn blank(&self) -> bool {
        true
    }

    fn render(&self, context: &mut Context<'_>, _output: &mut String) -> Result<()> {
        let value = context.evaluate_variable(&self.from)?;
        context.assign(self.to.clone(), value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets() {
        assert!(valid_target("x"));
        assert!(valid_target("product_1"));
        assert!(valid_target("a-b"));
        assert!(!valid_target(""));
        assert!(!valid_target("1x"));
        assert!(!valid_target("a b"));
    }
}
