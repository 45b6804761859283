use crate::ast::Variable;
use crate::context::Context;
use crate::error::Result;
use crate::lexer::Tokenizer;
use crate::parse_context::ParseContext;
use crate::tags::Tag;

/// `echo expression | filters`, the tag form of `{{ }}`. Mostly useful
/// inside `liquid` tags.
#[derive(Debug)]
pub struct Echo {
    variable: Variable,
}

pub fn parse(
    _name: &str,
    markup: &str,
    _tokens: &mut Tokenizer<'_>,
    ctx: &mut ParseContext<'_>,
) -> Result<Box<dyn Tag>> {
    let variable = ctx.parse_variable(markup)?;
    Ok(Box::new(Echo { variable }))
}

impl Tag for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn line_number(&self) -> Option<u32> {
        self.variable.line_number
    }

    fn render(&self, context: &mut Context<'_>, output: &mut String) -> Result<()> {
        let text = context.evaluate_variable(&self.variable)?.to_string();
        context.emit(output, &text)
    }
}
