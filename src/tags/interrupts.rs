use crate::context::{Context, Interrupt};
use crate::error::Result;
use crate::lexer::Tokenizer;
use crate::parse_context::{ErrorMode, ParseContext};
use crate::tags::Tag;

/// `break` / `continue`.
#[derive(Debug)]
pub struct InterruptTag {
    interrupt: Interrupt,
    line_number: Option<u32>,
}

pub fn parse(
    name: &str,
    markup: &str,
    _tokens: &mut Tokenizer<'_>,
    ctx: &mut ParseContext<'_>,
) -> Result<Box<dyn Tag>> {
    if ctx.error_mode() == ErrorMode::Strict && !markup.is_empty() {
        return Err(ctx.syntax_error("errors.syntax.tag_unexpected_args", &[("tag", name)]));
    }
    let interrupt = if name == "break" {
        Interrupt::Break
    } else {
        Interrupt::Continue
    };
    Ok(Box::new(InterruptTag {
        interrupt,
        line_number: ctx.line_number(),
    }))
}

impl Tag for InterruptTag {
    fn name(&self) -> &str {
        match self.interrupt {
            Interrupt::Break => "break",
            Interrupt::Continue => "continue",
        }
    }

    fn line_number(&self) -> Option<u32> {
        self.line_number
    }

    fn render(&self, context: &mut Context<'_>, _output: &mut String) -> Result<()> {
        context.push_interrupt(self.interrupt);
        Ok(())
    }
}
