use crate::block_body::{parse_block, unknown_tag, BlockBody};
use crate::context::Context;
use crate::error::Result;
use crate::lexer::Tokenizer;
use crate::parse_context::ParseContext;
use crate::tags::Tag;
use crate::value::Value;

/// `capture name` ... `endcapture`: renders its body into a string
/// variable instead of the output.
#[derive(Debug)]
pub struct Capture {
    to: String,
    body: BlockBody,
    line_number: Option<u32>,
}

fn target(markup: &str) -> Option<&str> {
    let name = markup.trim();
    let name = name
        .strip_prefix(['\'', '"'])
        .and_then(|rest| rest.strip_suffix(['\'', '"']))
        .unwrap_or(name);
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-'));
    valid.then_some(name)
}

pub fn parse(
    name: &str,
    markup: &str,
    tokens: &mut Tokenizer<'_>,
    ctx: &mut ParseContext<'_>,
) -> Result<Box<dyn Tag>> {
    let line_number = ctx.line_number();
    let Some(to) = target(markup) else {
        return Err(ctx.syntax_error("errors.syntax.capture", &[]));
    };
    let to = to.to_string();
    let block = parse_block(name, tokens, ctx, |tag, _, ctx| Err(unknown_tag(name, tag, ctx)))?;
    let body = block.bodies.into_iter().next().unwrap_or_default();
    Ok(Box::new(Capture {
        to,
        body,
        line_number,
    }))
}

impl Tag for Capture {
    fn name(&self) -> &str {
        "capture"
    }

    fn line_number(&self) -> Option<u32> {
        self.line_number
    }

    fn blank(&self) -> bool {
        true
    }

    fn render(&self, context: &mut Context<'_>, _output: &mut String) -> Result<()> {
        let mut captured = String::new();
        context.resource_limits_mut().begin_capture();
        let rendered = self.body.render(context, &mut captured);
        context.resource_limits_mut().end_capture();
        rendered?;
        context.assign_unscored(self.to.clone(), Value::Str(captured));
        Ok(())
    }
}
