use crate::block_body::{unknown_tag_with_delimiter, BlockBody, BodyEnd};
use crate::context::Context;
use crate::error::Result;
use crate::lexer::Tokenizer;
use crate::parse_context::ParseContext;
use crate::tags::Tag;

/// `{% liquid ... %}`: one tag per line, no delimiters.
#[derive(Debug)]
pub struct LiquidTag {
    body: BlockBody,
    line_number: Option<u32>,
}

pub fn parse(
    _name: &str,
    markup: &str,
    _tokens: &mut Tokenizer<'_>,
    ctx: &mut ParseContext<'_>,
) -> Result<Box<dyn Tag>> {
    let line_number = ctx.line_number();
    let mut lines = Tokenizer::for_liquid_tag(markup, line_number.unwrap_or(1));
    let mut body = BlockBody::new();
    match ctx.nested(|ctx| body.parse(&mut lines, ctx))? {
        BodyEnd::Eof => Ok(Box::new(LiquidTag { body, line_number })),
        BodyEnd::Tag { name, .. } => Err(unknown_tag_with_delimiter("liquid", "%}", name, ctx)),
    }
}

impl Tag for LiquidTag {
    fn name(&self) -> &str {
        "liquid"
    }

    fn line_number(&self) -> Option<u32> {
        self.line_number
    }

    fn blank(&self) -> bool {
        self.body.blank()
    }

    fn render(&self, context: &mut Context<'_>, output: &mut String) -> Result<()> {
        self.body.render(context, output)
    }
}
