//! `if` / `unless` with `elsif` and `else` branches.

use crate::ast::Condition;
use crate::block_body::{parse_block, unknown_tag, BlockBody, BlockStep};
use crate::context::Context;
use crate::error::Result;
use crate::lexer::Tokenizer;
use crate::parse_context::ParseContext;
use crate::tags::Tag;

#[derive(Debug)]
struct Branch {
    condition: Condition,
    body: BlockBody,
}

#[derive(Debug)]
pub struct If {
    name: String,
    branches: Vec<Branch>,
    /// `unless`: the first branch renders when its condition is false.
    negate_first: bool,
    line_number: Option<u32>,
    blank: bool,
}

pub fn parse_if(
    name: &str,
    markup: &str,
    tokens: &mut Tokenizer<'_>,
    ctx: &mut ParseContext<'_>,
) -> Result<Box<dyn Tag>> {
    Ok(Box::new(If::parse(name, markup, tokens, ctx, false)?))
}

pub fn parse_unless(
    name: &str,
    markup: &str,
    tokens: &mut Tokenizer<'_>,
    ctx: &mut ParseContext<'_>,
) -> Result<Box<dyn Tag>> {
    Ok(Box::new(If::parse(name, markup, tokens, ctx, true)?))
}

impl If {
    /// Parse a conditional block closed by `end<name>`.
    pub fn parse(
        name: &str,
        markup: &str,
        tokens: &mut Tokenizer<'_>,
        ctx: &mut ParseContext<'_>,
        negate_first: bool,
    ) -> Result<Self> {
        let line_number = ctx.line_number();
        let mut conditions = vec![ctx.parse_condition("if", markup)?];
        let block = parse_block(name, tokens, ctx, |tag, markup, ctx| match tag {
            "elsif" => {
                conditions.push(ctx.parse_condition("if", markup)?);
                Ok(BlockStep::NewBody)
            }
            "else" => {
                conditions.push(Condition::Else);
                Ok(BlockStep::NewBody)
            }
            _ => Err(unknown_tag(name, tag, ctx)),
        })?
        .without_blank_text();
        let branches = conditions
            .into_iter()
            .zip(block.bodies)
            .map(|(condition, body)| Branch { condition, body })
            .collect();
        Ok(Self {
            name: name.to_string(),
            branches,
            negate_first,
            line_number,
            blank: block.blank,
        })
    }
}

impl Tag for If {
    fn name(&self) -> &str {
        &self.name
    }

    fn line_number(&self) -> Option<u32> {
        self.line_number
    }

    fn blank(&self) -> bool {
        self.blank
    }

    fn render(&self, context: &mut Context<'_>, output: &mut String) -> Result<()> {
        for (i, branch) in self.branches.iter().enumerate() {
            let mut taken = context.evaluate_condition(&branch.condition)?;
            if i == 0 && self.negate_first {
                taken = !taken;
            }
            if taken {
                return branch.body.render(context, output);
            }
        }
        Ok(())
    }
}
