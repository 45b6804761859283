//! `case` / `when` / `else`.
//!
//! Every `when` whose values match renders, in order. `else` renders only
//! if no `when` before it matched.

use crate::ast::{Condition, Expression, Operator};
use crate::block_body::{parse_block, unknown_tag, BlockBody, BlockStep};
use crate::context::Context;
use crate::error::Result;
use crate::lexer::{MarkupToken, Tokenizer};
use crate::parse_context::{lax_error, ErrorMode, ParseContext};
use crate::parser::Parser;
use crate::tags::Tag;

#[derive(Debug)]
enum Arm {
    When(Condition, BlockBody),
    Else(BlockBody),
}

#[derive(Debug)]
pub struct Case {
    arms: Vec<Arm>,
    line_number: Option<u32>,
    blank: bool,
}

/// `a, b or c` against `left`, as an `or` chain of equalities.
fn when_condition(left: &Expression, parser: &mut Parser, strict: bool) -> Result<Condition> {
    let mut condition = Condition::compare(left.clone(), Operator::Eq, parser.expression()?);
    while parser.consume_if(&MarkupToken::Comma) || parser.id_is("or") {
        let next = Condition::compare(left.clone(), Operator::Eq, parser.expression()?);
        condition = Condition::Or(Box::new(condition), Box::new(next));
    }
    if strict {
        parser.expect_end()?;
    }
    Ok(condition)
}

pub fn parse(
    name: &str,
    markup: &str,
    tokens: &mut Tokenizer<'_>,
    ctx: &mut ParseContext<'_>,
) -> Result<Box<dyn Tag>> {
    let line_number = ctx.line_number();
    let case_error = ctx.t("errors.syntax.case", &[]);
    let left = ctx.parse_with_mode(
        markup,
        |m| {
            let mut parser = Parser::new(m)?;
            let left = parser.expression()?;
            parser.expect_end()?;
            Ok(left)
        },
        |m| Parser::lax(m).expression().map_err(|err| lax_error(err, case_error)),
    )?;

    enum Pending {
        When(Condition),
        Else,
    }
    let mut pending = Vec::new();
    let block = parse_block(name, tokens, ctx, |tag, markup, ctx| match tag {
        "when" => {
            let when_error = ctx.t("errors.syntax.case_invalid_when", &[]);
            let condition = ctx.parse_with_mode(
                markup,
                |m| when_condition(&left, &mut Parser::new(m)?, true),
                |m| when_condition(&left, &mut Parser::lax(m), false).map_err(|err| lax_error(err, when_error)),
            )?;
            pending.push(Pending::When(condition));
            Ok(BlockStep::NewBody)
        }
        "else" => {
            if ctx.error_mode() == ErrorMode::Strict && !markup.is_empty() {
                return Err(ctx.syntax_error("errors.syntax.case_invalid_else", &[]));
            }
            pending.push(Pending::Else);
            Ok(BlockStep::NewBody)
        }
        _ => Err(unknown_tag(name, tag, ctx)),
    })?
    .without_blank_text();

    // The first body holds whatever precedes the first `when`; it never renders.
    let arms = pending
        .into_iter()
        .zip(block.bodies.into_iter().skip(1))
        .map(|(pending, body)| match pending {
            Pending::When(condition) => Arm::When(condition, body),
            Pending::Else => Arm::Else(body),
        })
        .collect();
    Ok(Box::new(Case {
        arms,
        line_number,
        blank: block.blank,
    }))
}

impl Tag for Case {
    fn name(&self) -> &str {
        "case"
    }

    fn line_number(&self) -> Option<u32> {
        self.line_number
    }

    fn blank(&self) -> bool {
        self.blank
    }

    fn render(&self, context: &mut Context<'_>, output: &mut String) -> Result<()> {
        let mut matched = false;
        for arm in &self.arms {
            match arm {
                Arm::When(condition, body) => {
                    if context.evaluate_condition(condition)? {
                        matched = true;
                        body.render(context, output)?;
                    }
                }
                Arm::Else(body) => {
                    if !matched {
                        body.render(context, output)?;
                    }
                }
            }
        }
        Ok(())
    }
}
