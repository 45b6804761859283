//! Partials: `include` and `render`.
//!
//! Both accept `with expr` or `for expr`, an optional `as alias` and
//! `key: value` attributes. `include` renders the partial inside the
//! caller's scopes, so it sees and can change the caller's variables.
//! `render` uses an isolated sub-context that only sees its attributes
//! and the passed object; the partial's name must be a quoted string.

use crate::ast::Expression;
use crate::context::Context;
use crate::drop::to_liquid;
use crate::error::{Error, Result};
use crate::lexer::{MarkupToken, Tokenizer};
use crate::parse_context::{lax_error, ParseContext};
use crate::parser::Parser;
use crate::tags::for_tag::{ForloopDrop, Segment};
use crate::tags::Tag;
use crate::value::{range_len, Value};

#[derive(Debug, Clone, PartialEq)]
struct PartialCall {
    template: Expression,
    variable: Option<Expression>,
    is_for: bool,
    alias: Option<String>,
    attributes: Vec<(String, Expression)>,
}

fn parse_call(parser: &mut Parser, strict: bool) -> Result<PartialCall> {
    let template = parser.expression()?;
    let (variable, is_for) = if parser.id_is("with") {
        (Some(parser.expression()?), false)
    } else if parser.id_is("for") {
        (Some(parser.expression()?), true)
    } else {
        (None, false)
    };
    let alias = if parser.id_is("as") {
        Some(parser.consume_id()?)
    } else {
        None
    };
    let mut attributes = Vec::new();
    loop {
        parser.consume_if(&MarkupToken::Comma);
        if !(matches!(parser.peek(0), MarkupToken::Id(_)) && matches!(parser.peek(1), MarkupToken::Colon)) {
            break;
        }
        let key = parser.consume_id()?;
        parser.consume();
        attributes.push((key, parser.expression()?));
    }
    if strict {
        parser.expect_end()?;
    }
    Ok(PartialCall {
        template,
        variable,
        is_for,
        alias,
        attributes,
    })
}

/// `products/card` binds its object as `card` unless aliased.
fn default_alias(template_name: &str) -> &str {
    template_name.rsplit('/').next().unwrap_or(template_name)
}

/// Items of a value `render ... for` iterates; `None` renders it once.
fn iterable_items(value: &Value) -> Option<Segment> {
    match value {
        Value::Array(items) => Some(Segment::Items(items.clone())),
        Value::Range(start, end) => Some(Segment::Range {
            start: *start,
            len: range_len(*start, *end),
        }),
        Value::Object(map) => Some(Segment::Items(
            map.iter()
                .map(|(k, v)| Value::Array(vec![Value::Str(k.clone()), v.clone()]))
                .collect(),
        )),
        Value::Drop(drop) => drop.items().map(Segment::Items),
        _ => None,
    }
}

#[derive(Debug)]
pub struct Include {
    call: PartialCall,
    line_number: Option<u32>,
}

pub fn parse_include(
    _name: &str,
    markup: &str,
    _tokens: &mut Tokenizer<'_>,
    ctx: &mut ParseContext<'_>,
) -> Result<Box<dyn Tag>> {
    let line_number = ctx.line_number();
    let include_error = ctx.t("errors.syntax.include", &[]);
    let call = ctx.parse_with_mode(
        markup,
        |m| parse_call(&mut Parser::new(m)?, true),
        |m| parse_call(&mut Parser::lax(m), false).map_err(|err| lax_error(err, include_error)),
    )?;
    Ok(Box::new(Include { call, line_number }))
}

impl Tag for Include {
    fn name(&self) -> &str {
        "include"
    }

    fn line_number(&self) -> Option<u32> {
        self.line_number
    }

    fn render(&self, context: &mut Context<'_>, output: &mut String) -> Result<()> {
        let locale = context.registry().locale();
        if context.tag_disabled("include") {
            return Err(Error::standard(format!("include {}", locale.t("errors.disabled.tag", &[]))));
        }
        let Value::Str(name) = context.evaluate(&self.call.template)?.to_scalar() else {
            return Err(Error::argument(locale.t("errors.argument.include", &[])));
        };
        let partial = context.load_partial(&name)?;
        let alias = self
            .call
            .alias
            .clone()
            .unwrap_or_else(|| default_alias(&name).to_string());
        let variable = match &self.call.variable {
            Some(expression) => to_liquid(context.evaluate(expression)?),
            None => context.find_variable(&name).unwrap_or_default(),
        };

        let previous_name = context.replace_template_name(Some(name));
        let rendered = context.stack(|context| {
            for (key, expression) in &self.call.attributes {
                let value = context.evaluate(expression)?;
                context.set(key.clone(), value);
            }
            match variable {
                Value::Array(items) => {
                    for item in items {
                        context.set(alias.clone(), item);
                        partial.render(context, output)?;
                    }
                    Ok(())
                }
                other => {
                    context.set(alias, other);
                    partial.render(context, output)
                }
            }
        });
        context.replace_template_name(previous_name);
        rendered
    }
}

#[derive(Debug)]
pub struct Render {
    name: String,
    call: PartialCall,
    line_number: Option<u32>,
}

pub fn parse_render(
    _name: &str,
    markup: &str,
    _tokens: &mut Tokenizer<'_>,
    ctx: &mut ParseContext<'_>,
) -> Result<Box<dyn Tag>> {
    let line_number = ctx.line_number();
    let render_error = ctx.t("errors.syntax.render", &[]);
    if !matches!(Parser::lax(markup).peek(0), MarkupToken::Str(_)) {
        return Err(ctx.syntax_error("errors.syntax.render", &[]));
    }
    let call = ctx.parse_with_mode(
        markup,
        |m| parse_call(&mut Parser::new(m)?, true),
        |m| parse_call(&mut Parser::lax(m), false).map_err(|err| lax_error(err, render_error)),
    )?;
    let Expression::Literal(Value::Str(name)) = &call.template else {
        return Err(ctx.syntax_error("errors.syntax.render", &[]));
    };
    Ok(Box::new(Render {
        name: name.clone(),
        call,
        line_number,
    }))
}

impl Render {
    /// Render the partial once in a fresh isolated sub-context.
    fn render_once(
        &self,
        context: &mut Context<'_>,
        bindings: Vec<(String, Value)>,
        output: &mut String,
    ) -> Result<()> {
        let partial = context.load_partial(&self.name)?;
        context.isolated(Some(self.name.clone()), |inner| {
            inner.stack(|inner| {
                for (key, value) in bindings {
                    inner.set(key, value);
                }
                partial.render(inner, output)
            })
        })
    }
}

impl Tag for Render {
    fn name(&self) -> &str {
        "render"
    }

    fn line_number(&self) -> Option<u32> {
        self.line_number
    }

    fn render(&self, context: &mut Context<'_>, output: &mut String) -> Result<()> {
        let alias = self
            .call
            .alias
            .clone()
            .unwrap_or_else(|| default_alias(&self.name).to_string());
        let attributes = self
            .call
            .attributes
            .iter()
            .map(|(key, expression)| Ok((key.clone(), context.evaluate(expression)?)))
            .collect::<Result<Vec<_>>>()?;
        let variable = match &self.call.variable {
            Some(expression) => Some(to_liquid(context.evaluate(expression)?)),
            None => None,
        };

        match variable {
            Some(collection) if self.call.is_for => {
                if let Some(items) = iterable_items(&collection) {
                    let length = items.len();
                    for index0 in 0..length {
                        let item = items.get(index0);
                        let forloop = Value::drop(ForloopDrop::new(self.name.as_str(), length, index0, Value::Nil));
                        let mut bindings = attributes.clone();
                        bindings.push((alias.clone(), item));
                        bindings.push(("forloop".to_string(), forloop));
                        self.render_once(context, bindings, output)?;
                    }
                    return Ok(());
                }
                let mut bindings = attributes;
                bindings.push((alias, collection));
                self.render_once(context, bindings, output)
            }
            Some(value) => {
                let mut bindings = attributes;
                if !value.is_nil() {
                    bindings.push((alias, value));
                }
                self.render_once(context, bindings, output)
            }
            None => self.render_once(context, attributes, output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_calls() {
        let call = parse_call(&mut Parser::new("'card' for products as item, size: 2").unwrap(), true).unwrap();
        assert!(call.is_for);
        assert_eq!(call.alias.as_deref(), Some("item"));
        assert_eq!(call.attributes.len(), 1);
        assert_eq!(call.attributes[0].0, "size");
    }

    #[test]
    fn strict_rejects_trailing_tokens() {
        assert!(parse_call(&mut Parser::new("'card' with x y").unwrap(), true).is_err());
        assert!(parse_call(&mut Parser::lax("'card' with x y"), false).is_ok());
    }

    #[test]
    fn aliases_default_to_the_last_path_segment() {
        assert_eq!(default_alias("products/card"), "card");
        assert_eq!(default_alias("card"), "card");
    }
}
