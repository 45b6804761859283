//! Tags whose bodies are not parsed: `comment`, `#` and `raw`.

use crate::context::Context;
use crate::error::Result;
use crate::lexer::{split_tag_markup, Token, Tokenizer};
use crate::parse_context::ParseContext;
use crate::tags::Tag;

/// Renders nothing. Used by `comment` and `#`.
#[derive(Debug)]
pub struct Comment {
    name: &'static str,
}

impl Tag for Comment {
    fn name(&self) -> &str {
        self.name
    }

    fn blank(&self) -> bool {
        true
    }

    fn render(&self, _context: &mut Context<'_>, _output: &mut String) -> Result<()> {
        Ok(())
    }
}

fn tag_name<'s>(token: &Token<'s>) -> Option<(&'s str, bool, bool)> {
    match token {
        Token::Tag(delimited) => {
            split_tag_markup(delimited.markup).map(|(name, _)| (name, delimited.trim_left, delimited.trim_right))
        }
        _ => None,
    }
}

/// Skip tokens up to the matching `end<name>`.
///
/// `comment` blocks nest; the body of a `raw` block inside a comment is
/// skipped without looking for comment tags.
fn skip_until_end(name: &str, tokens: &mut Tokenizer<'_>, ctx: &mut ParseContext<'_>) -> Result<()> {
    let mut depth = 0usize;
    let mut in_raw = false;
    loop {
        let token = tokens.next_token();
        if token == Token::Eof {
            return Err(ctx.syntax_error("errors.syntax.tag_never_closed", &[("block_name", name)]));
        }
        let Some((tag, _, trim_right)) = tag_name(&token) else {
            continue;
        };
        match tag {
            "endraw" if in_raw => in_raw = false,
            _ if in_raw => {}
            "raw" => in_raw = true,
            "comment" => depth += 1,
            "endcomment" if depth > 0 => depth -= 1,
            "endcomment" => {
                ctx.trim_whitespace = trim_right;
                return Ok(());
            }
            _ => {}
        }
    }
}

pub fn parse_comment(
    name: &str,
    _markup: &str,
    tokens: &mut Tokenizer<'_>,
    ctx: &mut ParseContext<'_>,
) -> Result<Box<dyn Tag>> {
    skip_until_end(name, tokens, ctx)?;
    Ok(Box::new(Comment { name: "comment" }))
}

/// `{% # note %}`. A multi-line inline comment needs `#` on every line.
pub fn parse_inline(
    _name: &str,
    markup: &str,
    _tokens: &mut Tokenizer<'_>,
    ctx: &mut ParseContext<'_>,
) -> Result<Box<dyn Tag>> {
    let valid = markup.lines().skip(1).all(|line| {
        let line = line.trim_start();
        line.is_empty() || line.starts_with('#')
    });
    if !valid {
        return Err(ctx.syntax_error("errors.syntax.inline_comment_invalid", &[]));
    }
    Ok(Box::new(Comment { name: "#" }))
}

/// `raw` ... `endraw`: the enclosed source, output verbatim.
#[derive(Debug)]
pub struct Raw {
    body: String,
}

pub fn parse_raw(
    name: &str,
    markup: &str,
    tokens: &mut Tokenizer<'_>,
    ctx: &mut ParseContext<'_>,
) -> Result<Box<dyn Tag>> {
    if !markup.is_empty() {
        return Err(ctx.syntax_error("errors.syntax.tag_unexpected_args", &[("tag", name)]));
    }
    let trim_start = ctx.take_trim_whitespace();
    let mut body = String::new();
    loop {
        let token = tokens.next_token();
        match (&token, tag_name(&token)) {
            (Token::Eof, _) => {
                return Err(ctx.syntax_error("errors.syntax.tag_never_closed", &[("block_name", name)]));
            }
            (_, Some(("endraw", trim_left, trim_right))) => {
                if trim_left {
                    body.truncate(body.trim_end().len());
                }
                ctx.trim_whitespace = trim_right;
                break;
            }
            (Token::Text { text, .. }, _) => body.push_str(text),
            (Token::Output(delimited) | Token::Tag(delimited), _) => body.push_str(delimited.source),
        }
    }
    if trim_start {
        body = body.trim_start().to_string();
    }
    Ok(Box::new(Raw { body }))
}

impl Tag for Raw {
    fn name(&self) -> &str {
        "raw"
    }

    fn blank(&self) -> bool {
        self.body.is_empty()
    }

    fn render(&self, context: &mut Context<'_>, output: &mut String) -> Result<()> {
        context.emit(output, &self.body)
    }
}
