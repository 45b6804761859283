//! The generic block framework.
//!
//! [`BlockBody::parse`] turns tokens into nodes until it meets a tag name
//! that no constructor is registered for, and hands that name back to the
//! caller. Block tags drive it through [`parse_block`], which routes the
//! handed-back names (`else`, `elsif`, `when`, ...) to a per-tag callback
//! and stops at the matching `end<name>`.

use crate::ast::Variable;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::lexer::{split_tag_markup, DelimiterKind, Token, Tokenizer};
use crate::parse_context::ParseContext;
use crate::tags::Tag;

/// Anything renderable.
#[derive(Debug)]
pub enum Node {
    Text(String),
    Variable(Variable),
    Tag(Box<dyn Tag>),
}

/// Why [`BlockBody::parse`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEnd<'s> {
    /// A tag with no registered constructor, left for the owner.
    Tag {
        name: &'s str,
        markup: &'s str,
        line_number: u32,
    },
    Eof,
}

/// What a block owner decided about a handed-back tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStep {
    /// Keep parsing into the current body.
    Continue,
    /// Start a new sibling body (`else`, `elsif`, `when`).
    NewBody,
    /// The block is complete.
    End,
}

#[derive(Debug)]
pub struct BlockBody {
    nodes: Vec<Node>,
    blank: bool,
}

impl Default for BlockBody {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockBody {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            blank: true,
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whitespace-only text, no output nodes, and only blank tags.
    pub fn blank(&self) -> bool {
        self.blank
    }

    pub fn push(&mut self, node: Node) {
        match &node {
            Node::Text(text) => self.blank &= text.trim().is_empty(),
            Node::Variable(_) => self.blank = false,
            Node::Tag(tag) => self.blank &= tag.blank(),
        }
        self.nodes.push(node);
    }

    /// Drop the text nodes of a body whose block renders nothing visible.
    pub fn remove_blank_strings(&mut self) {
        self.nodes.retain(|node| !matches!(node, Node::Text(_)));
    }

    fn trim_previous_text(&mut self) {
        if let Some(Node::Text(text)) = self.nodes.last_mut() {
            text.truncate(text.trim_end().len());
            if text.is_empty() {
                self.nodes.pop();
            }
        }
    }

    /// Consume tokens into this body.
    ///
    /// Stops at end of input or at the first tag no constructor is
    /// registered for. Can be called again to keep appending.
    pub fn parse<'s>(
        &mut self,
        tokens: &mut Tokenizer<'s>,
        ctx: &mut ParseContext<'_>,
    ) -> Result<BodyEnd<'s>> {
        loop {
            match tokens.next_token() {
                Token::Eof => return Ok(BodyEnd::Eof),
                Token::Text { text, .. } => {
                    let text = if ctx.take_trim_whitespace() {
                        text.trim_start()
                    } else {
                        text
                    };
                    if !text.is_empty() {
                        self.push(Node::Text(text.to_string()));
                    }
                }
                Token::Output(delimited) => {
                    ctx.set_line_number(delimited.line_number);
                    if delimited.trim_left {
                        self.trim_previous_text();
                    }
                    ctx.trim_whitespace = delimited.trim_right;
                    let variable = ctx.parse_variable(delimited.markup)?;
                    self.push(Node::Variable(variable));
                }
                Token::Tag(delimited) => {
                    ctx.set_line_number(delimited.line_number);
                    if delimited.trim_left {
                        self.trim_previous_text();
                    }
                    ctx.trim_whitespace = delimited.trim_right;
                    let Some((name, markup)) = split_tag_markup(delimited.markup) else {
                        return Err(ctx.syntax_error(
                            "errors.syntax.tag_termination",
                            &[("token", delimited.source), ("tag_end", "%}")],
                        ));
                    };
                    let Some(constructor) = ctx.registry().tag(name) else {
                        return Ok(BodyEnd::Tag {
                            name,
                            markup,
                            line_number: delimited.line_number,
                        });
                    };
                    let line_number = ctx.line_number();
                    tracing::trace!(tag = name, line = delimited.line_number, "parsing tag");
                    let tag = constructor(name, markup, tokens, ctx)
                        .map_err(|err| err.with_line_number(line_number))?;
                    self.push(Node::Tag(tag));
                }
            }
        }
    }

    /// Render every node into `output`.
    ///
    /// Errors raised by a node are handed to [`Context::rescue`], so one
    /// failing node does not stop its siblings. Rendering stops early
    /// once a `break`/`continue` is pending.
    pub fn render(&self, context: &mut Context<'_>, output: &mut String) -> Result<()> {
        context
            .resource_limits_mut()
            .increment_render_score(self.nodes.len())?;
        for node in &self.nodes {
            match node {
                Node::Text(text) => context.emit(output, text)?,
                Node::Variable(variable) => {
                    let rendered = context
                        .evaluate_variable(variable)
                        .map(|value| value.to_string());
                    match rendered {
                        Ok(text) => context.emit(output, &text)?,
                        Err(err) => context.rescue(err, variable.line_number, false, output)?,
                    }
                }
                Node::Tag(tag) => {
                    if let Err(err) = tag.render(context, output) {
                        context.rescue(err, tag.line_number(), tag.blank(), output)?;
                    }
                    if context.interrupted() {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Error for a handed-back tag that the owning block does not claim.
pub fn unknown_tag(block_name: &str, tag: &str, ctx: &ParseContext<'_>) -> Error {
    unknown_tag_with_delimiter(block_name, &format!("end{block_name}"), tag, ctx)
}

pub(crate) fn unknown_tag_with_delimiter(
    block_name: &str,
    block_delimiter: &str,
    tag: &str,
    ctx: &ParseContext<'_>,
) -> Error {
    if tag == "else" {
        ctx.syntax_error("errors.syntax.unexpected_else", &[("block_name", block_name)])
    } else if tag.starts_with("end") {
        ctx.syntax_error(
            "errors.syntax.invalid_delimiter",
            &[
                ("tag", tag),
                ("block_name", block_name),
                ("block_delimiter", block_delimiter),
            ],
        )
    } else {
        ctx.syntax_error("errors.syntax.unknown_tag", &[("tag", tag)])
    }
}

/// A block tag's parsed bodies.
#[derive(Debug)]
pub struct ParsedBlock {
    /// The opening body first, then one per [`BlockStep::NewBody`].
    pub bodies: Vec<BlockBody>,
    pub blank: bool,
}

impl ParsedBlock {
    /// Remove the whitespace text of a block that renders nothing visible.
    pub fn without_blank_text(mut self) -> Self {
        if self.blank {
            self.bodies.iter_mut().for_each(BlockBody::remove_blank_strings);
        }
        self
    }
}

/// Parse the bodies of block `block_name` up to its `end<block_name>`.
///
/// Every handed-back tag other than the end tag goes to `on_tag`, which
/// decides whether it continues the current body, opens a new one or ends
/// the block. Unclaimed names should be answered with [`unknown_tag`].
pub fn parse_block<'s>(
    block_name: &str,
    tokens: &mut Tokenizer<'s>,
    ctx: &mut ParseContext<'_>,
    mut on_tag: impl FnMut(&'s str, &'s str, &mut ParseContext<'_>) -> Result<BlockStep>,
) -> Result<ParsedBlock> {
    let end_tag = format!("end{block_name}");
    let mut bodies = vec![BlockBody::new()];
    loop {
        let Some(body) = bodies.last_mut() else {
            return Err(Error::internal("block has no body"));
        };
        match ctx.nested(|ctx| body.parse(tokens, ctx))? {
            BodyEnd::Eof => {
                return Err(ctx.syntax_error(
                    "errors.syntax.tag_never_closed",
                    &[("block_name", block_name)],
                ));
            }
            BodyEnd::Tag { name, .. } if name == end_tag => break,
            BodyEnd::Tag { name, markup, .. } => match on_tag(name, markup, ctx)? {
                BlockStep::Continue => {}
                BlockStep::NewBody => bodies.push(BlockBody::new()),
                BlockStep::End => break,
            },
        }
    }

    let blank = bodies.iter().all(BlockBody::blank);
    Ok(ParsedBlock { bodies, blank })
}

/// A parsed template or partial.
#[derive(Debug, Default)]
pub struct Document {
    body: BlockBody,
}

impl Document {
    pub fn parse(source: &str, ctx: &mut ParseContext<'_>) -> Result<Self> {
        let mut tokens = Tokenizer::new(source);
        Self::parse_tokens(&mut tokens, ctx).map_err(|err| err.with_template_name(ctx.template_name()))
    }

    fn parse_tokens(tokens: &mut Tokenizer<'_>, ctx: &mut ParseContext<'_>) -> Result<Self> {
        let mut body = BlockBody::new();
        match body.parse(tokens, ctx)? {
            BodyEnd::Eof => match tokens.unterminated() {
                None => Ok(Self { body }),
                Some(unterminated) => {
                    ctx.set_line_number(unterminated.line_number);
                    let (key, tag_end) = match unterminated.kind {
                        DelimiterKind::Output => ("errors.syntax.variable_termination", "}}"),
                        DelimiterKind::Tag => ("errors.syntax.tag_termination", "%}"),
                    };
                    Err(ctx.syntax_error(key, &[("token", unterminated.source), ("tag_end", tag_end)]))
                }
            },
            BodyEnd::Tag { name, .. } => Err(outer_tag_error(name, ctx)),
        }
    }

    pub fn body(&self) -> &BlockBody {
        &self.body
    }

    pub fn render(&self, context: &mut Context<'_>, output: &mut String) -> Result<()> {
        self.body.render(context, output)
    }
}

/// Error for a handed-back tag at the top level of a document.
pub(crate) fn outer_tag_error(tag: &str, ctx: &ParseContext<'_>) -> Error {
    match tag {
        "else" | "end" => ctx.syntax_error("errors.syntax.unexpected_outer_tag", &[("tag", tag)]),
        _ => ctx.syntax_error("errors.syntax.unknown_tag", &[("tag", tag)]),
    }
}
