//! Tag trait and the standard tag set.
//!
//! A tag is registered as a constructor under its name. The constructor
//! receives the name, the markup after it, the token stream (block tags
//! keep consuming it through [`parse_block`](crate::block_body::parse_block))
//! and the parse context.

use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Result;
use crate::lexer::Tokenizer;
use crate::parse_context::ParseContext;
use crate::registry::Registry;

pub mod assign;
pub mod capture;
pub mod case;
pub mod comment;
pub mod echo;
pub mod for_tag;
pub mod if_tag;
pub mod include;
pub mod interrupts;
pub mod liquid;

pub trait Tag: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Line the tag started on, when line tracking was enabled.
    fn line_number(&self) -> Option<u32> {
        None
    }

    /// A blank tag never writes visible output; errors it raises are
    /// recorded but not rendered inline.
    fn blank(&self) -> bool {
        false
    }

    fn render(&self, context: &mut Context<'_>, output: &mut String) -> Result<()>;
}

pub type TagConstructor = Arc<
    dyn Fn(&str, &str, &mut Tokenizer<'_>, &mut ParseContext<'_>) -> Result<Box<dyn Tag>>
        + Send
        + Sync,
>;

pub(crate) fn register_standard(registry: &mut Registry) {
    registry
        .register_tag("if", if_tag::parse_if)
        .register_tag("unless", if_tag::parse_unless)
        .register_tag("case", case::parse)
        .register_tag("for", for_tag::parse)
        .register_tag("break", interrupts::parse)
        .register_tag("continue", interrupts::parse)
        .register_tag("assign", assign::parse)
        .register_tag("capture", capture::parse)
        .register_tag("comment", comment::parse_comment)
        .register_tag("#", comment::parse_inline)
        .register_tag("raw", comment::parse_raw)
        .register_tag("echo", echo::parse)
        .register_tag("liquid", liquid::parse)
        .register_tag("include", include::parse_include)
        .register_tag("render", include::parse_render);
}
