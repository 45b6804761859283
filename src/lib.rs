//! shimmyliquid: an embeddable Liquid-style template engine.
//!
//! Templates are parsed once into a tree of nodes and rendered many times
//! against host data. Rendering is sandboxed: templates only reach data
//! they are given, host objects expose an explicit allow-list of methods
//! through [`LiquidDrop`], and every render is bounded by deterministic
//! [`ResourceLimits`].
//!
//! ```
//! use shimmyliquid::{Template, object_from_json};
//! use serde_json::json;
//!
//! let mut template = Template::compile("Hello {{ name | upcase }}!").unwrap();
//! let out = template.render(object_from_json(json!({"name": "world"}))).unwrap();
//! assert_eq!(out, "Hello WORLD!");
//! ```
//!
//! Parse-time strictness is controlled by [`ErrorMode`]:
//! - `Lax` recovers from malformed markup with a best-effort parse.
//! - `Warn` recovers the same way but records each deviation in
//!   [`Template::warnings`].
//! - `Strict` fails on the first deviation.
//!
//! Render-time errors are rescued per node and rendered inline as
//! `Liquid error (line N): message`, so one failing expression does not
//! blank the whole page. [`Template::render_strict`] returns them instead.
//!
//! Custom tags and filters are registered on a [`Registry`]; block tags
//! are built on [`parse_block`].

pub mod ast;
pub mod block_body;
pub mod context;
pub mod drop;
pub mod error;
pub mod eval;
pub mod file_system;
pub mod filters;
pub mod lexer;
pub mod locale;
pub mod parse_context;
pub mod parser;
pub mod registry;
pub mod resource_limits;
pub mod tags;
pub mod template;
pub mod value;

pub use block_body::{parse_block, unknown_tag, BlockBody, BlockStep, BodyEnd, Document, ParsedBlock};
pub use context::{Context, ExceptionRenderer, Interrupt, Registers, RenderOptions};
pub use drop::LiquidDrop;
pub use error::{Error, ErrorKind, Result};
pub use file_system::{BlankFileSystem, FileSystem, MemoryFileSystem};
pub use filters::FilterArgs;
pub use locale::Locale;
pub use parse_context::{ErrorMode, ParseContext, ParseOptions};
pub use registry::Registry;
pub use resource_limits::ResourceLimits;
pub use tags::Tag;
pub use template::Template;
pub use value::{object_from_json, Object, Value};

/// Parse and render `source` in one go with the standard registry.
///
/// `assigns` should be a JSON object; anything else renders with no
/// variables.
pub fn render(source: &str, assigns: serde_json::Value) -> Result<String> {
    Template::compile(source)?.render(object_from_json(assigns))
}
