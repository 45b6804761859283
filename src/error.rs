//! Engine error type.
//!
//! Every failure the engine knows about is an [`Error`] carrying an
//! [`ErrorKind`], a message and, when available, the template name and
//! line number it was raised at. `Display` renders the exact inline form
//! used in template output, e.g. `Liquid error (page line 3): divided by 0`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// What went wrong.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Grammar violation found while parsing.
    Syntax,
    /// Wrong-typed or missing tag/filter argument.
    Argument,
    /// Generic runtime failure raised by host data.
    Standard,
    /// Engine-internal failure.
    Internal,
    /// Nesting ceiling exceeded (parse or render time).
    StackLevel,
    /// A resource limit was exceeded.
    Memory,
    /// A partial could not be loaded.
    FileSystem,
    ZeroDivision,
    UndefinedVariable,
    UndefinedFilter,
    UndefinedDropMethod,
    /// Failure that the engine does not recognise. Never rendered inline.
    Foreign,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{}{}{message}", prefix(.kind), location(.template_name, .line_number))]
pub struct Error {
    kind: ErrorKind,
    message: String,
    line_number: Option<u32>,
    template_name: Option<String>,
}

fn prefix(kind: &ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Syntax => "Liquid syntax error",
        _ => "Liquid error",
    }
}

fn location(template_name: &Option<String>, line_number: &Option<u32>) -> String {
    match (template_name, line_number) {
        (Some(name), Some(line)) => format!(" ({name} line {line}): "),
        (None, Some(line)) => format!(" (line {line}): "),
        _ => ": ".to_string(),
    }
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line_number: None,
            template_name: None,
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, message)
    }

    pub fn argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Argument, message)
    }

    pub fn standard(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Standard, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn stack_level() -> Self {
        Self::new(ErrorKind::StackLevel, "Nesting too deep")
    }

    pub fn memory() -> Self {
        Self::new(ErrorKind::Memory, "Memory limits exceeded")
    }

    /// Wrap a host-side failure that should propagate out of the render.
    pub fn foreign(err: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::Foreign, err.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The bare message, without the `Liquid error` prefix.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn line_number(&self) -> Option<u32> {
        self.line_number
    }

    pub fn template_name(&self) -> Option<&str> {
        self.template_name.as_deref()
    }

    /// Set the line number unless one is already attached.
    pub fn with_line_number(mut self, line_number: Option<u32>) -> Self {
        if self.line_number.is_none() {
            self.line_number = line_number;
        }
        self
    }

    /// Set the template name unless one is already attached.
    pub fn with_template_name(mut self, name: Option<&str>) -> Self {
        if self.template_name.is_none() {
            self.template_name = name.map(str::to_owned);
        }
        self
    }

    /// Errors the per-node rescue records without rendering anything.
    pub(crate) fn is_undefined(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::UndefinedVariable | ErrorKind::UndefinedFilter | ErrorKind::UndefinedDropMethod
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn display_without_location() {
        let err = Error::argument("invalid integer");
        assert_eq!(err.to_string(), "Liquid error: invalid integer");
    }

    #[test]
    fn display_with_line_and_name() {
        let err = Error::standard("boom")
            .with_line_number(Some(4))
            .with_template_name(Some("product"));
        assert_eq!(err.to_string(), "Liquid error (product line 4): boom");
    }

    #[test]
    fn syntax_errors_use_syntax_prefix() {
        let err = Error::syntax("Unknown tag 'foo'").with_line_number(Some(1));
        assert_eq!(err.to_string(), "Liquid syntax error (line 1): Unknown tag 'foo'");
    }

    #[test]
    fn first_location_wins() {
        let err = Error::memory().with_line_number(Some(2)).with_line_number(Some(9));
        assert_eq!(err.line_number(), Some(2));
    }
}
