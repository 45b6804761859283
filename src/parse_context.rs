//! Parse-time state shared by every tag constructor of one parse.

use crate::ast::{Condition, Expression, Variable};
use crate::error::{Error, ErrorKind, Result};
use crate::parser;
use crate::registry::Registry;

/// How grammar deviations are treated while parsing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorMode {
    /// Recover silently with a best-effort parse.
    #[default]
    Lax,
    /// Recover like `Lax`, but record each deviation as a warning.
    Warn,
    /// Raise a syntax error on the first deviation.
    Strict,
}

#[derive(Clone, Debug, Default)]
pub struct ParseOptions {
    /// Overrides the registry's default mode.
    pub error_mode: Option<ErrorMode>,
    /// Attach line numbers to syntax and render errors.
    pub line_numbers: bool,
    /// Template name shown in error messages.
    pub name: Option<String>,
}

impl ParseOptions {
    pub fn strict() -> Self {
        Self {
            error_mode: Some(ErrorMode::Strict),
            ..Self::default()
        }
    }

    pub fn with_error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = Some(mode);
        self
    }

    pub fn with_line_numbers(mut self, line_numbers: bool) -> Self {
        self.line_numbers = line_numbers;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

pub struct ParseContext<'r> {
    registry: &'r Registry,
    error_mode: ErrorMode,
    line_numbers: bool,
    template_name: Option<String>,
    depth: usize,
    line_number: u32,
    /// Set by a `-}}`/`-%}` delimiter; consumed by the next text token.
    pub(crate) trim_whitespace: bool,
    warnings: Vec<Error>,
}

impl<'r> ParseContext<'r> {
    pub fn new(registry: &'r Registry, options: &ParseOptions) -> Self {
        Self {
            registry,
            error_mode: options.error_mode.unwrap_or_else(|| registry.error_mode()),
            line_numbers: options.line_numbers,
            template_name: options.name.clone(),
            depth: 0,
            line_number: 1,
            trim_whitespace: false,
            warnings: Vec::new(),
        }
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    pub fn error_mode(&self) -> ErrorMode {
        self.error_mode
    }

    pub fn template_name(&self) -> Option<&str> {
        self.template_name.as_deref()
    }

    /// Block nesting depth of the body currently being parsed.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Line of the token being parsed, when line tracking is enabled.
    pub fn line_number(&self) -> Option<u32> {
        self.line_numbers.then_some(self.line_number)
    }

    pub(crate) fn set_line_number(&mut self, line_number: u32) {
        self.line_number = line_number;
    }

    pub fn warnings(&self) -> &[Error] {
        &self.warnings
    }

    pub(crate) fn take_warnings(&mut self) -> Vec<Error> {
        std::mem::take(&mut self.warnings)
    }

    pub(crate) fn take_trim_whitespace(&mut self) -> bool {
        std::mem::take(&mut self.trim_whitespace)
    }

    /// Run `f` one block level deeper.
    ///
    /// Fails with a stack-level error once the registry's nesting ceiling
    /// is reached, before `f` runs.
    pub fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= self.registry.nesting_limit() {
            return Err(Error::stack_level().with_line_number(self.line_number()));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// Translate a message key through the registry's locale.
    pub fn t(&self, key: &str, vars: &[(&str, &str)]) -> String {
        self.registry.locale().t(key, vars)
    }

    /// A syntax error carrying the translated message for `key` and the
    /// current line.
    pub fn syntax_error(&self, key: &str, vars: &[(&str, &str)]) -> Error {
        Error::syntax(self.t(key, vars)).with_line_number(self.line_number())
    }

    /// Dispatch on the error mode.
    ///
    /// Strict runs `strict` only. Lax runs `lax` only. Warn runs `strict`
    /// first and, if it fails, records the error as a warning and falls
    /// back to `lax`.
    pub fn parse_with_mode<T>(
        &mut self,
        markup: &str,
        strict: impl FnOnce(&str) -> Result<T>,
        lax: impl FnOnce(&str) -> Result<T>,
    ) -> Result<T> {
        match self.error_mode {
            ErrorMode::Strict => strict(markup).map_err(|err| err.with_line_number(self.line_number())),
            ErrorMode::Lax => lax(markup),
            ErrorMode::Warn => match strict(markup) {
                Ok(parsed) => Ok(parsed),
                Err(err) => {
                    tracing::debug!(markup, error = %err, "falling back to lax parse");
                    let warning = err
                        .with_line_number(self.line_number())
                        .with_template_name(self.template_name.as_deref());
                    self.warnings.push(warning);
                    lax(markup)
                }
            },
        }
    }

    /// Parse `{{ }}`-style markup into a [`Variable`].
    pub fn parse_variable(&mut self, markup: &str) -> Result<Variable> {
        let line_number = self.line_number();
        let (expression, filters) =
            self.parse_with_mode(markup, parser::parse_variable_strict, parser::parse_variable_lax)?;
        Ok(Variable {
            expression,
            filters,
            line_number,
        })
    }

    /// Parse a condition; lax failures report `errors.syntax.<tag>`.
    pub fn parse_condition(&mut self, tag: &str, markup: &str) -> Result<Condition> {
        let message = self.t(&format!("errors.syntax.{tag}"), &[]);
        self.parse_with_mode(markup, parser::parse_condition_strict, |m| {
            parser::parse_condition_lax(m).map_err(|err| lax_error(err, message))
        })
    }

    pub fn parse_expression(&mut self, markup: &str) -> Result<Expression> {
        self.parse_with_mode(markup, parser::parse_expression_strict, parser::parse_expression_lax)
    }
}

/// The error a lax parser reports for `err`: nesting overflow as is,
/// anything else as the tag's generic syntax `message`.
pub(crate) fn lax_error(err: Error, message: String) -> Error {
    match err.kind() {
        ErrorKind::StackLevel => err,
        _ => Error::syntax(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nesting_ceiling() {
        let registry = Registry::new().with_nesting_limit(2);
        let mut ctx = ParseContext::new(&registry, &ParseOptions::default());
        let ok = ctx.nested(|ctx| ctx.nested(|ctx| Ok(ctx.depth())));
        assert_eq!(ok, Ok(2));
        let err = ctx
            .nested(|ctx| ctx.nested(|ctx| ctx.nested(|_| Ok(()))))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::StackLevel);
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn warn_mode_records_and_recovers() {
        let registry = Registry::new();
        let options = ParseOptions::default()
            .with_error_mode(ErrorMode::Warn)
            .with_line_numbers(true);
        let mut ctx = ParseContext::new(&registry, &options);
        ctx.set_line_number(7);
        let variable = ctx.parse_variable("x | append: 'a',").unwrap();
        assert_eq!(variable.filters.len(), 1);
        assert_eq!(ctx.warnings().len(), 1);
        assert_eq!(ctx.warnings()[0].line_number(), Some(7));
    }

    #[test]
    fn strict_mode_raises() {
        let registry = Registry::new();
        let mut ctx = ParseContext::new(&registry, &ParseOptions::strict());
        assert!(ctx.parse_variable("x | append: 'a',").is_err());
        assert!(ctx.parse_condition("if", "a == b == c").is_err());
    }

    #[test]
    fn lax_condition_failure_uses_tag_message() {
        let registry = Registry::new();
        let mut ctx = ParseContext::new(&registry, &ParseOptions::default());
        let err = ctx.parse_condition("if", "").unwrap_err();
        assert_eq!(err.message(), "Syntax Error in tag 'if' - Valid syntax: if [expression]");
    }
}
