//! Render-time state.
//!
//! A [`Context`] lives for one render. It owns the scope stack (innermost
//! last, never empty), the read-only environments consulted after the
//! scopes, the registers side channel, the pending `break`/`continue`
//! interrupts, the resource counters and the errors rescued so far.

use std::fmt;
use std::mem;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::ast::{Condition, Expression, Variable};
use crate::block_body::Document;
use crate::error::{Error, ErrorKind, Result};
use crate::eval;
use crate::parse_context::{ParseContext, ParseOptions};
use crate::registry::Registry;
use crate::resource_limits::{assign_score_of, ResourceLimits};
use crate::value::{Object, Value};

/// Produces the text that replaces a rescued render error.
pub type ExceptionRenderer = Arc<dyn Fn(&Error) -> String + Send + Sync>;

/// Cooperative loop control pushed by `break`/`continue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Break,
    Continue,
}

/// Cross-tag state that is not part of the variable namespace.
#[derive(Debug, Clone, Default)]
pub struct Registers {
    values: FxHashMap<String, Value>,
    /// `offset:continue` positions, keyed by `var-collection`.
    pub(crate) offsets: FxHashMap<String, usize>,
    /// Parsed partials, keyed by name.
    pub(crate) partials: FxHashMap<String, Arc<Document>>,
}

impl Registers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    /// Number of partials parsed and cached so far.
    pub fn cached_partials(&self) -> usize {
        self.partials.len()
    }
}

/// Per-render switches.
#[derive(Clone, Default)]
pub struct RenderOptions {
    /// Missing variables and drop methods raise instead of yielding nil.
    pub strict_variables: bool,
    /// Unknown filters raise instead of passing the input through.
    pub strict_filters: bool,
    /// Overrides the registry's exception renderer for this render.
    pub exception_renderer: Option<ExceptionRenderer>,
    /// Initial registers; a fresh set is used when absent.
    pub registers: Option<Registers>,
}

impl fmt::Debug for RenderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderOptions")
            .field("strict_variables", &self.strict_variables)
            .field("strict_filters", &self.strict_filters)
            .field("exception_renderer", &self.exception_renderer.is_some())
            .field("registers", &self.registers)
            .finish()
    }
}

impl RenderOptions {
    pub fn strict_variables(mut self) -> Self {
        self.strict_variables = true;
        self
    }

    pub fn strict_filters(mut self) -> Self {
        self.strict_filters = true;
        self
    }

    pub fn with_exception_renderer<F>(mut self, renderer: F) -> Self
    where
        F: Fn(&Error) -> String + Send + Sync + 'static,
    {
        self.exception_renderer = Some(Arc::new(renderer));
        self
    }

    pub fn with_registers(mut self, registers: Registers) -> Self {
        self.registers = Some(registers);
        self
    }
}

pub struct Context<'r> {
    registry: &'r Registry,
    scopes: Vec<Object>,
    environments: Vec<Object>,
    registers: Registers,
    interrupts: Vec<Interrupt>,
    resource_limits: ResourceLimits,
    errors: Vec<Error>,
    exception_renderer: Option<ExceptionRenderer>,
    template_name: Option<String>,
    parse_options: ParseOptions,
    strict_variables: bool,
    strict_filters: bool,
    rethrow_errors: bool,
    disabled_tags: Vec<String>,
    for_stack: Vec<Value>,
}

impl fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("scopes", &self.scopes)
            .field("environments", &self.environments)
            .field("interrupts", &self.interrupts)
            .field("resource_limits", &self.resource_limits)
            .field("errors", &self.errors)
            .field("template_name", &self.template_name)
            .finish_non_exhaustive()
    }
}

impl<'r> Context<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            scopes: vec![Object::new()],
            environments: Vec::new(),
            registers: Registers::default(),
            interrupts: Vec::new(),
            resource_limits: ResourceLimits::default(),
            errors: Vec::new(),
            exception_renderer: registry.exception_renderer().cloned(),
            template_name: None,
            parse_options: ParseOptions::default(),
            strict_variables: false,
            strict_filters: false,
            rethrow_errors: false,
            disabled_tags: Vec::new(),
            for_stack: Vec::new(),
        }
    }

    /// Append a read-only environment, consulted after every scope and
    /// after the environments added before it.
    pub fn with_environment(mut self, environment: Object) -> Self {
        self.environments.push(environment);
        self
    }

    /// Replace the outermost scope, where assignments land.
    pub fn with_outer_scope(mut self, scope: Object) -> Self {
        if let Some(outer) = self.scopes.first_mut() {
            *outer = scope;
        }
        self
    }

    pub fn with_resource_limits(mut self, limits: ResourceLimits) -> Self {
        self.resource_limits = limits;
        self
    }

    pub fn with_options(mut self, options: &RenderOptions) -> Self {
        self.strict_variables = options.strict_variables;
        self.strict_filters = options.strict_filters;
        if let Some(renderer) = &options.exception_renderer {
            self.exception_renderer = Some(Arc::clone(renderer));
        }
        if let Some(registers) = &options.registers {
            self.registers = registers.clone();
        }
        self
    }

    pub fn with_template_name(mut self, name: Option<String>) -> Self {
        self.template_name = name;
        self
    }

    /// Options used when parsing partials during this render.
    pub fn with_parse_options(mut self, options: ParseOptions) -> Self {
        self.parse_options = options;
        self
    }

    /// Return rescued errors to the caller instead of rendering them.
    pub fn with_rethrow_errors(mut self, rethrow: bool) -> Self {
        self.rethrow_errors = rethrow;
        self
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    pub fn strict_variables(&self) -> bool {
        self.strict_variables
    }

    pub fn strict_filters(&self) -> bool {
        self.strict_filters
    }

    pub fn template_name(&self) -> Option<&str> {
        self.template_name.as_deref()
    }

    pub(crate) fn replace_template_name(&mut self, name: Option<String>) -> Option<String> {
        mem::replace(&mut self.template_name, name)
    }

    /// Scopes innermost first, then environments in order.
    pub fn find_variable(&self, key: &str) -> Option<Value> {
        self.scopes
            .iter()
            .rev()
            .chain(self.environments.iter())
            .find_map(|scope| scope.get(key))
            .cloned()
    }

    pub fn evaluate(&self, expression: &Expression) -> Result<Value> {
        eval::evaluate(expression, self)
    }

    pub fn evaluate_variable(&self, variable: &Variable) -> Result<Value> {
        eval::evaluate_variable(variable, self)
    }

    pub fn evaluate_condition(&self, condition: &Condition) -> Result<bool> {
        eval::evaluate_condition(condition, self)
    }

    /// Bind `key` in the innermost scope.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(key.into(), value.into());
        }
    }

    /// Bind `key` in the outermost scope and charge its assign score.
    pub fn assign(&mut self, key: impl Into<String>, value: Value) -> Result<()> {
        self.resource_limits
            .increment_assign_score(assign_score_of(&value))?;
        self.assign_unscored(key.into(), value);
        Ok(())
    }

    /// Outermost-scope binding for captured text, already charged while
    /// it was written.
    pub(crate) fn assign_unscored(&mut self, key: String, value: Value) {
        if let Some(scope) = self.scopes.first_mut() {
            scope.insert(key, value);
        }
    }

    /// Run `f` inside a fresh innermost scope, one render level deeper.
    pub fn stack<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.resource_limits.enter_scope()?;
        self.scopes.push(Object::new());
        let result = f(self);
        self.scopes.pop();
        self.resource_limits.exit_scope();
        result
    }

    pub fn push_interrupt(&mut self, interrupt: Interrupt) {
        self.interrupts.push(interrupt);
    }

    pub fn pop_interrupt(&mut self) -> Option<Interrupt> {
        self.interrupts.pop()
    }

    pub fn interrupted(&self) -> bool {
        !self.interrupts.is_empty()
    }

    /// Append `text` to `output`, charging its byte length.
    pub fn emit(&mut self, output: &mut String, text: &str) -> Result<()> {
        output.push_str(text);
        self.resource_limits.increment_write_score(text.len())
    }

    pub fn resource_limits(&self) -> &ResourceLimits {
        &self.resource_limits
    }

    pub fn resource_limits_mut(&mut self) -> &mut ResourceLimits {
        &mut self.resource_limits
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    /// Errors rescued so far in this render.
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    fn render_exception(&self, err: &Error) -> String {
        match &self.exception_renderer {
            Some(renderer) => renderer(err),
            None => err.to_string(),
        }
    }

    /// Per-node error handling.
    ///
    /// Memory and foreign errors (and everything, when rethrowing)
    /// propagate. Undefined-name errors are only recorded. Anything else
    /// is recorded and its rendered text emitted, unless the failing node
    /// is blank.
    pub fn rescue(
        &mut self,
        err: Error,
        line_number: Option<u32>,
        blank: bool,
        output: &mut String,
    ) -> Result<()> {
        if self.rethrow_errors || matches!(err.kind(), ErrorKind::Memory | ErrorKind::Foreign) {
            return Err(err);
        }
        let err = err
            .with_line_number(line_number)
            .with_template_name(self.template_name.as_deref());
        tracing::debug!(error = %err, "rescued render error");
        if err.is_undefined() {
            self.errors.push(err);
            return Ok(());
        }
        let text = self.render_exception(&err);
        self.errors.push(err);
        if blank {
            return Ok(());
        }
        self.emit(output, &text)
    }

    pub fn tag_disabled(&self, name: &str) -> bool {
        self.disabled_tags.iter().any(|tag| tag == name)
    }

    /// Run `f` with an isolated sub-context.
    ///
    /// The sub-context starts with one empty scope, no environments and
    /// no interrupts, and has `include` disabled. It shares this
    /// context's registers, resource counters and error list, which are
    /// handed back when `f` returns.
    pub fn isolated<T>(&mut self, template_name: Option<String>, f: impl FnOnce(&mut Context<'r>) -> T) -> T {
        let mut disabled_tags = self.disabled_tags.clone();
        disabled_tags.push("include".to_string());
        let mut sub = Context {
            registry: self.registry,
            scopes: vec![Object::new()],
            environments: Vec::new(),
            registers: mem::take(&mut self.registers),
            interrupts: Vec::new(),
            resource_limits: mem::take(&mut self.resource_limits),
            errors: mem::take(&mut self.errors),
            exception_renderer: self.exception_renderer.clone(),
            template_name,
            parse_options: self.parse_options.clone(),
            strict_variables: self.strict_variables,
            strict_filters: self.strict_filters,
            rethrow_errors: self.rethrow_errors,
            disabled_tags,
            for_stack: Vec::new(),
        };
        let result = f(&mut sub);
        self.registers = sub.registers;
        self.resource_limits = sub.resource_limits;
        self.errors = sub.errors;
        result
    }

    /// Parse (or fetch from the registers cache) the partial `name`.
    pub fn load_partial(&mut self, name: &str) -> Result<Arc<Document>> {
        if let Some(document) = self.registers.partials.get(name) {
            tracing::debug!(partial = name, "partial cache hit");
            return Ok(Arc::clone(document));
        }
        tracing::debug!(partial = name, "loading partial");
        let source = self.registry.file_system().read_template_file(name)?;
        let options = ParseOptions {
            name: Some(name.to_string()),
            ..self.parse_options.clone()
        };
        let mut ctx = ParseContext::new(self.registry, &options);
        let document = Arc::new(Document::parse(&source, &mut ctx)?);
        self.registers
            .partials
            .insert(name.to_string(), Arc::clone(&document));
        Ok(document)
    }

    pub(crate) fn current_forloop(&self) -> Option<&Value> {
        self.for_stack.last()
    }

    pub(crate) fn push_forloop(&mut self, forloop: Value) {
        self.for_stack.push(forloop);
    }

    pub(crate) fn pop_forloop(&mut self) {
        self.for_stack.pop();
    }

    /// Outermost scope, resource counters and rescued errors.
    pub(crate) fn finish(mut self) -> (Object, ResourceLimits, Vec<Error>) {
        let outer = if self.scopes.is_empty() {
            Object::new()
        } else {
            self.scopes.swap_remove(0)
        };
        (outer, self.resource_limits, self.errors)
    }
}
