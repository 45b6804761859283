//! Parse once, render many times.

use std::mem;
use std::sync::Arc;

use crate::block_body::Document;
use crate::context::{Context, RenderOptions};
use crate::error::{Error, ErrorKind, Result};
use crate::parse_context::{ParseContext, ParseOptions};
use crate::registry::Registry;
use crate::resource_limits::ResourceLimits;
use crate::value::Object;

/// A parsed template plus the state that persists between its renders.
///
/// Variable lookup during a render sees, in order of precedence: the
/// assigns passed to that render, values assigned by earlier renders of
/// this template, and the presets in [`Template::assigns_mut`].
#[derive(Debug)]
pub struct Template {
    registry: Arc<Registry>,
    root: Option<Arc<Document>>,
    options: ParseOptions,
    assigns: Object,
    instance_assigns: Object,
    resource_limits: ResourceLimits,
    errors: Vec<Error>,
    warnings: Vec<Error>,
}

impl Default for Template {
    fn default() -> Self {
        Self::new()
    }
}

impl Template {
    /// An empty template using the standard tags and filters.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(Registry::new()))
    }

    pub fn with_registry(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            root: None,
            options: ParseOptions::default(),
            assigns: Object::new(),
            instance_assigns: Object::new(),
            resource_limits: ResourceLimits::default(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Parse `source` with the standard registry and default options.
    pub fn compile(source: &str) -> Result<Self> {
        let mut template = Self::new();
        template.parse(source)?;
        Ok(template)
    }

    pub fn parse(&mut self, source: &str) -> Result<&mut Self> {
        self.parse_with_options(source, ParseOptions::default())
    }

    /// Replace the parsed document. Warnings from warn mode are kept in
    /// [`Template::warnings`]; a failed parse leaves the previous document
    /// in place.
    #[tracing::instrument(level = "debug", skip_all, fields(name = options.name.as_deref()))]
    pub fn parse_with_options(&mut self, source: &str, options: ParseOptions) -> Result<&mut Self> {
        let (document, warnings) = {
            let mut ctx = ParseContext::new(&self.registry, &options);
            let document = Document::parse(source, &mut ctx);
            (document, ctx.take_warnings())
        };
        self.warnings = warnings;
        self.root = Some(Arc::new(document?));
        tracing::debug!(warnings = self.warnings.len(), "parsed template");
        self.options = options;
        Ok(self)
    }

    /// Variables visible to every render, below the render's own assigns.
    pub fn assigns_mut(&mut self) -> &mut Object {
        &mut self.assigns
    }

    pub fn resource_limits(&self) -> &ResourceLimits {
        &self.resource_limits
    }

    /// Ceilings applied to subsequent renders. Counters are reset at the
    /// start of each render.
    pub fn resource_limits_mut(&mut self) -> &mut ResourceLimits {
        &mut self.resource_limits
    }

    /// Errors rescued during the last render.
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// Deviations recorded by the last warn-mode parse.
    pub fn warnings(&self) -> &[Error] {
        &self.warnings
    }

    pub fn render(&mut self, assigns: Object) -> Result<String> {
        self.render_with(assigns, &RenderOptions::default())
    }

    /// Render, rescuing errors per node.
    ///
    /// A resource-limit breach yields `Liquid error: Memory limits
    /// exceeded` in place of the output. Only errors that are not the
    /// engine's own are returned as `Err`.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn render_with(&mut self, assigns: Object, options: &RenderOptions) -> Result<String> {
        match self.render_document(assigns, options, false) {
            Err(err) if err.kind() == ErrorKind::Memory => {
                let message = err.to_string();
                self.errors.push(err);
                Ok(message)
            }
            result => result,
        }
    }

    /// Render, returning the first error instead of rendering it inline.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn render_strict(&mut self, assigns: Object, options: &RenderOptions) -> Result<String> {
        self.render_document(assigns, options, true)
    }

    fn render_document(&mut self, assigns: Object, options: &RenderOptions, rethrow: bool) -> Result<String> {
        let Some(root) = self.root.clone() else {
            return Ok(String::new());
        };
        let registry = Arc::clone(&self.registry);
        let mut limits = mem::take(&mut self.resource_limits);
        limits.reset();

        // Earlier assignments, except those the caller passes again.
        let outer: Object = self
            .instance_assigns
            .iter()
            .filter(|(key, _)| !assigns.contains_key(*key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let mut context = Context::new(&registry)
            .with_environment(assigns)
            .with_environment(self.assigns.clone())
            .with_outer_scope(outer)
            .with_resource_limits(limits)
            .with_options(options)
            .with_template_name(self.options.name.clone())
            .with_parse_options(self.options.clone())
            .with_rethrow_errors(rethrow);

        let mut output = String::new();
        let result = root.render(&mut context, &mut output);
        let (outer, limits, errors) = context.finish();
        self.resource_limits = limits;
        if matches!(&result, Err(err) if err.kind() == ErrorKind::Memory) {
            self.resource_limits.mark_reached();
        }
        self.errors = errors;
        self.instance_assigns.extend(outer);
        tracing::debug!(
            bytes = output.len(),
            errors = self.errors.len(),
            render_score = self.resource_limits.render_score(),
            "rendered template"
        );
        result.map(|()| output)
    }
}
