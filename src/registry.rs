//! Long-lived engine configuration.
//!
//! A [`Registry`] owns the tag constructors, filters, partial loader,
//! default error mode, exception renderer, message table and parse nesting
//! ceiling. It is immutable during parse and render and is usually shared
//! behind an `Arc` by any number of templates.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::context::ExceptionRenderer;
use crate::error::{Error, Result};
use crate::file_system::{BlankFileSystem, FileSystem};
use crate::filters::{self, FilterArgs, FilterFn, FilterSpec};
use crate::lexer::Tokenizer;
use crate::locale::Locale;
use crate::parse_context::{ErrorMode, ParseContext};
use crate::resource_limits::MAX_DEPTH;
use crate::tags::{self, Tag, TagConstructor};
use crate::value::Value;

#[derive(Clone)]
pub struct Registry {
    tags: FxHashMap<String, TagConstructor>,
    filters: FxHashMap<String, FilterSpec>,
    file_system: Arc<dyn FileSystem>,
    error_mode: ErrorMode,
    exception_renderer: Option<ExceptionRenderer>,
    locale: Locale,
    nesting_limit: usize,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<&str> = self.tags.keys().map(String::as_str).collect();
        tags.sort_unstable();
        let mut filters: Vec<&str> = self.filters.keys().map(String::as_str).collect();
        filters.sort_unstable();
        f.debug_struct("Registry")
            .field("tags", &tags)
            .field("filters", &filters)
            .field("error_mode", &self.error_mode)
            .field("nesting_limit", &self.nesting_limit)
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// A registry with the standard tags and filters.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        tags::register_standard(&mut registry);
        filters::register_standard(&mut registry);
        registry
    }

    /// A registry with no tags and no filters.
    pub fn empty() -> Self {
        Self {
            tags: FxHashMap::default(),
            filters: FxHashMap::default(),
            file_system: Arc::new(BlankFileSystem),
            error_mode: ErrorMode::default(),
            exception_renderer: None,
            locale: Locale::default(),
            nesting_limit: MAX_DEPTH,
        }
    }

    pub fn register_tag<F>(&mut self, name: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn(&str, &str, &mut Tokenizer<'_>, &mut ParseContext<'_>) -> Result<Box<dyn Tag>>
            + Send
            + Sync
            + 'static,
    {
        self.tags.insert(name.into(), Arc::new(constructor));
        self
    }

    /// Register a filter taking `required` positional arguments followed by
    /// up to `optional` more.
    pub fn register_filter<F>(
        &mut self,
        name: impl Into<String>,
        required: usize,
        optional: usize,
        filter: F,
    ) -> &mut Self
    where
        F: Fn(&Value, &FilterArgs<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        let func: FilterFn = Arc::new(filter);
        self.filters.insert(
            name.into(),
            FilterSpec {
                required,
                optional,
                func,
            },
        );
        self
    }

    pub fn with_file_system(mut self, file_system: impl FileSystem + 'static) -> Self {
        self.file_system = Arc::new(file_system);
        self
    }

    pub fn with_error_mode(mut self, error_mode: ErrorMode) -> Self {
        self.error_mode = error_mode;
        self
    }

    pub fn with_exception_renderer<F>(mut self, renderer: F) -> Self
    where
        F: Fn(&Error) -> String + Send + Sync + 'static,
    {
        self.exception_renderer = Some(Arc::new(renderer));
        self
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn with_nesting_limit(mut self, limit: usize) -> Self {
        self.nesting_limit = limit;
        self
    }

    pub fn tag(&self, name: &str) -> Option<&TagConstructor> {
        self.tags.get(name)
    }

    pub fn filter(&self, name: &str) -> Option<&FilterSpec> {
        self.filters.get(name)
    }

    pub fn file_system(&self) -> &dyn FileSystem {
        self.file_system.as_ref()
    }

    pub fn error_mode(&self) -> ErrorMode {
        self.error_mode
    }

    pub fn exception_renderer(&self) -> Option<&ExceptionRenderer> {
        self.exception_renderer.as_ref()
    }

    pub fn locale(&self) -> &Locale {
        &self.locale
    }

    pub fn nesting_limit(&self) -> usize {
        self.nesting_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_has_core_tags_and_filters() {
        let registry = Registry::new();
        for tag in ["if", "unless", "case", "for", "break", "continue", "assign", "capture", "raw", "#"] {
            assert!(registry.tag(tag).is_some(), "missing tag {tag}");
        }
        for filter in ["upcase", "append", "default", "divided_by", "map"] {
            assert!(registry.filter(filter).is_some(), "missing filter {filter}");
        }
    }

    #[test]
    fn empty_registry() {
        let registry = Registry::empty();
        assert!(registry.tag("if").is_none());
        assert!(registry.filter("upcase").is_none());
        assert_eq!(registry.nesting_limit(), MAX_DEPTH);
    }

    #[test]
    fn custom_filters_are_registered() {
        let mut registry = Registry::empty();
        registry.register_filter("shout", 0, 0, |input, _| Ok(Value::from(format!("{input}!"))));
        let spec = registry.filter("shout").unwrap();
        let context = crate::context::Context::new(&registry);
        let args = FilterArgs::new(&[], &[], &context);
        assert_eq!(spec.call(&Value::from("hi"), &args), Ok(Value::from("hi!")));
    }
}
