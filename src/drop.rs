//! Capability-restricted host objects.
//!
//! A host type becomes visible to templates by implementing [`LiquidDrop`].
//! Only the names it lists in [`LiquidDrop::accessors`] (plus whatever its
//! [`LiquidDrop::method_missing`] hook answers) can be reached from a
//! template; nothing else on the type is exposed.
//!
//! Path traversal (`a.b[0].size`) goes through [`lookup_segment`], which
//! applies the same rules to drops, maps, arrays, ranges and strings.

use std::borrow::Cow;
use std::fmt;

use crate::context::Context;
use crate::error::{Error, ErrorKind, Result};
use crate::value::{range_len, Object, Value};

pub trait LiquidDrop: fmt::Debug + Send + Sync {
    /// Names of the accessors templates may call.
    fn accessors(&self) -> &'static [&'static str];

    /// Invoke one of [`accessors`](Self::accessors). Only ever called with
    /// a listed name. The context is the one resolving the path.
    fn call(&self, name: &str, context: &Context<'_>) -> Result<Value>;

    /// Catch-all for names not in [`accessors`](Self::accessors).
    fn method_missing(&self, _name: &str, _context: &Context<'_>) -> Result<Option<Value>> {
        Ok(None)
    }

    /// Replacement value substituted before any traversal.
    fn to_liquid(&self) -> Option<Value> {
        None
    }

    /// Replacement value substituted at output and comparison time only.
    fn to_liquid_scalar(&self) -> Option<Value> {
        None
    }

    /// Items when the drop behaves as a collection. Enables iteration,
    /// indexing and the `size`/`first`/`last` accessors.
    fn items(&self) -> Option<Vec<Value>> {
        None
    }

    /// Text written when the drop itself is output.
    fn to_output(&self) -> String {
        std::any::type_name::<Self>()
            .rsplit("::")
            .next()
            .unwrap_or_default()
            .to_string()
    }
}

/// Apply `to_liquid` coercion to a value about to be traversed.
pub(crate) fn to_liquid(value: Value) -> Value {
    if let Value::Drop(drop) = &value {
        if let Some(coerced) = drop.to_liquid() {
            return coerced;
        }
    }
    value
}

/// Something that can answer index and derived-accessor lookups.
enum Collection<'a> {
    Items(Cow<'a, [Value]>),
    Map(&'a Object),
    Range(i64, i64),
    Text(&'a str),
}

impl Collection<'_> {
    fn len(&self) -> usize {
        match self {
            Collection::Items(items) => items.len(),
            Collection::Map(map) => map.len(),
            Collection::Range(start, end) => range_len(*start, *end),
            Collection::Text(text) => text.chars().count(),
        }
    }

    fn get(&self, index: usize) -> Option<Value> {
        match self {
            Collection::Items(items) => items.get(index).cloned(),
            Collection::Map(map) => map
                .get_index(index)
                .map(|(k, v)| Value::Array(vec![Value::Str(k.clone()), v.clone()])),
            Collection::Range(start, _) => {
                let offset = i64::try_from(index).ok().filter(|_| index < self.len())?;
                start.checked_add(offset).map(Value::Int)
            }
            Collection::Text(text) => text.chars().nth(index).map(|c| Value::Str(c.to_string())),
        }
    }

    /// Positive or from-the-end index.
    fn index(&self, index: i64) -> Option<Value> {
        let len = i64::try_from(self.len()).ok()?;
        let index = if index < 0 { len + index } else { index };
        if index < 0 {
            return None;
        }
        self.get(usize::try_from(index).ok()?)
    }

    fn derived(&self, name: &str) -> Option<Value> {
        let len = self.len();
        let value = match name {
            "size" => Value::from(len),
            "first" => self.get(0).unwrap_or_default(),
            "last" => len.checked_sub(1).and_then(|i| self.get(i)).unwrap_or_default(),
            "empty" => Value::Bool(len == 0),
            "blank" => match self {
                Collection::Text(text) => Value::Bool(text.trim().is_empty()),
                _ => Value::Bool(len == 0),
            },
            _ => return None,
        };
        Some(value)
    }
}

fn index_key(key: &Value) -> Option<i64> {
    match key {
        Value::Int(i) => Some(*i),
        Value::Str(s) => s.parse().ok(),
        _ => None,
    }
}

fn lookup_in(collection: &Collection<'_>, key: &Value, command: bool) -> Option<Value> {
    if !matches!(collection, Collection::Text(_)) {
        if let Some(index) = index_key(key) {
            return Some(collection.index(index).unwrap_or_default());
        }
    }
    match key {
        Value::Str(name) if command => collection.derived(name),
        _ => None,
    }
}

/// Resolve one path segment against `object`.
///
/// `command` marks dot-form segments, which may fall back to the derived
/// accessors `size`, `first`, `last`, `empty` and `blank`. `Ok(None)` means
/// the object has no such member.
pub fn lookup_segment(
    object: &Value,
    key: &Value,
    command: bool,
    context: &Context<'_>,
) -> Result<Option<Value>> {
    let found = match object {
        Value::Drop(drop) => return lookup_drop(drop.as_ref(), key, command, context),
        Value::Object(map) => {
            let name = key.to_string();
            match map.get(&name) {
                Some(value) => Some(value.clone()),
                None if command => Collection::Map(map).derived(&name),
                None => None,
            }
        }
        Value::Array(items) => lookup_in(&Collection::Items(Cow::Borrowed(items)), key, command),
        Value::Range(start, end) => lookup_in(&Collection::Range(*start, *end), key, command),
        Value::Str(text) => lookup_in(&Collection::Text(text), key, command),
        _ => None,
    };
    Ok(found)
}

fn lookup_drop(
    drop: &dyn LiquidDrop,
    key: &Value,
    command: bool,
    context: &Context<'_>,
) -> Result<Option<Value>> {
    let name = key.to_string();
    if drop.accessors().contains(&name.as_str()) {
        return drop.call(&name, context).map(Some);
    }
    if let Some(value) = drop.method_missing(&name, context)? {
        return Ok(Some(value));
    }
    if let Some(items) = drop.items() {
        if let Some(value) = lookup_in(&Collection::Items(Cow::Owned(items)), key, command) {
            return Ok(Some(value));
        }
    }
    if context.strict_variables() {
        return Err(Error::new(
            ErrorKind::UndefinedDropMethod,
            format!("undefined method {name} for {}", drop.to_output()),
        ));
    }
    // Drops answer every name; unknown ones are nil.
    Ok(Some(Value::Nil))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use serde_json::json;

    #[derive(Debug)]
    struct Product {
        title: String,
        #[allow(dead_code)]
        secret: String,
    }

    impl LiquidDrop for Product {
        fn accessors(&self) -> &'static [&'static str] {
            &["title"]
        }

        fn call(&self, name: &str, _context: &Context<'_>) -> Result<Value> {
            match name {
                "title" => Ok(Value::from(self.title.as_str())),
                _ => Ok(Value::Nil),
            }
        }
    }

    fn product() -> Value {
        Value::drop(Product {
            title: "Shoe".into(),
            secret: "s3cret".into(),
        })
    }

    fn lookup(object: &Value, key: &str, command: bool) -> Option<Value> {
        let registry = Registry::new();
        let context = Context::new(&registry);
        lookup_segment(object, &Value::from(key), command, &context).unwrap()
    }

    #[test]
    fn drop_exposes_only_whitelisted_accessors() {
        let p = product();
        assert_eq!(lookup(&p, "title", true), Some(Value::from("Shoe")));
        assert_eq!(lookup(&p, "secret", true), Some(Value::Nil));
        if let Value::Drop(d) = &p {
            assert!(format!("{d:?}").contains("s3cret"));
        }
    }

    #[test]
    fn negative_array_index() {
        let arr = Value::from(json!([1, 2, 3]));
        assert_eq!(lookup(&arr, "-1", false), Some(Value::Int(3)));
        assert_eq!(lookup(&arr, "5", false), Some(Value::Nil));
    }

    #[test]
    fn map_key_shadows_derived_size() {
        let map = Value::from(json!({"size": "big"}));
        assert_eq!(lookup(&map, "size", true), Some(Value::from("big")));
        let map = Value::from(json!({"a": 1, "b": 2}));
        assert_eq!(lookup(&map, "size", true), Some(Value::Int(2)));
        assert_eq!(lookup(&map, "size", false), None);
    }

    #[test]
    fn derived_accessors_on_text_and_ranges() {
        let text = Value::from("héllo");
        assert_eq!(lookup(&text, "size", true), Some(Value::Int(5)));
        assert_eq!(lookup(&text, "first", true), Some(Value::from("h")));
        let range = Value::Range(3, 7);
        assert_eq!(lookup(&range, "last", true), Some(Value::Int(7)));
        assert_eq!(lookup(&range, "1", false), Some(Value::Int(4)));
    }

    #[test]
    fn full_width_ranges_saturate() {
        let range = Value::Range(i64::MIN, i64::MAX);
        assert_eq!(lookup(&range, "size", true), Some(Value::Int(i64::MAX)));
        assert_eq!(lookup(&range, "first", true), Some(Value::Int(i64::MIN)));
        assert_eq!(lookup(&range, "-1", false), Some(Value::Int(i64::MIN + i64::MAX - 1)));
        assert_eq!(lookup(&Value::Range(5, 1), "size", true), Some(Value::Int(0)));
    }
}
