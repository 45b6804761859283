//! Template data model.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::drop::LiquidDrop;
use crate::error::{Error, Result};

/// Keyed container. Keeps insertion order so iteration and output are stable.
pub type Object = IndexMap<String, Value>;

#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Value>),
    Object(Object),
    /// Inclusive integer range, `(1..3)`.
    Range(i64, i64),
    Drop(Arc<dyn LiquidDrop>),
}

impl Value {
    pub fn drop(drop: impl LiquidDrop + 'static) -> Self {
        Value::Drop(Arc::new(drop))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Only `nil` and `false` are falsy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Name used in comparison error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "NilClass",
            Value::Bool(true) => "TrueClass",
            Value::Bool(false) => "FalseClass",
            Value::Int(_) => "Integer",
            Value::Float(_) => "Float",
            Value::Str(_) => "String",
            Value::Array(_) => "Array",
            Value::Object(_) => "Hash",
            Value::Range(..) => "Range",
            Value::Drop(_) => "Drop",
        }
    }

    /// Substitute a drop by its scalar form, used at output and comparison.
    pub fn to_scalar(&self) -> Value {
        match self {
            Value::Drop(drop) => drop.to_liquid_scalar().unwrap_or_else(|| self.clone()),
            _ => self.clone(),
        }
    }

    /// Emptiness for the `empty` keyword. `None` when the value has no
    /// notion of being empty.
    pub fn is_empty_collection(&self) -> Option<bool> {
        match self {
            Value::Str(s) => Some(s.is_empty()),
            Value::Array(items) => Some(items.is_empty()),
            Value::Object(map) => Some(map.is_empty()),
            Value::Range(start, end) => Some(end < start),
            Value::Drop(drop) => drop.items().map(|items| items.is_empty()),
            _ => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Value::Nil | Value::Bool(false) => true,
            Value::Str(s) => s.trim().is_empty(),
            other => other.is_empty_collection().unwrap_or(false),
        }
    }

    /// Integer coercion used by ranges and loop attributes.
    pub fn to_integer(&self) -> Result<i64> {
        match self {
            Value::Int(i) => Ok(*i),
            #[allow(clippy::cast_possible_truncation)]
            Value::Float(f) => Ok(f.trunc() as i64),
            Value::Str(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| Error::argument("invalid integer")),
            _ => Err(Error::argument("invalid integer")),
        }
    }

    /// Numeric coercion used by the math filters: strings parse, anything
    /// else becomes `0`.
    pub fn to_number(&self) -> Value {
        match self {
            Value::Int(_) | Value::Float(_) => self.clone(),
            Value::Str(s) => {
                let s = s.trim();
                if let Ok(i) = s.parse::<i64>() {
                    Value::Int(i)
                } else if let Ok(f) = s.parse::<f64>() {
                    Value::Float(f)
                } else {
                    Value::Int(0)
                }
            }
            Value::Drop(_) => self.to_scalar().to_number(),
            _ => Value::Int(0),
        }
    }

    /// `inspect`-style rendering used for hashes nested in output.
    pub fn inspect(&self) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Str(s) => format!("{s:?}"),
            Value::Array(items) => {
                let inner: Vec<String> = items.iter().map(Value::inspect).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Object(map) => {
                let inner: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{k:?}=>{}", v.inspect()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            other => other.to_string(),
        }
    }
}

/// Number of integers in `start..=end`, saturating at `i64::MAX`.
pub(crate) fn range_len(start: i64, end: i64) -> usize {
    usize::try_from(end.saturating_sub(start).saturating_add(1)).unwrap_or(0)
}

pub(crate) fn format_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        let text = if f > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

/// Output form: what `{{ value }}` writes.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => f.write_str(&format_float(*x)),
            Value::Str(s) => f.write_str(s),
            Value::Array(items) => items.iter().try_for_each(|item| write!(f, "{item}")),
            Value::Object(_) => f.write_str(&self.inspect()),
            Value::Range(start, end) => write!(f, "{start}..{end}"),
            Value::Drop(drop) => match drop.to_liquid_scalar() {
                Some(scalar) => write!(f, "{scalar}"),
                None => f.write_str(&drop.to_output()),
            },
        }
    }
}

/// Structural equality with numeric cross-type comparison (`1 == 1.0`).
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            #[allow(clippy::cast_precision_loss)]
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Range(a1, a2), Value::Range(b1, b2)) => a1 == b1 && a2 == b2,
            (Value::Drop(a), Value::Drop(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl From<Object> for Value {
    fn from(map: Object) -> Self {
        Value::Object(map)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Nil, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(0.0)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// Build an [`Object`] from a JSON object literal; anything that is not a
/// JSON object yields an empty object.
pub fn object_from_json(json: serde_json::Value) -> Object {
    match Value::from(json) {
        Value::Object(map) => map,
        _ => Object::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn output_forms() {
        assert_eq!(Value::Nil.to_string(), "");
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::Range(1, 3).to_string(), "1..3");
        let nested = Value::from(json!([1, [2, 3], null, "x"]));
        assert_eq!(nested.to_string(), "123x");
    }

    #[test]
    fn hashes_render_inspected() {
        let v = Value::from(json!({"a": 1, "b": "x"}));
        assert_eq!(v.to_string(), r#"{"a"=>1, "b"=>"x"}"#);
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Int(0).is_truthy());
        assert!(Value::from("").is_truthy());
    }

    #[test]
    fn numeric_equality_crosses_types() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::Int(1), Value::from("1"));
    }

    #[test]
    fn blankness() {
        assert!(Value::from("  ").is_blank());
        assert!(Value::Nil.is_blank());
        assert!(Value::Array(vec![]).is_blank());
        assert!(!Value::Int(0).is_blank());
    }

    #[test]
    fn json_conversion_keeps_order() {
        let obj = object_from_json(json!({"z": 1, "a": 2}));
        let keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[test]
    fn integer_coercion() {
        assert_eq!(Value::from(" 42 ").to_integer(), Ok(42));
        assert_eq!(Value::Float(3.9).to_integer(), Ok(3));
        assert!(Value::from("abc").to_integer().is_err());
    }
}
