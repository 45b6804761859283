//! Filter dispatch types and the standard filter set.
//!
//! Filters are plain functions of the piped input and the evaluated
//! arguments. Arity is declared at registration and checked before the
//! call, so the functions below can index their required arguments
//! without further checks.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::drop::lookup_segment;
use crate::error::{Error, ErrorKind, Result};
use crate::eval::comparison_error;
use crate::registry::Registry;
use crate::value::{range_len, Value};

pub type FilterFn = Arc<dyn Fn(&Value, &FilterArgs<'_>) -> Result<Value> + Send + Sync>;

/// Arguments of one filter call.
pub struct FilterArgs<'a> {
    positional: &'a [Value],
    keywords: &'a [(String, Value)],
    context: &'a Context<'a>,
}

impl<'a> FilterArgs<'a> {
    pub fn new(positional: &'a [Value], keywords: &'a [(String, Value)], context: &'a Context<'a>) -> Self {
        Self {
            positional,
            keywords,
            context,
        }
    }

    /// Number of positional arguments supplied.
    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&'a Value> {
        self.positional.get(index)
    }

    pub fn keyword(&self, name: &str) -> Option<&'a Value> {
        self.keywords.iter().find(|(key, _)| key == name).map(|(_, value)| value)
    }

    pub fn context(&self) -> &'a Context<'a> {
        self.context
    }

    /// Positional argument `index`, or nil when it was not supplied.
    fn arg(&self, index: usize) -> Value {
        self.get(index).cloned().unwrap_or_default()
    }
}

/// A registered filter and its declared arity.
#[derive(Clone)]
pub struct FilterSpec {
    pub(crate) required: usize,
    pub(crate) optional: usize,
    pub(crate) func: FilterFn,
}

impl fmt::Debug for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterSpec")
            .field("required", &self.required)
            .field("optional", &self.optional)
            .finish_non_exhaustive()
    }
}

impl FilterSpec {
    pub fn required(&self) -> usize {
        self.required
    }

    pub fn optional(&self) -> usize {
        self.optional
    }

    /// Counts include the piped input, so `append` called with no
    /// arguments reports `given 1, expected 2`.
    fn check_arity(&self, given: usize) -> Result<()> {
        if (self.required..=self.required + self.optional).contains(&given) {
            return Ok(());
        }
        let expected = if self.optional == 0 {
            (self.required + 1).to_string()
        } else {
            format!("{}..{}", self.required + 1, self.required + self.optional + 1)
        };
        Err(Error::argument(format!(
            "wrong number of arguments (given {}, expected {expected})",
            given + 1
        )))
    }

    pub fn call(&self, input: &Value, args: &FilterArgs<'_>) -> Result<Value> {
        self.check_arity(args.len())?;
        (self.func)(input, args)
    }
}

/// Flattened items of a collection-ish input; scalars become one item.
///
/// Ranges are expanded only when their length fits in the remaining
/// render score budget.
fn to_items(input: &Value, args: &FilterArgs<'_>) -> Result<Vec<Value>> {
    fn flatten_into(items: &[Value], out: &mut Vec<Value>) {
        for item in items {
            match item {
                Value::Array(inner) => flatten_into(inner, out),
                other => out.push(other.clone()),
            }
        }
    }
    let items = match input {
        Value::Nil => Vec::new(),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            flatten_into(items, &mut out);
            out
        }
        Value::Range(start, end) => {
            args.context()
                .resource_limits()
                .check_render_score(range_len(*start, *end))?;
            (*start..=*end).map(Value::Int).collect()
        }
        Value::Drop(drop) => drop.items().unwrap_or_else(|| vec![input.clone()]),
        other => vec![other.clone()],
    };
    Ok(items)
}

fn property(item: &Value, name: &Value, args: &FilterArgs<'_>) -> Result<Value> {
    Ok(lookup_segment(item, name, true, args.context())?.unwrap_or_default())
}

fn is_number(value: &Value) -> bool {
    matches!(value, Value::Int(_) | Value::Float(_))
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(value: &Value) -> f64 {
    match value {
        Value::Int(i) => *i as f64,
        Value::Float(f) => *f,
        _ => 0.0,
    }
}

/// Ordering used by `sort`; `None` for incomparable pairs.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (x, y) if is_number(x) && is_number(y) => as_f64(x).partial_cmp(&as_f64(y)),
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn sort_values(items: &mut [Value], key: impl Fn(&Value) -> Value) -> Result<()> {
    let mut failure = None;
    items.sort_by(|a, b| {
        let (a, b) = (key(a), key(b));
        match (a.is_nil(), b.is_nil()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => compare_values(&a, &b).unwrap_or_else(|| {
                failure.get_or_insert_with(|| comparison_error(&a, &b));
                Ordering::Equal
            }),
        }
    });
    failure.map_or(Ok(()), Err)
}

/// Integer op with float fallback when either side is a float or the
/// integer op overflows.
fn arithmetic(
    input: &Value,
    operand: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Value {
    let (a, b) = (input.to_number(), operand.to_number());
    if let (Value::Int(x), Value::Int(y)) = (&a, &b) {
        if let Some(result) = int_op(*x, *y) {
            return Value::Int(result);
        }
    }
    Value::Float(float_op(as_f64(&a), as_f64(&b)))
}

fn floor_div(a: i64, b: i64) -> Option<i64> {
    let quotient = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        quotient.checked_sub(1)
    } else {
        Some(quotient)
    }
}

fn floor_mod(a: i64, b: i64) -> Option<i64> {
    a.checked_sub(b.checked_mul(floor_div(a, b)?)?)
}

fn zero_division(input: &Value, operand: &Value) -> Result<()> {
    match (input.to_number(), operand.to_number()) {
        (Value::Int(_), Value::Int(0)) => Err(Error::new(ErrorKind::ZeroDivision, "divided by 0")),
        _ => Ok(()),
    }
}

fn char_slice(text: &str, start: usize, len: usize) -> String {
    text.chars().skip(start).take(len).collect()
}

/// Start index for `slice`, resolving negative offsets. `None` when out of
/// range.
fn slice_start(offset: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let start = if offset < 0 { len + offset } else { offset };
    if start < 0 || start > len {
        return None;
    }
    usize::try_from(start).ok()
}

fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn split(text: &str, pattern: &str) -> Vec<Value> {
    let mut parts: Vec<Value> = if pattern.is_empty() {
        text.chars().map(|c| Value::Str(c.to_string())).collect()
    } else if pattern == " " {
        text.split_whitespace().map(Value::from).collect()
    } else {
        text.split(pattern).map(Value::from).collect()
    };
    while parts.last().is_some_and(|part| part.as_str() == Some("")) {
        parts.pop();
    }
    parts
}

fn size(input: &Value) -> Value {
    match input {
        Value::Str(s) => Value::from(s.chars().count()),
        Value::Array(items) => Value::from(items.len()),
        Value::Object(map) => Value::from(map.len()),
        Value::Range(start, end) => Value::from(range_len(*start, *end)),
        Value::Drop(drop) => drop.items().map_or(Value::Int(0), |items| Value::from(items.len())),
        _ => Value::Int(0),
    }
}

fn default_filter(input: &Value, args: &FilterArgs<'_>) -> Value {
    let allow_false = args.keyword("allow_false").is_some_and(Value::is_truthy);
    let scalar = input.to_scalar();
    let missing = if allow_false {
        scalar.is_nil()
    } else {
        !scalar.is_truthy()
    };
    if missing || scalar.is_empty_collection().unwrap_or(false) {
        args.get(0).cloned().unwrap_or_else(|| Value::from(""))
    } else {
        input.clone()
    }
}

fn truncate(input: &Value, args: &FilterArgs<'_>) -> Result<Value> {
    if input.is_nil() {
        return Ok(Value::Nil);
    }
    let text = input.to_string();
    let length = match args.get(0) {
        Some(length) => usize::try_from(length.to_integer()?).unwrap_or(0),
        None => 50,
    };
    let ellipsis = args.get(1).map_or_else(|| "...".to_string(), Value::to_string);
    if text.chars().count() <= length {
        return Ok(Value::Str(text));
    }
    let keep = length.saturating_sub(ellipsis.chars().count());
    Ok(Value::Str(format!("{}{ellipsis}", char_slice(&text, 0, keep))))
}

fn slice(input: &Value, args: &FilterArgs<'_>) -> Result<Value> {
    let offset = args.arg(0).to_integer()?;
    let length = match args.get(1) {
        Some(length) => usize::try_from(length.to_integer()?).unwrap_or(0),
        None => 1,
    };
    match input {
        Value::Array(items) => Ok(Value::Array(
            slice_start(offset, items.len())
                .map(|start| items.iter().skip(start).take(length).cloned().collect())
                .unwrap_or_default(),
        )),
        other => {
            let text = other.to_string();
            Ok(Value::Str(
                slice_start(offset, text.chars().count())
                    .map(|start| char_slice(&text, start, length))
                    .unwrap_or_default(),
            ))
        }
    }
}

fn round(input: &Value, args: &FilterArgs<'_>) -> Result<Value> {
    let digits = match args.get(0) {
        Some(digits) => digits.to_integer()?,
        None => 0,
    };
    let number = input.to_number();
    if digits == 0 {
        return Ok(match number {
            Value::Int(i) => Value::Int(i),
            #[allow(clippy::cast_possible_truncation)]
            other => Value::Int(as_f64(&other).round() as i64),
        });
    }
    let factor = 10f64.powi(i32::try_from(digits).unwrap_or(i32::MAX));
    Ok(Value::Float((as_f64(&number) * factor).round() / factor))
}

fn clamp(input: &Value, bound: &Value, pick_larger: bool) -> Value {
    let (a, b) = (input.to_number(), bound.to_number());
    let a_wins = match compare_values(&a, &b) {
        Some(Ordering::Less) => !pick_larger,
        Some(Ordering::Greater) => pick_larger,
        _ => true,
    };
    if a_wins {
        a
    } else {
        b
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_int_with(input: &Value, f: fn(f64) -> f64) -> Value {
    match input.to_number() {
        Value::Int(i) => Value::Int(i),
        other => Value::Int(f(as_f64(&other)) as i64),
    }
}

fn unique(items: Vec<Value>, key: impl Fn(&Value) -> Result<Value>) -> Result<Vec<Value>> {
    let mut seen: Vec<Value> = Vec::new();
    let mut out = Vec::new();
    for item in items {
        let k = key(&item)?;
        if !seen.contains(&k) {
            seen.push(k);
            out.push(item);
        }
    }
    Ok(out)
}

pub(crate) fn register_standard(registry: &mut Registry) {
    registry
        .register_filter("size", 0, 0, |input, _| Ok(size(input)))
        .register_filter("upcase", 0, 0, |input, _| Ok(Value::Str(input.to_string().to_uppercase())))
        .register_filter("downcase", 0, 0, |input, _| Ok(Value::Str(input.to_string().to_lowercase())))
        .register_filter("capitalize", 0, 0, |input, _| Ok(Value::Str(capitalize(&input.to_string()))))
        .register_filter("strip", 0, 0, |input, _| Ok(Value::from(input.to_string().trim())))
        .register_filter("lstrip", 0, 0, |input, _| Ok(Value::from(input.to_string().trim_start())))
        .register_filter("rstrip", 0, 0, |input, _| Ok(Value::from(input.to_string().trim_end())))
        .register_filter("escape", 0, 0, |input, _| {
            Ok(match input {
                Value::Nil => Value::Nil,
                other => Value::Str(html_escape(&other.to_string())),
            })
        })
        .register_filter("append", 1, 0, |input, args| {
            Ok(Value::Str(format!("{input}{}", args.arg(0))))
        })
        .register_filter("prepend", 1, 0, |input, args| {
            Ok(Value::Str(format!("{}{input}", args.arg(0))))
        })
        .register_filter("remove", 1, 0, |input, args| {
            Ok(Value::Str(input.to_string().replace(&args.arg(0).to_string(), "")))
        })
        .register_filter("replace", 1, 1, |input, args| {
            let replacement = args.arg(1).to_string();
            Ok(Value::Str(input.to_string().replace(&args.arg(0).to_string(), &replacement)))
        })
        .register_filter("split", 1, 0, |input, args| {
            Ok(Value::Array(split(&input.to_string(), &args.arg(0).to_string())))
        })
        .register_filter("join", 0, 1, |input, args| {
            let glue = args.get(0).map_or_else(|| " ".to_string(), Value::to_string);
            let parts: Vec<String> = to_items(input, args)?.iter().map(Value::to_string).collect();
            Ok(Value::Str(parts.join(&glue)))
        })
        .register_filter("first", 0, 0, |input, args| {
            Ok(match input {
                Value::Range(start, end) => (start <= end).then_some(Value::Int(*start)).unwrap_or_default(),
                Value::Array(_) | Value::Drop(_) => to_items(input, args)?.into_iter().next().unwrap_or_default(),
                _ => Value::Nil,
            })
        })
        .register_filter("last", 0, 0, |input, args| {
            Ok(match input {
                Value::Range(start, end) => (start <= end).then_some(Value::Int(*end)).unwrap_or_default(),
                Value::Array(_) | Value::Drop(_) => to_items(input, args)?.pop().unwrap_or_default(),
                _ => Value::Nil,
            })
        })
        .register_filter("reverse", 0, 0, |input, args| {
            let mut items = to_items(input, args)?;
            items.reverse();
            Ok(Value::Array(items))
        })
        .register_filter("uniq", 0, 1, |input, args| {
            let items = to_items(input, args)?;
            let unique = match args.get(0) {
                Some(name) => unique(items, |item| property(item, name, args))?,
                None => unique(items, |item| Ok(item.clone()))?,
            };
            Ok(Value::Array(unique))
        })
        .register_filter("compact", 0, 1, |input, args| {
            let mut kept = Vec::new();
            for item in to_items(input, args)? {
                let probe = match args.get(0) {
                    Some(name) => property(&item, name, args)?,
                    None => item.clone(),
                };
                if !probe.is_nil() {
                    kept.push(item);
                }
            }
            Ok(Value::Array(kept))
        })
        .register_filter("sort", 0, 1, |input, args| {
            let mut items = to_items(input, args)?;
            match args.get(0) {
                Some(name) => {
                    let mut keyed = items
                        .into_iter()
                        .map(|item| Ok(Value::Array(vec![property(&item, name, args)?, item])))
                        .collect::<Result<Vec<_>>>()?;
                    sort_values(&mut keyed, |pair| match pair {
                        Value::Array(pair) => pair.first().cloned().unwrap_or_default(),
                        _ => Value::Nil,
                    })?;
                    items = keyed
                        .into_iter()
                        .filter_map(|pair| match pair {
                            Value::Array(mut pair) => pair.pop(),
                            _ => None,
                        })
                        .collect();
                }
                None => sort_values(&mut items, Value::clone)?,
            }
            Ok(Value::Array(items))
        })
        .register_filter("map", 1, 0, |input, args| {
            let name = args.arg(0);
            let mapped = to_items(input, args)?
                .iter()
                .map(|item| property(item, &name, args))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Array(mapped))
        })
        .register_filter("default", 0, 1, |input, args| Ok(default_filter(input, args)))
        .register_filter("plus", 1, 0, |input, args| {
            Ok(arithmetic(input, &args.arg(0), i64::checked_add, |a, b| a + b))
        })
        .register_filter("minus", 1, 0, |input, args| {
            Ok(arithmetic(input, &args.arg(0), i64::checked_sub, |a, b| a - b))
        })
        .register_filter("times", 1, 0, |input, args| {
            Ok(arithmetic(input, &args.arg(0), i64::checked_mul, |a, b| a * b))
        })
        .register_filter("divided_by", 1, 0, |input, args| {
            let operand = args.arg(0);
            zero_division(input, &operand)?;
            Ok(arithmetic(input, &operand, floor_div, |a, b| a / b))
        })
        .register_filter("modulo", 1, 0, |input, args| {
            let operand = args.arg(0);
            zero_division(input, &operand)?;
            Ok(arithmetic(input, &operand, floor_mod, |a, b| a - b * (a / b).floor()))
        })
        .register_filter("abs", 0, 0, |input, _| {
            Ok(match input.to_number() {
                Value::Int(i) => i.checked_abs().map_or(Value::Float(as_f64(&Value::Int(i)).abs()), Value::Int),
                other => Value::Float(as_f64(&other).abs()),
            })
        })
        .register_filter("ceil", 0, 0, |input, _| Ok(to_int_with(input, f64::ceil)))
        .register_filter("floor", 0, 0, |input, _| Ok(to_int_with(input, f64::floor)))
        .register_filter("round", 0, 1, round)
        .register_filter("at_least", 1, 0, |input, args| Ok(clamp(input, &args.arg(0), true)))
        .register_filter("at_most", 1, 0, |input, args| Ok(clamp(input, &args.arg(0), false)))
        .register_filter("truncate", 0, 2, truncate)
        .register_filter("slice", 1, 1, slice);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use test_case::test_case;

    fn apply(name: &str, input: Value, args: Vec<Value>) -> Result<Value> {
        let registry = Registry::new();
        let context = Context::new(&registry);
        let spec = registry.filter(name).unwrap();
        spec.call(&input, &FilterArgs::new(&args, &[], &context))
    }

    #[test_case("upcase", json!("abc"), vec![], json!("ABC") ; "upcase")]
    #[test_case("capitalize", json!("hELLO world"), vec![], json!("Hello world") ; "capitalize")]
    #[test_case("append", json!("a"), vec![json!("b")], json!("ab") ; "append")]
    #[test_case("replace", json!("a-b-c"), vec![json!("-")], json!("abc") ; "replace without replacement")]
    #[test_case("split", json!("a,b,,"), vec![json!(",")], json!(["a", "b"]) ; "split drops trailing empties")]
    #[test_case("join", json!([1, [2, 3]]), vec![json!("-")], json!("1-2-3") ; "join flattens")]
    #[test_case("plus", json!("3"), vec![json!(2)], json!(5) ; "plus parses strings")]
    #[test_case("plus", json!(1), vec![json!(0.5)], json!(1.5) ; "plus promotes to float")]
    #[test_case("divided_by", json!(7), vec![json!(2)], json!(3) ; "integer division")]
    #[test_case("divided_by", json!(-7), vec![json!(2)], json!(-4) ; "integer division floors")]
    #[test_case("modulo", json!(-7), vec![json!(3)], json!(2) ; "modulo follows divisor")]
    #[test_case("round", json!(2.567), vec![json!(2)], json!(2.57) ; "round digits")]
    #[test_case("ceil", json!("1.2"), vec![], json!(2) ; "ceil")]
    #[test_case("at_most", json!(5), vec![json!(3)], json!(3) ; "at_most")]
    #[test_case("truncate", json!("Ground control"), vec![json!(8)], json!("Groun...") ; "truncate")]
    #[test_case("slice", json!("hello"), vec![json!(-3), json!(2)], json!("ll") ; "slice negative")]
    #[test_case("sort", json!([3, 1, 2]), vec![], json!([1, 2, 3]) ; "sort numbers")]
    #[test_case("uniq", json!([1, 1, "a", "a"]), vec![], json!([1, "a"]) ; "uniq")]
    #[test_case("compact", json!([1, null, 2]), vec![], json!([1, 2]) ; "compact")]
    #[test_case("map", json!([{"n": "a"}, {"n": "b"}]), vec![json!("n")], json!(["a", "b"]) ; "map")]
    #[test_case("size", json!("héllo"), vec![], json!(5) ; "size counts chars")]
    #[test_case("escape", json!("<a href='x'>"), vec![], json!("&lt;a href=&#39;x&#39;&gt;") ; "escape")]
    fn standard_filters(name: &str, input: serde_json::Value, args: Vec<serde_json::Value>, expected: serde_json::Value) {
        let args = args.into_iter().map(Value::from).collect();
        assert_eq!(apply(name, Value::from(input), args), Ok(Value::from(expected)));
    }

    #[test]
    fn division_by_zero() {
        let err = apply("divided_by", Value::Int(1), vec![Value::Int(0)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ZeroDivision);
        assert_eq!(err.to_string(), "Liquid error: divided by 0");
        assert_eq!(
            apply("divided_by", Value::Float(1.0), vec![Value::Int(0)]),
            Ok(Value::Float(f64::INFINITY))
        );
    }

    #[test]
    fn arity_is_checked() {
        let err = apply("append", Value::from("a"), vec![]).unwrap_err();
        assert_eq!(err.message(), "wrong number of arguments (given 1, expected 2)");
        let err = apply("truncate", Value::from("a"), vec![Value::Int(1); 3]).unwrap_err();
        assert_eq!(err.message(), "wrong number of arguments (given 4, expected 1..3)");
    }

    #[test]
    fn sort_rejects_mixed_types() {
        let err = apply("sort", Value::from(json!([1, "a"])), vec![]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Argument);
    }

    #[test]
    fn default_respects_allow_false() {
        let registry = Registry::new();
        let context = Context::new(&registry);
        let spec = registry.filter("default").unwrap();
        let positional = [Value::from("x")];
        let keywords = [("allow_false".to_string(), Value::Bool(true))];
        let args = FilterArgs::new(&positional, &keywords, &context);
        assert_eq!(spec.call(&Value::Bool(false), &args), Ok(Value::Bool(false)));
        let args = FilterArgs::new(&positional, &[], &context);
        assert_eq!(spec.call(&Value::Bool(false), &args), Ok(Value::from("x")));
        assert_eq!(spec.call(&Value::from(""), &args), Ok(Value::from("x")));
    }
}
