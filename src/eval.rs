use std::cmp::Ordering;

use crate::ast::*;
use crate::context::Context;
use crate::drop::{lookup_segment, to_liquid};
use crate::error::{Error, ErrorKind, Result};
use crate::filters::FilterArgs;
use crate::value::Value;

fn undefined_variable(name: &str) -> Error {
    Error::new(ErrorKind::UndefinedVariable, format!("undefined variable {name}"))
}

pub fn evaluate(expression: &Expression, context: &Context<'_>) -> Result<Value> {
    match expression {
        Expression::Literal(value) => Ok(value.clone()),
        // Both keywords print as the empty string.
        Expression::Empty | Expression::Blank => Ok(Value::Str(String::new())),
        Expression::Lookup(lookup) => evaluate_lookup(lookup, context),
        Expression::Range(start, end) => {
            let start = evaluate(start, context)?.to_scalar().to_integer()?;
            let end = evaluate(end, context)?.to_scalar().to_integer()?;
            Ok(Value::Range(start, end))
        }
        Expression::Path(root, segments) => walk_segments(to_liquid(evaluate(root, context)?), segments, context),
    }
}

fn evaluate_lookup(lookup: &VariableLookup, context: &Context<'_>) -> Result<Value> {
    let name = evaluate(&lookup.name, context)?.to_scalar().to_string();
    let object = match context.find_variable(&name) {
        Some(value) => to_liquid(value),
        None if context.strict_variables() => return Err(undefined_variable(&name)),
        None => Value::Nil,
    };
    walk_segments(object, &lookup.segments, context)
}

fn walk_segments(mut object: Value, segments: &[Segment], context: &Context<'_>) -> Result<Value> {
    for segment in segments {
        let key = evaluate(&segment.key, context)?.to_scalar();
        match lookup_segment(&object, &key, segment.command, context)? {
            Some(value) => object = to_liquid(value),
            None if context.strict_variables() => return Err(undefined_variable(&key.to_string())),
            None => return Ok(Value::Nil),
        }
    }
    Ok(object)
}

/// Evaluate an expression and run it through its filter chain.
pub fn evaluate_variable(variable: &Variable, context: &Context<'_>) -> Result<Value> {
    let mut value = evaluate(&variable.expression, context)?;
    for call in &variable.filters {
        value = apply_filter(&value, call, context)?;
    }
    Ok(value)
}

fn apply_filter(input: &Value, call: &FilterCall, context: &Context<'_>) -> Result<Value> {
    let Some(spec) = context.registry().filter(&call.name) else {
        if context.strict_filters() {
            return Err(Error::new(
                ErrorKind::UndefinedFilter,
                format!("undefined filter {}", call.name),
            ));
        }
        return Ok(input.clone());
    };
    let positional = call
        .args
        .iter()
        .map(|arg| evaluate(arg, context))
        .collect::<Result<Vec<_>>>()?;
    let keywords = call
        .keywords
        .iter()
        .map(|(name, arg)| Ok((name.clone(), evaluate(arg, context)?)))
        .collect::<Result<Vec<_>>>()?;
    spec.call(input, &FilterArgs::new(&positional, &keywords, context))
}

pub fn evaluate_condition(condition: &Condition, context: &Context<'_>) -> Result<bool> {
    match condition {
        Condition::Else => Ok(true),
        Condition::And(left, right) => {
            Ok(evaluate_condition(left, context)? && evaluate_condition(right, context)?)
        }
        Condition::Or(left, right) => {
            Ok(evaluate_condition(left, context)? || evaluate_condition(right, context)?)
        }
        Condition::Compare { left, op: None } => Ok(evaluate(left, context)?.to_scalar().is_truthy()),
        Condition::Compare {
            left,
            op: Some((op, right)),
        } => compare(left, *op, right, context),
    }
}

fn compare(left: &Expression, op: Operator, right: &Expression, context: &Context<'_>) -> Result<bool> {
    match op {
        Operator::Eq => equal(left, right, context),
        Operator::NotEq => Ok(!equal(left, right, context)?),
        Operator::Contains => {
            let left = evaluate(left, context)?.to_scalar();
            let right = evaluate(right, context)?.to_scalar();
            Ok(contains(&left, &right))
        }
        Operator::Lt | Operator::LtEq | Operator::Gt | Operator::GtEq => {
            let left = evaluate(left, context)?.to_scalar();
            let right = evaluate(right, context)?.to_scalar();
            let Some(ordering) = order(&left, &right)? else {
                return Ok(false);
            };
            Ok(match op {
                Operator::Lt => ordering.is_lt(),
                Operator::LtEq => ordering.is_le(),
                Operator::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
    }
}

/// `empty` and `blank` compare by the other operand's emptiness or
/// blankness; everything else by value.
fn equal(left: &Expression, right: &Expression, context: &Context<'_>) -> Result<bool> {
    match (left, right) {
        (Expression::Empty, other) | (other, Expression::Empty) => Ok(evaluate(other, context)?
            .to_scalar()
            .is_empty_collection()
            .unwrap_or(false)),
        (Expression::Blank, other) | (other, Expression::Blank) => {
            Ok(evaluate(other, context)?.to_scalar().is_blank())
        }
        _ => Ok(evaluate(left, context)?.to_scalar() == evaluate(right, context)?.to_scalar()),
    }
}

fn contains(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (_, Value::Nil) => false,
        (Value::Str(text), needle) => text.contains(&needle.to_string()),
        (Value::Array(items), needle) => items.contains(needle),
        (Value::Object(map), key) => map.contains_key(&key.to_string()),
        (Value::Range(start, end), Value::Int(i)) => (*start..=*end).contains(i),
        (Value::Drop(drop), needle) => drop.items().is_some_and(|items| items.contains(needle)),
        _ => false,
    }
}

/// Ordering between two operands.
///
/// Numbers order with numbers and strings with strings. A number against
/// a string is an error; every other pairing (nil included) is unordered
/// and the comparison is false.
fn order(left: &Value, right: &Value) -> Result<Option<Ordering>> {
    #[allow(clippy::cast_precision_loss)]
    fn as_f64(value: &Value) -> Option<f64> {
        match value {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Some(a.cmp(b))),
        (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            Ok(as_f64(left).zip(as_f64(right)).and_then(|(a, b)| a.partial_cmp(&b)))
        }
        (Value::Int(_) | Value::Float(_), Value::Str(_)) | (Value::Str(_), Value::Int(_) | Value::Float(_)) => {
            Err(comparison_error(left, right))
        }
        _ => Ok(None),
    }
}

/// `comparison of Integer with String failed`. Immediate values on the
/// right are shown by value, as in `comparison of String with 1 failed`.
pub(crate) fn comparison_error(left: &Value, right: &Value) -> Error {
    let right = match right {
        Value::Nil | Value::Bool(_) | Value::Int(_) | Value::Float(_) => right.inspect(),
        other => other.type_name().to_string(),
    };
    Error::argument(format!("comparison of {} with {right} failed", left.type_name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_condition_strict, parse_variable_strict};
    use crate::registry::Registry;
    use crate::value::object_from_json;
    use serde_json::json;
    use test_case::test_case;

    fn context(registry: &Registry) -> Context<'_> {
        Context::new(registry).with_environment(object_from_json(json!({
            "n": 5,
            "s": "hello",
            "list": [1, 2, 3],
            "map": {"a": {"b": "deep"}},
            "blank_str": "   ",
            "empty_list": [],
        })))
    }

    fn check(markup: &str) -> Result<bool> {
        let registry = Registry::new();
        let context = context(&registry);
        evaluate_condition(&parse_condition_strict(markup).unwrap(), &context)
    }

    #[test_case("n == 5", true ; "int equality")]
    #[test_case("n == 5.0", true ; "int float equality")]
    #[test_case("n != 5", false ; "inequality")]
    #[test_case("n <> 4", true ; "diamond inequality")]
    #[test_case("n > 4 and n < 6", true ; "and")]
    #[test_case("n > 10 or s == 'hello'", true ; "or")]
    #[test_case("true or false and false", true ; "and binds tighter")]
    #[test_case("s contains 'ell'", true ; "substring")]
    #[test_case("list contains 2", true ; "membership")]
    #[test_case("map contains 'a'", true ; "key presence")]
    #[test_case("missing contains 'a'", false ; "nil contains")]
    #[test_case("s contains missing", false ; "contains nil")]
    #[test_case("missing < 5", false ; "nil is unordered")]
    #[test_case("5 >= missing", false ; "nil is unordered on the right")]
    #[test_case("empty_list == empty", true ; "empty list")]
    #[test_case("s == empty", false ; "non-empty string")]
    #[test_case("blank_str == blank", true ; "blank string")]
    #[test_case("missing == blank", true ; "nil is blank")]
    #[test_case("'b' > 'a'", true ; "string ordering")]
    #[test_case("list", true ; "truthiness")]
    #[test_case("missing", false ; "missing is falsy")]
    fn conditions(markup: &str, expected: bool) {
        assert_eq!(check(markup), Ok(expected));
    }

    #[test]
    fn mismatched_ordering_raises() {
        let err = check("n < s").unwrap_err();
        assert_eq!(err.message(), "comparison of Integer with String failed");
        let err = check("s < 1").unwrap_err();
        assert_eq!(err.message(), "comparison of String with 1 failed");
    }

    #[test]
    fn nested_lookups_and_filters() {
        let registry = Registry::new();
        let context = context(&registry);
        let (expression, filters) = parse_variable_strict("map.a.b | upcase | append: '!'").unwrap();
        let variable = Variable {
            expression,
            filters,
            line_number: None,
        };
        assert_eq!(evaluate_variable(&variable, &context), Ok(Value::from("DEEP!")));
    }

    #[test]
    fn unknown_filters_pass_through_unless_strict() {
        let registry = Registry::new();
        let (expression, filters) = parse_variable_strict("s | nope").unwrap();
        let variable = Variable {
            expression,
            filters,
            line_number: None,
        };
        let lax = context(&registry);
        assert_eq!(evaluate_variable(&variable, &lax), Ok(Value::from("hello")));
        let strict = context(&registry).with_options(&crate::context::RenderOptions::default().strict_filters());
        let err = evaluate_variable(&variable, &strict).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UndefinedFilter);
    }

    #[test]
    fn strict_variables_report_the_missing_segment() {
        let registry = Registry::new();
        let context = context(&registry).with_options(&crate::context::RenderOptions::default().strict_variables());
        let missing = Expression::variable("nope");
        assert_eq!(evaluate(&missing, &context).unwrap_err().message(), "undefined variable nope");
        let (deep, _) = parse_variable_strict("map.a.c").unwrap();
        assert_eq!(evaluate(&deep, &context).unwrap_err().message(), "undefined variable c");
    }

    #[test]
    fn dynamic_ranges() {
        let registry = Registry::new();
        let context = context(&registry);
        let (range, _) = parse_variable_strict("(1..n)").unwrap();
        assert_eq!(evaluate(&range, &context), Ok(Value::Range(1, 5)));
        let (bad, _) = parse_variable_strict("(1..list)").unwrap();
        assert_eq!(evaluate(&bad, &context).unwrap_err().message(), "invalid integer");
    }
}
