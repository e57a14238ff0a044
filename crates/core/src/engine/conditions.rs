use serde_json::Value;

use crate::domain::{Condition, ConditionMode, ConditionOperator, Session};

/// Evaluates a condition list with AND (`All`) or OR (`Any`) semantics.
pub fn evaluate_all(conditions: &[Condition], mode: ConditionMode, session: &Session) -> bool {
    match mode {
        ConditionMode::All => conditions.iter().all(|condition| evaluate(condition, session)),
        ConditionMode::Any => conditions.iter().any(|condition| evaluate(condition, session)),
    }
}

/// A missing variable makes every operator false, including `not_equals`.
pub fn evaluate(condition: &Condition, session: &Session) -> bool {
    let Some(actual) = session.lookup(&condition.variable) else {
        return false;
    };
    let expected = &condition.value;

    match condition.operator {
        ConditionOperator::Equals => values_equal(actual, expected),
        ConditionOperator::NotEquals => !values_equal(actual, expected),
        ConditionOperator::GreaterThan => compare(actual, expected, |a, b| a > b),
        ConditionOperator::LessThan => compare(actual, expected, |a, b| a < b),
        ConditionOperator::GreaterOrEqual => compare(actual, expected, |a, b| a >= b),
        ConditionOperator::LessOrEqual => compare(actual, expected, |a, b| a <= b),
        ConditionOperator::Contains => contains(actual, expected),
        ConditionOperator::NotContains => !contains(actual, expected),
        ConditionOperator::Exists => !actual.is_null(),
    }
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    // User replies are bound as strings, so "3" equals 3.
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn compare(actual: &Value, expected: &Value, predicate: impl Fn(f64, f64) -> bool) -> bool {
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(b)) => predicate(a, b),
        _ => false,
    }
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
        (Value::Array(items), _) => items.iter().any(|item| values_equal(item, expected)),
        (Value::Object(fields), Value::String(key)) => fields.contains_key(key),
        _ => false,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok().filter(|number| number.is_finite()),
        _ => None,
    }
}
