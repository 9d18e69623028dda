//! Comparator set (C5): named predicates used by the validator and
//! the poll controller.
//!
//! Equality/containment semantics are grounded on the teacher's
//! `validate_data_eq`/`is_field_ignored` comparison style in the
//! original `validator.rs`, generalized into a flat named-predicate
//! table with aliases rather than a single hardcoded `==`.

use regex::Regex;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ComparatorError {
    #[error("unknown comparator: {0}")]
    Unknown(String),
}

/// Resolve an alias to its canonical comparator name.
fn canonical(name: &str) -> &str {
    match name {
        "ge" => "gte",
        "le" => "lte",
        "in" => "contains",
        "not_in" => "not_contains",
        other => other,
    }
}

pub fn compare(name: &str, actual: &Value, expected: &Value) -> Result<bool, ComparatorError> {
    match canonical(name) {
        "eq" => Ok(actual == expected),
        "neq" => Ok(actual != expected),
        "gt" => Ok(numeric_cmp(actual, expected, |a, b| a > b)),
        "gte" => Ok(numeric_cmp(actual, expected, |a, b| a >= b)),
        "lt" => Ok(numeric_cmp(actual, expected, |a, b| a < b)),
        "lte" => Ok(numeric_cmp(actual, expected, |a, b| a <= b)),
        "contains" => Ok(contains(actual, expected)),
        "not_contains" => Ok(!contains(actual, expected)),
        "startswith" => Ok(str_pred(actual, expected, |a, e| a.starts_with(e))),
        "endswith" => Ok(str_pred(actual, expected, |a, e| a.ends_with(e))),
        "matches" => Ok(matches_regex(actual, expected)),
        "type_match" => Ok(type_match(actual, expected)),
        "length_eq" => Ok(length_cmp(actual, expected, |l, n| l == n)),
        "length_gt" => Ok(length_cmp(actual, expected, |l, n| l > n)),
        "length_lt" => Ok(length_cmp(actual, expected, |l, n| l < n)),
        "is_null" => Ok(actual.is_null()),
        "is_not_null" => Ok(!actual.is_null()),
        other => Err(ComparatorError::Unknown(other.to_string())),
    }
}

fn numeric_cmp(actual: &Value, expected: &Value, op: impl Fn(f64, f64) -> bool) -> bool {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(e)) => op(a, e),
        _ => false,
    }
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::String(s) => expected.as_str().map(|e| s.contains(e)).unwrap_or(false),
        Value::Array(arr) => arr.contains(expected),
        Value::Object(map) => expected.as_str().map(|k| map.contains_key(k)).unwrap_or(false),
        _ => false,
    }
}

fn str_pred(actual: &Value, expected: &Value, op: impl Fn(&str, &str) -> bool) -> bool {
    match (actual.as_str(), expected.as_str()) {
        (Some(a), Some(e)) => op(a, e),
        _ => false,
    }
}

fn matches_regex(actual: &Value, expected: &Value) -> bool {
    let Some(pattern) = expected.as_str() else {
        return false;
    };
    let owned;
    let a = match actual {
        Value::String(s) => s.as_str(),
        Value::Null => return false,
        other => {
            owned = other.to_string();
            owned.as_str()
        }
    };
    Regex::new(pattern).map(|re| re.is_match(a)).unwrap_or(false)
}

/// §4.5: `expected` names a type from `{int,str,list,dict,bool,null}`.
fn type_match(actual: &Value, expected: &Value) -> bool {
    let Some(expected_type) = expected.as_str() else {
        return false;
    };
    let actual_type = match actual {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    };
    actual_type == expected_type
}

fn length_cmp(actual: &Value, expected: &Value, op: impl Fn(usize, usize) -> bool) -> bool {
    let Some(n) = expected.as_u64().map(|v| v as usize) else {
        return false;
    };
    let len = match actual {
        Value::String(s) => s.chars().count(),
        Value::Array(a) => a.len(),
        Value::Object(m) => m.len(),
        _ => return false,
    };
    op(len, n)
}
