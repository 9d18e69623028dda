//! Tiny predicate grammar used by `skip_if`/`only_if` step gating.
//!
//! Deliberately not built on a general expression engine: the
//! grammar is exactly `<var> <op> <literal>`, so a hand-rolled
//! one-pass parser is simpler and more legible than importing one.

use crate::comparator;
use crate::variables::VariableStore;
use serde_json::Value;
use std::sync::LazyLock;

static PREDICATE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r#"^\s*([A-Za-z_][A-Za-z0-9_.]*)\s*(==|!=|>=|<=|>|<)\s*("(?:[^"]*)"|'(?:[^']*)'|true|false|null|-?[0-9]+\.?[0-9]*)\s*$"#,
    )
    .unwrap()
});

#[derive(Debug, thiserror::Error)]
pub enum PredicateError {
    #[error("malformed predicate: {0}")]
    Malformed(String),
}

/// Evaluate a `<var> <op> <literal>` predicate against the variable
/// store. An unresolved variable is treated as `null`.
pub fn evaluate(expr: &str, vars: &VariableStore) -> Result<bool, PredicateError> {
    let caps = PREDICATE_RE
        .captures(expr)
        .ok_or_else(|| PredicateError::Malformed(expr.to_string()))?;
    let var_path = &caps[1];
    let op = &caps[2];
    let literal_raw = caps[3].trim();

    let actual = vars.get_path(var_path).unwrap_or(Value::Null);
    let literal = parse_literal(literal_raw);
    let comparator_name = match op {
        "==" => "eq",
        "!=" => "neq",
        ">" => "gt",
        ">=" => "gte",
        "<" => "lt",
        "<=" => "lte",
        _ => unreachable!(),
    };
    comparator::compare(comparator_name, &actual, &literal)
        .map_err(|e| PredicateError::Malformed(e.to_string()))
}

fn parse_literal(raw: &str) -> Value {
    if (raw.starts_with('"') && raw.ends_with('"')) || (raw.starts_with('\'') && raw.ends_with('\'')) {
        Value::String(raw[1..raw.len() - 1].to_string())
    } else if raw == "true" {
        Value::Bool(true)
    } else if raw == "false" {
        Value::Bool(false)
    } else if raw == "null" {
        Value::Null
    } else if let Ok(n) = raw.parse::<f64>() {
        serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    } else {
        Value::String(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::Layer;
    use serde_json::json;

    #[test]
    fn numeric_comparison() {
        let mut vars = VariableStore::new();
        vars.set(Layer::Global, "count", json!(5));
        assert!(evaluate("count > 3", &vars).unwrap());
        assert!(!evaluate("count < 3", &vars).unwrap());
    }

    #[test]
    fn string_equality() {
        let mut vars = VariableStore::new();
        vars.set(Layer::Global, "env", json!("prod"));
        assert!(evaluate(r#"env == "prod""#, &vars).unwrap());
    }

    #[test]
    fn nested_path_lookup() {
        let mut vars = VariableStore::new();
        vars.set(Layer::Global, "last_response", json!({"status": 200}));
        assert!(evaluate("last_response.status == 200", &vars).unwrap());
    }

    #[test]
    fn unresolved_variable_is_null() {
        let vars = VariableStore::new();
        assert!(evaluate("missing == null", &vars).unwrap());
    }

    #[test]
    fn malformed_expression_errors() {
        let vars = VariableStore::new();
        assert!(evaluate("not a predicate", &vars).is_err());
    }
}
