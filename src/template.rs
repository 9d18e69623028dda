//! Template renderer (C3).
//!
//! Expands `{{ expr }}` placeholders against the variable store.
//! Grounded on the teacher's `expand_variables`, which used a single
//! precompiled regex rather than one compile per call; this module
//! keeps that optimization and generalizes the expression grammar it
//! accepts.
//!
//! An `expr` is either a dotted variable path (`a.b.c`) or a built-in
//! function call (`fn(args...)` or bare `fn`). When the whole input
//! string is exactly one `{{expr}}` placeholder, the resolved JSON
//! value is returned as-is (so a request body can bind a whole
//! object or number). When a placeholder appears inside a longer
//! string, the resolved value is stringified and spliced in.

use crate::clock::Clock;
use crate::variables::VariableStore;
use serde_json::Value;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\{\{\s*(.+?)\s*\}\}").unwrap());

static WHOLE_STRING: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^\{\{\s*(.+?)\s*\}\}$").unwrap());

static CALL: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\((.*)\)$").unwrap());

const BUILTINS: &[&str] = &[
    "random",
    "random_uuid",
    "timestamp",
    "timestamp_ms",
    "timestamp_us",
    "datetime",
];

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("unknown variable or function: {0}")]
    Unresolved(String),
}

/// Render `input` against `vars`, returning the native JSON value
/// when the whole string is one expression, else a rendered string.
pub fn render(input: &str, vars: &VariableStore, clock: &dyn Clock) -> Result<Value, RenderError> {
    if let Some(caps) = WHOLE_STRING.captures(input) {
        let expr = caps.get(1).unwrap().as_str();
        return resolve_expr(expr, vars, clock);
    }

    let mut err = None;
    let rendered = PLACEHOLDER.replace_all(input, |caps: &regex::Captures| {
        let expr = caps.get(1).unwrap().as_str();
        match resolve_expr(expr, vars, clock) {
            Ok(value) => stringify(&value),
            Err(e) => {
                err = Some(e);
                String::new()
            }
        }
    });

    if let Some(e) = err {
        return Err(e);
    }
    Ok(Value::String(rendered.into_owned()))
}

/// Render every string leaf of a JSON value in place (used for
/// request bodies and other structured inputs).
pub fn render_value(
    input: &Value,
    vars: &VariableStore,
    clock: &dyn Clock,
) -> Result<Value, RenderError> {
    match input {
        Value::String(s) => render(s, vars, clock),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(render_value(item, vars, clock)?);
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), render_value(v, vars, clock)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn resolve_expr(expr: &str, vars: &VariableStore, clock: &dyn Clock) -> Result<Value, RenderError> {
    if let Some(caps) = CALL.captures(expr) {
        let name = caps.get(1).unwrap().as_str();
        let args_raw = caps.get(2).unwrap().as_str().trim();
        return call_builtin(name, args_raw, clock);
    }

    if BUILTINS.contains(&expr) {
        return call_builtin(expr, "", clock);
    }

    let path = expr.strip_prefix("vars.").unwrap_or(expr);
    vars.get_path(path)
        .ok_or_else(|| RenderError::Unresolved(expr.to_string()))
}

fn call_builtin(name: &str, args_raw: &str, clock: &dyn Clock) -> Result<Value, RenderError> {
    match name {
        "random" => {
            let n: usize = args_raw.trim().parse().unwrap_or(8);
            Ok(Value::String(clock.random_hex(n)))
        }
        "random_uuid" => Ok(Value::String(clock.random_uuid())),
        "timestamp" => Ok(Value::Number((clock.now_ms() / 1000).into())),
        "timestamp_ms" => Ok(Value::Number(clock.now_ms().into())),
        "timestamp_us" => Ok(Value::Number(clock.now_us().into())),
        "datetime" => {
            let fmt = args_raw.trim().trim_matches(|c| c == '"' || c == '\'');
            let fmt = if fmt.is_empty() { "%Y-%m-%dT%H:%M:%S%z" } else { fmt };
            Ok(Value::String(clock.now_formatted(fmt)))
        }
        other => Err(RenderError::Unresolved(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::FixedClock;
    use crate::variables::Layer;
    use serde_json::json;

    fn store() -> VariableStore {
        let mut v = VariableStore::new();
        v.set(Layer::Global, "name", json!("ada"));
        v.set(Layer::Global, "count", json!(3));
        v.set(Layer::Global, "last_response", json!({"body": {"id": 7}}));
        v
    }

    #[test]
    fn whole_string_expression_preserves_native_type() {
        let clock = FixedClock::new(0);
        let out = render("{{count}}", &store(), &clock).unwrap();
        assert_eq!(out, json!(3));
    }

    #[test]
    fn embedded_expression_is_stringified() {
        let clock = FixedClock::new(0);
        let out = render("hello {{name}}!", &store(), &clock).unwrap();
        assert_eq!(out, json!("hello ada!"));
    }

    #[test]
    fn nested_path_resolves() {
        let clock = FixedClock::new(0);
        let out = render("{{last_response.body.id}}", &store(), &clock).unwrap();
        assert_eq!(out, json!(7));
    }

    #[test]
    fn builtin_function_call() {
        let clock = FixedClock::new(0);
        let out = render("{{random(4)}}", &store(), &clock).unwrap();
        assert_eq!(out, json!("aaaa"));
    }

    #[test]
    fn bare_builtin_without_parens() {
        let clock = FixedClock::new(0);
        let out = render("{{random_uuid}}", &store(), &clock).unwrap();
        assert_eq!(out, json!("00000000-0000-0000-0000-000000000000"));
    }

    #[test]
    fn unresolved_variable_errors() {
        let clock = FixedClock::new(0);
        assert!(render("{{missing}}", &store(), &clock).is_err());
    }
}
