//! JSONPath evaluator (C4).
//!
//! Hand-rolled: no crate in the dependency pack supports filter
//! expressions and chained post-processor functions together, so
//! this is its own small recursive-descent evaluator rather than an
//! imported JSONPath crate. Grounded loosely on the teacher's
//! dot-path `get_by_json_path`/`get_value_by_path` traversal, which
//! this generalizes with `[]`/`[*]`/`..`/filters/postprocessors.
//!
//! Grammar (informal):
//!   path      := '$'? segment*
//!   segment   := '.' ident | '..' ident | '[' index ']' | '[*]' | '[' filter ']' | '.' fname '(' arg? ')'
//!   index     := number | '-' number
//!   filter    := '?(' cond (('&'|'|') cond)* ')'
//!   cond      := '@.' ident op literal
//!   post      := '|' fname ('(' arg ')')?
//!
//! Post-processors chain two ways per §4.4: trailing `|pipe` stages,
//! and dotted calls inlined into the path itself (`.fn()`,
//! `.fn1().fn2()`) so that `path.f().g()` means `g(f(path))`. A `.`
//! segment followed immediately by `(` is parsed as a call, not a
//! field; `$.length` against a DB rows array is the one bare-field
//! exception, read as a row count rather than "not found".

use serde_json::Value;
use std::sync::LazyLock;

#[derive(Debug, thiserror::Error)]
pub enum JsonPathError {
    #[error("invalid JSONPath expression: {0}")]
    InvalidPath(String),
    #[error("unknown post-processor function: {0}")]
    UnknownFunction(String),
}

/// Evaluate `expr` against `root`, returning every matched value.
/// A plain (non-filter, non-recursive) path yields at most one
/// value; `[*]`, `..`, and filters may yield many.
pub fn evaluate(expr: &str, root: &Value) -> Result<Vec<Value>, JsonPathError> {
    let (path_part, functions) = split_postprocessors(expr);
    let segments = parse_segments(path_part)?;
    let mut current = vec![root.clone()];
    for seg in &segments {
        current = apply_segment(seg, &current)?;
    }
    for func in functions {
        current = apply_postprocessor(&func, current)?;
    }
    Ok(current)
}

/// Convenience: evaluate and return the first match, if any.
pub fn evaluate_one(expr: &str, root: &Value) -> Result<Option<Value>, JsonPathError> {
    Ok(evaluate(expr, root)?.into_iter().next())
}

#[derive(Debug, Clone)]
enum Segment {
    Field(String),
    RecursiveField(String),
    Index(i64),
    Wildcard,
    Filter(Vec<FilterCond>, FilterCombinator),
    /// Dotted `.fn()` call inlined into the path, e.g. `.length()`.
    Post(String),
}

#[derive(Debug, Clone, Copy)]
enum FilterCombinator {
    And,
    Or,
    Single,
}

#[derive(Debug, Clone)]
struct FilterCond {
    field: String,
    op: String,
    literal: Value,
}

fn split_postprocessors(expr: &str) -> (&str, Vec<String>) {
    // '|' inside a filter literal or a dotted `.fn('|')` argument must
    // not split; split only on top-level pipes outside `[...]`/`(...)`.
    let mut depth = 0i32;
    let mut parts = Vec::new();
    let mut last = 0usize;
    for (i, c) in expr.char_indices() {
        match c {
            '[' | '(' => depth += 1,
            ']' | ')' => depth -= 1,
            '|' if depth == 0 => {
                parts.push(&expr[last..i]);
                last = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&expr[last..]);
    let path = parts[0];
    let functions = parts[1..].iter().map(|s| s.trim().to_string()).collect();
    (path, functions)
}

fn parse_segments(path: &str) -> Result<Vec<Segment>, JsonPathError> {
    let path = path.trim().strip_prefix('$').unwrap_or(path.trim());
    let mut segments = Vec::new();
    let chars: Vec<char> = path.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        match chars[i] {
            '.' => {
                if i + 1 < chars.len() && chars[i + 1] == '.' {
                    i += 2;
                    let (ident, next) = read_ident(&chars, i);
                    i = next;
                    segments.push(Segment::RecursiveField(ident));
                } else {
                    i += 1;
                    let (ident, next) = read_ident(&chars, i);
                    i = next;
                    if !ident.is_empty() {
                        if i < chars.len() && chars[i] == '(' {
                            let close = chars[i..]
                                .iter()
                                .position(|c| *c == ')')
                                .map(|p| p + i)
                                .ok_or_else(|| JsonPathError::InvalidPath(path.to_string()))?;
                            let arg: String = chars[i + 1..close].iter().collect();
                            i = close + 1;
                            let call = if arg.trim().is_empty() {
                                ident
                            } else {
                                format!("{ident}({arg})")
                            };
                            segments.push(Segment::Post(call));
                        } else {
                            segments.push(Segment::Field(ident));
                        }
                    }
                }
            }
            '[' => {
                let close = chars[i..]
                    .iter()
                    .position(|c| *c == ']')
                    .map(|p| p + i)
                    .ok_or_else(|| JsonPathError::InvalidPath(path.to_string()))?;
                let inner: String = chars[i + 1..close].iter().collect();
                i = close + 1;
                if inner == "*" {
                    segments.push(Segment::Wildcard);
                } else if let Some(rest) = inner.strip_prefix("?(") {
                    let rest = rest.strip_suffix(')').unwrap_or(rest);
                    segments.push(parse_filter(rest)?);
                } else {
                    let idx: i64 = inner
                        .parse()
                        .map_err(|_| JsonPathError::InvalidPath(inner.clone()))?;
                    segments.push(Segment::Index(idx));
                }
            }
            _ => {
                let (ident, next) = read_ident(&chars, i);
                i = next;
                if !ident.is_empty() {
                    segments.push(Segment::Field(ident));
                } else {
                    i += 1;
                }
            }
        }
    }
    Ok(segments)
}

fn read_ident(chars: &[char], start: usize) -> (String, usize) {
    let mut i = start;
    while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '-') {
        i += 1;
    }
    (chars[start..i].iter().collect(), i)
}

static FILTER_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r#"@\.([A-Za-z0-9_]+)\s*(==|!=|>=|<=|>|<)\s*("(?:[^"]*)"|'(?:[^']*)'|[-0-9.]+|true|false|null)"#).unwrap()
});

fn parse_filter(body: &str) -> Result<Segment, JsonPathError> {
    let (combinator, parts): (FilterCombinator, Vec<&str>) = if body.contains('&') {
        (FilterCombinator::And, body.split('&').collect())
    } else if body.contains('|') {
        (FilterCombinator::Or, body.split('|').collect())
    } else {
        (FilterCombinator::Single, vec![body])
    };

    let mut conds = Vec::new();
    for part in parts {
        let caps = FILTER_RE
            .captures(part.trim())
            .ok_or_else(|| JsonPathError::InvalidPath(part.to_string()))?;
        let field = caps[1].to_string();
        let op = caps[2].to_string();
        let literal_raw = caps[3].trim();
        let literal = parse_literal(literal_raw);
        conds.push(FilterCond { field, op, literal });
    }
    Ok(Segment::Filter(conds, combinator))
}

fn parse_literal(raw: &str) -> Value {
    if (raw.starts_with('"') && raw.ends_with('"')) || (raw.starts_with('\'') && raw.ends_with('\''))
    {
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

fn apply_segment(segment: &Segment, inputs: &[Value]) -> Result<Vec<Value>, JsonPathError> {
    match segment {
        Segment::Field(name) => Ok(inputs
            .iter()
            .filter_map(|v| match v {
                Value::Object(m) => m.get(name).cloned(),
                // §4.4 DB special root: `$.length` over a rows array
                // is a count, not a missing-field lookup.
                Value::Array(arr) if name == "length" => Some(Value::Number(arr.len().into())),
                _ => None,
            })
            .collect()),
        Segment::RecursiveField(name) => {
            let mut out = Vec::new();
            for v in inputs {
                collect_recursive(v, name, &mut out);
            }
            Ok(out)
        }
        Segment::Index(idx) => Ok(inputs
            .iter()
            .filter_map(|v| v.as_array().and_then(|arr| resolve_index(arr, *idx)).cloned())
            .collect()),
        Segment::Wildcard => Ok(inputs
            .iter()
            .flat_map(|v| match v {
                Value::Array(arr) => arr.clone(),
                Value::Object(map) => map.values().cloned().collect(),
                _ => Vec::new(),
            })
            .collect()),
        Segment::Filter(conds, combinator) => Ok(inputs
            .iter()
            .flat_map(|v| match v {
                Value::Array(arr) => arr
                    .iter()
                    .filter(|item| filter_matches(item, conds, *combinator))
                    .cloned()
                    .collect::<Vec<_>>(),
                other => {
                    if filter_matches(other, conds, *combinator) {
                        vec![other.clone()]
                    } else {
                        Vec::new()
                    }
                }
            })
            .collect()),
        Segment::Post(call) => apply_postprocessor(call, inputs.to_vec()),
    }
}

fn resolve_index(arr: &[Value], idx: i64) -> Option<&Value> {
    let len = arr.len() as i64;
    let real = if idx < 0 { len + idx } else { idx };
    if real < 0 || real >= len {
        None
    } else {
        arr.get(real as usize)
    }
}

fn collect_recursive(value: &Value, name: &str, out: &mut Vec<Value>) {
    match value {
        Value::Object(map) => {
            if let Some(v) = map.get(name) {
                out.push(v.clone());
            }
            for v in map.values() {
                collect_recursive(v, name, out);
            }
        }
        Value::Array(arr) => {
            for v in arr {
                collect_recursive(v, name, out);
            }
        }
        _ => {}
    }
}

fn filter_matches(item: &Value, conds: &[FilterCond], combinator: FilterCombinator) -> bool {
    let results: Vec<bool> = conds
        .iter()
        .map(|c| {
            let actual = item.as_object().and_then(|m| m.get(&c.field));
            match actual {
                Some(actual) => compare(actual, &c.op, &c.literal),
                None => false,
            }
        })
        .collect();

    match combinator {
        FilterCombinator::Single => results.first().copied().unwrap_or(false),
        FilterCombinator::And => results.iter().all(|b| *b),
        FilterCombinator::Or => results.iter().any(|b| *b),
    }
}

fn compare(actual: &Value, op: &str, literal: &Value) -> bool {
    let ordering = match (actual.as_f64(), literal.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => None,
    };
    match op {
        "==" => actual == literal,
        "!=" => actual != literal,
        ">" => ordering == Some(std::cmp::Ordering::Greater),
        "<" => ordering == Some(std::cmp::Ordering::Less),
        ">=" => matches!(ordering, Some(std::cmp::Ordering::Greater) | Some(std::cmp::Ordering::Equal)),
        "<=" => matches!(ordering, Some(std::cmp::Ordering::Less) | Some(std::cmp::Ordering::Equal)),
        _ => false,
    }
}

fn apply_postprocessor(func: &str, values: Vec<Value>) -> Result<Vec<Value>, JsonPathError> {
    let (name, arg) = match func.split_once('(') {
        Some((n, rest)) => (n.trim(), Some(rest.trim_end_matches(')').trim())),
        None => (func.trim(), None),
    };
    let arg_str = arg.map(|a| a.trim_matches(|c| c == '"' || c == '\'').to_string());

    let single = |v: Value| Ok(vec![v]);

    match name {
        "length" | "size" | "count" => {
            let v = values.first().cloned().unwrap_or(Value::Null);
            let len = match &v {
                Value::Array(a) => a.len(),
                Value::String(s) => s.chars().count(),
                Value::Object(m) => m.len(),
                _ => values.len(),
            };
            single(Value::Number(len.into()))
        }
        "first" => single(values.first().cloned().unwrap_or(Value::Null)),
        "last" => single(values.last().cloned().unwrap_or(Value::Null)),
        "sum" | "avg" | "min" | "max" => {
            let nums: Vec<f64> = numbers_of(&values);
            if nums.is_empty() {
                return single(Value::Null);
            }
            let result = match name {
                "sum" => nums.iter().sum(),
                "avg" => nums.iter().sum::<f64>() / nums.len() as f64,
                "min" => nums.iter().cloned().fold(f64::INFINITY, f64::min),
                "max" => nums.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                _ => unreachable!(),
            };
            single(serde_json::Number::from_f64(result).map(Value::Number).unwrap_or(Value::Null))
        }
        "reverse" => {
            let mut v = values;
            v.reverse();
            Ok(v)
        }
        "sort" => {
            let mut v = values;
            v.sort_by(|a, b| {
                a.to_string().cmp(&b.to_string())
            });
            Ok(v)
        }
        "unique" => {
            let mut seen = Vec::new();
            for v in values {
                if !seen.contains(&v) {
                    seen.push(v);
                }
            }
            Ok(seen)
        }
        "flatten" => Ok(values
            .into_iter()
            .flat_map(|v| match v {
                Value::Array(a) => a,
                other => vec![other],
            })
            .collect()),
        "keys" => {
            let v = values.first().cloned().unwrap_or(Value::Null);
            match v {
                Value::Object(m) => Ok(m.keys().map(|k| Value::String(k.clone())).collect()),
                _ => Ok(Vec::new()),
            }
        }
        "values" => {
            let v = values.first().cloned().unwrap_or(Value::Null);
            match v {
                Value::Object(m) => Ok(m.values().cloned().collect()),
                _ => Ok(Vec::new()),
            }
        }
        "upper" => map_strings(values, |s| s.to_uppercase()),
        "lower" => map_strings(values, |s| s.to_lowercase()),
        "trim" => map_strings(values, |s| s.trim().to_string()),
        "split" => {
            let sep = arg_str.unwrap_or_else(|| ",".to_string());
            let v = values.first().and_then(|v| v.as_str()).unwrap_or("");
            Ok(v.split(sep.as_str()).map(|s| Value::String(s.to_string())).collect())
        }
        "join" => {
            let sep = arg_str.unwrap_or_default();
            let joined = values
                .iter()
                .map(value_as_str)
                .collect::<Vec<_>>()
                .join(&sep);
            single(Value::String(joined))
        }
        "contains" => {
            let needle = arg_str.unwrap_or_default();
            let v = values.first().cloned().unwrap_or(Value::Null);
            let result = match &v {
                Value::String(s) => s.contains(&needle),
                Value::Array(a) => a.iter().any(|i| value_as_str(i) == needle),
                _ => false,
            };
            single(Value::Bool(result))
        }
        "starts_with" => {
            let needle = arg_str.unwrap_or_default();
            let v = values.first().and_then(|v| v.as_str()).unwrap_or("");
            single(Value::Bool(v.starts_with(&needle)))
        }
        "ends_with" => {
            let needle = arg_str.unwrap_or_default();
            let v = values.first().and_then(|v| v.as_str()).unwrap_or("");
            single(Value::Bool(v.ends_with(&needle)))
        }
        "matches" => {
            let pattern = arg_str.unwrap_or_default();
            let re = regex::Regex::new(&pattern)
                .map_err(|_| JsonPathError::InvalidPath(pattern.clone()))?;
            let v = values.first().and_then(|v| v.as_str()).unwrap_or("");
            single(Value::Bool(re.is_match(v)))
        }
        other => Err(JsonPathError::UnknownFunction(other.to_string())),
    }
}

fn numbers_of(values: &[Value]) -> Vec<f64> {
    values.iter().filter_map(|v| v.as_f64()).collect()
}

fn value_as_str(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn map_strings(values: Vec<Value>, f: impl Fn(&str) -> String) -> Result<Vec<Value>, JsonPathError> {
    Ok(values
        .into_iter()
        .map(|v| match v {
            Value::String(s) => Value::String(f(&s)),
            other => other,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dot_path_and_index() {
        let root = json!({"items": [{"id": 1}, {"id": 2}]});
        let out = evaluate("$.items[0].id", &root).unwrap();
        assert_eq!(out, vec![json!(1)]);
    }

    #[test]
    fn negative_index() {
        let root = json!({"items": [1, 2, 3]});
        let out = evaluate("$.items[-1]", &root).unwrap();
        assert_eq!(out, vec![json!(3)]);
    }

    #[test]
    fn wildcard_collects_all_elements() {
        let root = json!({"items": [{"id": 1}, {"id": 2}]});
        let out = evaluate("$.items[*].id", &root).unwrap();
        assert_eq!(out, vec![json!(1), json!(2)]);
    }

    #[test]
    fn recursive_descent_finds_nested_field() {
        let root = json!({"a": {"b": {"id": 5}}, "c": {"id": 6}});
        let mut out = evaluate("$..id", &root).unwrap();
        out.sort_by_key(|v| v.as_i64().unwrap());
        assert_eq!(out, vec![json!(5), json!(6)]);
    }

    #[test]
    fn filter_expression_selects_matching_items() {
        let root = json!({"items": [{"id": 1, "active": true}, {"id": 2, "active": false}]});
        let out = evaluate("$.items[?(@.active == true)].id", &root).unwrap();
        assert_eq!(out, vec![json!(1)]);
    }

    #[test]
    fn filter_combinator_and() {
        let root = json!({"items": [{"id": 1, "active": true, "score": 5}, {"id": 2, "active": true, "score": 1}]});
        let out = evaluate("$.items[?(@.active == true & @.score > 3)].id", &root).unwrap();
        assert_eq!(out, vec![json!(1)]);
    }

    #[test]
    fn chained_postprocessor_length() {
        let root = json!({"items": [1, 2, 3]});
        let out = evaluate("$.items|length", &root).unwrap();
        assert_eq!(out, vec![json!(3)]);
    }

    #[test]
    fn chained_postprocessor_sum_and_join() {
        let root = json!({"items": [1, 2, 3]});
        let out = evaluate("$.items|sum", &root).unwrap();
        assert_eq!(out, vec![json!(6.0)]);
    }

    #[test]
    fn string_postprocessors() {
        let root = json!({"name": "  Ada  "});
        let out = evaluate("$.name|trim|upper", &root).unwrap();
        assert_eq!(out, vec![json!("ADA")]);
    }

    #[test]
    fn dotted_postprocessor_call() {
        let root = json!({"items": [1, 2, 3]});
        let out = evaluate("$.items.length()", &root).unwrap();
        assert_eq!(out, vec![json!(3)]);
    }

    #[test]
    fn dotted_postprocessor_chain_matches_pipe_chain() {
        let root = json!({"name": "  Ada  "});
        let dotted = evaluate("$.name.trim().upper()", &root).unwrap();
        let piped = evaluate("$.name|trim|upper", &root).unwrap();
        assert_eq!(dotted, piped);
    }

    #[test]
    fn db_rows_length_root_is_row_count_not_missing_field() {
        let rows = json!([{"id": 1}, {"id": 2}, {"id": 3}]);
        let out = evaluate("$.length", &rows).unwrap();
        assert_eq!(out, vec![json!(3)]);
    }
}
