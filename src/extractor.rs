//! Extractor (C6): pulls a value out of a response/DB result and
//! writes it into the variable store.
//!
//! A thin layer over `jsonpath.rs`, grounded on the teacher's
//! dot-path `save: HashMap<String, String>` extraction in
//! `runner.rs`, generalized to multiple sources and the full
//! JSONPath grammar.
//!
//! Per §4.6/§7, a failed extraction is never fatal to the step on
//! its own: `extract_all`/`extract_one` always produce an
//! `ExtractOutcome`, falling back to `rule.default` when present and
//! otherwise recording `EXTRACT_FAILED` without returning `Err`.

use crate::jsonpath;
use crate::model::{ExtractRule, ResponseInfo};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("no response available to extract from")]
    NoResponse,
    #[error("jsonpath error: {0}")]
    JsonPath(#[from] jsonpath::JsonPathError),
    #[error("response body is not valid JSON")]
    NotJson,
    #[error("header not found: {0}")]
    HeaderNotFound(String),
    #[error("unknown extraction source: {0}")]
    UnknownSource(String),
}

/// Outcome of applying one `ExtractRule`. `value` is `Some` whenever
/// something should be written to the variable store — either the
/// real extracted value, or `rule.default` when extraction failed
/// but a default was declared.
#[derive(Debug, Clone)]
pub struct ExtractOutcome {
    pub variable: String,
    pub scope: String,
    pub value: Option<Value>,
    pub success: bool,
    pub error: Option<String>,
}

/// Apply one extraction rule against an HTTP response, returning the
/// extracted value (the caller writes it into the store).
pub fn extract_from_response(
    rule: &ExtractRule,
    response: Option<&ResponseInfo>,
) -> Result<Value, ExtractError> {
    match rule.source.as_str() {
        "response_body" => {
            let response = response.ok_or(ExtractError::NoResponse)?;
            let body = response.body.as_deref().unwrap_or("");
            let json: Value = serde_json::from_str(body).map_err(|_| ExtractError::NotJson)?;
            Ok(jsonpath::evaluate_one(&rule.path, &json)?.unwrap_or(Value::Null))
        }
        "response_header" => {
            let response = response.ok_or(ExtractError::NoResponse)?;
            response
                .headers
                .get(&rule.path.to_lowercase())
                .map(|v| Value::String(v.clone()))
                .ok_or_else(|| ExtractError::HeaderNotFound(rule.path.clone()))
        }
        "response_cookie" => {
            let response = response.ok_or(ExtractError::NoResponse)?;
            let cookie_header = response.headers.get("set-cookie").cloned().unwrap_or_default();
            Ok(parse_cookie(&cookie_header, &rule.path)
                .map(Value::String)
                .unwrap_or(Value::Null))
        }
        other => Err(ExtractError::UnknownSource(other.to_string())),
    }
}

/// Apply one extraction rule against a DB result set (columns/rows
/// shape produced by `DbAdapter::query`).
pub fn extract_from_db_result(
    rule: &ExtractRule,
    result: &Value,
) -> Result<Value, ExtractError> {
    Ok(jsonpath::evaluate_one(&rule.path, result)?.unwrap_or(Value::Null))
}

/// Runs `extract` (one of `extract_from_response`/
/// `extract_from_db_result`) and folds a failure into a non-fatal
/// `ExtractOutcome`, applying `rule.default` when declared.
fn to_outcome(rule: &ExtractRule, extract: impl FnOnce() -> Result<Value, ExtractError>) -> ExtractOutcome {
    match extract() {
        Ok(value) => ExtractOutcome {
            variable: rule.variable.clone(),
            scope: rule.scope.clone(),
            value: Some(value),
            success: true,
            error: None,
        },
        Err(e) => match &rule.default {
            Some(default) => ExtractOutcome {
                variable: rule.variable.clone(),
                scope: rule.scope.clone(),
                value: Some(default.clone()),
                success: true,
                error: None,
            },
            None => ExtractOutcome {
                variable: rule.variable.clone(),
                scope: rule.scope.clone(),
                value: None,
                success: false,
                error: Some(e.to_string()),
            },
        },
    }
}

fn parse_cookie(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|kv| {
        let mut parts = kv.trim().splitn(2, '=');
        let key = parts.next()?.trim();
        let value = parts.next()?.trim();
        if key == name {
            Some(value.to_string())
        } else {
            None
        }
    })
}

/// Applies every rule against an HTTP response, one `ExtractOutcome`
/// per rule, in order. Never fails as a batch: a rule with no
/// default and no match simply comes back `success: false`.
pub fn extract_all(rules: &[ExtractRule], response: Option<&ResponseInfo>) -> Vec<ExtractOutcome> {
    rules
        .iter()
        .map(|rule| to_outcome(rule, || extract_from_response(rule, response)))
        .collect()
}

/// Applies every rule against a DB result set, same non-fatal shape
/// as `extract_all`.
pub fn extract_all_from_db(rules: &[ExtractRule], result: &Value) -> Vec<ExtractOutcome> {
    rules
        .iter()
        .map(|rule| to_outcome(rule, || extract_from_db_result(rule, result)))
        .collect()
}

/// Materializes the successful (or defaulted) outcomes as a flat map,
/// for `StepResult.extracted`.
pub fn outcomes_to_map(outcomes: &[ExtractOutcome]) -> HashMap<String, Value> {
    outcomes
        .iter()
        .filter_map(|o| o.value.clone().map(|v| (o.variable.clone(), v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn response(body: &str) -> ResponseInfo {
        ResponseInfo {
            status: 200,
            headers: Map::new(),
            body: Some(body.to_string()),
            response_time_ms: 5,
        }
    }

    fn rule(variable: &str, source: &str, path: &str) -> ExtractRule {
        ExtractRule {
            variable: variable.into(),
            source: source.into(),
            path: path.into(),
            default: None,
            scope: "global".into(),
        }
    }

    #[test]
    fn extracts_from_json_body() {
        let rule = rule("id", "response_body", "$.id");
        let resp = response(r#"{"id": 42}"#);
        assert_eq!(
            extract_from_response(&rule, Some(&resp)).unwrap(),
            Value::from(42)
        );
    }

    #[test]
    fn extracts_from_cookie_header() {
        let rule = rule("session", "response_cookie", "sid");
        let mut resp = response("{}");
        resp.headers.insert("set-cookie".into(), "sid=abc123; Path=/".into());
        assert_eq!(
            extract_from_response(&rule, Some(&resp)).unwrap(),
            Value::String("abc123".into())
        );
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let rule = rule("token", "response_header", "Authorization");
        let mut resp = response("{}");
        resp.headers.insert("authorization".into(), "Bearer T".into());
        assert_eq!(
            extract_from_response(&rule, Some(&resp)).unwrap(),
            Value::String("Bearer T".into())
        );
    }

    #[test]
    fn missing_header_errors() {
        let rule = rule("x", "response_header", "x-missing");
        let resp = response("{}");
        assert!(extract_from_response(&rule, Some(&resp)).is_err());
    }

    #[test]
    fn failed_extraction_without_default_is_non_fatal() {
        let r = rule("missing", "response_header", "x-missing");
        let resp = response("{}");
        let outcomes = extract_all(&[r], Some(&resp));
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].success);
        assert!(outcomes[0].value.is_none());
        assert!(outcomes[0].error.is_some());
    }

    #[test]
    fn failed_extraction_with_default_writes_default_and_succeeds() {
        let mut r = rule("missing", "response_header", "x-missing");
        r.default = Some(Value::String("fallback".into()));
        let resp = response("{}");
        let outcomes = extract_all(&[r], Some(&resp));
        assert!(outcomes[0].success);
        assert_eq!(outcomes[0].value, Some(Value::String("fallback".into())));
        let map = outcomes_to_map(&outcomes);
        assert_eq!(map.get("missing"), Some(&Value::String("fallback".into())));
    }
}
