//! HTTP executor (C8): builds and sends requests, normalizes the
//! response, and records timing.
//!
//! Generalizes the teacher's `send_request`/response-capture code in
//! `runner.rs`, which built a `reqwest::Client` per scenario and
//! measured elapsed time with `std::time::Instant`. This keeps that
//! shape (one shared `reqwest::Client`, `Instant`-based timing) and
//! adds query-string building, template rendering of every request
//! field, and structured error mapping via `error::map_reqwest_error`.

use crate::clock::Clock;
use crate::error::EngineError;
use crate::model::{BodyKind, HttpMethod, RequestInfo, ResponseInfo};
use crate::template;
use crate::variables::VariableStore;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::io::Write;
use std::time::Instant;
use tracing::{debug, instrument};

pub struct HttpExecutor {
    client: Client,
}

impl HttpExecutor {
    pub fn new(timeout_secs: u64) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        Ok(Self { client })
    }

    #[instrument(skip(self, vars, clock), fields(method = %method, url = %url))]
    pub async fn execute(
        &self,
        method: &HttpMethod,
        url: &str,
        base_url: Option<&str>,
        headers: &HashMap<String, String>,
        query: &HashMap<String, String>,
        body_kind: BodyKind,
        body: Option<&serde_json::Value>,
        vars: &VariableStore,
        clock: &dyn Clock,
    ) -> Result<(RequestInfo, ResponseInfo), EngineError> {
        let rendered_url = render_str(url, vars, clock)?;
        let full_url = join_url(base_url, &rendered_url);

        let mut rendered_headers = HashMap::new();
        for (k, v) in headers {
            rendered_headers.insert(k.clone(), render_str(v, vars, clock)?);
        }

        let mut rendered_query = HashMap::new();
        for (k, v) in query {
            rendered_query.insert(k.clone(), render_str(v, vars, clock)?);
        }

        let rendered_body = match body_kind {
            BodyKind::None => None,
            _ => match body {
                Some(b) => Some(template::render_value(b, vars, clock).map_err(|e| {
                    EngineError::VariableRender(e.to_string())
                })?),
                None => None,
            },
        };

        let mut req = self.client.request(reqwest_method(method), &full_url);
        for (k, v) in &rendered_headers {
            req = req.header(k, v);
        }
        if !rendered_query.is_empty() {
            req = req.query(&rendered_query);
        }

        // Keeps the multipart attachments' backing temp files alive
        // until the request has been sent; they're removed on drop.
        let mut _multipart_files = Vec::new();
        let body_repr = match (body_kind, rendered_body.as_ref()) {
            (BodyKind::None, _) | (_, None) => None,
            (BodyKind::Json, Some(b)) => {
                req = req.json(b);
                Some(b.to_string())
            }
            (BodyKind::Form, Some(b)) => {
                req = req.form(&value_to_string_map(b));
                Some(b.to_string())
            }
            (BodyKind::Raw, Some(b)) => {
                let raw = match b {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                req = req.body(raw.clone());
                Some(raw)
            }
            (BodyKind::Multipart, Some(b)) => {
                let (form, files) = self.build_multipart(b).await?;
                _multipart_files = files;
                req = req.multipart(form);
                Some(b.to_string())
            }
        };

        let request_info = RequestInfo {
            method: method.to_string(),
            url: full_url.clone(),
            headers: rendered_headers,
            body: body_repr,
        };

        debug!("sending request");
        let start = Instant::now();
        let response = req.send().await.map_err(|e| crate::error::map_reqwest_error(&e))?;
        let status = response.status().as_u16();
        let mut response_headers = HashMap::new();
        for (k, v) in response.headers() {
            response_headers.insert(
                k.as_str().to_lowercase(),
                v.to_str().unwrap_or("").to_string(),
            );
        }
        let body_text = response
            .text()
            .await
            .map_err(|e| crate::error::map_reqwest_error(&e))?;
        let elapsed = start.elapsed().as_millis() as u64;
        debug!(status, elapsed_ms = elapsed, "received response");

        let response_info = ResponseInfo {
            status,
            headers: response_headers,
            body: Some(body_text),
            response_time_ms: elapsed,
        };

        Ok((request_info, response_info))
    }

    /// Builds a multipart form from a rendered JSON object body. A
    /// field shaped `{"file": "<ref>"}` is downloaded from the
    /// content-addressed object store and attached as a temp file
    /// (removed when the returned handles are dropped); any other
    /// value becomes a plain text field (§3 multipart bodies).
    async fn build_multipart(
        &self,
        body: &Value,
    ) -> Result<(reqwest::multipart::Form, Vec<tempfile::NamedTempFile>), EngineError> {
        let mut form = reqwest::multipart::Form::new();
        let mut temp_files = Vec::new();
        let Some(obj) = body.as_object() else {
            return Ok((form, temp_files));
        };

        for (key, value) in obj {
            match value.get("file").and_then(Value::as_str) {
                Some(file_ref) => {
                    let bytes = self
                        .client
                        .get(file_ref)
                        .send()
                        .await
                        .map_err(|e| crate::error::map_reqwest_error(&e))?
                        .bytes()
                        .await
                        .map_err(|e| crate::error::map_reqwest_error(&e))?;
                    let mut tmp = tempfile::NamedTempFile::new()
                        .map_err(|e| EngineError::Internal(e.to_string()))?;
                    tmp.write_all(&bytes).map_err(|e| EngineError::Internal(e.to_string()))?;
                    let file_name = file_ref.rsplit('/').next().unwrap_or(key).to_string();
                    let part = reqwest::multipart::Part::file(tmp.path())
                        .await
                        .map_err(|e| EngineError::Internal(e.to_string()))?
                        .file_name(file_name);
                    form = form.part(key.clone(), part);
                    temp_files.push(tmp);
                }
                None => {
                    let text = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    form = form.text(key.clone(), text);
                }
            }
        }
        Ok((form, temp_files))
    }
}

fn value_to_string_map(v: &Value) -> HashMap<String, String> {
    v.as_object()
        .map(|obj| {
            obj.iter()
                .map(|(k, v)| {
                    let s = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), s)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn render_str(s: &str, vars: &VariableStore, clock: &dyn Clock) -> Result<String, EngineError> {
    let rendered = template::render(s, vars, clock).map_err(|e| EngineError::VariableRender(e.to_string()))?;
    Ok(match rendered {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

fn reqwest_method(method: &HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Head => reqwest::Method::HEAD,
        HttpMethod::Options => reqwest::Method::OPTIONS,
    }
}

fn join_url(base: Option<&str>, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        return url.to_string();
    }
    match base {
        Some(base) => format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/')),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_prefers_absolute_url() {
        assert_eq!(join_url(Some("http://base"), "http://other/x"), "http://other/x");
    }

    #[test]
    fn join_url_joins_relative_path() {
        assert_eq!(join_url(Some("http://base/"), "/path"), "http://base/path");
    }

    #[test]
    fn join_url_without_base_returns_url_unchanged() {
        assert_eq!(join_url(None, "/path"), "/path");
    }

    #[test]
    fn value_to_string_map_stringifies_non_string_fields() {
        let v = serde_json::json!({"name": "ada", "age": 30});
        let map = value_to_string_map(&v);
        assert_eq!(map.get("name"), Some(&"ada".to_string()));
        assert_eq!(map.get("age"), Some(&"30".to_string()));
    }
}
