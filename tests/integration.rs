use std::sync::Arc;

use axum::{http::StatusCode, routing::get, Json, Router};
use serde_json::json;
use sisyphus::{Case, CaseLoader, Clock, DbAdapter, HttpExecutor, Scheduler, SystemClock};
use std::collections::HashMap;
use tokio::task::JoinHandle;

struct TestServer {
    base_url: String,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    async fn spawn() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();

        let app = Router::new()
            .route(
                "/items",
                get(|| async move {
                    Json(json!({
                        "user": {"id": 42, "name": "ada"},
                        "items": [{"id": 1}, {"id": 2}, {"id": 3}]
                    }))
                }),
            )
            .route(
                "/headers",
                get(|| async move {
                    (
                        [("X-Test-Header", "ok")],
                        Json(json!({"message": "header response"})),
                    )
                }),
            )
            .route(
                "/created",
                get(|| async move { (StatusCode::CREATED, Json(json!({"created": true}))) }),
            );

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let server = axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });

        let handle = tokio::spawn(async move {
            if let Err(err) = server.await {
                eprintln!("test server error: {err}");
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                let _ = handle.await;
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

fn load_case(yaml: &str, base_url: &str) -> Case {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("case.yaml");
    std::fs::write(&path, yaml.replace("__BASE_URL__", base_url)).unwrap();
    let loader = CaseLoader::new();
    let case = loader.load_case(&path).expect("case should load");
    // `dir` would delete the file on drop before the scheduler needs
    // the case contents, but it's already been parsed into `case`.
    case
}

async fn run(case: &Case) -> sisyphus::CaseResult {
    let http = Arc::new(HttpExecutor::new(case.config.timeout.max(1)).unwrap());
    let dbs: Arc<HashMap<String, Box<dyn DbAdapter>>> = Arc::new(HashMap::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let scheduler = Scheduler::new(http, dbs, clock);
    let dir = tempfile::tempdir().unwrap();
    scheduler.run_case(case, dir.path()).await
}

#[tokio::test]
async fn request_assertion_and_extraction_reuse_across_steps() {
    let server = TestServer::spawn().await;
    let case = load_case(
        r#"
name: extraction reuse
steps:
  - type: request
    name: fetch items
    method: GET
    url: __BASE_URL__/items
    validate:
      - target: status_code
        expected: 200
      - target: json
        path: "$.user.id"
        expected: 42
    extract:
      - variable: user_id
        source: response_body
        path: "$.user.id"
      - variable: item_count
        source: response_body
        path: "$.items|length"
  - type: assertion
    name: confirm extracted values
    validate:
      - target: env_variable
        path: ".user_id"
        expected: 42
      - target: env_variable
        path: ".item_count"
        expected: 3
"#,
        &server.base_url,
    );
    let result = run(&case).await;
    assert_eq!(result.status, "passed", "{result:?}");
    assert_eq!(result.summary.total_steps, 2);
    assert_eq!(result.summary.passed_assertions, 4);
    server.shutdown().await;
}

#[tokio::test]
async fn header_assertion_succeeds() {
    let server = TestServer::spawn().await;
    let case = load_case(
        r#"
name: header check
steps:
  - type: request
    name: fetch headers
    method: GET
    url: __BASE_URL__/headers
    validate:
      - target: header
        path: "x-test-header"
        expected: "ok"
"#,
        &server.base_url,
    );
    let result = run(&case).await;
    assert_eq!(result.status, "passed", "{result:?}");
    server.shutdown().await;
}

#[tokio::test]
async fn status_mismatch_produces_failed_case() {
    let server = TestServer::spawn().await;
    let case = load_case(
        r#"
name: status mismatch
steps:
  - type: request
    name: expect wrong status
    method: GET
    url: __BASE_URL__/items
    validate:
      - target: status_code
        expected: 404
"#,
        &server.base_url,
    );
    let result = run(&case).await;
    assert_eq!(result.status, "failed");
    assert_eq!(result.steps[0].status, "failed");
    assert!(!result.steps[0].assertions[0].passed);
    server.shutdown().await;
}

#[tokio::test]
async fn created_status_and_json_body_match() {
    let server = TestServer::spawn().await;
    let case = load_case(
        r#"
name: creation response
steps:
  - type: request
    name: create
    method: GET
    url: __BASE_URL__/created
    validate:
      - target: status_code
        expected: 201
      - target: json
        path: "$.created"
        expected: true
"#,
        &server.base_url,
    );
    let result = run(&case).await;
    assert_eq!(result.status, "passed", "{result:?}");
    server.shutdown().await;
}

#[tokio::test]
async fn depends_on_skips_when_predecessor_fails() {
    let server = TestServer::spawn().await;
    let case = load_case(
        r#"
name: cascading skip
steps:
  - type: request
    id: first
    name: fails on purpose
    method: GET
    url: __BASE_URL__/items
    validate:
      - target: status_code
        expected: 999
  - type: assertion
    name: never runs
    depends_on: ["first"]
    validate:
      - target: env_variable
        path: ".nothing"
        expected: null
config:
  continue_on_failure: true
"#,
        &server.base_url,
    );
    let result = run(&case).await;
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.steps[0].status, "failed");
    assert_eq!(result.steps[1].status, "skipped");
    server.shutdown().await;
}
