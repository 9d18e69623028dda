//! Data model for scenario cases, configuration, and results.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single test case: an ordered sequence of steps plus the
/// configuration and data-driven parametrization that govern how
/// they run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    /// Human-readable case name.
    pub name: String,
    /// Optional free-text description.
    #[serde(default)]
    pub description: Option<String>,
    /// Tags for filtering and grouping.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Variables available to every step before any extraction runs.
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
    /// Steps to run, setup/teardown, and dependsOn metadata.
    pub steps: Vec<Step>,
    /// Steps that run once before `steps`, regardless of `ddts`.
    #[serde(default)]
    pub setup: Vec<Step>,
    /// Steps that always run after `steps`, even on failure.
    #[serde(default)]
    pub teardown: Vec<Step>,
    /// SQL run before the case starts.
    #[serde(default)]
    pub pre_sql: Option<SqlBlock>,
    /// SQL run after the case finishes.
    #[serde(default)]
    pub post_sql: Option<SqlBlock>,
    /// Data-driven test parametrization.
    #[serde(default)]
    pub ddts: Option<Ddts>,
    /// Scenario-scoped configuration.
    #[serde(default)]
    pub config: Config,
}

/// SQL executed as a pseudo-step outside the ordinary step list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlBlock {
    /// Data source name; resolved against `Config.datasources`.
    pub datasource: String,
    /// SQL text. May contain `{{ }}` template expressions.
    pub sql: String,
}

/// Case-level configuration: networking defaults, environment
/// overlay, and data sources available to `db` steps.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Base URL prefix applied to relative request URLs.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Headers merged into every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Default per-step timeout, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Whether a failing step still allows later steps to run.
    #[serde(default)]
    pub continue_on_failure: bool,
    /// Named environments (dev/staging/prod style variable overlays).
    #[serde(default)]
    pub environments: HashMap<String, Environment>,
    /// Which named environment is active for this run.
    #[serde(default)]
    pub active_environment: Option<String>,
    /// Named database sources available to `db` steps and SQL blocks.
    #[serde(default)]
    pub datasources: HashMap<String, DataSourceConfig>,
    /// Bound on concurrent fan-out (loop `parallel` / data-driven runs).
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_timeout() -> u64 {
    30
}

fn default_max_concurrency() -> usize {
    4
}

/// A named environment: a variable overlay plus optional base URL.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Environment {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
}

/// Connection info for a named data source, used by `DbAdapter`
/// implementations. The engine treats this as opaque configuration;
/// concrete drivers are out of scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceConfig {
    /// Adapter kind, e.g. "sqlite", "postgres". Only "sqlite" ships
    /// a reference adapter.
    pub kind: String,
    /// Connection string or file path, interpreted by the adapter.
    pub connection: String,
}

/// Data-driven test parametrization: either an inline row list or a
/// CSV file path, plus how rows are executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ddts {
    /// Inline parameter rows, each a flat variable map.
    #[serde(default)]
    pub rows: Vec<HashMap<String, serde_json::Value>>,
    /// Path to a CSV file of parameter rows; merged after `rows`.
    #[serde(default)]
    pub csv: Option<String>,
    /// Run rows concurrently (bounded by `Config.max_concurrency`)
    /// instead of sequentially.
    #[serde(default)]
    pub parallel: bool,
}

/// One executable unit in a case's step list. Tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    Request(RequestStep),
    Assertion(AssertionStep),
    Extract(ExtractStep),
    Db(DbStep),
    Custom(CustomStep),
}

impl Step {
    pub fn common(&self) -> &StepCommon {
        match self {
            Step::Request(s) => &s.common,
            Step::Assertion(s) => &s.common,
            Step::Extract(s) => &s.common,
            Step::Db(s) => &s.common,
            Step::Custom(s) => &s.common,
        }
    }
}

/// Fields shared by every step kind.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StepCommon {
    /// Human-readable step name.
    pub name: Option<String>,
    /// Optional step identifier for `dependsOn` references.
    #[serde(default)]
    pub id: Option<String>,
    /// Step ids this step depends on. If any dependency was skipped
    /// or failed, this step is skipped too.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Whether the step runs at all. Evaluated before `skip_if`.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Predicate (`<var> <op> <literal>`); step is skipped if true.
    #[serde(default)]
    pub skip_if: Option<String>,
    /// Predicate; step runs only if true (opposite polarity of
    /// `skip_if`, both may be given and are ANDed).
    #[serde(default)]
    pub only_if: Option<String>,
    /// Retry policy applied to this step.
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    /// Poll policy applied to this step, checked after each attempt.
    #[serde(default)]
    pub poll: Option<PollConfig>,
    /// Loop configuration: repeats the step, optionally in parallel.
    #[serde(default)]
    pub loop_config: Option<LoopConfig>,
    /// Sub-steps run before this step's own body. Each obeys its own
    /// `enabled`/`skip_if`/`only_if`/`depends_on` rules; a setup
    /// sub-step that errors marks the owning step `error` without
    /// running the body.
    #[serde(default)]
    pub setup: Vec<Step>,
    /// Sub-steps that always run after this step's body, regardless
    /// of how it finished.
    #[serde(default)]
    pub teardown: Vec<Step>,
}

fn default_true() -> bool {
    true
}

/// Sends an HTTP request and records the response as `last_response`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestStep {
    #[serde(flatten)]
    pub common: StepCommon,
    pub method: HttpMethod,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub query: HashMap<String, String>,
    /// Which of {json,form,multipart,raw} `body` is shaped as.
    /// Mutually exclusive by construction (§3 invariant 2): a step
    /// carries at most one body representation.
    #[serde(default)]
    pub body_kind: BodyKind,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    /// Inline validations, run against the response immediately.
    #[serde(default)]
    pub validate: Vec<ValidateRule>,
    /// Inline extractions, run against the response immediately.
    #[serde(default)]
    pub extract: Vec<ExtractRule>,
}

/// The shape of `RequestStep.body` (§3 `bodyKind`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BodyKind {
    None,
    #[default]
    Json,
    Form,
    Multipart,
    Raw,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        };
        write!(f, "{s}")
    }
}

/// A standalone set of assertions against already-available state
/// (typically `last_response` or the variable store).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionStep {
    #[serde(flatten)]
    pub common: StepCommon,
    pub validate: Vec<ValidateRule>,
}

/// A standalone extraction, writing values into the variable store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractStep {
    #[serde(flatten)]
    pub common: StepCommon,
    pub extract: Vec<ExtractRule>,
}

/// Runs SQL against a named data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbStep {
    #[serde(flatten)]
    pub common: StepCommon,
    pub datasource: String,
    pub sql: String,
    #[serde(default)]
    pub extract: Vec<ExtractRule>,
    #[serde(default)]
    pub validate: Vec<ValidateRule>,
}

/// An opaque, named operation handed to a caller-supplied keyword
/// registry (e.g. a custom assertion or side effect not expressible
/// by the built-in step kinds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomStep {
    #[serde(flatten)]
    pub common: StepCommon,
    pub keyword: String,
    #[serde(default)]
    pub args: HashMap<String, serde_json::Value>,
}

/// One value extracted from a source into a named variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractRule {
    /// Destination variable name.
    pub variable: String,
    /// Source to extract from: "response_body" (default),
    /// "response_header", "response_cookie", "db_result".
    #[serde(default = "default_extract_source")]
    pub source: String,
    /// JSONPath expression (for body/db_result) or literal key
    /// name (for header/cookie).
    pub path: String,
    /// Value written when the extraction itself fails to find
    /// anything; when present the extraction is reported as a
    /// success instead of `EXTRACT_FAILED` (§4.6).
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    /// "global" (default, layer 2 — visible to every later step) or
    /// "environment" (layer 5 — visible to later steps only).
    #[serde(default = "default_extract_scope")]
    pub scope: String,
}

fn default_extract_source() -> String {
    "response_body".to_string()
}

fn default_extract_scope() -> String {
    "global".to_string()
}

/// One assertion: a target, a comparator, and an expected value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateRule {
    /// "status_code", "response_time", "json", "header", "cookie",
    /// "env_variable", "db_result".
    pub target: String,
    /// JSONPath/key within the target, when applicable.
    #[serde(default)]
    pub path: Option<String>,
    /// Comparator name (see comparator.rs); defaults to "eq".
    #[serde(default = "default_comparator")]
    pub comparator: String,
    /// Expected value. Rendered through the template engine first.
    #[serde(default)]
    pub expected: serde_json::Value,
}

fn default_comparator() -> String {
    "eq".to_string()
}

/// Retry policy: how many times and with what backoff to retry a
/// step whose attempt failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,
    /// "fixed", "linear", or "exponential".
    #[serde(default = "default_retry_strategy")]
    pub strategy: String,
    /// Base interval in seconds.
    #[serde(default = "default_retry_interval")]
    pub interval: f64,
    /// Multiplier for the exponential strategy.
    #[serde(default = "default_retry_multiplier")]
    pub multiplier: f64,
    /// Ceiling on the computed interval, in seconds.
    #[serde(default)]
    pub max_interval: Option<f64>,
    /// Apply `U[0.5, 1.5]` jitter to the computed interval.
    #[serde(default)]
    pub jitter: bool,
    /// Error kinds that trigger a retry. Empty means "all".
    #[serde(default)]
    pub retry_on: Vec<String>,
    /// Error kinds that must not be retried, even if also in
    /// `retry_on` or implied by the empty-means-all default.
    #[serde(default)]
    pub stop_on: Vec<String>,
}

fn default_retry_attempts() -> u32 {
    1
}

fn default_retry_strategy() -> String {
    "fixed".to_string()
}

fn default_retry_interval() -> f64 {
    1.0
}

fn default_retry_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            strategy: default_retry_strategy(),
            interval: default_retry_interval(),
            multiplier: default_retry_multiplier(),
            max_interval: None,
            jitter: false,
            retry_on: Vec::new(),
            stop_on: Vec::new(),
        }
    }
}

/// Poll controller configuration: re-check a condition until it is
/// satisfied or the deadline passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// "jsonpath" or "status_code".
    pub condition: String,
    /// JSONPath expression, when `condition == "jsonpath"`.
    #[serde(default)]
    pub path: Option<String>,
    /// Expected value the condition must reach.
    pub expected: serde_json::Value,
    /// Comparator used to test the condition. Defaults to "eq".
    #[serde(default = "default_comparator")]
    pub comparator: String,
    /// Seconds between polls.
    #[serde(default = "default_poll_interval")]
    pub interval: f64,
    /// Total seconds to keep polling before giving up.
    #[serde(default = "default_poll_timeout")]
    pub timeout: f64,
    /// Maximum number of condition evaluations, regardless of how
    /// much of `timeout` remains.
    #[serde(default = "default_poll_max_attempts")]
    pub max_attempts: u32,
    /// "fail" (default) or "continue" when the timeout is reached.
    #[serde(default = "default_on_timeout")]
    pub on_timeout: String,
}

fn default_poll_interval() -> f64 {
    1.0
}

fn default_poll_timeout() -> f64 {
    30.0
}

fn default_poll_max_attempts() -> u32 {
    30
}

fn default_on_timeout() -> String {
    "fail".to_string()
}

/// For/while repetition of a step, optionally fanned out in parallel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// "for" (fixed `count` iterations) or "while" (`until` false).
    #[serde(default = "default_loop_kind")]
    pub kind: String,
    #[serde(default = "default_loop_count")]
    pub count: u32,
    /// Predicate; loop continues while this is true (while-kind).
    #[serde(default)]
    pub until: Option<String>,
    /// Run iterations concurrently instead of sequentially.
    #[serde(default)]
    pub parallel: bool,
    /// Variable name exposing the zero-based iteration index inside
    /// the step (e.g. `{{loop.index}}`).
    #[serde(default = "default_loop_index_var")]
    pub index_variable: String,
}

fn default_loop_kind() -> String {
    "for".to_string()
}

fn default_loop_count() -> u32 {
    1
}

fn default_loop_index_var() -> String {
    "loop.index".to_string()
}

impl Case {
    /// Deserialize a case from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize the case to a YAML string.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Outcome of running a whole case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    pub name: String,
    pub status: String,
    pub error: Option<ErrorInfo>,
    pub steps: Vec<StepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_driven: Option<DataDrivenResult>,
    pub duration_ms: u64,
    pub execution_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub summary: Summary,
    pub variables: HashMap<String, serde_json::Value>,
    pub logs: Vec<LogEntry>,
}

/// Sub-report for a case driven by `ddts`: one `DataDrivenRun` per
/// row, in row order. `CaseResult.steps` stays empty for these cases
/// -- the per-row steps live under `runs[i].steps` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataDrivenResult {
    pub total_runs: usize,
    pub passed_runs: usize,
    pub runs: Vec<DataDrivenRun>,
}

/// One data-driven row's outcome: the parameters it ran with, its own
/// pass/fail/error status, and the steps it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataDrivenRun {
    pub parameters: HashMap<String, serde_json::Value>,
    pub status: String,
    pub steps: Vec<StepResult>,
}

/// Machine-readable error, per the taxonomy in `error.rs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

/// Aggregate statistics across a case run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Summary {
    pub total_steps: usize,
    pub passed_steps: usize,
    pub failed_steps: usize,
    pub error_steps: usize,
    pub skipped_steps: usize,
    pub total_assertions: usize,
    pub passed_assertions: usize,
    pub failed_assertions: usize,
    pub pass_rate: f64,
    pub total_requests: usize,
    pub total_db_operations: usize,
    pub total_extractions: usize,
    pub data_driven_runs: usize,
    pub avg_response_time_ms: f64,
    pub min_response_time_ms: u64,
    pub max_response_time_ms: u64,
}

/// Result of running a single step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    /// The step's `keywordType`: "request", "assertion", "extract",
    /// "db", "custom", or a pseudo-kind ("pre_sql"/"post_sql") for
    /// the two SQL blocks that never appear in `steps`.
    #[serde(rename = "keyword_type")]
    pub kind: String,
    pub status: String,
    pub error: Option<ErrorInfo>,
    pub attempts: u32,
    pub request: Option<RequestInfo>,
    pub response: Option<ResponseInfo>,
    pub assertions: Vec<AssertionResult>,
    pub extracted: HashMap<String, serde_json::Value>,
    pub duration_ms: u64,
}

/// Outcome of a single assertion within a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionResult {
    pub target: String,
    pub comparator: String,
    pub expected: serde_json::Value,
    pub actual: serde_json::Value,
    pub passed: bool,
}

/// Captured HTTP request information for a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestInfo {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

/// Captured HTTP response information for a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseInfo {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    pub response_time_ms: u64,
}

/// One captured log line, mirrored from the tracing subscriber into
/// the result document (see `log_capture.rs`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: String,
    pub message: String,
    pub step: Option<String>,
}
