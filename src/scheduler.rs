//! Step scheduler (C13): the orchestration core.
//!
//! Generalizes the teacher's `TestRunner`/`DefaultTestRunner::run`
//! (`runner.rs`), which iterated a flat step list, sent each
//! request, and applied one declarative `expect:` block per step.
//! This keeps that same "loop over steps, execute, validate, save"
//! shape but adds: tagged step-kind dispatch, `enabled`/`skip_if`/
//! `only_if` gating, `dependsOn` cascading skip, `setup`/`teardown`,
//! pre/post SQL pseudo-steps, and per-step retry/poll/loop wrapping.
//!
//! `Scheduler` holds its collaborators behind `Arc` and derives
//! `Clone` cheaply: parallel fan-out (data-driven rows, per-step
//! loops) hands owned clones of the scheduler and the step/case being
//! run into spawned tasks, since `tokio::task::JoinSet` requires
//! `'static` futures.

use crate::aggregator::Aggregator;
use crate::clock::Clock;
use crate::db_executor::DbAdapter;
use crate::ddt;
use crate::error::EngineError;
use crate::extractor;
use crate::http_executor::HttpExecutor;
use crate::model::{
    AssertionStep, Case, CaseResult, CustomStep, DataDrivenResult, DataDrivenRun, DbStep,
    ErrorInfo, ExtractStep, LoopConfig, RequestStep, Step, StepCommon, StepResult,
};
use crate::predicate;
use crate::retry::{RetryDecision, RetryState};
use crate::validator;
use crate::variables::{Layer, VariableStore};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{instrument, warn, Instrument};

#[derive(Clone)]
pub struct Scheduler {
    http: Arc<HttpExecutor>,
    dbs: Arc<HashMap<String, Box<dyn DbAdapter>>>,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(
        http: Arc<HttpExecutor>,
        dbs: Arc<HashMap<String, Box<dyn DbAdapter>>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { http, dbs, clock }
    }

    /// Runs a whole case and returns its result document, with
    /// `logs[]` populated from everything the run logged through
    /// `tracing` (see `log_capture.rs`).
    pub async fn run_case(&self, case: &Case, case_dir: &Path) -> CaseResult {
        let span = crate::log_capture::case_span(&case.name);
        let mut result = self
            .run_case_inner(case, case_dir)
            .instrument(span.clone())
            .await;
        result.logs = crate::log_capture::drain(&span);
        result
    }

    #[instrument(skip(self, case), fields(case = %case.name))]
    async fn run_case_inner(&self, case: &Case, case_dir: &Path) -> CaseResult {
        let mut aggregator = Aggregator::start(case.name.clone(), self.clock.as_ref());
        let base_vars = match self.base_vars(case) {
            Ok(vars) => vars,
            Err(e) => {
                aggregator.fail_case(to_error_info(&e));
                return aggregator.finish(
                    self.clock.as_ref(),
                    HashMap::new(),
                    Vec::new(),
                    None,
                );
            }
        };

        let Some(ddts) = &case.ddts else {
            let steps = self.run_once(case, base_vars.clone()).await;
            for step in steps {
                aggregator.push_step(step);
            }
            return aggregator.finish(self.clock.as_ref(), base_vars.snapshot(), Vec::new(), None);
        };

        let rows = match ddt::load_rows(ddts, case_dir) {
            Ok(rows) => rows,
            Err(e) => {
                aggregator.fail_case(to_error_info(&e));
                return aggregator.finish(self.clock.as_ref(), base_vars.snapshot(), Vec::new(), None);
            }
        };
        let run_count = rows.len();
        let row_params = rows.clone();

        let per_row_steps: Vec<Vec<StepResult>> = if ddts.parallel {
            let case_arc = Arc::new(case.clone());
            let scheduler = self.clone();
            let config = LoopConfig {
                kind: "for".to_string(),
                count: rows.len() as u32,
                until: None,
                parallel: true,
                index_variable: "ddt.index".to_string(),
            };
            let per_row_vars: Vec<VariableStore> = rows
                .into_iter()
                .map(|row| base_vars.with_row_overlay(row))
                .collect();
            crate::loop_driver::run(
                &config,
                &base_vars,
                case.config.max_concurrency,
                move |i, _overlay| {
                    let scheduler = scheduler.clone();
                    let case_arc = case_arc.clone();
                    let vars = per_row_vars[i].clone();
                    async move { scheduler.run_once(&case_arc, vars).await }
                },
            )
            .await
        } else {
            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                let vars = base_vars.with_row_overlay(row);
                out.push(self.run_once(case, vars).await);
            }
            out
        };

        let runs: Vec<DataDrivenRun> = row_params
            .into_iter()
            .zip(per_row_steps)
            .map(|(parameters, steps)| DataDrivenRun {
                status: run_status(&steps),
                parameters,
                steps,
            })
            .collect();
        let passed_runs = runs.iter().filter(|r| r.status == "passed").count();
        let data_driven = DataDrivenResult {
            total_runs: run_count,
            passed_runs,
            runs,
        };

        aggregator.finish(
            self.clock.as_ref(),
            base_vars.snapshot(),
            Vec::new(),
            Some(data_driven),
        )
    }

    fn base_vars(&self, case: &Case) -> Result<VariableStore, EngineError> {
        let mut vars = VariableStore::new();
        vars.extend(Layer::ConfigDefaults, case.variables.clone());
        if let Some(base) = &case.config.base_url {
            vars.set(Layer::ConfigDefaults, "base_url", serde_json::json!(base));
        }

        if let Some(active) = &case.config.active_environment {
            if let Some(env) = case.config.environments.get(active) {
                vars.extend(Layer::Environment, env.variables.clone());
                if let Some(base) = &env.base_url {
                    vars.set(Layer::Environment, "base_url", serde_json::json!(base));
                }
            }
        }

        // `Config.variables` and environment `variables` may reference
        // one another (`{{other_var}}`); resolve those nested refs
        // before any step renders against this store (§4.2).
        vars.resolve_self_references(Layer::Environment, self.clock.as_ref())
            .map_err(|e| EngineError::VariableRender(e.to_string()))?;
        vars.resolve_self_references(Layer::ConfigDefaults, self.clock.as_ref())
            .map_err(|e| EngineError::VariableRender(e.to_string()))?;
        Ok(vars)
    }

    /// Runs one full pass: pre_sql, setup, main steps, teardown,
    /// post_sql, against a single variable overlay (one data-driven
    /// row, or the base vars when there is no `ddts`).
    async fn run_once(&self, case: &Case, mut vars: VariableStore) -> Vec<StepResult> {
        let mut results = Vec::new();

        if let Some(pre_sql) = &case.pre_sql {
            match self.run_sql(pre_sql, &vars).await {
                Ok(json) => vars.set(Layer::Global, "last_db_result", json),
                Err(e) => {
                    // Pre-SQL failure aborts the whole case (open
                    // question resolution).
                    results.push(self.error_result("pre_sql", "pre_sql", e.code(), e.to_string()));
                    return results;
                }
            }
        }

        for step in &case.setup {
            results.extend(self.execute_with_subflows(step, &mut vars).await);
        }

        let mut skipped_ids: HashSet<String> = HashSet::new();

        for step in &case.steps {
            let common = step.common();
            let blocked_by_dependency = common
                .depends_on
                .iter()
                .any(|dep| skipped_ids.contains(dep));
            let should_skip = blocked_by_dependency || !self.step_is_enabled(common, &vars);

            if should_skip {
                if let Some(id) = &common.id {
                    skipped_ids.insert(id.clone());
                }
                results.push(self.empty_result(step_kind(step), common, "skipped"));
                continue;
            }

            let step_results = self.execute_with_subflows(step, &mut vars).await;
            let last_status = step_results.last().map(|r| r.status.as_str()).unwrap_or("error");
            let step_failed = last_status == "failed" || last_status == "error";
            if step_failed {
                if let Some(id) = &common.id {
                    skipped_ids.insert(id.clone());
                }
            }
            let should_stop = step_failed && !case.config.continue_on_failure;
            results.extend(step_results);
            if should_stop {
                break;
            }
        }

        for step in &case.teardown {
            results.extend(self.execute_with_subflows(step, &mut vars).await);
        }

        if let Some(post_sql) = &case.post_sql {
            if let Ok(json) = self.run_sql(post_sql, &vars).await {
                vars.set(Layer::Global, "last_db_result", json);
            }
        }

        results
    }

    fn step_is_enabled(&self, common: &StepCommon, vars: &VariableStore) -> bool {
        if !common.enabled {
            return false;
        }
        if let Some(expr) = &common.skip_if {
            if predicate::evaluate(expr, vars).unwrap_or(false) {
                return false;
            }
        }
        if let Some(expr) = &common.only_if {
            if !predicate::evaluate(expr, vars).unwrap_or(true) {
                return false;
            }
        }
        true
    }

    /// Runs a step's own `setup`/`teardown` sub-steps around its
    /// body, per §4.13 steps 4 and 7. Each sub-step obeys the same
    /// `enabled`/`skip_if`/`only_if` gating as a top-level step. A
    /// setup sub-step that doesn't pass aborts the owning step (no
    /// body execution) and is reported as `SETUP_FAILED`; teardown
    /// sub-steps always run, even when setup or the body failed.
    async fn execute_with_subflows(&self, step: &Step, vars: &mut VariableStore) -> Vec<StepResult> {
        let common = step.common().clone();
        let mut results = Vec::new();

        for sub in &common.setup {
            let sub_common = sub.common();
            if !self.step_is_enabled(sub_common, vars) {
                results.push(self.empty_result(step_kind(sub), sub_common, "skipped"));
                continue;
            }
            let sub_result = self.execute_with_policies(sub, vars).await;
            let sub_passed = sub_result.status == "passed";
            results.push(sub_result);
            if !sub_passed {
                results.push(self.error_result(
                    step_kind(step),
                    common.name.as_deref().unwrap_or_default(),
                    "SETUP_FAILED",
                    "a setup sub-step did not pass".to_string(),
                ));
                for teardown in &common.teardown {
                    results.push(self.execute_with_policies(teardown, vars).await);
                }
                return results;
            }
        }

        results.push(self.execute_with_policies(step, vars).await);

        for teardown in &common.teardown {
            results.push(self.execute_with_policies(teardown, vars).await);
        }

        results
    }

    /// Wraps a single step's execution with its loop policy, per
    /// §4.12. Retry and poll are applied per loop iteration (or once,
    /// when there is no `loop_config`) inside `execute_once_with_retry`.
    async fn execute_with_policies(&self, step: &Step, vars: &mut VariableStore) -> StepResult {
        let common = step.common().clone();

        let Some(loop_config) = common.loop_config.clone() else {
            return self.execute_once_with_retry(step, vars).await;
        };

        let scheduler = self.clone();
        let step_owned = Arc::new(step.clone());
        let outcomes = crate::loop_driver::run(&loop_config, vars, 1, move |i, mut overlay| {
            let scheduler = scheduler.clone();
            let step_owned = step_owned.clone();
            async move {
                let result = scheduler.execute_once_with_retry(&step_owned, &mut overlay).await;
                (i, result, overlay)
            }
        })
        .await;

        if let Some((_, _, last_overlay)) = outcomes.iter().max_by_key(|(i, ..)| *i) {
            *vars = last_overlay.clone();
        }
        outcomes
            .into_iter()
            .last()
            .map(|(_, r, _)| r)
            .unwrap_or_else(|| self.empty_result(step_kind(step), &common, "skipped"))
    }

    async fn execute_once_with_retry(&self, step: &Step, vars: &mut VariableStore) -> StepResult {
        let common = step.common().clone();
        let policy = common.retry.clone().unwrap_or_default();
        let mut retry_state = RetryState::new(&policy);
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let result = self.execute_step(step, vars).await;
            // Retry only wraps genuine step errors (§4.9): an
            // assertion that simply didn't pass is a "failed" result,
            // never retried, and returned as-is.
            if result.status != "error" {
                let mut final_result = result;
                final_result.attempts = attempts;
                return final_result;
            }
            let code = result
                .error
                .as_ref()
                .map(|e| e.code.clone())
                .unwrap_or_else(|| "ENGINE_INTERNAL_ERROR".to_string());

            match retry_state.next(&code, self.clock.as_ref()) {
                RetryDecision::RetryAfter(ms) => {
                    warn!(attempt = attempts, wait_ms = ms, "step failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
                }
                RetryDecision::GiveUp => {
                    let mut final_result = result;
                    final_result.attempts = attempts;
                    return final_result;
                }
            }
        }
    }

    async fn execute_step(&self, step: &Step, vars: &mut VariableStore) -> StepResult {
        let start = Instant::now();
        let mut result = match step {
            Step::Request(s) => self.execute_request_step(s, vars).await,
            Step::Assertion(s) => self.execute_assertion_step(s, vars),
            Step::Extract(s) => self.execute_extract_step(s, vars),
            Step::Db(s) => self.execute_db_step(s, vars).await,
            Step::Custom(s) => self.execute_custom_step(s),
        };
        result.duration_ms = start.elapsed().as_millis() as u64;
        result
    }

    async fn execute_request_step(&self, step: &RequestStep, vars: &mut VariableStore) -> StepResult {
        let name = step.common.name.clone().unwrap_or_default();

        let poll_config = step.common.poll.clone();
        let sent = if let Some(poll_config) = &poll_config {
            self.execute_polled_request(step, vars, poll_config).await
        } else {
            self.send_request(step, vars).await.map(|(req, resp)| (req, resp, 1))
        };

        let (request_info, response_info, poll_attempts) = match sent {
            Ok(triple) => triple,
            Err(e) => return self.error_result("request", &name, e.code(), e.to_string()),
        };

        vars.set(
            Layer::Global,
            "last_response",
            serde_json::json!({
                "status": response_info.status,
                "headers": response_info.headers,
                "body": response_info.body.as_ref().and_then(|b| serde_json::from_str::<serde_json::Value>(b).ok()),
            }),
        );

        let mut assertions = Vec::new();
        for rule in &step.validate {
            match validator::validate_one(rule, Some(&response_info), vars, self.clock.as_ref()) {
                Ok(a) => assertions.push(a),
                Err(e) => {
                    let mut result = self.error_result("request", &name, "ASSERTION_FAILED", e.to_string());
                    result.request = Some(request_info);
                    result.response = Some(response_info);
                    return result;
                }
            }
        }

        let outcomes = extractor::extract_all(&step.extract, Some(&response_info));
        self.apply_extract_outcomes(&outcomes, vars);
        let extracted = extractor::outcomes_to_map(&outcomes);

        let status = if assertions.iter().all(|a| a.passed) { "passed" } else { "failed" }.to_string();
        StepResult {
            name,
            kind: "request".to_string(),
            status,
            error: None,
            attempts: poll_attempts,
            request: Some(request_info),
            response: Some(response_info),
            assertions,
            extracted,
            duration_ms: 0,
        }
    }

    /// Writes every successful (or defaulted) extraction into its
    /// declared scope layer; a failed extraction with no default is
    /// logged and otherwise ignored -- it never fails the step
    /// (§4.6/§7).
    fn apply_extract_outcomes(&self, outcomes: &[extractor::ExtractOutcome], vars: &mut VariableStore) {
        for outcome in outcomes {
            match &outcome.value {
                Some(v) => {
                    let layer = if outcome.scope == "environment" {
                        Layer::Environment
                    } else {
                        Layer::Global
                    };
                    vars.set(layer, outcome.variable.clone(), v.clone());
                }
                None => {
                    warn!(
                        variable = %outcome.variable,
                        error = outcome.error.as_deref().unwrap_or(""),
                        "EXTRACT_FAILED"
                    );
                }
            }
        }
    }

    async fn send_request(
        &self,
        step: &RequestStep,
        vars: &VariableStore,
    ) -> Result<(crate::model::RequestInfo, crate::model::ResponseInfo), EngineError> {
        let base_url = vars.get("base_url").and_then(|v| v.as_str()).map(|s| s.to_string());
        self.http
            .execute(
                &step.method,
                &step.url,
                base_url.as_deref(),
                &step.headers,
                &step.query,
                step.body_kind,
                step.body.as_ref(),
                vars,
                self.clock.as_ref(),
            )
            .await
    }

    /// Re-sends the request until `poll_config`'s condition is met or
    /// it times out, returning the last attempt's request/response.
    async fn execute_polled_request(
        &self,
        step: &RequestStep,
        vars: &VariableStore,
        poll_config: &crate::model::PollConfig,
    ) -> Result<(crate::model::RequestInfo, crate::model::ResponseInfo, u32), EngineError> {
        let last = std::sync::Mutex::new(None);
        let last_ref = &last;
        let outcome = crate::poll::poll_until(poll_config, move || {
            let vars = vars.clone();
            async move {
                let sent = self.send_request(step, &vars).await;
                let (status, body) = match &sent {
                    Ok((_, resp)) => (
                        resp.status,
                        resp.body
                            .as_deref()
                            .and_then(|b| serde_json::from_str(b).ok())
                            .unwrap_or(serde_json::Value::Null),
                    ),
                    Err(_) => (0u16, serde_json::Value::Null),
                };
                *last_ref.lock().unwrap() = Some(sent);
                (status, body)
            }
        })
        .await;

        let sent = last.into_inner().unwrap();
        let attempts = match outcome {
            Ok(crate::poll::PollOutcome::Satisfied(n)) => n,
            Ok(crate::poll::PollOutcome::TimedOutContinuing(n)) => n,
            Err(crate::poll::PollError::TimedOut(s)) => return Err(EngineError::Timeout((s * 1000.0) as u64)),
            Err(e) => return Err(EngineError::Internal(e.to_string())),
        };
        sent.unwrap_or(Err(EngineError::Internal("poll produced no attempt".to_string())))
            .map(|(req, resp)| (req, resp, attempts))
    }

    fn execute_assertion_step(&self, step: &AssertionStep, vars: &mut VariableStore) -> StepResult {
        let name = step.common.name.clone().unwrap_or_default();
        let last_response = reconstitute_response(vars);
        let mut assertions = Vec::new();
        for rule in &step.validate {
            match validator::validate_one(rule, last_response.as_ref(), vars, self.clock.as_ref()) {
                Ok(a) => assertions.push(a),
                Err(e) => return self.error_result("assertion", &name, "ASSERTION_FAILED", e.to_string()),
            }
        }
        let status = if assertions.iter().all(|a| a.passed) { "passed" } else { "failed" }.to_string();
        StepResult {
            name,
            kind: "assertion".to_string(),
            status,
            error: None,
            attempts: 1,
            request: None,
            response: None,
            assertions,
            extracted: HashMap::new(),
            duration_ms: 0,
        }
    }

    fn execute_extract_step(&self, step: &ExtractStep, vars: &mut VariableStore) -> StepResult {
        let name = step.common.name.clone().unwrap_or_default();
        let last_response = reconstitute_response(vars);
        let outcomes = extractor::extract_all(&step.extract, last_response.as_ref());
        self.apply_extract_outcomes(&outcomes, vars);
        let extracted = extractor::outcomes_to_map(&outcomes);
        StepResult {
            name,
            kind: "extract".to_string(),
            status: "passed".to_string(),
            error: None,
            attempts: 1,
            request: None,
            response: None,
            assertions: Vec::new(),
            extracted,
            duration_ms: 0,
        }
    }

    async fn execute_db_step(&self, step: &DbStep, vars: &mut VariableStore) -> StepResult {
        let name = step.common.name.clone().unwrap_or_default();
        let rendered_sql = match crate::template::render(&step.sql, vars, self.clock.as_ref()) {
            Ok(v) => v.as_str().map(|s| s.to_string()).unwrap_or_else(|| v.to_string()),
            Err(e) => return self.error_result("db", &name, "VARIABLE_RENDER_ERROR", e.to_string()),
        };

        let Some(adapter) = self.dbs.get(&step.datasource) else {
            return self.error_result("db", &name, "DB_DATASOURCE_NOT_FOUND", step.datasource.clone());
        };

        if let Err(e) = crate::db_executor::check_sql_safety(&rendered_sql) {
            return self.error_result("db", &name, "DB_QUERY_ERROR", e.to_string());
        }

        let json = match adapter.query(&rendered_sql).await {
            Ok(r) => r.to_json(),
            Err(e) => return self.error_result("db", &name, "DB_QUERY_ERROR", e.to_string()),
        };
        vars.set(Layer::Global, "last_db_result", json.clone());

        let mut assertions = Vec::new();
        for rule in &step.validate {
            match validator::validate_one(rule, None, vars, self.clock.as_ref()) {
                Ok(a) => assertions.push(a),
                Err(e) => return self.error_result("db", &name, "ASSERTION_FAILED", e.to_string()),
            }
        }

        let outcomes = extractor::extract_all_from_db(&step.extract, &json);
        self.apply_extract_outcomes(&outcomes, vars);
        let extracted = extractor::outcomes_to_map(&outcomes);

        let status = if assertions.iter().all(|a| a.passed) { "passed" } else { "failed" }.to_string();
        StepResult {
            name,
            kind: "db".to_string(),
            status,
            error: None,
            attempts: 1,
            request: None,
            response: None,
            assertions,
            extracted,
            duration_ms: 0,
        }
    }

    fn execute_custom_step(&self, step: &CustomStep) -> StepResult {
        // Custom/keyword steps are a caller-supplied extension point;
        // the engine has no built-in keyword registry, so any
        // `custom` step is reported as not found rather than
        // silently succeeding.
        self.error_result(
            "custom",
            step.common.name.as_deref().unwrap_or_default(),
            "KEYWORD_NOT_FOUND",
            step.keyword.clone(),
        )
    }

    async fn run_sql(
        &self,
        sql: &crate::model::SqlBlock,
        vars: &VariableStore,
    ) -> Result<serde_json::Value, EngineError> {
        let adapter = self
            .dbs
            .get(&sql.datasource)
            .ok_or_else(|| EngineError::DbDatasourceNotFound(sql.datasource.clone()))?;
        let rendered = crate::template::render(&sql.sql, vars, self.clock.as_ref())
            .map_err(|e| EngineError::VariableRender(e.to_string()))?;
        let rendered_sql = rendered.as_str().map(|s| s.to_string()).unwrap_or_else(|| rendered.to_string());
        crate::db_executor::check_sql_safety(&rendered_sql)
            .map_err(|e| EngineError::DbQuery(e.to_string()))?;
        let result = adapter
            .query(&rendered_sql)
            .await
            .map_err(|e| EngineError::DbQuery(e.to_string()))?;
        Ok(result.to_json())
    }

    fn error_result(&self, kind: &str, name: &str, code: &str, message: String) -> StepResult {
        StepResult {
            name: name.to_string(),
            kind: kind.to_string(),
            status: "error".to_string(),
            error: Some(ErrorInfo {
                code: code.to_string(),
                message,
                detail: None,
            }),
            attempts: 1,
            request: None,
            response: None,
            assertions: Vec::new(),
            extracted: HashMap::new(),
            duration_ms: 0,
        }
    }

    fn empty_result(&self, kind: &str, common: &StepCommon, status: &str) -> StepResult {
        StepResult {
            name: common.name.clone().unwrap_or_default(),
            kind: kind.to_string(),
            status: status.to_string(),
            error: None,
            attempts: 0,
            request: None,
            response: None,
            assertions: Vec::new(),
            extracted: HashMap::new(),
            duration_ms: 0,
        }
    }
}

fn step_kind(step: &Step) -> &'static str {
    match step {
        Step::Request(_) => "request",
        Step::Assertion(_) => "assertion",
        Step::Extract(_) => "extract",
        Step::Db(_) => "db",
        Step::Custom(_) => "custom",
    }
}

fn reconstitute_response(vars: &VariableStore) -> Option<crate::model::ResponseInfo> {
    let last = vars.get("last_response")?;
    let status = last.get("status")?.as_u64()? as u16;
    let headers = last
        .get("headers")
        .and_then(|h| h.as_object())
        .map(|m| {
            m.iter()
                .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
                .collect()
        })
        .unwrap_or_default();
    let body = last.get("body").map(|b| b.to_string());
    Some(crate::model::ResponseInfo {
        status,
        headers,
        body,
        response_time_ms: 0,
    })
}

/// Folds one data-driven row's steps into a single pass/fail/error
/// verdict, mirroring the case-level rule in `Aggregator::finish`.
fn run_status(steps: &[StepResult]) -> String {
    if steps.iter().any(|s| s.status == "error") {
        "error".to_string()
    } else if steps.iter().any(|s| s.status == "failed") {
        "failed".to_string()
    } else {
        "passed".to_string()
    }
}

fn to_error_info(err: &EngineError) -> ErrorInfo {
    ErrorInfo {
        code: err.code().to_string(),
        message: err.to_string(),
        detail: None,
    }
}
