//! Result aggregator (C15): assembles the deterministic per-case
//! result document, including summary statistics.
//!
//! Generalizes the teacher's `TestResult`/`StepResult`/`TestRunReport`
//! shapes; the summary-statistic fields (`pass_rate`, avg/min/max
//! response time) are additionally grounded on
//! `cbaugus-rust_loadtest`'s `ScenarioResult` aggregate shape. Field
//! order in `CaseResult`/`Summary` is fixed by struct declaration
//! order (serde_json serializes struct fields in that order), which
//! is what gives the output document its stable key ordering rather
//! than relying on any particular map implementation.

use crate::clock::Clock;
use crate::model::{CaseResult, DataDrivenResult, ErrorInfo, StepResult, Summary};
use std::collections::HashMap;

pub struct Aggregator {
    name: String,
    execution_id: String,
    started_at: String,
    start_ms: u64,
    steps: Vec<StepResult>,
    error: Option<ErrorInfo>,
}

impl Aggregator {
    pub fn start(name: impl Into<String>, clock: &dyn Clock) -> Self {
        Self {
            name: name.into(),
            execution_id: clock.random_uuid(),
            started_at: clock.now_rfc3339(),
            start_ms: clock.now_ms(),
            steps: Vec::new(),
            error: None,
        }
    }

    pub fn push_step(&mut self, step: StepResult) {
        self.steps.push(step);
    }

    pub fn fail_case(&mut self, error: ErrorInfo) {
        self.error = Some(error);
    }

    pub fn finish(
        self,
        clock: &dyn Clock,
        variables: HashMap<String, serde_json::Value>,
        logs: Vec<crate::model::LogEntry>,
        data_driven: Option<DataDrivenResult>,
    ) -> CaseResult {
        let finished_at = clock.now_rfc3339();
        let duration_ms = clock.now_ms().saturating_sub(self.start_ms);

        let passed_steps = self.steps.iter().filter(|s| s.status == "passed").count();
        let errored_steps = self.steps.iter().filter(|s| s.status == "error").count();
        let failed_steps = self.steps.iter().filter(|s| s.status == "failed").count();
        let skipped_steps = self.steps.iter().filter(|s| s.status == "skipped").count();
        let total_steps = self.steps.len();

        let total_assertions: usize = self.steps.iter().map(|s| s.assertions.len()).sum();
        let passed_assertions: usize = self
            .steps
            .iter()
            .flat_map(|s| s.assertions.iter())
            .filter(|a| a.passed)
            .count();
        let failed_assertions = total_assertions - passed_assertions;

        let response_times: Vec<u64> = self
            .steps
            .iter()
            .filter_map(|s| s.response.as_ref().map(|r| r.response_time_ms))
            .collect();
        let total_requests = response_times.len();
        let avg_response_time_ms = if total_requests > 0 {
            response_times.iter().sum::<u64>() as f64 / total_requests as f64
        } else {
            0.0
        };
        let min_response_time_ms = response_times.iter().copied().min().unwrap_or(0);
        let max_response_time_ms = response_times.iter().copied().max().unwrap_or(0);
        let total_extractions = self.steps.iter().map(|s| s.extracted.len()).sum();
        let total_db_operations = self.steps.iter().filter(|s| s.kind == "db").count();

        // §4.15 / §8 invariant 2: over assertions, not steps, one decimal.
        let pass_rate = (passed_assertions as f64 / total_assertions.max(1) as f64 * 1000.0).round() / 10.0;

        let dd_has_error = data_driven
            .as_ref()
            .map(|d| d.runs.iter().any(|r| r.status == "error"))
            .unwrap_or(false);
        let dd_has_failure = data_driven
            .as_ref()
            .map(|d| d.runs.iter().any(|r| r.status == "failed"))
            .unwrap_or(false);
        let data_driven_runs = data_driven.as_ref().map(|d| d.total_runs).unwrap_or(0);

        // Per §7: an engine-level error, or any step (or data-driven
        // row) ending in `error`, makes the whole case `error`; a
        // plain assertion failure only makes it `failed`.
        let status = if self.error.is_some() || errored_steps > 0 || dd_has_error {
            "error"
        } else if failed_steps > 0 || dd_has_failure {
            "failed"
        } else {
            "passed"
        }
        .to_string();

        CaseResult {
            name: self.name,
            status,
            error: self.error,
            steps: self.steps,
            data_driven,
            duration_ms,
            execution_id: self.execution_id,
            started_at: self.started_at,
            finished_at,
            summary: Summary {
                total_steps,
                passed_steps,
                failed_steps,
                error_steps: errored_steps,
                skipped_steps,
                total_assertions,
                passed_assertions,
                failed_assertions,
                pass_rate,
                total_requests,
                total_db_operations,
                total_extractions,
                data_driven_runs,
                avg_response_time_ms,
                min_response_time_ms,
                max_response_time_ms,
            },
            variables,
            logs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::FixedClock;
    use crate::model::{AssertionResult, ResponseInfo};
    use std::collections::HashMap as Map;

    fn passed_step(response_time_ms: u64) -> StepResult {
        StepResult {
            name: "step".into(),
            kind: "request".into(),
            status: "passed".into(),
            error: None,
            attempts: 1,
            request: None,
            response: Some(ResponseInfo {
                status: 200,
                headers: Map::new(),
                body: None,
                response_time_ms,
            }),
            assertions: vec![AssertionResult {
                target: "status_code".into(),
                comparator: "eq".into(),
                expected: serde_json::json!(200),
                actual: serde_json::json!(200),
                passed: true,
            }],
            extracted: Map::new(),
            duration_ms: response_time_ms,
        }
    }

    #[test]
    fn computes_pass_rate_and_response_stats() {
        let clock = FixedClock::new(0);
        let mut agg = Aggregator::start("case", &clock);
        agg.push_step(passed_step(10));
        agg.push_step(passed_step(30));
        let result = agg.finish(&clock, Map::new(), Vec::new(), None);
        assert_eq!(result.summary.total_steps, 2);
        assert_eq!(result.summary.pass_rate, 100.0);
        assert_eq!(result.summary.min_response_time_ms, 10);
        assert_eq!(result.summary.max_response_time_ms, 30);
        assert_eq!(result.summary.avg_response_time_ms, 20.0);
        assert_eq!(result.status, "passed");
    }

    #[test]
    fn pass_rate_is_over_assertions_not_steps() {
        let clock = FixedClock::new(0);
        let mut agg = Aggregator::start("case", &clock);
        // One step with one passing assertion, one step with none:
        // pass_rate must reflect 1/1 assertions, not 1/2 steps.
        agg.push_step(passed_step(10));
        agg.push_step(StepResult {
            name: "no assertions".into(),
            kind: "extract".into(),
            status: "passed".into(),
            error: None,
            attempts: 1,
            request: None,
            response: None,
            assertions: Vec::new(),
            extracted: Map::new(),
            duration_ms: 1,
        });
        let result = agg.finish(&clock, Map::new(), Vec::new(), None);
        assert_eq!(result.summary.total_assertions, 1);
        assert_eq!(result.summary.passed_assertions, 1);
        assert_eq!(result.summary.failed_assertions, 0);
        assert_eq!(result.summary.pass_rate, 100.0);
    }

    #[test]
    fn engine_error_marks_case_status_error() {
        let clock = FixedClock::new(0);
        let mut agg = Aggregator::start("case", &clock);
        agg.fail_case(ErrorInfo {
            code: "DB_QUERY_ERROR".into(),
            message: "boom".into(),
            detail: None,
        });
        let result = agg.finish(&clock, Map::new(), Vec::new(), None);
        assert_eq!(result.status, "error");
    }

    #[test]
    fn a_single_errored_step_marks_the_whole_case_error_not_just_failed() {
        let clock = FixedClock::new(0);
        let mut agg = Aggregator::start("case", &clock);
        agg.push_step(passed_step(10));
        agg.push_step(StepResult {
            name: "db lookup".into(),
            kind: "db".into(),
            status: "error".into(),
            error: Some(ErrorInfo {
                code: "DB_QUERY_ERROR".into(),
                message: "syntax error".into(),
                detail: None,
            }),
            attempts: 1,
            request: None,
            response: None,
            assertions: Vec::new(),
            extracted: Map::new(),
            duration_ms: 5,
        });
        let result = agg.finish(&clock, Map::new(), Vec::new(), None);
        assert_eq!(result.status, "error");
        assert_eq!(result.summary.total_db_operations, 1);
    }

    #[test]
    fn a_failed_data_driven_row_marks_the_whole_case_failed() {
        let clock = FixedClock::new(0);
        let agg = Aggregator::start("case", &clock);
        let mut failing = passed_step(5);
        failing.status = "failed".into();
        failing.assertions[0].passed = false;
        let data_driven = crate::model::DataDrivenResult {
            total_runs: 2,
            passed_runs: 1,
            runs: vec![
                crate::model::DataDrivenRun {
                    parameters: Map::new(),
                    status: "passed".into(),
                    steps: vec![passed_step(5)],
                },
                crate::model::DataDrivenRun {
                    parameters: Map::new(),
                    status: "failed".into(),
                    steps: vec![failing],
                },
            ],
        };
        let result = agg.finish(&clock, Map::new(), Vec::new(), Some(data_driven));
        assert_eq!(result.status, "failed");
        assert_eq!(result.summary.data_driven_runs, 2);
        assert!(result.steps.is_empty());
    }
}
