//! Poll controller (C11): re-checks a condition until it is
//! satisfied or a timeout elapses.
//!
//! Split out as its own component from the teacher's `LoopConfig.until`
//! pattern in `runner.rs` (which conflated looping and condition
//! polling into one field); this keeps the same "check, sleep,
//! repeat" shape but with an explicit condition kind and
//! `on_timeout` behavior, per the richer poll semantics the data
//! model requires.

use crate::comparator;
use crate::jsonpath;
use crate::model::PollConfig;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("jsonpath error: {0}")]
    JsonPath(#[from] jsonpath::JsonPathError),
    #[error("comparator error: {0}")]
    Comparator(#[from] comparator::ComparatorError),
    #[error("poll timed out after {0}s")]
    TimedOut(f64),
}

/// Outcome of one full poll run.
pub enum PollOutcome {
    /// The condition held; carries the 1-based number of evaluations
    /// it took.
    Satisfied(u32),
    /// Timed out, but `on_timeout == "continue"` so the step did not
    /// fail. Carries the number of evaluations made.
    TimedOutContinuing(u32),
}

/// Poll `check` (an async closure producing the current JSON state,
/// e.g. a fresh response body, and its HTTP status) until
/// `config.condition` is satisfied, the deadline passes, or
/// `config.max_attempts` evaluations have run.
#[instrument(skip(config, check))]
pub async fn poll_until<F, Fut>(config: &PollConfig, mut check: F) -> Result<PollOutcome, PollError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = (u16, Value)>,
{
    let deadline = std::time::Instant::now() + Duration::from_secs_f64(config.timeout);
    let mut attempts = 0u32;
    loop {
        let (status, body) = check().await;
        attempts += 1;
        let satisfied = evaluate_condition(config, status, &body)?;
        if satisfied {
            return Ok(PollOutcome::Satisfied(attempts));
        }
        let exhausted = attempts >= config.max_attempts || std::time::Instant::now() >= deadline;
        if exhausted {
            return if config.on_timeout == "continue" {
                Ok(PollOutcome::TimedOutContinuing(attempts))
            } else {
                Err(PollError::TimedOut(config.timeout))
            };
        }
        debug!(interval = config.interval, attempts, "poll condition not yet satisfied, retrying");
        tokio::time::sleep(Duration::from_secs_f64(config.interval)).await;
    }
}

fn evaluate_condition(config: &PollConfig, status: u16, body: &Value) -> Result<bool, PollError> {
    let actual = match config.condition.as_str() {
        "status_code" => Value::from(status),
        "jsonpath" => {
            let path = config.path.as_deref().unwrap_or("$");
            jsonpath::evaluate_one(path, body)?.unwrap_or(Value::Null)
        }
        _ => Value::Null,
    };
    Ok(comparator::compare(&config.comparator, &actual, &config.expected)?)
}
