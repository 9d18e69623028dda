//! Human-readable console reporter, grounded on
//! `bin/muon.rs::print_test_result`.

use crate::model::{CaseResult, StepResult};
use tracing::{error, info};

/// Prints one case's result to the tracing `info`/`error` sinks,
/// matching the teacher's colored pass/fail glyph style.
pub fn print(result: &CaseResult, verbose: bool) {
    let status_label = match result.status.as_str() {
        "passed" => "\x1b[32mPASS\x1b[0m",
        "failed" => "\x1b[31mFAIL\x1b[0m",
        _ => "\x1b[33mERROR\x1b[0m",
    };
    info!(
        "{} {} ({} ms, {}/{} steps passed)",
        status_label, result.name, result.duration_ms, result.summary.passed_steps, result.summary.total_steps
    );
    if let Some(err) = &result.error {
        error!("  engine error [{}]: {}", err.code, err.message);
    }
    if let Some(dd) = &result.data_driven {
        info!("  data-driven: {}/{} rows passed", dd.passed_runs, dd.total_runs);
        for (i, run) in dd.runs.iter().enumerate() {
            info!("  row {}. {} ({:?})", i + 1, run.status, run.parameters);
            print_steps(&run.steps, verbose, "    ");
        }
        return;
    }
    print_steps(&result.steps, verbose, "  ");
}

fn print_steps(steps: &[StepResult], verbose: bool, indent: &str) {
    for (i, step) in steps.iter().enumerate() {
        let step_label = match step.status.as_str() {
            "passed" => "\x1b[32m\u{2713}\x1b[0m",
            "skipped" => "\x1b[90m\u{2013}\x1b[0m",
            _ => "\x1b[31m\u{2717}\x1b[0m",
        };
        info!("{}{}. {} {} ({} ms)", indent, i + 1, step_label, step.name, step.duration_ms);
        if verbose {
            for assertion in &step.assertions {
                if !assertion.passed {
                    info!(
                        "{}     assertion failed: {} {} {} (actual: {})",
                        indent, assertion.target, assertion.comparator, assertion.expected, assertion.actual
                    );
                }
            }
        }
        if let Some(err) = &step.error {
            error!("{}     error [{}]: {}", indent, err.code, err.message);
        }
    }
}
