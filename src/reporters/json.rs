//! Structured JSON reporter: one `CaseResult` document, or
//! `{"cases": [...]}` for a multi-case run, pretty-printed exactly as
//! the teacher's `save_test_report` wrote its JSON report.

use crate::model::CaseResult;

/// Renders the final `-O json` document for a CLI invocation.
pub fn render(results: &[CaseResult]) -> Result<String, serde_json::Error> {
    let doc = if results.len() == 1 {
        serde_json::to_value(&results[0])?
    } else {
        serde_json::json!({ "cases": results })
    };
    serde_json::to_string_pretty(&doc)
}
