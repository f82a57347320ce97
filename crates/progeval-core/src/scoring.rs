//! Rule-based annotation from a query's expectation block.
//!
//! Covers the mechanical checks only (errors, tool invocation, substring
//! inclusion/exclusion). Semantic requirements stay with human reviewers;
//! the annotation `source` field records which path produced a judgment.

use serde_json::Value;

use crate::domain::{Annotation, QueryExpected, QueryResult};

/// Judge one query result against its expectation block.
pub fn score_result(result: &QueryResult, expected: &QueryExpected) -> Annotation {
    let mut failures: Vec<String> = Vec::new();

    if let Some(error) = &result.error {
        failures.push(format!("run failed: {error}"));
    } else {
        if expected.invokes_tools && !output_invokes_tools(&result.raw_output) {
            failures.push("no tool calls in output".to_string());
        }
        let output_lower = result.raw_output.to_lowercase();
        for needle in &expected.output_contains {
            if !output_lower.contains(&needle.to_lowercase()) {
                failures.push(format!("missing expected text {needle:?}"));
            }
        }
        for needle in &expected.output_excludes {
            if output_lower.contains(&needle.to_lowercase()) {
                failures.push(format!("contains excluded text {needle:?}"));
            }
        }
    }

    Annotation {
        query_id: result.query_id.clone(),
        acceptable: failures.is_empty(),
        feedback: failures.join("; "),
        source: "rules".to_string(),
    }
}

/// Whether the output JSON carries a non-empty `tool_calls` array.
fn output_invokes_tools(raw_output: &str) -> bool {
    let Ok(value) = serde_json::from_str::<Value>(raw_output) else {
        return false;
    };
    value
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| !calls.is_empty())
        .unwrap_or(false)
}
