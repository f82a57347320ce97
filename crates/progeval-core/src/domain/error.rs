//! Error taxonomy for the harness.
//!
//! Configuration-class errors (bad samples, missing annotations, wrong result
//! kind) propagate and stop the run. Generation, validation, and execution
//! failures are caught by the pipelines and converted into result records.

/// Harness errors.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("invalid eval sample: {0}")]
    InvalidSample(String),

    #[error("missing annotations for queries: {}", query_ids.join(", "))]
    MissingAnnotations { query_ids: Vec<String> },

    #[error("result file {path} is {actual}, expected {expected}")]
    ResultKindMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("program generation failed: {0}")]
    Generation(String),

    #[error("program validation failed: {0}")]
    Validation(String),

    #[error("program execution failed: {0}")]
    Execution(String),

    #[error("{stage} timed out after {limit_secs}s")]
    Timeout { stage: String, limit_secs: u64 },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_annotations_lists_ids() {
        let err = HarnessError::MissingAnnotations {
            query_ids: vec!["q01".to_string(), "q03".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("q01"));
        assert!(msg.contains("q03"));
    }

    #[test]
    fn test_timeout_names_stage_and_limit() {
        let err = HarnessError::Timeout {
            stage: "--schema".to_string(),
            limit_secs: 120,
        };
        assert!(err.to_string().contains("--schema"));
        assert!(err.to_string().contains("120"));
    }

    #[test]
    fn test_result_kind_mismatch_display() {
        let err = HarnessError::ResultKindMismatch {
            path: "out/results.json".to_string(),
            expected: "bootstrap".to_string(),
            actual: "iteration".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("bootstrap"));
        assert!(msg.contains("iteration"));
    }
}
