//! Result and annotation records persisted between pipeline stages.
//!
//! Every result file carries an explicit `kind` discriminant so tools can
//! tell bootstrap results from iteration results without sniffing for keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discriminant for persisted result files.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Bootstrap,
    Iteration,
}

impl std::fmt::Display for ResultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultKind::Bootstrap => write!(f, "bootstrap"),
            ResultKind::Iteration => write!(f, "iteration"),
        }
    }
}

/// The outcome of running one query against one program version.
///
/// Exactly one of these exists per (program version, query id) pair per run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    pub query_id: String,

    /// The structured input the orchestration step produced, if it got
    /// that far.
    #[serde(default)]
    pub orchestrated_input: Option<serde_json::Value>,

    /// Raw program stdout (or stderr when the run failed).
    #[serde(default)]
    pub raw_output: String,

    /// Error description when any stage failed.
    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub run_start: Option<DateTime<Utc>>,

    #[serde(default)]
    pub run_end: Option<DateTime<Utc>>,
}

impl QueryResult {
    /// A result recording a failure before or during execution.
    pub fn failed(query_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            query_id: query_id.into(),
            orchestrated_input: None,
            raw_output: String::new(),
            error: Some(error.into()),
            run_start: None,
            run_end: None,
        }
    }
}

/// An acceptability judgment for one query result.
///
/// Annotations are append-only; the capture loop flushes each one to disk
/// immediately after it is recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Annotation {
    pub query_id: String,
    pub acceptable: bool,

    #[serde(default)]
    pub feedback: String,

    /// "human" or "rules", depending on who judged.
    #[serde(default)]
    pub source: String,
}

/// The persisted outcome of a bootstrap run: one generated program and its
/// results across every sample query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BootstrapResult {
    pub kind: ResultKind,
    pub run_id: Uuid,
    pub sample_id: String,
    pub program_path: String,
    pub program_code: String,

    /// SHA-256 hex of the program source, recorded when the artifact is
    /// written.
    #[serde(default)]
    pub program_digest: String,

    pub query_results: Vec<QueryResult>,

    #[serde(default)]
    pub annotations: Vec<Annotation>,

    pub created_at: DateTime<Utc>,
}

impl BootstrapResult {
    pub fn new(sample_id: impl Into<String>, program_path: impl Into<String>) -> Self {
        Self {
            kind: ResultKind::Bootstrap,
            run_id: Uuid::new_v4(),
            sample_id: sample_id.into(),
            program_path: program_path.into(),
            program_code: String::new(),
            program_digest: String::new(),
            query_results: Vec::new(),
            annotations: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Look up the result for a query id.
    pub fn result(&self, query_id: &str) -> Option<&QueryResult> {
        self.query_results.iter().find(|r| r.query_id == query_id)
    }

    /// Look up the annotation for a query id.
    pub fn annotation(&self, query_id: &str) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.query_id == query_id)
    }

    /// Query ids with a result but no annotation yet, in result order.
    pub fn unannotated_ids(&self) -> Vec<&str> {
        self.query_results
            .iter()
            .filter(|r| self.annotation(&r.query_id).is_none())
            .map(|r| r.query_id.as_str())
            .collect()
    }
}

/// Stage reached by one fold of the iteration controller.
///
/// Folds advance `Pending → GeneratingImprovement → Validating →
/// OrchestratingInput → Running → Scored`, exiting early to `Failed` when a
/// stage errors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FoldPhase {
    Pending,
    GeneratingImprovement,
    Validating,
    OrchestratingInput,
    Running,
    Scored,
    Failed,
}

/// Classification of a fold against its bootstrap baseline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FoldOutcome {
    /// Failed before, passes after improvement.
    Fixed,
    /// Passed before, fails after improvement.
    Regressed,
    /// Same verdict before and after (including skipped folds and failed
    /// folds, which count as "not improved").
    Unchanged,
}

impl std::fmt::Display for FoldOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FoldOutcome::Fixed => write!(f, "fixed"),
            FoldOutcome::Regressed => write!(f, "regressed"),
            FoldOutcome::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// One leave-one-out fold: the regenerated program, its result on the
/// held-out query, and (once available) the annotation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FoldResult {
    pub fold_index: usize,
    pub held_out_query_id: String,

    /// Improved program source (empty when generation was skipped or
    /// failed before producing code).
    #[serde(default)]
    pub program_code: String,

    #[serde(default)]
    pub program_digest: String,

    pub phase: FoldPhase,
    pub query_result: QueryResult,

    #[serde(default)]
    pub annotation: Option<Annotation>,

    #[serde(default)]
    pub outcome: Option<FoldOutcome>,

    /// True when generation was skipped because the other queries offered
    /// no failure feedback to learn from.
    #[serde(default)]
    pub skipped: bool,
}

/// The persisted outcome of a leave-one-out iteration run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IterationResult {
    pub kind: ResultKind,
    pub run_id: Uuid,
    pub sample_id: String,
    pub folds: Vec<FoldResult>,
    pub created_at: DateTime<Utc>,
}

impl IterationResult {
    pub fn new(sample_id: impl Into<String>) -> Self {
        Self {
            kind: ResultKind::Iteration,
            run_id: Uuid::new_v4(),
            sample_id: sample_id.into(),
            folds: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Fold ids with a query result but no annotation yet.
    pub fn unannotated_ids(&self) -> Vec<&str> {
        self.folds
            .iter()
            .filter(|f| f.annotation.is_none())
            .map(|f| f.held_out_query_id.as_str())
            .collect()
    }
}
