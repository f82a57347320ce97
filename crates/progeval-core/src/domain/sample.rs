//! Eval sample definitions loaded from YAML.
//!
//! A sample is authored once per skill under test: a bootstrap prompt that
//! describes the program to generate, a set of named test queries with
//! expected-content assertions, and optional test state injected into agent
//! programs. Samples are loaded at the start of a run and never mutated.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::{HarnessError, Result};

/// Content assertions for one query's output.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryExpected {
    /// When true, the program's output must record at least one tool call.
    #[serde(default)]
    pub invokes_tools: bool,

    /// Substrings that must appear in the output (case-insensitive).
    #[serde(default)]
    pub output_contains: Vec<String>,

    /// Substrings that must not appear in the output (case-insensitive).
    #[serde(default)]
    pub output_excludes: Vec<String>,

    /// Free-text requirements left to human reviewers.
    #[serde(default)]
    pub semantic_requirements: Vec<String>,
}

/// A single named test query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvalQuery {
    /// Unique identifier within the sample; the join key for results,
    /// annotations, and folds.
    pub id: String,

    /// Free-text user query.
    pub text: String,

    /// Specificity bucket for report breakdowns (e.g. "vague", "detailed").
    #[serde(default)]
    pub specificity: String,

    /// Professionalism bucket for report breakdowns.
    #[serde(default)]
    pub professionalism: String,

    /// Expected-content assertions used by the rule-based scorer.
    #[serde(default)]
    pub expected: QueryExpected,
}

/// The bootstrap prompt and its descriptive tags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bootstrap {
    /// Natural-language description of the program to generate.
    pub prompt: String,

    #[serde(default)]
    pub specificity: String,

    #[serde(default)]
    pub professionalism: String,

    #[serde(default)]
    pub expected_capabilities: Vec<String>,
}

/// Descriptive sample metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SampleMetadata {
    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default = "default_difficulty")]
    pub difficulty: String,
}

fn default_difficulty() -> String {
    "medium".to_string()
}

/// Fixed test-world state injected into agent programs that accept a
/// `context` input property.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TestState {
    #[serde(default)]
    pub today: String,

    #[serde(default)]
    pub existing_appointments: Vec<serde_json::Value>,
}

/// A complete, versioned eval sample.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvalSample {
    #[serde(default = "default_version")]
    pub version: String,

    /// Skill category; an "agent" substring selects agent-mode generation.
    pub skill_type: String,

    pub sample_id: String,

    #[serde(default)]
    pub created_at: String,

    #[serde(default)]
    pub metadata: SampleMetadata,

    pub bootstrap: Bootstrap,

    #[serde(default)]
    pub test_state: TestState,

    pub queries: Vec<EvalQuery>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl EvalSample {
    /// Load a sample from a YAML file and validate its invariants.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse a sample from YAML text and validate its invariants.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let sample: Self = serde_yaml::from_str(yaml)?;
        sample.validate()?;
        Ok(sample)
    }

    /// Check structural invariants: non-empty queries, unique query ids.
    pub fn validate(&self) -> Result<()> {
        if self.queries.is_empty() {
            return Err(HarnessError::InvalidSample(format!(
                "sample {} has no queries",
                self.sample_id
            )));
        }
        let mut seen = HashSet::new();
        for query in &self.queries {
            if !seen.insert(query.id.as_str()) {
                return Err(HarnessError::InvalidSample(format!(
                    "duplicate query id: {}",
                    query.id
                )));
            }
        }
        Ok(())
    }

    /// Whether this sample targets a tool-using agent program.
    pub fn is_agent(&self) -> bool {
        self.skill_type.to_lowercase().contains("agent")
            || self.metadata.tags.iter().any(|t| t == "agent")
    }

    /// Look up a query by id.
    pub fn query(&self, id: &str) -> Option<&EvalQuery> {
        self.queries.iter().find(|q| q.id == id)
    }

    /// All query ids, in declaration order.
    pub fn query_ids(&self) -> Vec<&str> {
        self.queries.iter().map(|q| q.id.as_str()).collect()
    }
}
