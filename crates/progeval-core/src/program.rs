//! Generated-program execution over the CLI contract.
//!
//! Generated programs are untrusted-ish artifacts and always run as isolated
//! subprocesses with captured stdout/stderr and an enforced wall-clock
//! timeout. The contract: `--help` exits 0, `--schema` prints a JSON object
//! with `input` and `output` keys, and `--input <json>` prints the structured
//! output JSON on stdout (stderr with empty stdout signals failure).

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use crate::domain::{EvalSample, HarnessError, QueryResult, Result};

/// Maximum error text carried into result records.
const ERROR_TRUNCATE_LEN: usize = 500;

/// How generated programs are invoked.
#[derive(Debug, Clone)]
pub struct ExecConfig {
    /// Command prefix the program path is appended to (e.g. `["uv", "run"]`).
    pub command_prefix: Vec<String>,

    /// Timeout for contract-validation calls (`--help`, `--schema`).
    pub validate_timeout_secs: u64,

    /// Timeout for query runs (`--input`).
    pub run_timeout_secs: u64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            command_prefix: vec!["uv".to_string(), "run".to_string()],
            validate_timeout_secs: 120,
            run_timeout_secs: 180,
        }
    }
}

/// Captured output of one subprocess invocation.
#[derive(Debug, Clone)]
pub struct ProgramOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl ProgramOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs generated programs as subprocesses.
#[derive(Debug, Clone, Default)]
pub struct ProgramRunner {
    config: ExecConfig,
}

impl ProgramRunner {
    pub fn new(config: ExecConfig) -> Self {
        Self { config }
    }

    /// Invoke the program with the given flags, bounded by `timeout_secs`.
    ///
    /// A timeout is reported as [`HarnessError::Timeout`], distinct from a
    /// crash (which is a normal `ProgramOutput` with nonzero exit code).
    async fn invoke(
        &self,
        program: &Path,
        args: &[&str],
        timeout_secs: u64,
    ) -> Result<ProgramOutput> {
        let (exe, prefix_args) = self
            .config
            .command_prefix
            .split_first()
            .ok_or_else(|| HarnessError::Execution("empty command prefix".to_string()))?;

        let start = Instant::now();
        let child = Command::new(exe)
            .args(prefix_args)
            .arg(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A timed-out program must not outlive its fold.
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| HarnessError::Timeout {
            stage: args.first().unwrap_or(&"run").to_string(),
            limit_secs: timeout_secs,
        })??;

        let result = ProgramOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        debug!(
            program = %program.display(),
            args = ?args,
            exit_code = result.exit_code,
            duration_ms = result.duration_ms,
            "program invoked"
        );
        Ok(result)
    }

    /// Verify the self-description contract before any query is run.
    ///
    /// Failure messages name the violated part of the contract (missing
    /// file, failing flag, missing schema key).
    pub async fn validate(&self, program: &Path) -> Result<()> {
        if !program.exists() {
            return Err(HarnessError::Validation(format!(
                "program file not found: {}",
                program.display()
            )));
        }

        let help = self
            .invoke(program, &["--help"], self.config.validate_timeout_secs)
            .await?;
        if !help.success() {
            return Err(HarnessError::Validation(format!(
                "--help failed: {}",
                truncate(&help.stderr, ERROR_TRUNCATE_LEN)
            )));
        }

        let schema_out = self
            .invoke(program, &["--schema"], self.config.validate_timeout_secs)
            .await?;
        if !schema_out.success() {
            return Err(HarnessError::Validation(format!(
                "--schema failed: {}",
                truncate(&schema_out.stderr, ERROR_TRUNCATE_LEN)
            )));
        }
        let schema: Value = serde_json::from_str(&schema_out.stdout).map_err(|e| {
            HarnessError::Validation(format!("--schema returned invalid JSON: {e}"))
        })?;
        for key in ["input", "output"] {
            if schema.get(key).is_none() {
                return Err(HarnessError::Validation(format!(
                    "--schema output missing \"{key}\" key"
                )));
            }
        }
        Ok(())
    }

    /// Fetch the program's declared input/output schema.
    pub async fn schema(&self, program: &Path) -> Result<Value> {
        let output = self
            .invoke(program, &["--schema"], self.config.validate_timeout_secs)
            .await?;
        if !output.success() {
            return Err(HarnessError::Execution(format!(
                "--schema failed: {}",
                truncate(&output.stderr, ERROR_TRUNCATE_LEN)
            )));
        }
        Ok(serde_json::from_str(&output.stdout)?)
    }

    /// Run one structured input through the program and record a
    /// [`QueryResult`].
    ///
    /// Never returns an error for program-level failures; crashes, timeouts,
    /// and stderr-without-stdout all land in the result's `error` field so
    /// the run can continue with the remaining queries.
    pub async fn run_query(
        &self,
        program: &Path,
        query_id: &str,
        input: &Value,
    ) -> QueryResult {
        let input_str = input.to_string();
        let run_start = Utc::now();

        let output = match self
            .invoke(program, &["--input", &input_str], self.config.run_timeout_secs)
            .await
        {
            Ok(output) => output,
            Err(e) => {
                let mut result = QueryResult::failed(query_id, e.to_string());
                result.orchestrated_input = Some(input.clone());
                result.run_start = Some(run_start);
                result.run_end = Some(Utc::now());
                return result;
            }
        };

        let stdout_empty = output.stdout.trim().is_empty();
        let (raw_output, error) = if !output.stderr.is_empty() && stdout_empty {
            (
                output.stderr.clone(),
                Some(format!(
                    "program error: {}",
                    truncate(&output.stderr, ERROR_TRUNCATE_LEN)
                )),
            )
        } else if !output.success() && stdout_empty {
            (
                String::new(),
                Some(format!("program exited with code {}", output.exit_code)),
            )
        } else {
            (output.stdout.clone(), None)
        };

        QueryResult {
            query_id: query_id.to_string(),
            orchestrated_input: Some(input.clone()),
            raw_output,
            error,
            run_start: Some(run_start),
            run_end: Some(Utc::now()),
        }
    }
}

/// Pick the program's natural-language input field from its input schema:
/// `query`, then `prompt`, then the first string-typed property.
pub fn input_field(schema: &Value) -> String {
    let props = schema
        .get("input")
        .and_then(|i| i.get("properties"))
        .and_then(|p| p.as_object());

    let Some(props) = props else {
        return "prompt".to_string();
    };
    for candidate in ["query", "prompt"] {
        if props.contains_key(candidate) {
            return candidate.to_string();
        }
    }
    props
        .iter()
        .find(|(_, v)| v.get("type").and_then(Value::as_str) == Some("string"))
        .map(|(k, _)| k.clone())
        .unwrap_or_else(|| "prompt".to_string())
}

/// Assemble the structured input for a query, injecting the sample's test
/// state into agent programs that declare a `context` property.
pub fn build_input(sample: &EvalSample, schema: &Value, field: &str, query_text: &str) -> Value {
    let mut input = serde_json::json!({ field: query_text });

    let has_context = schema
        .get("input")
        .and_then(|i| i.get("properties"))
        .and_then(|p| p.get("context"))
        .is_some();
    if sample.is_agent() && has_context {
        let today = if sample.test_state.today.is_empty() {
            "2025-02-15"
        } else {
            &sample.test_state.today
        };
        input["context"] = serde_json::json!({
            "today": today,
            "existing_appointments": sample.test_state.existing_appointments,
        });
    }
    input
}

/// Truncate a string for error records.
pub(crate) fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let mut end = max_len;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}
