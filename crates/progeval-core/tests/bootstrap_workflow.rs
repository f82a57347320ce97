//! End-to-end bootstrap workflow driven by a canned generator and
//! shell-script programs.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use progeval_core::{
    load_bootstrap, BootstrapConfig, BootstrapPipeline, EvalSample, ExecConfig, GeneratedProgram,
    GenerateRequest, HarnessError, ImproveRequest, Orchestration, ProgramGenerator, ProgramRunner,
};

const COMPLIANT_PROGRAM: &str = r#"
case "$1" in
  --help) exit 0 ;;
  --schema) echo '{"input":{"type":"object","properties":{"prompt":{"type":"string"}}},"output":{"type":"object"}}' ;;
  --input) echo '{"answer":"extracted fields","tool_calls":[]}' ;;
esac
"#;

const BROKEN_SCHEMA_PROGRAM: &str = r#"
case "$1" in
  --help) exit 0 ;;
  --schema) echo '{"input":{}}' ;;
esac
"#;

/// Generator returning fixed program text and recording every call.
struct CannedGenerator {
    program: String,
    generate_calls: Mutex<Vec<GenerateRequest>>,
    improve_calls: Mutex<Vec<ImproveRequest>>,
}

impl CannedGenerator {
    fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            generate_calls: Mutex::new(Vec::new()),
            improve_calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ProgramGenerator for CannedGenerator {
    async fn generate(&self, request: &GenerateRequest) -> progeval_core::Result<GeneratedProgram> {
        self.generate_calls
            .lock()
            .map_err(|_| HarnessError::Generation("poisoned lock".to_string()))?
            .push(request.clone());
        Ok(GeneratedProgram {
            code: self.program.clone(),
        })
    }

    async fn improve(&self, request: &ImproveRequest) -> progeval_core::Result<GeneratedProgram> {
        self.improve_calls
            .lock()
            .map_err(|_| HarnessError::Generation("poisoned lock".to_string()))?
            .push(request.clone());
        Ok(GeneratedProgram {
            code: self.program.clone(),
        })
    }

    async fn orchestrate(&self, query_text: &str, _input_schema: &Value) -> progeval_core::Result<Value> {
        Ok(serde_json::json!({ "prompt": query_text }))
    }
}

fn sample() -> EvalSample {
    EvalSample::from_yaml_str(
        r#"
sample_id: invoice-extraction
skill_type: structured_extraction
metadata:
  description: "Extract invoice fields from email text"
bootstrap:
  prompt: "Build an invoice field extractor."
queries:
  - id: q01
    text: "Invoice 1234 from Acme, total $50"
    expected:
      output_contains: ["extracted"]
  - id: q02
    text: "Please pull the fields from this PO"
"#,
    )
    .expect("sample parses")
}

fn sh_runner() -> ProgramRunner {
    ProgramRunner::new(ExecConfig {
        command_prefix: vec!["sh".to_string()],
        validate_timeout_secs: 10,
        run_timeout_secs: 10,
    })
}

fn config(dir: &tempfile::TempDir, orchestration: Orchestration) -> BootstrapConfig {
    BootstrapConfig {
        output_dir: dir.path().to_path_buf(),
        skill_instructions: "Emit JSON on stdout.".to_string(),
        orchestration,
    }
}

#[tokio::test]
async fn bootstrap_runs_all_queries_and_persists() {
    let dir = tempfile::tempdir().expect("tempdir");
    let generator = CannedGenerator::new(COMPLIANT_PROGRAM);
    let pipeline = BootstrapPipeline::new(&generator, sh_runner());

    let result = pipeline
        .run(&sample(), &config(&dir, Orchestration::Llm))
        .await
        .expect("bootstrap succeeds");

    assert_eq!(result.query_results.len(), 2);
    assert!(result.query_results.iter().all(|r| r.error.is_none()));
    assert!(!result.program_digest.is_empty());
    {
        let calls = generator.generate_calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].is_agent);
    }

    // Program and results are on disk; the results file round-trips.
    assert!(dir.path().join("program.py").exists());
    let loaded =
        load_bootstrap(&dir.path().join("bootstrap_results.json")).expect("results load");
    assert_eq!(loaded.sample_id, "invoice-extraction");
    assert_eq!(loaded.run_id, result.run_id);
}

#[tokio::test]
async fn bootstrap_direct_orchestration_uses_schema_field() {
    let dir = tempfile::tempdir().expect("tempdir");
    let generator = CannedGenerator::new(COMPLIANT_PROGRAM);
    let pipeline = BootstrapPipeline::new(&generator, sh_runner());

    let result = pipeline
        .run(&sample(), &config(&dir, Orchestration::Direct))
        .await
        .expect("bootstrap succeeds");

    let input = result.query_results[0]
        .orchestrated_input
        .as_ref()
        .expect("input recorded");
    assert_eq!(input["prompt"], "Invoice 1234 from Acme, total $50");
}

#[tokio::test]
async fn bootstrap_marks_agent_samples_in_the_generate_request() {
    let agent_sample = EvalSample::from_yaml_str(
        r#"
sample_id: booking
skill_type: booking_agent
bootstrap:
  prompt: "Build an appointment booking agent."
queries:
  - id: q01
    text: "Book me a slot tomorrow"
"#,
    )
    .expect("sample parses");

    let dir = tempfile::tempdir().expect("tempdir");
    let generator = CannedGenerator::new(COMPLIANT_PROGRAM);
    let pipeline = BootstrapPipeline::new(&generator, sh_runner());

    pipeline
        .run(&agent_sample, &config(&dir, Orchestration::Llm))
        .await
        .expect("bootstrap succeeds");

    let calls = generator.generate_calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].is_agent);
}

#[tokio::test]
async fn bootstrap_validation_failure_saves_partial_results() {
    let dir = tempfile::tempdir().expect("tempdir");
    let generator = CannedGenerator::new(BROKEN_SCHEMA_PROGRAM);
    let pipeline = BootstrapPipeline::new(&generator, sh_runner());

    let err = pipeline
        .run(&sample(), &config(&dir, Orchestration::Llm))
        .await
        .expect_err("validation fails");
    assert!(matches!(err, HarnessError::Validation(_)));
    assert!(err.to_string().contains("\"output\""));

    // The generated program stays on disk for inspection and every query is
    // recorded as failed.
    assert!(dir.path().join("program.py").exists());
    let partial =
        load_bootstrap(&dir.path().join("bootstrap_results.json")).expect("partial results load");
    assert_eq!(partial.query_results.len(), 2);
    assert!(partial
        .query_results
        .iter()
        .all(|r| r.error.as_deref().unwrap_or("").contains("program invalid")));
}

#[tokio::test]
async fn bootstrap_generation_failure_propagates() {
    struct FailingGenerator;

    #[async_trait]
    impl ProgramGenerator for FailingGenerator {
        async fn generate(
            &self,
            _request: &GenerateRequest,
        ) -> progeval_core::Result<GeneratedProgram> {
            Err(HarnessError::Generation("model unavailable".to_string()))
        }

        async fn improve(
            &self,
            _request: &ImproveRequest,
        ) -> progeval_core::Result<GeneratedProgram> {
            Err(HarnessError::Generation("model unavailable".to_string()))
        }

        async fn orchestrate(
            &self,
            _query_text: &str,
            _input_schema: &Value,
        ) -> progeval_core::Result<Value> {
            Err(HarnessError::Generation("model unavailable".to_string()))
        }
    }

    let dir = tempfile::tempdir().expect("tempdir");
    let pipeline = BootstrapPipeline::new(&FailingGenerator, sh_runner());
    let err = pipeline
        .run(&sample(), &config(&dir, Orchestration::Llm))
        .await
        .expect_err("generation fails");
    assert!(matches!(err, HarnessError::Generation(_)));
}
