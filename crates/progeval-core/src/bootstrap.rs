//! Bootstrap pipeline: generate a program from a sample, validate it, run
//! every query, persist the results.
//!
//! The generated program is written to disk before validation so a failing
//! artifact can still be inspected. Validation failure persists a partial
//! result (every query marked failed) and then surfaces the error; the
//! results file is the durable record either way.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::domain::{BootstrapResult, EvalSample, QueryResult, Result};
use crate::generator::{GenerateRequest, ProgramGenerator};
use crate::obs;
use crate::program::{build_input, input_field, ProgramRunner};
use crate::{digest::program_digest, store};

/// Name of the generated program file inside the output directory.
pub const PROGRAM_FILE: &str = "program.py";

/// Name of the bootstrap results file inside the output directory.
pub const RESULTS_FILE: &str = "bootstrap_results.json";

/// How natural-language queries become structured program input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orchestration {
    /// Ask the generator to translate each query against the input schema.
    Llm,
    /// Place the query text into the schema's natural-language field,
    /// injecting agent context when the schema declares it.
    Direct,
}

/// Settings for one bootstrap run.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub output_dir: PathBuf,
    /// Program conventions handed to the generator verbatim.
    pub skill_instructions: String,
    pub orchestration: Orchestration,
}

/// Drives the bootstrap workflow end to end.
pub struct BootstrapPipeline<'a> {
    generator: &'a dyn ProgramGenerator,
    runner: ProgramRunner,
}

impl<'a> BootstrapPipeline<'a> {
    pub fn new(generator: &'a dyn ProgramGenerator, runner: ProgramRunner) -> Self {
        Self { generator, runner }
    }

    /// Run the full pipeline for one sample.
    ///
    /// On contract-validation failure the partial result is saved before
    /// the error is returned.
    pub async fn run(
        &self,
        sample: &EvalSample,
        config: &BootstrapConfig,
    ) -> Result<BootstrapResult> {
        sample.validate()?;
        std::fs::create_dir_all(&config.output_dir)?;

        let program_path = config.output_dir.join(PROGRAM_FILE);
        let results_path = config.output_dir.join(RESULTS_FILE);
        let mut result =
            BootstrapResult::new(&sample.sample_id, program_path.display().to_string());

        let _span = obs::RunSpan::enter(&result.run_id.to_string());
        let run_id = result.run_id.to_string();
        obs::emit_bootstrap_started(&run_id, &sample.sample_id, sample.queries.len());

        let generated = self
            .generator
            .generate(&GenerateRequest {
                skill_instructions: config.skill_instructions.clone(),
                bootstrap_prompt: sample.bootstrap.prompt.clone(),
                is_agent: sample.is_agent(),
            })
            .await?;
        result.program_code = generated.code;
        result.program_digest = program_digest(&result.program_code);

        std::fs::write(&program_path, &result.program_code)?;
        obs::emit_program_generated(
            &run_id,
            &program_path.display().to_string(),
            &result.program_digest,
        );

        if let Err(error) = self.runner.validate(&program_path).await {
            obs::emit_validation_failed(&run_id, &error);
            result.query_results = sample
                .queries
                .iter()
                .map(|q| QueryResult::failed(&q.id, format!("program invalid: {error}")))
                .collect();
            store::save_bootstrap(&result, &results_path)?;
            obs::emit_results_saved(&run_id, &results_path.display().to_string());
            return Err(error);
        }
        info!(program = %program_path.display(), "program validated");

        let schema = self.runner.schema(&program_path).await?;
        let input_schema = schema.get("input").cloned().unwrap_or_default();
        let field = input_field(&schema);

        for query in &sample.queries {
            let input = match config.orchestration {
                Orchestration::Direct => build_input(sample, &schema, &field, &query.text),
                Orchestration::Llm => {
                    match self.generator.orchestrate(&query.text, &input_schema).await {
                        Ok(input) => input,
                        Err(error) => {
                            obs::emit_query_finished(&run_id, &query.id, false);
                            result.query_results.push(QueryResult::failed(
                                &query.id,
                                format!("orchestration failed: {error}"),
                            ));
                            continue;
                        }
                    }
                }
            };

            let query_result = self.runner.run_query(&program_path, &query.id, &input).await;
            obs::emit_query_finished(&run_id, &query.id, query_result.error.is_none());
            result.query_results.push(query_result);
        }

        store::save_bootstrap(&result, &results_path)?;
        obs::emit_results_saved(&run_id, &results_path.display().to_string());
        Ok(result)
    }
}

/// Path of the results file a bootstrap run writes under `output_dir`.
pub fn results_path(output_dir: &Path) -> PathBuf {
    output_dir.join(RESULTS_FILE)
}
