//! Leave-one-out iteration: one fold per query, each improving the program
//! from every other query's feedback and re-running only the held-out query.
//!
//! The training set is built by id subtraction in its only constructor, so
//! the held-out query's annotation can never reach the improvement prompt.
//! Folds where every other query already passed are skipped outright; with
//! no failure feedback the improvement call has nothing to learn from, and
//! the fold keeps its bootstrap verdict.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::domain::{
    Annotation, BootstrapResult, EvalSample, FoldOutcome, FoldPhase, FoldResult, HarnessError,
    IterationResult, QueryResult, Result,
};
use crate::generator::{ImproveRequest, ProgramGenerator};
use crate::obs;
use crate::program::{build_input, input_field, ProgramRunner};
use crate::scoring::score_result;
use crate::{bootstrap::Orchestration, digest::program_digest, store};

/// Name of the iteration results file inside the output directory.
pub const RESULTS_FILE: &str = "iteration_results.json";

// ---- Training set ----

/// Annotated examples for one fold's improvement prompt, with the held-out
/// query structurally excluded.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    held_out_query_id: String,
    examples: Vec<TrainingExample>,
}

#[derive(Debug, Clone)]
struct TrainingExample {
    query_id: String,
    query_text: String,
    orchestrated_input: Option<serde_json::Value>,
    raw_output: String,
    acceptable: bool,
    feedback: String,
}

impl TrainingSet {
    /// Collect every annotated query except the held-out one.
    pub fn build(
        sample: &EvalSample,
        bootstrap: &BootstrapResult,
        held_out_query_id: &str,
    ) -> Self {
        let mut examples = Vec::new();
        for annotation in &bootstrap.annotations {
            if annotation.query_id == held_out_query_id {
                continue;
            }
            let (Some(query), Some(result)) = (
                sample.query(&annotation.query_id),
                bootstrap.result(&annotation.query_id),
            ) else {
                continue;
            };
            examples.push(TrainingExample {
                query_id: annotation.query_id.clone(),
                query_text: query.text.clone(),
                orchestrated_input: result.orchestrated_input.clone(),
                raw_output: result.raw_output.clone(),
                acceptable: annotation.acceptable,
                feedback: annotation.feedback.clone(),
            });
        }
        Self {
            held_out_query_id: held_out_query_id.to_string(),
            examples,
        }
    }

    pub fn held_out_query_id(&self) -> &str {
        &self.held_out_query_id
    }

    /// Whether any included example was judged unacceptable.
    pub fn has_failures(&self) -> bool {
        self.examples.iter().any(|e| !e.acceptable)
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Render the examples for the improvement prompt.
    pub fn render(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        for example in &self.examples {
            lines.push(format!("--- Example: {} ---", example.query_id));
            lines.push(format!("Query: {}", example.query_text.trim()));
            if let Some(input) = &example.orchestrated_input {
                lines.push(format!("Orchestrated input: {input}"));
            }
            lines.push(format!("Output: {}", example.raw_output.trim()));
            lines.push(format!(
                "Acceptable: {}",
                if example.acceptable { "yes" } else { "no" }
            ));
            if !example.feedback.is_empty() {
                lines.push(format!("Feedback: {}", example.feedback));
            }
            lines.push(String::new());
        }
        lines.join("\n")
    }
}

// ---- Fold classification ----

/// Compare the bootstrap verdict with the fold verdict for one query.
pub fn classify_fold(before_acceptable: bool, after_acceptable: bool) -> FoldOutcome {
    match (before_acceptable, after_acceptable) {
        (false, true) => FoldOutcome::Fixed,
        (true, false) => FoldOutcome::Regressed,
        _ => FoldOutcome::Unchanged,
    }
}

// ---- Pipeline ----

/// Settings for one iteration run.
#[derive(Debug, Clone)]
pub struct IterationConfig {
    pub output_dir: PathBuf,
    pub orchestration: Orchestration,
    /// Score fold results with each query's expectation rules and classify
    /// folds immediately. When false, annotation is left for reviewers.
    pub auto_score: bool,
}

/// Drives the leave-one-out workflow end to end.
pub struct IterationPipeline<'a> {
    generator: &'a dyn ProgramGenerator,
    runner: ProgramRunner,
}

impl<'a> IterationPipeline<'a> {
    pub fn new(generator: &'a dyn ProgramGenerator, runner: ProgramRunner) -> Self {
        Self { generator, runner }
    }

    /// Run one fold per sample query. Fold-level failures are recorded in
    /// the fold and never abort the remaining folds.
    pub async fn run(
        &self,
        sample: &EvalSample,
        bootstrap: &BootstrapResult,
        config: &IterationConfig,
    ) -> Result<IterationResult> {
        sample.validate()?;
        require_fully_annotated(sample, bootstrap)?;
        std::fs::create_dir_all(&config.output_dir)?;

        let mut result = IterationResult::new(&sample.sample_id);
        let _span = obs::RunSpan::enter(&result.run_id.to_string());
        let run_id = result.run_id.to_string();

        for (fold_index, query) in sample.queries.iter().enumerate() {
            obs::emit_fold_started(&run_id, fold_index, &query.id);
            let fold = self
                .run_fold(sample, bootstrap, config, fold_index, query.id.as_str())
                .await?;
            obs::emit_fold_finished(
                &run_id,
                fold_index,
                &fold
                    .outcome
                    .map(|o| o.to_string())
                    .unwrap_or_else(|| "unannotated".to_string()),
                fold.skipped,
            );
            result.folds.push(fold);
        }

        let results_path = config.output_dir.join(RESULTS_FILE);
        store::save_iteration(&result, &results_path)?;
        obs::emit_results_saved(&run_id, &results_path.display().to_string());
        Ok(result)
    }

    async fn run_fold(
        &self,
        sample: &EvalSample,
        bootstrap: &BootstrapResult,
        config: &IterationConfig,
        fold_index: usize,
        held_out_query_id: &str,
    ) -> Result<FoldResult> {
        // Annotation presence was checked up front.
        let baseline = bootstrap
            .annotation(held_out_query_id)
            .ok_or_else(|| HarnessError::MissingAnnotations {
                query_ids: vec![held_out_query_id.to_string()],
            })?;
        let query = sample.query(held_out_query_id).ok_or_else(|| {
            HarnessError::InvalidSample(format!("unknown query id: {held_out_query_id}"))
        })?;

        let mut fold = FoldResult {
            fold_index,
            held_out_query_id: held_out_query_id.to_string(),
            program_code: String::new(),
            program_digest: String::new(),
            phase: FoldPhase::Pending,
            query_result: QueryResult::failed(held_out_query_id, "fold did not run"),
            annotation: None,
            outcome: None,
            skipped: false,
        };

        let training = TrainingSet::build(sample, bootstrap, held_out_query_id);
        if !training.has_failures() {
            info!(
                fold_index = fold_index,
                held_out_query_id = %held_out_query_id,
                "no failure feedback in training set, keeping bootstrap verdict"
            );
            fold.skipped = true;
            fold.phase = FoldPhase::Scored;
            fold.query_result = bootstrap
                .result(held_out_query_id)
                .cloned()
                .unwrap_or_else(|| QueryResult::failed(held_out_query_id, "no bootstrap result"));
            fold.annotation = Some(baseline.clone());
            fold.outcome = Some(FoldOutcome::Unchanged);
            return Ok(fold);
        }

        let fold_dir = config
            .output_dir
            .join("folds")
            .join(format!("fold_{fold_index:02}"));
        std::fs::create_dir_all(&fold_dir)?;

        fold.phase = FoldPhase::GeneratingImprovement;
        let improved = match self
            .generator
            .improve(&ImproveRequest {
                original_code: bootstrap.program_code.clone(),
                training_examples: training.render(),
                bootstrap_prompt: sample.bootstrap.prompt.clone(),
            })
            .await
        {
            Ok(improved) => improved,
            Err(error) => {
                fold.phase = FoldPhase::Failed;
                fold.query_result =
                    QueryResult::failed(held_out_query_id, format!("improvement failed: {error}"));
                return Ok(self.finish_fold(fold, baseline, query, config));
            }
        };
        fold.program_code = improved.code;
        fold.program_digest = program_digest(&fold.program_code);

        let program_path = fold_dir.join("program.py");
        std::fs::write(&program_path, &fold.program_code)?;

        fold.phase = FoldPhase::Validating;
        if let Err(error) = self.runner.validate(&program_path).await {
            fold.phase = FoldPhase::Failed;
            fold.query_result =
                QueryResult::failed(held_out_query_id, format!("program invalid: {error}"));
            return Ok(self.finish_fold(fold, baseline, query, config));
        }

        fold.phase = FoldPhase::OrchestratingInput;
        let schema = match self.runner.schema(&program_path).await {
            Ok(schema) => schema,
            Err(error) => {
                fold.phase = FoldPhase::Failed;
                fold.query_result =
                    QueryResult::failed(held_out_query_id, format!("schema fetch failed: {error}"));
                return Ok(self.finish_fold(fold, baseline, query, config));
            }
        };
        let input = match config.orchestration {
            Orchestration::Direct => {
                let field = input_field(&schema);
                build_input(sample, &schema, &field, &query.text)
            }
            Orchestration::Llm => {
                let input_schema = schema.get("input").cloned().unwrap_or_default();
                match self.generator.orchestrate(&query.text, &input_schema).await {
                    Ok(input) => input,
                    Err(error) => {
                        fold.phase = FoldPhase::Failed;
                        fold.query_result = QueryResult::failed(
                            held_out_query_id,
                            format!("orchestration failed: {error}"),
                        );
                        return Ok(self.finish_fold(fold, baseline, query, config));
                    }
                }
            }
        };

        fold.phase = FoldPhase::Running;
        fold.query_result = self
            .runner
            .run_query(&program_path, held_out_query_id, &input)
            .await;

        Ok(self.finish_fold(fold, baseline, query, config))
    }

    /// Score and classify the fold when auto-scoring is on. Failed folds
    /// are scored too; an error verdict counts as unacceptable.
    fn finish_fold(
        &self,
        mut fold: FoldResult,
        baseline: &Annotation,
        query: &crate::domain::EvalQuery,
        config: &IterationConfig,
    ) -> FoldResult {
        if config.auto_score {
            let annotation = score_result(&fold.query_result, &query.expected);
            fold.outcome = Some(classify_fold(baseline.acceptable, annotation.acceptable));
            fold.annotation = Some(annotation);
            if fold.phase != FoldPhase::Failed {
                fold.phase = FoldPhase::Scored;
            }
        }
        fold
    }
}

/// Every sample query must carry a bootstrap annotation before iteration.
fn require_fully_annotated(sample: &EvalSample, bootstrap: &BootstrapResult) -> Result<()> {
    let mut missing: Vec<String> = sample
        .queries
        .iter()
        .filter(|q| bootstrap.annotation(&q.id).is_none())
        .map(|q| q.id.clone())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        missing.sort();
        Err(HarnessError::MissingAnnotations { query_ids: missing })
    }
}

/// Path of the results file an iteration run writes under `output_dir`.
pub fn results_path(output_dir: &Path) -> PathBuf {
    output_dir.join(RESULTS_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResultKind;
    use uuid::Uuid;

    fn sample() -> EvalSample {
        EvalSample::from_yaml_str(
            r#"
sample_id: s1
skill_type: structured_extraction
bootstrap:
  prompt: "Extract invoice fields."
queries:
  - id: q01
    text: "first query"
  - id: q02
    text: "second query"
  - id: q03
    text: "third query"
"#,
        )
        .expect("sample parses")
    }

    fn annotated_bootstrap(verdicts: &[(&str, bool, &str)]) -> BootstrapResult {
        BootstrapResult {
            kind: ResultKind::Bootstrap,
            run_id: Uuid::new_v4(),
            sample_id: "s1".to_string(),
            program_path: "out/program.py".to_string(),
            program_code: "print('v1')".to_string(),
            program_digest: String::new(),
            query_results: verdicts
                .iter()
                .map(|(id, _, _)| QueryResult {
                    query_id: id.to_string(),
                    orchestrated_input: Some(serde_json::json!({"prompt": id})),
                    raw_output: format!("output for {id}"),
                    error: None,
                    run_start: None,
                    run_end: None,
                })
                .collect(),
            annotations: verdicts
                .iter()
                .map(|(id, acceptable, feedback)| Annotation {
                    query_id: id.to_string(),
                    acceptable: *acceptable,
                    feedback: feedback.to_string(),
                    source: "human".to_string(),
                })
                .collect(),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_training_set_excludes_held_out_query() {
        let bootstrap = annotated_bootstrap(&[
            ("q01", true, ""),
            ("q02", false, "missing total"),
            ("q03", true, ""),
        ]);
        let training = TrainingSet::build(&sample(), &bootstrap, "q02");
        let rendered = training.render();
        assert!(rendered.contains("Example: q01"));
        assert!(rendered.contains("Example: q03"));
        assert!(!rendered.contains("q02"));
        assert!(!rendered.contains("missing total"));
        assert_eq!(training.held_out_query_id(), "q02");
    }

    #[test]
    fn test_training_set_has_failures() {
        let bootstrap = annotated_bootstrap(&[
            ("q01", true, ""),
            ("q02", false, "bad"),
            ("q03", true, ""),
        ]);
        // Holding out the only failure leaves nothing to learn from.
        assert!(!TrainingSet::build(&sample(), &bootstrap, "q02").has_failures());
        assert!(TrainingSet::build(&sample(), &bootstrap, "q01").has_failures());
    }

    #[test]
    fn test_training_set_render_includes_feedback() {
        let bootstrap = annotated_bootstrap(&[("q01", false, "wrong date"), ("q02", true, "")]);
        let rendered = TrainingSet::build(&sample(), &bootstrap, "q03").render();
        assert!(rendered.contains("Acceptable: no"));
        assert!(rendered.contains("Feedback: wrong date"));
        assert!(rendered.contains("Acceptable: yes"));
    }

    #[test]
    fn test_classify_fold() {
        assert_eq!(classify_fold(false, true), FoldOutcome::Fixed);
        assert_eq!(classify_fold(true, false), FoldOutcome::Regressed);
        assert_eq!(classify_fold(true, true), FoldOutcome::Unchanged);
        assert_eq!(classify_fold(false, false), FoldOutcome::Unchanged);
    }

    #[test]
    fn test_require_fully_annotated_lists_missing_ids() {
        let bootstrap = annotated_bootstrap(&[("q01", true, "")]);
        let err = require_fully_annotated(&sample(), &bootstrap).unwrap_err();
        match err {
            HarnessError::MissingAnnotations { query_ids } => {
                assert_eq!(query_ids, vec!["q02".to_string(), "q03".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
