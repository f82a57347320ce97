//! Annotation of query results, interactively or from rules.
//!
//! The interactive session is generic over its reader and writer so tests
//! drive it with in-memory buffers. Each judgment is appended to the result
//! and handed to the persist hook as soon as it is entered, so an aborted
//! session keeps every verdict captured up to that point.

use std::io::{BufRead, Write};

use crate::domain::{
    Annotation, BootstrapResult, EvalSample, IterationResult, QueryResult, Result,
};
use crate::scoring::score_result;

/// Annotate every unannotated query from the sample's expectation rules.
/// Returns the number of annotations added.
pub fn apply_rules(sample: &EvalSample, result: &mut BootstrapResult) -> usize {
    let pending: Vec<String> = result
        .unannotated_ids()
        .into_iter()
        .map(str::to_string)
        .collect();
    let mut added = 0;
    for query_id in pending {
        let Some(query) = sample.query(&query_id) else {
            continue;
        };
        let Some(query_result) = result.result(&query_id) else {
            continue;
        };
        let annotation = score_result(query_result, &query.expected);
        result.annotations.push(annotation);
        added += 1;
    }
    added
}

/// Interactive review of unannotated query results.
pub struct AnnotationSession<R, W> {
    input: R,
    output: W,
}

enum Judgment {
    Captured(Annotation),
    Skipped,
    EndOfInput,
}

impl<R: BufRead, W: Write> AnnotationSession<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Walk the unannotated results, prompting for a verdict and optional
    /// feedback on each. `s` skips a query, end of input ends the session.
    /// `persist` runs after every captured judgment. The sample, when
    /// supplied, lets the prompt show each query's text. Returns the number
    /// of annotations added.
    pub fn run(
        &mut self,
        sample: Option<&EvalSample>,
        result: &mut BootstrapResult,
        mut persist: impl FnMut(&BootstrapResult) -> Result<()>,
    ) -> Result<usize> {
        let pending: Vec<String> = result
            .unannotated_ids()
            .into_iter()
            .map(str::to_string)
            .collect();
        if pending.is_empty() {
            writeln!(self.output, "All queries are annotated.")?;
            return Ok(0);
        }

        let mut added = 0;
        for query_id in pending {
            let query_result = result.result(&query_id).cloned().unwrap_or_default();
            match self.prompt_for(sample, &query_id, &query_result)? {
                Judgment::Captured(annotation) => {
                    result.annotations.push(annotation);
                    added += 1;
                    persist(result)?;
                }
                Judgment::Skipped => continue,
                Judgment::EndOfInput => break,
            }
        }

        writeln!(self.output, "\nAnnotated {added} result(s).")?;
        self.output.flush()?;
        Ok(added)
    }

    /// Same loop over the folds of an iteration run, for human review of
    /// fold outputs. Fold outcomes stay unset; reporting classifies them
    /// against the bootstrap baseline.
    pub fn run_iteration(
        &mut self,
        sample: Option<&EvalSample>,
        result: &mut IterationResult,
        mut persist: impl FnMut(&IterationResult) -> Result<()>,
    ) -> Result<usize> {
        if result.unannotated_ids().is_empty() {
            writeln!(self.output, "All folds are annotated.")?;
            return Ok(0);
        }

        let mut added = 0;
        for index in 0..result.folds.len() {
            if result.folds[index].annotation.is_some() {
                continue;
            }
            let query_id = result.folds[index].held_out_query_id.clone();
            let query_result = result.folds[index].query_result.clone();
            match self.prompt_for(sample, &query_id, &query_result)? {
                Judgment::Captured(annotation) => {
                    result.folds[index].annotation = Some(annotation);
                    added += 1;
                    persist(result)?;
                }
                Judgment::Skipped => continue,
                Judgment::EndOfInput => break,
            }
        }

        writeln!(self.output, "\nAnnotated {added} fold(s).")?;
        self.output.flush()?;
        Ok(added)
    }

    fn prompt_for(
        &mut self,
        sample: Option<&EvalSample>,
        query_id: &str,
        query_result: &QueryResult,
    ) -> Result<Judgment> {
        let query_text = sample
            .and_then(|s| s.query(query_id))
            .map(|q| q.text.as_str())
            .unwrap_or("<unknown query>");

        writeln!(self.output, "\n=== {query_id} ===")?;
        writeln!(self.output, "Query: {query_text}")?;
        match &query_result.error {
            Some(error) => writeln!(self.output, "Error: {error}")?,
            None => writeln!(self.output, "Output: {}", query_result.raw_output)?,
        }
        write!(self.output, "Acceptable? [y/n/s]: ")?;
        self.output.flush()?;

        let Some(verdict) = self.read_line()? else {
            return Ok(Judgment::EndOfInput);
        };
        let acceptable = match verdict.trim().to_lowercase().as_str() {
            "y" | "yes" => true,
            "n" | "no" => false,
            _ => return Ok(Judgment::Skipped),
        };

        write!(self.output, "Feedback (blank for none): ")?;
        self.output.flush()?;
        let feedback = self.read_line()?.unwrap_or_default().trim().to_string();

        Ok(Judgment::Captured(Annotation {
            query_id: query_id.to_string(),
            acceptable,
            feedback,
            source: "human".to_string(),
        }))
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let read = self.input.read_line(&mut line)?;
        if read == 0 {
            Ok(None)
        } else {
            Ok(Some(line))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FoldPhase, FoldResult, ResultKind};
    use uuid::Uuid;

    fn sample() -> EvalSample {
        EvalSample::from_yaml_str(
            r#"
sample_id: s1
skill_type: structured_extraction
bootstrap:
  prompt: "Extract."
queries:
  - id: q01
    text: "first"
    expected:
      output_contains: ["alpha"]
  - id: q02
    text: "second"
"#,
        )
        .expect("sample parses")
    }

    fn result_with_outputs() -> BootstrapResult {
        BootstrapResult {
            kind: ResultKind::Bootstrap,
            run_id: Uuid::new_v4(),
            sample_id: "s1".to_string(),
            program_path: String::new(),
            program_code: String::new(),
            program_digest: String::new(),
            query_results: vec![
                QueryResult {
                    query_id: "q01".to_string(),
                    orchestrated_input: None,
                    raw_output: "alpha beta".to_string(),
                    error: None,
                    run_start: None,
                    run_end: None,
                },
                QueryResult {
                    query_id: "q02".to_string(),
                    orchestrated_input: None,
                    raw_output: "gamma".to_string(),
                    error: None,
                    run_start: None,
                    run_end: None,
                },
            ],
            annotations: Vec::new(),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_apply_rules_annotates_all_pending() {
        let sample = sample();
        let mut result = result_with_outputs();
        let added = apply_rules(&sample, &mut result);
        assert_eq!(added, 2);
        assert!(result.annotation("q01").map(|a| a.acceptable).unwrap_or(false));
        assert_eq!(result.annotation("q01").map(|a| a.source.as_str()), Some("rules"));
    }

    #[test]
    fn test_session_records_verdicts_and_feedback() {
        let sample = sample();
        let mut result = result_with_outputs();
        let input = b"y\n\nn\nmissing detail\n" as &[u8];
        let mut output = Vec::new();
        let mut persisted = 0usize;
        let added = AnnotationSession::new(input, &mut output)
            .run(Some(&sample), &mut result, |r| {
                persisted = r.annotations.len();
                Ok(())
            })
            .expect("session");
        assert_eq!(added, 2);
        assert_eq!(persisted, 2);
        let q02 = result.annotation("q02").expect("q02 annotated");
        assert!(!q02.acceptable);
        assert_eq!(q02.feedback, "missing detail");
        assert_eq!(q02.source, "human");

        let transcript = String::from_utf8(output).expect("utf8");
        assert!(transcript.contains("=== q01 ==="));
        assert!(transcript.contains("Annotated 2 result(s)."));
    }

    #[test]
    fn test_session_skip_leaves_query_unannotated() {
        let sample = sample();
        let mut result = result_with_outputs();
        let input = b"s\ny\n\n" as &[u8];
        let mut output = Vec::new();
        let added = AnnotationSession::new(input, &mut output)
            .run(Some(&sample), &mut result, |_| Ok(()))
            .expect("session");
        assert_eq!(added, 1);
        assert!(result.annotation("q01").is_none());
        assert!(result.annotation("q02").is_some());
    }

    fn fold(index: usize, query_id: &str, annotation: Option<Annotation>) -> FoldResult {
        FoldResult {
            fold_index: index,
            held_out_query_id: query_id.to_string(),
            program_code: String::new(),
            program_digest: String::new(),
            phase: FoldPhase::Running,
            query_result: QueryResult {
                query_id: query_id.to_string(),
                raw_output: "fold output".to_string(),
                ..QueryResult::default()
            },
            annotation,
            outcome: None,
            skipped: false,
        }
    }

    #[test]
    fn test_iteration_session_annotates_pending_folds() {
        let sample = sample();
        let mut result = IterationResult::new("s1");
        result.folds.push(fold(
            0,
            "q01",
            Some(Annotation {
                query_id: "q01".to_string(),
                acceptable: true,
                feedback: String::new(),
                source: "rules".to_string(),
            }),
        ));
        result.folds.push(fold(1, "q02", None));

        let input = b"n\nwrong slot\n" as &[u8];
        let mut output = Vec::new();
        let mut persisted = 0usize;
        let added = AnnotationSession::new(input, &mut output)
            .run_iteration(Some(&sample), &mut result, |_| {
                persisted += 1;
                Ok(())
            })
            .expect("session");

        assert_eq!(added, 1);
        assert_eq!(persisted, 1);
        let q02 = result.folds[1].annotation.as_ref().expect("q02 annotated");
        assert!(!q02.acceptable);
        assert_eq!(q02.feedback, "wrong slot");
        assert_eq!(q02.source, "human");
        // The already-annotated fold is never re-prompted.
        assert_eq!(result.folds[0].annotation.as_ref().map(|a| a.source.as_str()), Some("rules"));
        let transcript = String::from_utf8(output).expect("utf8");
        assert!(!transcript.contains("=== q01 ==="));
        assert!(transcript.contains("Annotated 1 fold(s)."));
    }

    #[test]
    fn test_session_ends_on_eof() {
        let sample = sample();
        let mut result = result_with_outputs();
        let input = b"" as &[u8];
        let mut output = Vec::new();
        let added = AnnotationSession::new(input, &mut output)
            .run(Some(&sample), &mut result, |_| Ok(()))
            .expect("session");
        assert_eq!(added, 0);
        assert!(result.annotations.is_empty());
    }
}
