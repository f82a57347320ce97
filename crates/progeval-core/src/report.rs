//! Report assembly over annotated bootstrap and iteration results.
//!
//! Reporting is a pure read: it never mutates result files, so re-running
//! it over the same inputs produces the same report.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    BootstrapResult, EvalSample, FoldOutcome, HarnessError, IterationResult, Result,
};
use crate::iteration::classify_fold;

/// Name of the report file inside the output directory.
pub const REPORT_FILE: &str = "report.json";

/// Pass counts for one slice of queries.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PassStats {
    pub passed: usize,
    pub total: usize,
}

impl PassStats {
    fn record(&mut self, acceptable: bool) {
        self.total += 1;
        if acceptable {
            self.passed += 1;
        }
    }
}

/// Pass counts grouped by the sample's query dimensions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DimensionStats {
    pub specificity: String,
    pub professionalism: String,
    #[serde(flatten)]
    pub stats: PassStats,
}

/// The assembled report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub sample_id: String,
    pub skill_type: String,
    pub generated_at: DateTime<Utc>,

    /// Pass stats over annotated bootstrap queries.
    pub initial: PassStats,

    /// Pass stats over annotated iteration folds, absent without an
    /// iteration run.
    pub post_loo: Option<PassStats>,

    pub fixed: usize,
    pub regressed: usize,
    pub unchanged: usize,

    pub dimensions: Vec<DimensionStats>,
}

/// Format a pass rate, or `n/a` when nothing was annotated.
pub fn pct(stats: PassStats) -> String {
    if stats.total == 0 {
        "n/a".to_string()
    } else {
        format!("{:.1}%", 100.0 * stats.passed as f64 / stats.total as f64)
    }
}

/// Assemble a report from the bootstrap result and an optional iteration
/// result for the same sample. The sample itself is optional; without it
/// the per-dimension breakdown is omitted.
pub fn build_report(
    sample: Option<&EvalSample>,
    bootstrap: &BootstrapResult,
    iteration: Option<&IterationResult>,
) -> Result<Report> {
    if let Some(sample) = sample {
        if bootstrap.sample_id != sample.sample_id {
            return Err(HarnessError::InvalidSample(format!(
                "bootstrap result is for sample {:?}, not {:?}",
                bootstrap.sample_id, sample.sample_id
            )));
        }
    }

    let mut initial = PassStats::default();
    let mut by_dimension: BTreeMap<(String, String), PassStats> = BTreeMap::new();
    for annotation in &bootstrap.annotations {
        initial.record(annotation.acceptable);
        let Some(query) = sample.and_then(|s| s.query(&annotation.query_id)) else {
            continue;
        };
        by_dimension
            .entry((query.specificity.clone(), query.professionalism.clone()))
            .or_default()
            .record(annotation.acceptable);
    }

    let mut post_loo = None;
    let mut fixed = 0;
    let mut regressed = 0;
    let mut unchanged = 0;
    if let Some(iteration) = iteration {
        if iteration.sample_id != bootstrap.sample_id {
            return Err(HarnessError::InvalidSample(format!(
                "iteration result is for sample {:?}, not {:?}",
                iteration.sample_id, bootstrap.sample_id
            )));
        }
        let mut stats = PassStats::default();
        for fold in &iteration.folds {
            let Some(annotation) = &fold.annotation else {
                continue;
            };
            stats.record(annotation.acceptable);
            let outcome = fold.outcome.or_else(|| {
                bootstrap
                    .annotation(&fold.held_out_query_id)
                    .map(|baseline| classify_fold(baseline.acceptable, annotation.acceptable))
            });
            match outcome {
                Some(FoldOutcome::Fixed) => fixed += 1,
                Some(FoldOutcome::Regressed) => regressed += 1,
                Some(FoldOutcome::Unchanged) => unchanged += 1,
                None => {}
            }
        }
        post_loo = Some(stats);
    }

    Ok(Report {
        sample_id: bootstrap.sample_id.clone(),
        skill_type: sample.map(|s| s.skill_type.clone()).unwrap_or_default(),
        generated_at: Utc::now(),
        initial,
        post_loo,
        fixed,
        regressed,
        unchanged,
        dimensions: by_dimension
            .into_iter()
            .map(|((specificity, professionalism), stats)| DimensionStats {
                specificity,
                professionalism,
                stats,
            })
            .collect(),
    })
}

impl Report {
    /// Human-readable summary for the terminal.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.skill_type.is_empty() {
            out.push_str(&format!("Sample: {}\n", self.sample_id));
        } else {
            out.push_str(&format!("Sample: {} ({})\n", self.sample_id, self.skill_type));
        }
        out.push_str(&format!(
            "Initial pass rate: {} ({}/{})\n",
            pct(self.initial),
            self.initial.passed,
            self.initial.total
        ));
        match self.post_loo {
            Some(stats) => {
                out.push_str(&format!(
                    "Post-LOO pass rate: {} ({}/{})\n",
                    pct(stats),
                    stats.passed,
                    stats.total
                ));
                out.push_str(&format!(
                    "Fixed: {}  Regressed: {}  Unchanged: {}\n",
                    self.fixed, self.regressed, self.unchanged
                ));
            }
            None => out.push_str("Post-LOO pass rate: n/a (no iteration run)\n"),
        }
        if !self.dimensions.is_empty() {
            out.push_str("By dimension:\n");
            for dim in &self.dimensions {
                out.push_str(&format!(
                    "  specificity={} professionalism={}: {} ({}/{})\n",
                    display_dim(&dim.specificity),
                    display_dim(&dim.professionalism),
                    pct(dim.stats),
                    dim.stats.passed,
                    dim.stats.total
                ));
            }
        }
        out
    }

    /// Write the report as JSON next to the result files.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

fn display_dim(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Annotation, FoldPhase, FoldResult, QueryResult, ResultKind};
    use uuid::Uuid;

    fn sample() -> EvalSample {
        EvalSample::from_yaml_str(
            r#"
sample_id: s1
skill_type: booking_agent
bootstrap:
  prompt: "Book appointments."
queries:
  - id: q01
    text: "vague ask"
    specificity: low
    professionalism: high
  - id: q02
    text: "precise ask"
    specificity: high
    professionalism: high
"#,
        )
        .expect("sample parses")
    }

    fn bootstrap(annotations: Vec<Annotation>) -> BootstrapResult {
        BootstrapResult {
            kind: ResultKind::Bootstrap,
            run_id: Uuid::new_v4(),
            sample_id: "s1".to_string(),
            program_path: String::new(),
            program_code: String::new(),
            program_digest: String::new(),
            query_results: Vec::new(),
            annotations,
            created_at: Utc::now(),
        }
    }

    fn ann(query_id: &str, acceptable: bool) -> Annotation {
        Annotation {
            query_id: query_id.to_string(),
            acceptable,
            feedback: String::new(),
            source: "human".to_string(),
        }
    }

    #[test]
    fn test_pct_zero_denominator_is_na() {
        assert_eq!(pct(PassStats::default()), "n/a");
        assert_eq!(pct(PassStats { passed: 1, total: 2 }), "50.0%");
    }

    #[test]
    fn test_report_without_iteration() {
        let sample = sample();
        let report = build_report(
            Some(&sample),
            &bootstrap(vec![ann("q01", true), ann("q02", false)]),
            None,
        )
        .expect("report");
        assert_eq!(report.initial, PassStats { passed: 1, total: 2 });
        assert!(report.post_loo.is_none());
        assert_eq!(report.fixed, 0);
        assert!(report.render().contains("no iteration run"));
    }

    #[test]
    fn test_report_without_sample_omits_dimensions() {
        let report = build_report(None, &bootstrap(vec![ann("q01", true)]), None)
            .expect("report");
        assert_eq!(report.sample_id, "s1");
        assert!(report.skill_type.is_empty());
        assert!(report.dimensions.is_empty());
        assert!(report.render().starts_with("Sample: s1\n"));
    }

    #[test]
    fn test_report_counts_fixed_and_regressed() {
        let boot = bootstrap(vec![ann("q01", false), ann("q02", true)]);
        let mut iteration = IterationResult::new("s1");
        iteration.folds = vec![
            FoldResult {
                fold_index: 0,
                held_out_query_id: "q01".to_string(),
                program_code: String::new(),
                program_digest: String::new(),
                phase: FoldPhase::Scored,
                query_result: QueryResult::failed("q01", ""),
                annotation: Some(ann("q01", true)),
                outcome: None,
                skipped: false,
            },
            FoldResult {
                fold_index: 1,
                held_out_query_id: "q02".to_string(),
                program_code: String::new(),
                program_digest: String::new(),
                phase: FoldPhase::Scored,
                query_result: QueryResult::failed("q02", ""),
                annotation: Some(ann("q02", false)),
                outcome: None,
                skipped: false,
            },
        ];

        let sample = sample();
        let report = build_report(Some(&sample), &boot, Some(&iteration)).expect("report");
        assert_eq!(report.fixed, 1);
        assert_eq!(report.regressed, 1);
        assert_eq!(report.post_loo, Some(PassStats { passed: 1, total: 2 }));
    }

    #[test]
    fn test_report_dimension_breakdown() {
        let sample = sample();
        let report = build_report(
            Some(&sample),
            &bootstrap(vec![ann("q01", false), ann("q02", true)]),
            None,
        )
        .expect("report");
        assert_eq!(report.dimensions.len(), 2);
        let low = report
            .dimensions
            .iter()
            .find(|d| d.specificity == "low")
            .expect("low slice");
        assert_eq!(low.stats, PassStats { passed: 0, total: 1 });
    }

    #[test]
    fn test_report_rejects_mismatched_sample() {
        let sample = sample();
        let mut boot = bootstrap(vec![]);
        boot.sample_id = "other".to_string();
        assert!(build_report(Some(&sample), &boot, None).is_err());
    }
}
