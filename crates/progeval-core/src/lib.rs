//! Progeval Core Library
//!
//! Domain types and workflows for bootstrapping, evaluating, and iterating
//! generated LLM programs against annotated query samples.

pub mod annotate;
pub mod bootstrap;
pub mod digest;
pub mod domain;
pub mod generator;
pub mod iteration;
pub mod obs;
pub mod program;
pub mod report;
pub mod scoring;
pub mod store;
pub mod telemetry;

pub use domain::{
    Annotation, Bootstrap, BootstrapResult, EvalQuery, EvalSample, FoldOutcome, FoldPhase,
    FoldResult, HarnessError, IterationResult, QueryExpected, QueryResult, Result, ResultKind,
    SampleMetadata, TestState,
};

pub use annotate::{apply_rules, AnnotationSession};
pub use bootstrap::{BootstrapConfig, BootstrapPipeline, Orchestration};
pub use digest::program_digest;
pub use generator::{
    GenerateRequest, GeneratedProgram, ImproveRequest, ProgramGenerator, DEFAULT_MODEL,
};
pub use iteration::{classify_fold, IterationConfig, IterationPipeline, TrainingSet};
pub use program::{build_input, input_field, ExecConfig, ProgramOutput, ProgramRunner};
pub use report::{build_report, pct, DimensionStats, PassStats, Report};
pub use scoring::score_result;
pub use store::{load_bootstrap, load_iteration, save_bootstrap, save_iteration};

pub use obs::{
    emit_bootstrap_started, emit_fold_finished, emit_fold_started, emit_program_generated,
    emit_query_finished, emit_results_saved, emit_validation_failed, RunSpan,
};
pub use telemetry::init_tracing;

/// Progeval version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
