//! Domain types: eval samples, query results, annotations, folds.

pub mod error;
pub mod result;
pub mod sample;

pub use error::{HarnessError, Result};
pub use result::{
    Annotation, BootstrapResult, FoldOutcome, FoldPhase, FoldResult, IterationResult, QueryResult,
    ResultKind,
};
pub use sample::{Bootstrap, EvalQuery, EvalSample, QueryExpected, SampleMetadata, TestState};
