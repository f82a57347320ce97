//! Structured observability hooks for eval run lifecycle events.
//!
//! This module provides:
//! - Run-scoped tracing spans via `RunSpan` RAII guard
//! - Emission functions for key lifecycle events: generation, validation,
//!   query runs, folds, reporting
//!
//! Events are emitted at `info!` level (configurable via `PROGEVAL_LOG` env
//! var). For JSON output, set `PROGEVAL_LOG_FORMAT=json`.

use tracing::{info, warn};

/// RAII guard that enters a run-scoped tracing span for the duration of a run.
///
/// # Example
///
/// ```ignore
/// let _span = RunSpan::enter("run-12345");
/// // All tracing calls are now associated with run_id = "run-12345"
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a span tagged with the run_id.
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("progeval.run", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: bootstrap run started for a sample.
pub fn emit_bootstrap_started(run_id: &str, sample_id: &str, query_count: usize) {
    info!(
        event = "bootstrap.started",
        run_id = %run_id,
        sample_id = %sample_id,
        query_count = query_count,
    );
}

/// Emit event: program generated and written to disk.
pub fn emit_program_generated(run_id: &str, program_path: &str, digest: &str) {
    info!(
        event = "program.generated",
        run_id = %run_id,
        program_path = %program_path,
        digest = %digest,
    );
}

/// Emit event: contract validation failed (warning level).
pub fn emit_validation_failed(run_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "program.validation_failed", run_id = %run_id, error = %error);
}

/// Emit event: one query run finished.
pub fn emit_query_finished(run_id: &str, query_id: &str, success: bool) {
    info!(
        event = "query.finished",
        run_id = %run_id,
        query_id = %query_id,
        success = success,
    );
}

/// Emit event: a fold started with its held-out query.
pub fn emit_fold_started(run_id: &str, fold_index: usize, held_out_query_id: &str) {
    info!(
        event = "fold.started",
        run_id = %run_id,
        fold_index = fold_index,
        held_out_query_id = %held_out_query_id,
    );
}

/// Emit event: a fold finished with its outcome (or was skipped).
pub fn emit_fold_finished(run_id: &str, fold_index: usize, outcome: &str, skipped: bool) {
    info!(
        event = "fold.finished",
        run_id = %run_id,
        fold_index = fold_index,
        outcome = %outcome,
        skipped = skipped,
    );
}

/// Emit event: results persisted.
pub fn emit_results_saved(run_id: &str, path: &str) {
    info!(event = "results.saved", run_id = %run_id, path = %path);
}
