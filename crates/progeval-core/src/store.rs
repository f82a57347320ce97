//! Result persistence.
//!
//! Results are JSON files carrying an explicit `kind` discriminant so a
//! bootstrap file handed to the iteration loader (or vice versa) fails with
//! a named error instead of a shape mismatch deep in deserialization.
//! Files written before the discriminant existed are still accepted: their
//! kind is inferred from the presence of a `folds` array, with a warning.

use std::fs;
use std::path::Path;

use chrono::Utc;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::digest::program_digest;
use crate::domain::{BootstrapResult, HarnessError, IterationResult, Result, ResultKind};

/// Save a bootstrap result as pretty-printed JSON.
pub fn save_bootstrap(result: &BootstrapResult, path: &Path) -> Result<()> {
    write_json(path, &serde_json::to_value(result)?)
}

/// Save an iteration result as pretty-printed JSON.
pub fn save_iteration(result: &IterationResult, path: &Path) -> Result<()> {
    write_json(path, &serde_json::to_value(result)?)
}

/// Load a bootstrap result, rejecting files of any other kind.
pub fn load_bootstrap(path: &Path) -> Result<BootstrapResult> {
    let value = read_kinded(path, ResultKind::Bootstrap)?;
    Ok(serde_json::from_value(value)?)
}

/// Load an iteration result, rejecting files of any other kind.
pub fn load_iteration(path: &Path) -> Result<IterationResult> {
    let value = read_kinded(path, ResultKind::Iteration)?;
    Ok(serde_json::from_value(value)?)
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

/// Read a result file and verify its kind, upgrading legacy files in place
/// in memory (never on disk).
fn read_kinded(path: &Path, expected: ResultKind) -> Result<Value> {
    let text = fs::read_to_string(path)?;
    let mut value: Value = serde_json::from_str(&text)?;

    let actual = match value.get("kind").and_then(Value::as_str) {
        Some(kind) => serde_json::from_value::<ResultKind>(Value::String(kind.to_string()))
            .map_err(|_| HarnessError::ResultKindMismatch {
                path: path.display().to_string(),
                expected: expected.to_string(),
                actual: kind.to_string(),
            })?,
        None => {
            let inferred = if value.get("folds").is_some() {
                ResultKind::Iteration
            } else {
                ResultKind::Bootstrap
            };
            warn!(
                path = %path.display(),
                inferred_kind = %inferred,
                "result file has no kind field, inferring from shape"
            );
            upgrade_legacy(&mut value, inferred);
            inferred
        }
    };

    if actual != expected {
        return Err(HarnessError::ResultKindMismatch {
            path: path.display().to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(value)
}

/// Fill in the fields legacy files predate.
fn upgrade_legacy(value: &mut Value, kind: ResultKind) {
    let Some(object) = value.as_object_mut() else {
        return;
    };
    object.insert("kind".to_string(), serde_json::json!(kind));
    object
        .entry("run_id")
        .or_insert_with(|| serde_json::json!(Uuid::new_v4()));
    object
        .entry("created_at")
        .or_insert_with(|| serde_json::json!(Utc::now()));
    if kind == ResultKind::Bootstrap {
        let digest = object
            .get("program_code")
            .and_then(Value::as_str)
            .map(program_digest)
            .unwrap_or_default();
        object
            .entry("program_digest")
            .or_insert_with(|| serde_json::json!(digest));
    }
}
