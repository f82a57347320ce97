//! Content digests for generated program artifacts.

use sha2::{Digest, Sha256};

/// SHA-256 hex digest of program source, stored alongside each result so
/// artifacts on disk can be matched to the run that produced them.
pub fn program_digest(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}
