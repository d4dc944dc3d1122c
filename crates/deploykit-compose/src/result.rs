//! Composition results.
//!
//! One immutable value per composition call. Failures are carried in
//! `errors` with `success == false`; callers branch on the flag rather
//! than catching anything.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Summary metadata attached to every composition result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionMetadata {
    /// `"composed"` on success, `"failed"` otherwise.
    pub status: String,
    /// Number of fragments that entered the merge phase.
    pub fragment_count: usize,
    /// Distinct fragment kinds, in first-seen order.
    pub fragment_types: Vec<String>,
}

/// Outcome of one composition call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionResult {
    pub success: bool,
    pub composed_manifest: Option<Value>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub metadata: CompositionMetadata,
    pub elapsed_ms: u64,
}

impl CompositionResult {
    /// A failed result carrying `errors` and no manifest.
    pub fn failure(errors: Vec<String>, fragment_count: usize, elapsed_ms: u64) -> Self {
        Self {
            success: false,
            composed_manifest: None,
            errors,
            warnings: Vec::new(),
            metadata: CompositionMetadata {
                status: "failed".to_string(),
                fragment_count,
                fragment_types: Vec::new(),
            },
            elapsed_ms,
        }
    }
}
