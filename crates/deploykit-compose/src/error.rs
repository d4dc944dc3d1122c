//! Crate-level error type for `deploykit-compose`.
//!
//! Most composition failures are collected into
//! [`crate::CompositionResult::errors`] as strings instead of being
//! raised; this enum covers the paths that do return `Result`, chiefly
//! profile rendering and the profile source seam.

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ComposeError {
    /// A profile's cached rendering could not be parsed.
    #[error("invalid rendered content for profile '{profile}': {reason}")]
    InvalidRendering { profile: String, reason: String },

    /// A JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The external profile store failed to resolve a profile reference.
    #[error("profile source error for '{profile_id}': {reason}")]
    Source { profile_id: String, reason: String },
}

/// Convenience result alias for composition operations.
pub type ComposeResult<T> = Result<T, ComposeError>;
