//! Crate-level error type for `deploykit-manifest`.

use thiserror::Error;

/// Errors produced while manipulating manifest trees.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ManifestError {
    /// A path walked into a node of the wrong shape (e.g. expected an
    /// object, found a scalar).
    #[error("unexpected node at '{path}': expected {expected}")]
    UnexpectedShape { path: String, expected: &'static str },
}

/// Convenience result alias for manifest operations.
pub type ManifestResult<T> = Result<T, ManifestError>;
