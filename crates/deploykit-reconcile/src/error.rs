//! Crate-level error type for `deploykit-reconcile`.
//!
//! Unlike composition, reconciliation failures are raised. API failures
//! surface the server's structured message when the response body is
//! JSON-decodable, otherwise the raw body text.

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReconcileError {
    /// The API server rejected a request. `message` is the decoded
    /// `Status.message` when available, else the raw response body.
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Transport-level failure before any server response.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Cluster configuration could not be loaded.
    #[error("config error: {0}")]
    Config(#[from] ::config::ConfigError),

    /// Requested patch operation is not in the registry.
    #[error("unknown patch operation '{0}'")]
    UnknownOperation(String),

    /// The operation exists but is not permitted for the target kind.
    #[error("operation '{op}' is not allowed for kind '{kind}'")]
    KindNotAllowed { op: String, kind: String },

    /// The operation's input payload is malformed.
    #[error("invalid data for operation '{op}': {reason}")]
    InvalidOperationData { op: String, reason: String },

    /// The live object required by a read-modify-write was not found.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// A desired manifest is missing identity fields (apiVersion, kind,
    /// metadata.name).
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
}

impl ReconcileError {
    /// Build an [`ReconcileError::Api`] from a response body, preferring
    /// the structured `message` field of a Kubernetes `Status` object.
    pub fn from_api_response(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
            .unwrap_or_else(|| body.to_string());
        Self::Api { status, message }
    }
}

/// Convenience result alias for reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_status_message_is_preferred() {
        let body = r#"{"kind":"Status","message":"deployments.apps \"api\" not found","code":404}"#;
        let err = ReconcileError::from_api_response(404, body);
        match err {
            ReconcileError::Api { status, message } => {
                assert_eq!(status, 404);
                assert!(message.contains("not found"));
                assert!(!message.contains("kind"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn undecodable_body_falls_back_to_raw_text() {
        let err = ReconcileError::from_api_response(500, "<html>Internal Error</html>");
        match err {
            ReconcileError::Api { message, .. } => assert!(message.contains("<html>")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn kind_not_allowed_names_both_parties() {
        let err = ReconcileError::KindNotAllowed {
            op: "set_service_type".to_string(),
            kind: "Deployment".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("set_service_type"));
        assert!(text.contains("Deployment"));
    }
}
