//! Cluster connection configuration.
//!
//! Loaded from an optional config file (TOML/YAML/JSON, format detected
//! from the extension) overlaid with `DEPLOYKIT_*` environment variables,
//! the environment winning. A missing file with a full environment is
//! valid; a bare `ClusterConfig::new(url)` works for tests.

use crate::error::ReconcileResult;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_timeout_secs() -> u64 {
    30
}

/// Connection settings for one API server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Base URL of the API server, e.g. `https://10.0.0.1:6443`.
    pub api_server: String,
    /// Bearer token; `None` relies on ambient transport auth.
    #[serde(default)]
    pub token: Option<String>,
    /// Accept self-signed certificates (lab clusters).
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ClusterConfig {
    pub fn new(api_server: impl Into<String>) -> Self {
        Self {
            api_server: api_server.into(),
            token: None,
            insecure_skip_tls_verify: false,
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Load from `path` (optional) overlaid with `DEPLOYKIT_*` environment
    /// variables, e.g. `DEPLOYKIT_API_SERVER`, `DEPLOYKIT_TOKEN`.
    pub fn load(path: Option<&Path>) -> ReconcileResult<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let settings = builder
            .add_source(Environment::with_prefix("DEPLOYKIT"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn loads_from_toml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cluster.toml");
        fs::write(&path, "api_server = \"https://10.0.0.1:6443\"\ntimeout_secs = 5\n").unwrap();

        let cfg = ClusterConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.api_server, "https://10.0.0.1:6443");
        assert_eq!(cfg.timeout_secs, 5);
        assert!(cfg.token.is_none());
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cluster.yaml");
        fs::write(&path, "api_server: https://localhost:6443\n").unwrap();

        let cfg = ClusterConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.timeout_secs, 30);
        assert!(!cfg.insecure_skip_tls_verify);
    }

    #[test]
    fn environment_overlay_wins_over_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cluster.toml");
        fs::write(&path, "api_server = \"https://from-file:6443\"\n").unwrap();

        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("DEPLOYKIT_API_SERVER", "https://from-env:6443") };
        let cfg = ClusterConfig::load(Some(&path)).unwrap();
        unsafe { std::env::remove_var("DEPLOYKIT_API_SERVER") };

        assert_eq!(cfg.api_server, "https://from-env:6443");
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cluster.toml");
        fs::write(&path, "timeout_secs = 5\n").unwrap();

        assert!(ClusterConfig::load(Some(&path)).is_err());
    }
}
