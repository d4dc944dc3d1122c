//! Resource identity: the (apiVersion, kind, namespace, name) tuple that
//! locates a live object in a cluster.
//!
//! The reconciliation engine requires an identity to be fully resolved
//! before any create/patch/delete call; this type is the proof of that.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fully-resolved coordinates of one cluster object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentity {
    /// `group/version` for grouped APIs, bare `version` for the core group
    /// (e.g. `apps/v1`, `v1`).
    pub api_version: String,
    pub kind: String,
    /// `None` for cluster-scoped resources.
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceIdentity {
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: Option<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace,
            name: name.into(),
        }
    }

    /// Build an identity from a manifest's own `apiVersion`/`kind`/
    /// `metadata.name`/`metadata.namespace` fields. Returns `None` when any
    /// required field is missing.
    pub fn from_manifest(manifest: &serde_json::Value) -> Option<Self> {
        let api_version = manifest.get("apiVersion")?.as_str()?.to_string();
        let kind = manifest.get("kind")?.as_str()?.to_string();
        let metadata = manifest.get("metadata")?;
        let name = metadata.get("name")?.as_str()?.to_string();
        let namespace = metadata
            .get("namespace")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        Some(Self { api_version, kind, namespace, name })
    }

    /// Split `api_version` into `(group, version)`. The core group yields
    /// an empty group string.
    pub fn group_version(&self) -> (&str, &str) {
        match self.api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", &self.api_version),
        }
    }

    /// Request path prefix for this identity's API group, e.g.
    /// `/apis/apps/v1` or `/api/v1` for the core group.
    pub fn api_prefix(&self) -> String {
        let (group, version) = self.group_version();
        if group.is_empty() {
            format!("/api/{version}")
        } else {
            format!("/apis/{group}/{version}")
        }
    }

    /// Collection path for this identity given the resource's plural name,
    /// e.g. `/apis/apps/v1/namespaces/prod/deployments`.
    pub fn collection_path(&self, plural: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/namespaces/{}/{}", self.api_prefix(), ns, plural),
            None => format!("{}/{}", self.api_prefix(), plural),
        }
    }

    /// Object path for this identity given the resource's plural name.
    pub fn object_path(&self, plural: &str) -> String {
        format!("{}/{}", self.collection_path(plural), self.name)
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{} {}/{}", self.api_version, self.kind, ns, self.name),
            None => write!(f, "{}/{} {}", self.api_version, self.kind, self.name),
        }
    }
}
