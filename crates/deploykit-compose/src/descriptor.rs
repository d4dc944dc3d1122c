//! Deployment descriptors and runtime overrides.
//!
//! A descriptor is the durable record owned by the external configuration
//! store; this crate only reads it. Profile references are join rows that
//! may override the referenced profile's own default order and priority.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One profile reference on a deployment descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileMapping {
    pub profile_id: String,
    /// Primary sort key for this deployment (overrides the profile's own
    /// default).
    #[serde(default)]
    pub composition_order: i32,
    /// Secondary sort key; higher merges earlier within the same order.
    #[serde(default)]
    pub merge_priority: i32,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl ProfileMapping {
    pub fn new(profile_id: impl Into<String>) -> Self {
        Self {
            profile_id: profile_id.into(),
            composition_order: 0,
            merge_priority: 0,
            enabled: true,
        }
    }

    pub fn with_order(mut self, composition_order: i32, merge_priority: i32) -> Self {
        self.composition_order = composition_order;
        self.merge_priority = merge_priority;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Base identity of a deployment plus its ordered profile references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentDescriptor {
    pub name: String,
    pub namespace: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default = "default_replicas")]
    pub replicas: i64,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub container_refs: Vec<ProfileMapping>,
    #[serde(default)]
    pub volume_refs: Vec<ProfileMapping>,
    #[serde(default)]
    pub scheduling_refs: Vec<ProfileMapping>,
}

fn default_api_version() -> String {
    "apps/v1".to_string()
}

fn default_kind() -> String {
    "Deployment".to_string()
}

fn default_replicas() -> i64 {
    1
}

impl DeploymentDescriptor {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            api_version: default_api_version(),
            kind: default_kind(),
            replicas: default_replicas(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            container_refs: Vec::new(),
            volume_refs: Vec::new(),
            scheduling_refs: Vec::new(),
        }
    }
}

/// Late overrides applied after composition and validation, at release
/// time: target images per container name, extra environment variables
/// merged by name, and a replica-count override.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeOverrides {
    /// container name → image reference. An empty-string key substitutes
    /// the image of every container.
    #[serde(default)]
    pub images: BTreeMap<String, String>,
    /// Environment variables merged into every container; an existing
    /// variable with the same name is overwritten.
    #[serde(default)]
    pub env: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i64>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl RuntimeOverrides {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
            && self.env.is_empty()
            && self.replicas.is_none()
            && self.labels.is_empty()
            && self.annotations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_defaults_to_apps_v1_deployment() {
        let d = DeploymentDescriptor::new("api", "prod");
        assert_eq!(d.api_version, "apps/v1");
        assert_eq!(d.kind, "Deployment");
        assert_eq!(d.replicas, 1);
    }

    #[test]
    fn mapping_deserializes_with_defaults() {
        let m: ProfileMapping = serde_json::from_str(r#"{"profile_id": "p1"}"#).unwrap();
        assert!(m.enabled);
        assert_eq!(m.composition_order, 0);
    }

    #[test]
    fn empty_overrides_report_empty() {
        assert!(RuntimeOverrides::default().is_empty());
        let with_replicas = RuntimeOverrides { replicas: Some(3), ..Default::default() };
        assert!(!with_replicas.is_empty());
    }
}
