//! Profile bodies and the fragment compiler.
//!
//! A profile is a reusable, independently stored configuration unit. The
//! compiler renders one profile into a [`Fragment`] whose content is
//! either the profile's own cached rendering (YAML or JSON text) or a
//! freshly serialized sub-tree built from well-known fields. Absent
//! optional fields are simply omitted, never an error.

use crate::error::{ComposeError, ComposeResult};
use crate::fragment::{Fragment, MergeStrategy, ProfileKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

/// A container profile: image, ports, mounts, environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerProfile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<Value>,
    /// Arbitrary extra container fields (command, args, securityContext…).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// Cached rendering; preferred over field-by-field assembly when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered: Option<String>,
}

/// A volume profile: one volume, or a list of volumes, as structured data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolumeProfile {
    pub name: String,
    /// Volume source configuration (emptyDir, configMap, pvc, …).
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered: Option<String>,
}

/// A scheduling profile: node selection, affinity, tolerations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulingProfile {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered: Option<String>,
}

/// Any other profile kind (resource limits, probes, lifecycle hooks,
/// arbitrary pod-spec additions). The kind tag routes deep merges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenericProfile {
    /// Routing tag, e.g. `resource`, `probe`, `lifecycle`.
    pub kind_tag: String,
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered: Option<String>,
}

/// Renders profiles into fragments. Stateless.
#[derive(Debug, Clone, Copy, Default)]
pub struct FragmentCompiler;

impl FragmentCompiler {
    pub fn new() -> Self {
        Self
    }

    /// Render a container profile. Only fields the profile actually
    /// carries end up in the fragment content.
    pub fn compile_container(
        &self,
        profile_id: &str,
        profile_name: &str,
        profile: &ContainerProfile,
    ) -> ComposeResult<Fragment> {
        let content = match &profile.rendered {
            Some(text) => parse_rendered(profile_name, text)?,
            None => {
                let mut body = Map::new();
                body.insert("name".to_string(), json!(profile.name));
                if let Some(image) = &profile.image {
                    body.insert("image".to_string(), json!(image));
                }
                if !profile.ports.is_empty() {
                    body.insert("ports".to_string(), Value::Array(profile.ports.clone()));
                }
                if !profile.volume_mounts.is_empty() {
                    body.insert(
                        "volumeMounts".to_string(),
                        Value::Array(profile.volume_mounts.clone()),
                    );
                }
                if !profile.env.is_empty() {
                    body.insert("env".to_string(), Value::Array(profile.env.clone()));
                }
                for (key, value) in &profile.extra {
                    body.insert(key.clone(), value.clone());
                }
                Value::Object(body)
            }
        };
        Ok(Fragment::new(
            profile_id,
            profile_name,
            ProfileKind::Container,
            content,
            MergeStrategy::Append,
        ))
    }

    /// Render a volume profile into a `{name, <source>}` volume entry.
    pub fn compile_volume(
        &self,
        profile_id: &str,
        profile_name: &str,
        profile: &VolumeProfile,
    ) -> ComposeResult<Fragment> {
        let content = match &profile.rendered {
            Some(text) => parse_rendered(profile_name, text)?,
            None => {
                let mut body = Map::new();
                body.insert("name".to_string(), json!(profile.name));
                for (key, value) in &profile.config {
                    body.insert(key.clone(), value.clone());
                }
                Value::Object(body)
            }
        };
        Ok(Fragment::new(
            profile_id,
            profile_name,
            ProfileKind::Volume,
            content,
            MergeStrategy::Append,
        ))
    }

    /// Render a scheduling profile into a pod-spec sub-tree carrying only
    /// the populated scheduling fields.
    pub fn compile_scheduling(
        &self,
        profile_id: &str,
        profile_name: &str,
        profile: &SchedulingProfile,
    ) -> ComposeResult<Fragment> {
        let content = match &profile.rendered {
            Some(text) => parse_rendered(profile_name, text)?,
            None => {
                let mut body = Map::new();
                if !profile.node_selector.is_empty() {
                    body.insert("nodeSelector".to_string(), json!(profile.node_selector));
                }
                if let Some(affinity) = &profile.affinity {
                    body.insert("affinity".to_string(), affinity.clone());
                }
                if !profile.tolerations.is_empty() {
                    body.insert(
                        "tolerations".to_string(),
                        Value::Array(profile.tolerations.clone()),
                    );
                }
                Value::Object(body)
            }
        };
        Ok(Fragment::new(
            profile_id,
            profile_name,
            ProfileKind::Scheduling,
            content,
            MergeStrategy::Deep,
        ))
    }

    /// Render any other profile kind, preserving its routing tag.
    pub fn compile_generic(
        &self,
        profile_id: &str,
        profile_name: &str,
        profile: &GenericProfile,
    ) -> ComposeResult<Fragment> {
        let content = match &profile.rendered {
            Some(text) => parse_rendered(profile_name, text)?,
            None => profile.content.clone(),
        };
        Ok(Fragment::new(
            profile_id,
            profile_name,
            ProfileKind::Other(profile.kind_tag.clone()),
            content,
            MergeStrategy::Deep,
        ))
    }
}

/// Parse a cached rendering. YAML is a superset of JSON, so a single
/// parser accepts both forms.
fn parse_rendered(profile_name: &str, text: &str) -> ComposeResult<Value> {
    serde_yaml::from_str(text).map_err(|e| ComposeError::InvalidRendering {
        profile: profile_name.to_string(),
        reason: e.to_string(),
    })
}
