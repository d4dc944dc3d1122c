//! Named, kind-scoped patch operations.
//!
//! A fixed catalog of narrow manifest mutations (set replicas, swap an
//! image, add a volume, …). Each entry pairs an allow-list of resource
//! kinds with a pure transform over the live manifest; running an
//! operation is a read-modify-write followed by a merge patch. This path
//! deliberately bypasses last-applied diffing.
//!
//! The table is built once at construction. Requests for an unregistered
//! operation, or one not permitted for the target kind, are rejected
//! before any network traffic.

use crate::error::{ReconcileError, ReconcileResult};
use serde_json::{Value, json};
use std::collections::HashMap;

/// Pure transform of a live manifest, driven by the caller's `data`.
pub type Mutator = fn(&mut Value, &Value) -> ReconcileResult<()>;

/// One registered operation: where it may run and what it does.
#[derive(Debug)]
pub struct OperationSpec {
    /// Kinds this operation may target; `["*"]` allows any kind.
    pub allowed_kinds: &'static [&'static str],
    pub mutator: Mutator,
}

impl OperationSpec {
    fn allows(&self, kind: &str) -> bool {
        self.allowed_kinds.iter().any(|k| *k == "*" || *k == kind)
    }
}

const TEMPLATE_WORKLOADS: &[&str] =
    &["Deployment", "StatefulSet", "DaemonSet", "ReplicaSet", "Job"];
const SCALABLE_WORKLOADS: &[&str] = &["Deployment", "StatefulSet", "ReplicaSet"];

/// The fixed operation catalog.
pub struct PatchOperationRegistry {
    table: HashMap<&'static str, OperationSpec>,
}

impl Default for PatchOperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PatchOperationRegistry {
    pub fn new() -> Self {
        let mut table: HashMap<&'static str, OperationSpec> = HashMap::new();
        table.insert(
            "set_replicas",
            OperationSpec { allowed_kinds: SCALABLE_WORKLOADS, mutator: set_replicas },
        );
        table.insert(
            "set_image",
            OperationSpec { allowed_kinds: TEMPLATE_WORKLOADS, mutator: set_image },
        );
        table.insert(
            "add_volume",
            OperationSpec { allowed_kinds: TEMPLATE_WORKLOADS, mutator: add_volume },
        );
        table.insert(
            "remove_volume",
            OperationSpec { allowed_kinds: TEMPLATE_WORKLOADS, mutator: remove_volume },
        );
        table.insert(
            "set_env",
            OperationSpec { allowed_kinds: TEMPLATE_WORKLOADS, mutator: set_env },
        );
        table.insert(
            "set_node_selector",
            OperationSpec { allowed_kinds: TEMPLATE_WORKLOADS, mutator: set_node_selector },
        );
        table.insert(
            "set_service_type",
            OperationSpec { allowed_kinds: &["Service"], mutator: set_service_type },
        );
        table.insert(
            "set_labels",
            OperationSpec { allowed_kinds: &["*"], mutator: set_labels },
        );
        table.insert(
            "set_annotations",
            OperationSpec { allowed_kinds: &["*"], mutator: set_annotations },
        );
        table.insert(
            "remove_annotation",
            OperationSpec { allowed_kinds: &["*"], mutator: remove_annotation },
        );
        Self { table }
    }

    /// Look up `op_name` and check `kind` against its allow-list.
    pub fn lookup(&self, op_name: &str, kind: &str) -> ReconcileResult<&OperationSpec> {
        let spec = self
            .table
            .get(op_name)
            .ok_or_else(|| ReconcileError::UnknownOperation(op_name.to_string()))?;
        if !spec.allows(kind) {
            return Err(ReconcileError::KindNotAllowed {
                op: op_name.to_string(),
                kind: kind.to_string(),
            });
        }
        Ok(spec)
    }

    pub fn operation_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.table.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

fn data_field<'a>(data: &'a Value, op: &str, field: &str) -> ReconcileResult<&'a Value> {
    data.get(field).ok_or_else(|| ReconcileError::InvalidOperationData {
        op: op.to_string(),
        reason: format!("missing field '{field}'"),
    })
}

fn bad_shape(op: &'static str) -> impl Fn(deploykit_manifest::ManifestError) -> ReconcileError {
    move |e| ReconcileError::InvalidOperationData { op: op.to_string(), reason: e.to_string() }
}

fn containers_mut<'a>(manifest: &'a mut Value, op: &str) -> ReconcileResult<&'a mut Vec<Value>> {
    deploykit_manifest::get_path_mut(manifest, &["spec", "template", "spec", "containers"])
        .and_then(Value::as_array_mut)
        .ok_or_else(|| ReconcileError::InvalidOperationData {
            op: op.to_string(),
            reason: "manifest has no spec.template.spec.containers".to_string(),
        })
}

fn set_replicas(manifest: &mut Value, data: &Value) -> ReconcileResult<()> {
    let count = data_field(data, "set_replicas", "count")?
        .as_i64()
        .ok_or_else(|| ReconcileError::InvalidOperationData {
            op: "set_replicas".to_string(),
            reason: "'count' must be an integer".to_string(),
        })?;
    let spec = deploykit_manifest::ensure_object_mut(manifest, &["spec"])
        .map_err(bad_shape("set_replicas"))?;
    spec.insert("replicas".to_string(), json!(count));
    Ok(())
}

/// `data`: `{container?, image}`. Without `container` every container's
/// image is swapped.
fn set_image(manifest: &mut Value, data: &Value) -> ReconcileResult<()> {
    let image = data_field(data, "set_image", "image")?.clone();
    let target = data.get("container").and_then(Value::as_str).map(String::from);
    for container in containers_mut(manifest, "set_image")?.iter_mut() {
        let matches = match &target {
            Some(name) => container.get("name").and_then(Value::as_str) == Some(name),
            None => true,
        };
        if matches {
            if let Some(map) = container.as_object_mut() {
                map.insert("image".to_string(), image.clone());
            }
        }
    }
    Ok(())
}

/// `data`: `{volume, mount?, container?}`. The volume lands in the pod
/// spec; an optional mount is added to the named container (or every
/// container).
fn add_volume(manifest: &mut Value, data: &Value) -> ReconcileResult<()> {
    let volume = data_field(data, "add_volume", "volume")?.clone();
    let volumes = deploykit_manifest::ensure_array_mut(
        manifest,
        &["spec", "template", "spec", "volumes"],
    )
    .map_err(bad_shape("add_volume"))?;
    volumes.push(volume);

    if let Some(mount) = data.get("mount") {
        let target = data.get("container").and_then(Value::as_str).map(String::from);
        for container in containers_mut(manifest, "add_volume")?.iter_mut() {
            let matches = match &target {
                Some(name) => container.get("name").and_then(Value::as_str) == Some(name),
                None => true,
            };
            if matches {
                if let Some(map) = container.as_object_mut() {
                    let mounts = map
                        .entry("volumeMounts".to_string())
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if let Some(list) = mounts.as_array_mut() {
                        list.push(mount.clone());
                    }
                }
            }
        }
    }
    Ok(())
}

/// `data`: `{name}`. Removes the volume and any mount referencing it.
fn remove_volume(manifest: &mut Value, data: &Value) -> ReconcileResult<()> {
    let name = data_field(data, "remove_volume", "name")?
        .as_str()
        .ok_or_else(|| ReconcileError::InvalidOperationData {
            op: "remove_volume".to_string(),
            reason: "'name' must be a string".to_string(),
        })?
        .to_string();

    if let Some(volumes) = deploykit_manifest::get_path_mut(
        manifest,
        &["spec", "template", "spec", "volumes"],
    )
    .and_then(Value::as_array_mut)
    {
        volumes.retain(|v| v.get("name").and_then(Value::as_str) != Some(name.as_str()));
    }
    if let Ok(containers) = containers_mut(manifest, "remove_volume") {
        for container in containers.iter_mut() {
            if let Some(mounts) = container.get_mut("volumeMounts").and_then(Value::as_array_mut)
            {
                mounts.retain(|m| m.get("name").and_then(Value::as_str) != Some(name.as_str()));
            }
        }
    }
    Ok(())
}

/// `data`: `{container?, name, value}`. Overwrites an existing variable
/// of the same name.
fn set_env(manifest: &mut Value, data: &Value) -> ReconcileResult<()> {
    let var = data_field(data, "set_env", "name")?.clone();
    let value = data_field(data, "set_env", "value")?.clone();
    let target = data.get("container").and_then(Value::as_str).map(String::from);

    for container in containers_mut(manifest, "set_env")?.iter_mut() {
        let matches = match &target {
            Some(name) => container.get("name").and_then(Value::as_str) == Some(name),
            None => true,
        };
        if !matches {
            continue;
        }
        let Some(map) = container.as_object_mut() else { continue };
        let env = map.entry("env".to_string()).or_insert_with(|| Value::Array(Vec::new()));
        if let Some(entries) = env.as_array_mut() {
            let existing = entries
                .iter_mut()
                .find(|e| e.get("name") == Some(&var));
            match existing {
                Some(entry) => {
                    if let Some(obj) = entry.as_object_mut() {
                        obj.insert("value".to_string(), value.clone());
                    }
                }
                None => entries.push(json!({"name": var, "value": value})),
            }
        }
    }
    Ok(())
}

/// `data`: `{selector}` — replaces the pod spec's nodeSelector map.
fn set_node_selector(manifest: &mut Value, data: &Value) -> ReconcileResult<()> {
    let selector = data_field(data, "set_node_selector", "selector")?.clone();
    let pod_spec = deploykit_manifest::ensure_object_mut(
        manifest,
        &["spec", "template", "spec"],
    )
    .map_err(bad_shape("set_node_selector"))?;
    pod_spec.insert("nodeSelector".to_string(), selector);
    Ok(())
}

/// `data`: `{type}` — e.g. `ClusterIP`, `NodePort`, `LoadBalancer`.
fn set_service_type(manifest: &mut Value, data: &Value) -> ReconcileResult<()> {
    let service_type = data_field(data, "set_service_type", "type")?.clone();
    let spec = deploykit_manifest::ensure_object_mut(manifest, &["spec"])
        .map_err(bad_shape("set_service_type"))?;
    spec.insert("type".to_string(), service_type);
    Ok(())
}

fn merge_metadata_map(
    manifest: &mut Value,
    op: &'static str,
    field: &'static str,
    data: &Value,
) -> ReconcileResult<()> {
    let entries = data_field(data, op, field)?
        .as_object()
        .cloned()
        .ok_or_else(|| ReconcileError::InvalidOperationData {
            op: op.to_string(),
            reason: format!("'{field}' must be an object"),
        })?;
    let target = deploykit_manifest::ensure_object_mut(manifest, &["metadata", field])
        .map_err(bad_shape(op))?;
    for (key, value) in entries {
        target.insert(key, value);
    }
    Ok(())
}

fn set_labels(manifest: &mut Value, data: &Value) -> ReconcileResult<()> {
    merge_metadata_map(manifest, "set_labels", "labels", data)
}

fn set_annotations(manifest: &mut Value, data: &Value) -> ReconcileResult<()> {
    merge_metadata_map(manifest, "set_annotations", "annotations", data)
}

/// `data`: `{key}`.
///
/// The mutated manifest goes back to the server as a merge patch, and a
/// merge patch only deletes keys that are explicitly `null`; an absent
/// key is left untouched. The annotation is therefore nulled, not
/// removed.
fn remove_annotation(manifest: &mut Value, data: &Value) -> ReconcileResult<()> {
    let key = data_field(data, "remove_annotation", "key")?
        .as_str()
        .ok_or_else(|| ReconcileError::InvalidOperationData {
            op: "remove_annotation".to_string(),
            reason: "'key' must be a string".to_string(),
        })?;
    let annotations =
        deploykit_manifest::ensure_object_mut(manifest, &["metadata", "annotations"])
            .map_err(bad_shape("remove_annotation"))?;
    annotations.insert(key.to_string(), Value::Null);
    Ok(())
}
