//! The composer: orders fragments, applies per-type merge strategies and
//! assembles the final manifest.
//!
//! Fragments are sorted by composition order ascending, then merge
//! priority descending; ties keep input order (stable sort). Merging is
//! grouped by fragment type and each group is processed in a fixed
//! sequence: containers, volumes, scheduling, then everything else, so a
//! probe profile always finds the containers it applies to.

use crate::descriptor::{DeploymentDescriptor, RuntimeOverrides};
use crate::fragment::{Fragment, MergeStrategy, ProfileKind};
use crate::result::{CompositionMetadata, CompositionResult};
use crate::DependencyResolver;
use deploykit_manifest::{deep_merge, ensure_array_mut, ensure_object_mut, shallow_merge};
use serde_json::{Map, Value, json};
use std::cmp::Reverse;
use std::time::Instant;
use tracing::{debug, warn};

const POD_SPEC: [&str; 3] = ["spec", "template", "spec"];
const CONTAINERS: [&str; 4] = ["spec", "template", "spec", "containers"];

/// Kinds whose pod template must carry at least one container.
const WORKLOAD_KINDS: [&str; 5] =
    ["Deployment", "StatefulSet", "DaemonSet", "ReplicaSet", "Job"];

/// Assembles one manifest from a descriptor and a batch of fragments.
#[derive(Debug, Clone, Copy, Default)]
pub struct Composer {
    resolver: DependencyResolver,
}

impl Composer {
    pub fn new() -> Self {
        Self { resolver: DependencyResolver::new() }
    }

    /// Compose `fragments` onto the skeleton derived from `descriptor`,
    /// then apply `overrides`. Never panics; all failures are collected
    /// into the returned result.
    pub fn compose(
        &self,
        descriptor: &DeploymentDescriptor,
        fragments: Vec<Fragment>,
        overrides: &RuntimeOverrides,
    ) -> CompositionResult {
        let start = Instant::now();

        let mut batch: Vec<Fragment> = fragments.into_iter().filter(|f| f.enabled).collect();

        let dependency_errors = self.resolver.validate(&batch);
        if !dependency_errors.is_empty() {
            return CompositionResult::failure(
                dependency_errors,
                batch.len(),
                elapsed_ms(start),
            );
        }

        // Stable sort keeps input order when both keys tie.
        batch.sort_by_key(|f| (f.composition_order, Reverse(f.priority)));

        let mut manifest = build_skeleton(descriptor);
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for group in 0..4 {
            for fragment in batch.iter().filter(|f| f.kind.group() == group) {
                if let Err(reason) = merge_fragment(&mut manifest, fragment) {
                    errors.push(format!(
                        "failed to merge fragment '{}': {reason}",
                        fragment.profile_name
                    ));
                }
            }
        }

        if errors.is_empty() {
            errors.extend(validate_manifest(&manifest));
        }

        let fragment_types = distinct_kinds(&batch);
        if !errors.is_empty() {
            let mut result = CompositionResult::failure(errors, batch.len(), elapsed_ms(start));
            result.metadata.fragment_types = fragment_types;
            return result;
        }

        collect_warnings(&manifest, &batch, &mut warnings);
        for warning in &warnings {
            warn!(deployment = %descriptor.name, "{warning}");
        }

        apply_overrides(&mut manifest, overrides);
        debug!(
            deployment = %descriptor.name,
            fragments = batch.len(),
            "composition complete"
        );

        CompositionResult {
            success: true,
            composed_manifest: Some(manifest),
            errors: Vec::new(),
            warnings,
            metadata: CompositionMetadata {
                status: "composed".to_string(),
                fragment_count: batch.len(),
                fragment_types,
            },
            elapsed_ms: elapsed_ms(start),
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Manifest skeleton for a descriptor: identity, base labels, replica
/// count, selector, and an empty container list for fragments to fill.
fn build_skeleton(descriptor: &DeploymentDescriptor) -> Value {
    let mut labels = Map::new();
    labels.insert("app".to_string(), json!(descriptor.name));
    for (key, value) in &descriptor.labels {
        labels.insert(key.clone(), json!(value));
    }

    let mut metadata = Map::new();
    metadata.insert("name".to_string(), json!(descriptor.name));
    metadata.insert("namespace".to_string(), json!(descriptor.namespace));
    metadata.insert("labels".to_string(), Value::Object(labels.clone()));
    if !descriptor.annotations.is_empty() {
        metadata.insert("annotations".to_string(), json!(descriptor.annotations));
    }

    json!({
        "apiVersion": descriptor.api_version,
        "kind": descriptor.kind,
        "metadata": Value::Object(metadata),
        "spec": {
            "replicas": descriptor.replicas,
            "selector": {"matchLabels": {"app": descriptor.name}},
            "template": {
                "metadata": {"labels": Value::Object(labels)},
                "spec": {"containers": []}
            }
        }
    })
}

fn merge_fragment(manifest: &mut Value, fragment: &Fragment) -> Result<(), String> {
    match &fragment.kind {
        ProfileKind::Container => merge_container(manifest, fragment),
        ProfileKind::Volume => merge_volume(manifest, fragment),
        ProfileKind::Scheduling => merge_scheduling(manifest, fragment),
        ProfileKind::Other(tag) => merge_other(manifest, fragment, tag),
    }
}

fn merge_container(manifest: &mut Value, fragment: &Fragment) -> Result<(), String> {
    let containers = ensure_array_mut(manifest, &CONTAINERS).map_err(|e| e.to_string())?;

    match fragment.strategy {
        MergeStrategy::Append => containers.push(fragment.content.clone()),
        MergeStrategy::Override => {
            if containers.is_empty() {
                containers.push(fragment.content.clone());
            } else {
                containers[0] = fragment.content.clone();
            }
        }
        MergeStrategy::Deep => {
            if let Some(first) = containers.first_mut() {
                deep_merge(first, &fragment.content);
            } else {
                containers.push(fragment.content.clone());
            }
        }
        MergeStrategy::Shallow => {
            if let Some(first) = containers.first_mut() {
                shallow_merge(first, &fragment.content);
            } else {
                containers.push(fragment.content.clone());
            }
        }
    }
    Ok(())
}

fn merge_volume(manifest: &mut Value, fragment: &Fragment) -> Result<(), String> {
    let volumes = ensure_array_mut(manifest, &["spec", "template", "spec", "volumes"])
        .map_err(|e| e.to_string())?;
    match &fragment.content {
        Value::Array(items) => volumes.extend(items.iter().cloned()),
        single => volumes.push(single.clone()),
    }
    Ok(())
}

fn merge_scheduling(manifest: &mut Value, fragment: &Fragment) -> Result<(), String> {
    let content = fragment
        .content
        .as_object()
        .ok_or("scheduling content is not an object")?;

    if let Some(selector) = content.get("nodeSelector") {
        let target = ensure_object_mut(manifest, &["spec", "template", "spec", "nodeSelector"])
            .map_err(|e| e.to_string())?;
        if let Some(map) = selector.as_object() {
            for (key, value) in map {
                target.insert(key.clone(), value.clone());
            }
        }
    }

    if let Some(affinity) = content.get("affinity") {
        let pod_spec = ensure_object_mut(manifest, &POD_SPEC).map_err(|e| e.to_string())?;
        let slot = pod_spec
            .entry("affinity".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        deep_merge(slot, affinity);
    }

    if let Some(tolerations) = content.get("tolerations") {
        let target = ensure_array_mut(manifest, &["spec", "template", "spec", "tolerations"])
            .map_err(|e| e.to_string())?;
        match tolerations {
            Value::Array(items) => target.extend(items.iter().cloned()),
            single => target.push(single.clone()),
        }
    }

    Ok(())
}

/// Remaining fragment kinds. Deep-strategy fragments are routed by their
/// kind tag to a specific target; anything else is a top-level update
/// into the pod spec.
fn merge_other(manifest: &mut Value, fragment: &Fragment, tag: &str) -> Result<(), String> {
    if fragment.strategy != MergeStrategy::Deep {
        let pod_spec = ensure_object_mut(manifest, &POD_SPEC).map_err(|e| e.to_string())?;
        if let Some(map) = fragment.content.as_object() {
            for (key, value) in map {
                pod_spec.insert(key.clone(), value.clone());
            }
        }
        return Ok(());
    }

    match tag {
        "resource" => for_each_container(manifest, |container| {
            let slot = container
                .as_object_mut()
                .map(|m| {
                    m.entry("resources".to_string())
                        .or_insert_with(|| Value::Object(Map::new()))
                })
                .ok_or("container is not an object")?;
            deep_merge(slot, &fragment.content);
            Ok(())
        }),
        "probe" => for_each_container(manifest, |container| {
            shallow_merge(container, &fragment.content);
            Ok(())
        }),
        "lifecycle" => for_each_container(manifest, |container| {
            let slot = container
                .as_object_mut()
                .map(|m| {
                    m.entry("lifecycle".to_string())
                        .or_insert_with(|| Value::Object(Map::new()))
                })
                .ok_or("container is not an object")?;
            deep_merge(slot, &fragment.content);
            Ok(())
        }),
        _ => {
            let pod_spec = deploykit_manifest::get_path_mut(manifest, &POD_SPEC)
                .ok_or("pod spec is missing")?;
            deep_merge(pod_spec, &fragment.content);
            Ok(())
        }
    }
}

fn for_each_container<F>(manifest: &mut Value, mut apply: F) -> Result<(), String>
where
    F: FnMut(&mut Value) -> Result<(), String>,
{
    let containers = ensure_array_mut(manifest, &CONTAINERS).map_err(|e| e.to_string())?;
    for container in containers.iter_mut() {
        apply(container)?;
    }
    Ok(())
}

/// Structural validation of the assembled manifest.
fn validate_manifest(manifest: &Value) -> Vec<String> {
    let mut errors = Vec::new();

    if manifest.get("apiVersion").and_then(Value::as_str).is_none() {
        errors.push("manifest is missing apiVersion".to_string());
    }
    let kind = manifest.get("kind").and_then(Value::as_str);
    if kind.is_none() {
        errors.push("manifest is missing kind".to_string());
    }

    if let Some(kind) = kind {
        if WORKLOAD_KINDS.contains(&kind) {
            match deploykit_manifest::get_path(manifest, &CONTAINERS) {
                Some(Value::Array(containers)) if !containers.is_empty() => {}
                _ => errors.push(
                    "workload manifest has no containers under spec.template.spec".to_string(),
                ),
            }
        }
    }

    errors
}

fn collect_warnings(manifest: &Value, batch: &[Fragment], warnings: &mut Vec<String>) {
    let container_fragments =
        batch.iter().filter(|f| f.kind == ProfileKind::Container).count();
    if container_fragments > 1 {
        warnings.push(format!(
            "{container_fragments} container fragments present; merge order may be ambiguous"
        ));
    }

    if let Some(Value::Array(containers)) = deploykit_manifest::get_path(manifest, &CONTAINERS) {
        let any_resources = containers.iter().any(|c| {
            c.get("resources")
                .and_then(Value::as_object)
                .is_some_and(|r| !r.is_empty())
        });
        if !containers.is_empty() && !any_resources {
            warnings.push("no container defines resource requests or limits".to_string());
        }
    }
}

/// Late runtime overrides, applied after validation.
fn apply_overrides(manifest: &mut Value, overrides: &RuntimeOverrides) {
    if overrides.is_empty() {
        return;
    }

    if let Ok(containers) = ensure_array_mut(manifest, &CONTAINERS) {
        for container in containers.iter_mut() {
            let Some(map) = container.as_object_mut() else { continue };
            let name = map.get("name").and_then(Value::as_str).unwrap_or_default().to_string();

            if let Some(image) =
                overrides.images.get(&name).or_else(|| overrides.images.get(""))
            {
                map.insert("image".to_string(), json!(image));
            }

            if !overrides.env.is_empty() {
                let env = map
                    .entry("env".to_string())
                    .or_insert_with(|| Value::Array(Vec::new()));
                if let Some(entries) = env.as_array_mut() {
                    for (var, value) in &overrides.env {
                        let existing = entries.iter_mut().find(|e| {
                            e.get("name").and_then(Value::as_str) == Some(var.as_str())
                        });
                        match existing {
                            Some(entry) => {
                                if let Some(obj) = entry.as_object_mut() {
                                    obj.insert("value".to_string(), json!(value));
                                }
                            }
                            None => entries.push(json!({"name": var, "value": value})),
                        }
                    }
                }
            }
        }
    }

    if let Some(replicas) = overrides.replicas {
        if let Ok(spec) = ensure_object_mut(manifest, &["spec"]) {
            spec.insert("replicas".to_string(), json!(replicas));
        }
    }

    if !overrides.labels.is_empty() {
        if let Ok(labels) = ensure_object_mut(manifest, &["metadata", "labels"]) {
            for (key, value) in &overrides.labels {
                labels.insert(key.clone(), json!(value));
            }
        }
    }
    if !overrides.annotations.is_empty() {
        if let Ok(annotations) = ensure_object_mut(manifest, &["metadata", "annotations"]) {
            for (key, value) in &overrides.annotations {
                annotations.insert(key.clone(), json!(value));
            }
        }
    }
}

fn distinct_kinds(batch: &[Fragment]) -> Vec<String> {
    let mut kinds: Vec<String> = Vec::new();
    for fragment in batch {
        let name = fragment.kind.to_string();
        if !kinds.contains(&name) {
            kinds.push(name);
        }
    }
    kinds
}
