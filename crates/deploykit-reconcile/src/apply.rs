//! Create-or-patch reconciliation.
//!
//! The engine's state machine per resource identity:
//!
//! - live object absent → create with the desired manifest as-is;
//! - present with no stored baseline → naive merge-patch (fields removed
//!   from the desired manifest are NOT nulled out — a known limitation of
//!   the two-way merge, preserved deliberately);
//! - present with a stored baseline → diff the baseline against the
//!   desired manifest so removed fields become explicit `null`s, then
//!   merge-patch.
//!
//! Before any network call the desired manifest is stamped with its own
//! canonical JSON under the last-applied annotation, giving the *next*
//! apply a fresh reference point. [`with_baseline_annotation`] is a pure
//! function so this step is testable without a cluster.

use crate::LAST_APPLIED_ANNOTATION;
use crate::client::ClusterApi;
use crate::error::{ReconcileError, ReconcileResult};
use crate::ops::PatchOperationRegistry;
use crate::resolver::ResourceTypeResolver;
use deploykit_manifest::{ResourceIdentity, canonical_json, diff_for_apply, ensure_object_mut};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

/// What the engine did for one apply call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppliedAction {
    Created,
    Patched,
}

/// Stamp `desired` with its own canonical JSON under the last-applied
/// annotation. The stored copy embeds every field except the annotation's
/// own value (the self-reference is cut there, matching `kubectl`).
pub fn with_baseline_annotation(desired: &Value) -> Value {
    let mut annotated = desired.clone();
    if let Ok(annotations) = ensure_object_mut(&mut annotated, &["metadata", "annotations"]) {
        annotations.remove(LAST_APPLIED_ANNOTATION);
    }
    let baseline = canonical_json(&annotated);
    if let Ok(annotations) = ensure_object_mut(&mut annotated, &["metadata", "annotations"]) {
        annotations.insert(LAST_APPLIED_ANNOTATION.to_string(), Value::String(baseline));
    }
    annotated
}

/// Pull the stored baseline off a live object, if one is present and
/// decodable.
fn stored_baseline(live: &Value) -> Option<Value> {
    let text = live
        .get("metadata")?
        .get("annotations")?
        .get(LAST_APPLIED_ANNOTATION)?
        .as_str()?;
    match serde_json::from_str(text) {
        Ok(baseline) => Some(baseline),
        Err(e) => {
            warn!(error = %e, "stored baseline is not valid JSON, treating as absent");
            None
        }
    }
}

/// Create-or-patch engine for single manifests.
///
/// No internal locking: two concurrent writers against the same identity
/// both read-modify-write and the cluster's resourceVersion check is the
/// only guard. Callers that care should serialize per identity.
pub struct ReconciliationEngine<C: ClusterApi> {
    api: C,
    resolver: ResourceTypeResolver<C>,
    ops: PatchOperationRegistry,
}

impl<C: ClusterApi + Clone> ReconciliationEngine<C> {
    pub fn new(api: C) -> Self {
        Self {
            resolver: ResourceTypeResolver::new(api.clone()),
            api,
            ops: PatchOperationRegistry::new(),
        }
    }

    pub fn resolver(&self) -> &ResourceTypeResolver<C> {
        &self.resolver
    }

    pub fn operations(&self) -> &PatchOperationRegistry {
        &self.ops
    }

    /// Apply `desired` to the cluster, creating or patching the live
    /// object. The manifest must carry apiVersion, kind and
    /// metadata.name.
    #[instrument(skip(self, desired))]
    pub async fn apply(&self, desired: &Value) -> ReconcileResult<AppliedAction> {
        let identity = ResourceIdentity::from_manifest(desired).ok_or_else(|| {
            ReconcileError::InvalidManifest(
                "manifest must carry apiVersion, kind and metadata.name".to_string(),
            )
        })?;
        let plural = self.resolver.plural_for_kind(&identity.kind).await?;

        let annotated = with_baseline_annotation(desired);

        match self.api.get(&identity, &plural).await? {
            None => {
                info!(identity = %identity, "creating");
                self.api.create(&identity, &plural, &annotated).await?;
                Ok(AppliedAction::Created)
            }
            Some(live) => {
                let patch = match stored_baseline(&live) {
                    Some(baseline) => {
                        debug!(identity = %identity, "patching against stored baseline");
                        diff_for_apply(&baseline, &annotated)
                    }
                    None => {
                        // Two-way merge only: without a baseline, fields
                        // absent from the desired manifest stay on the
                        // live object.
                        debug!(identity = %identity, "no stored baseline, naive patch");
                        annotated.clone()
                    }
                };
                self.api.merge_patch(&identity, &plural, &patch).await?;
                Ok(AppliedAction::Patched)
            }
        }
    }

    /// Run a named, kind-scoped partial mutation against the live object.
    /// Registry checks happen before any network call; the mutation is a
    /// read-modify-write with a plain merge patch, bypassing baseline
    /// diffing entirely.
    #[instrument(skip(self, data), fields(identity = %identity))]
    pub async fn run_op(
        &self,
        identity: &ResourceIdentity,
        op_name: &str,
        data: &Value,
    ) -> ReconcileResult<Value> {
        let spec = self.ops.lookup(op_name, &identity.kind)?;
        let plural = self.resolver.plural_for_kind(&identity.kind).await?;

        let mut live = self
            .api
            .get(identity, &plural)
            .await?
            .ok_or_else(|| ReconcileError::NotFound(identity.to_string()))?;

        (spec.mutator)(&mut live, data)?;
        info!(op = op_name, "applying patch operation");
        self.api.merge_patch(identity, &plural, &live).await
    }

    /// Delete the live object; absent objects are not an error.
    #[instrument(skip(self), fields(identity = %identity))]
    pub async fn delete(&self, identity: &ResourceIdentity) -> ReconcileResult<()> {
        let plural = self.resolver.plural_for_kind(&identity.kind).await?;
        self.api.delete(identity, &plural).await
    }
}
