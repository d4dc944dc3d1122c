//! Top-level composition entry point.
//!
//! [`RuntimeComposer`] resolves the *current* state of every enabled
//! profile reference on a deployment descriptor through a
//! [`ProfileSource`] (the external persistence layer), builds one
//! fragment per resolved profile carrying the join-level order and
//! priority, and delegates to the [`Composer`]. Profiles are never
//! cached here: each call sees the freshest data the source returns.

use crate::composer::Composer;
use crate::descriptor::{DeploymentDescriptor, ProfileMapping, RuntimeOverrides};
use crate::error::ComposeResult;
use crate::fragment::Fragment;
use crate::profile::{
    ContainerProfile, FragmentCompiler, GenericProfile, SchedulingProfile, VolumeProfile,
};
use crate::result::CompositionResult;
use async_trait::async_trait;
use tracing::{debug, instrument};

/// A profile body as resolved from the store, together with its
/// lifecycle flags.
#[derive(Debug, Clone)]
pub struct ResolvedProfile<T> {
    pub name: String,
    pub body: T,
    /// Inactive or disabled profiles are skipped, not an error.
    pub active: bool,
    /// Dependency ids declared by the profile itself.
    pub dependencies: Vec<String>,
}

impl<T> ResolvedProfile<T> {
    pub fn new(name: impl Into<String>, body: T) -> Self {
        Self { name: name.into(), body, active: true, dependencies: Vec::new() }
    }
}

/// Read access to the profile store. Implemented by the persistence layer
/// outside this crate; `None` means the reference is dangling.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn fetch_container(
        &self,
        profile_id: &str,
    ) -> ComposeResult<Option<ResolvedProfile<ContainerProfile>>>;

    async fn fetch_volume(
        &self,
        profile_id: &str,
    ) -> ComposeResult<Option<ResolvedProfile<VolumeProfile>>>;

    async fn fetch_scheduling(
        &self,
        profile_id: &str,
    ) -> ComposeResult<Option<ResolvedProfile<SchedulingProfile>>>;

    /// Additional pod-spec profiles attached to the deployment (resource
    /// limits, probes, lifecycle hooks, …). Default: none.
    async fn fetch_extras(
        &self,
        _descriptor: &DeploymentDescriptor,
    ) -> ComposeResult<Vec<(ProfileMapping, ResolvedProfile<GenericProfile>)>> {
        Ok(Vec::new())
    }
}

/// Composes a deployment descriptor against live profile data.
pub struct RuntimeComposer<S> {
    source: S,
    compiler: FragmentCompiler,
    composer: Composer,
}

impl<S: ProfileSource> RuntimeComposer<S> {
    pub fn new(source: S) -> Self {
        Self { source, compiler: FragmentCompiler::new(), composer: Composer::new() }
    }

    /// Compose the manifest for `descriptor`, applying `overrides` after
    /// assembly. Dangling references and source failures are collected
    /// into the result's errors; disabled mappings and inactive profiles
    /// are skipped silently.
    #[instrument(skip(self, descriptor, overrides), fields(deployment = %descriptor.name))]
    pub async fn compose_for(
        &self,
        descriptor: &DeploymentDescriptor,
        overrides: &RuntimeOverrides,
    ) -> CompositionResult {
        let mut fragments: Vec<Fragment> = Vec::new();
        let mut errors: Vec<String> = Vec::new();

        for mapping in enabled(&descriptor.container_refs) {
            match self.source.fetch_container(&mapping.profile_id).await {
                Ok(Some(profile)) if profile.active => {
                    match self.compiler.compile_container(
                        &mapping.profile_id,
                        &profile.name,
                        &profile.body,
                    ) {
                        Ok(fragment) => fragments.push(attach(fragment, mapping, &profile.dependencies)),
                        Err(e) => errors.push(e.to_string()),
                    }
                }
                Ok(Some(_)) => debug!(profile = %mapping.profile_id, "skipping inactive profile"),
                Ok(None) => errors.push(format!(
                    "container profile '{}' not found",
                    mapping.profile_id
                )),
                Err(e) => errors.push(e.to_string()),
            }
        }

        for mapping in enabled(&descriptor.volume_refs) {
            match self.source.fetch_volume(&mapping.profile_id).await {
                Ok(Some(profile)) if profile.active => {
                    match self.compiler.compile_volume(
                        &mapping.profile_id,
                        &profile.name,
                        &profile.body,
                    ) {
                        Ok(fragment) => fragments.push(attach(fragment, mapping, &profile.dependencies)),
                        Err(e) => errors.push(e.to_string()),
                    }
                }
                Ok(Some(_)) => debug!(profile = %mapping.profile_id, "skipping inactive profile"),
                Ok(None) => {
                    errors.push(format!("volume profile '{}' not found", mapping.profile_id))
                }
                Err(e) => errors.push(e.to_string()),
            }
        }

        for mapping in enabled(&descriptor.scheduling_refs) {
            match self.source.fetch_scheduling(&mapping.profile_id).await {
                Ok(Some(profile)) if profile.active => {
                    match self.compiler.compile_scheduling(
                        &mapping.profile_id,
                        &profile.name,
                        &profile.body,
                    ) {
                        Ok(fragment) => fragments.push(attach(fragment, mapping, &profile.dependencies)),
                        Err(e) => errors.push(e.to_string()),
                    }
                }
                Ok(Some(_)) => debug!(profile = %mapping.profile_id, "skipping inactive profile"),
                Ok(None) => errors.push(format!(
                    "scheduling profile '{}' not found",
                    mapping.profile_id
                )),
                Err(e) => errors.push(e.to_string()),
            }
        }

        match self.source.fetch_extras(descriptor).await {
            Ok(extras) => {
                for (mapping, profile) in &extras {
                    if !mapping.enabled || !profile.active {
                        continue;
                    }
                    match self.compiler.compile_generic(
                        &mapping.profile_id,
                        &profile.name,
                        &profile.body,
                    ) {
                        Ok(fragment) => fragments.push(attach(fragment, mapping, &profile.dependencies)),
                        Err(e) => errors.push(e.to_string()),
                    }
                }
            }
            Err(e) => errors.push(e.to_string()),
        }

        if !errors.is_empty() {
            return CompositionResult::failure(errors, fragments.len(), 0);
        }

        self.composer.compose(descriptor, fragments, overrides)
    }
}

fn enabled(mappings: &[ProfileMapping]) -> impl Iterator<Item = &ProfileMapping> {
    mappings.iter().filter(|m| m.enabled)
}

/// Join-level order and priority win over the profile's own defaults.
fn attach(fragment: Fragment, mapping: &ProfileMapping, dependencies: &[String]) -> Fragment {
    fragment
        .with_order(mapping.composition_order, mapping.merge_priority)
        .with_dependencies(dependencies.iter().cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ComposeError;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapSource {
        containers: HashMap<String, ResolvedProfile<ContainerProfile>>,
        volumes: HashMap<String, ResolvedProfile<VolumeProfile>>,
        scheduling: HashMap<String, ResolvedProfile<SchedulingProfile>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl ProfileSource for MapSource {
        async fn fetch_container(
            &self,
            profile_id: &str,
        ) -> ComposeResult<Option<ResolvedProfile<ContainerProfile>>> {
            if self.fail_on.as_deref() == Some(profile_id) {
                return Err(ComposeError::Source {
                    profile_id: profile_id.to_string(),
                    reason: "store unavailable".to_string(),
                });
            }
            Ok(self.containers.get(profile_id).cloned())
        }

        async fn fetch_volume(
            &self,
            profile_id: &str,
        ) -> ComposeResult<Option<ResolvedProfile<VolumeProfile>>> {
            Ok(self.volumes.get(profile_id).cloned())
        }

        async fn fetch_scheduling(
            &self,
            profile_id: &str,
        ) -> ComposeResult<Option<ResolvedProfile<SchedulingProfile>>> {
            Ok(self.scheduling.get(profile_id).cloned())
        }
    }

    fn container(name: &str) -> ResolvedProfile<ContainerProfile> {
        ResolvedProfile::new(
            name,
            ContainerProfile {
                name: name.to_string(),
                image: Some(format!("{name}:latest")),
                ..Default::default()
            },
        )
    }

    fn descriptor_with(refs: Vec<ProfileMapping>) -> DeploymentDescriptor {
        let mut d = DeploymentDescriptor::new("api", "prod");
        d.container_refs = refs;
        d
    }

    #[tokio::test]
    async fn composes_enabled_container_references() {
        let mut source = MapSource::default();
        source.containers.insert("p1".to_string(), container("web"));
        let composer = RuntimeComposer::new(source);

        let descriptor = descriptor_with(vec![ProfileMapping::new("p1")]);
        let result = composer.compose_for(&descriptor, &Default::default()).await;
        assert!(result.success, "{:?}", result.errors);
        let manifest = result.composed_manifest.unwrap();
        assert_eq!(manifest["spec"]["template"]["spec"]["containers"][0]["name"], "web");
    }

    #[tokio::test]
    async fn disabled_mapping_is_skipped() {
        let mut source = MapSource::default();
        source.containers.insert("p1".to_string(), container("web"));
        source.containers.insert("p2".to_string(), container("sidecar"));
        let composer = RuntimeComposer::new(source);

        let descriptor = descriptor_with(vec![
            ProfileMapping::new("p1"),
            ProfileMapping::new("p2").disabled(),
        ]);
        let result = composer.compose_for(&descriptor, &Default::default()).await;
        let manifest = result.composed_manifest.unwrap();
        let containers = manifest["spec"]["template"]["spec"]["containers"].as_array().unwrap();
        assert_eq!(containers.len(), 1);
    }

    #[tokio::test]
    async fn inactive_profile_is_skipped() {
        let mut source = MapSource::default();
        let mut inactive = container("old");
        inactive.active = false;
        source.containers.insert("p1".to_string(), container("web"));
        source.containers.insert("p2".to_string(), inactive);
        let composer = RuntimeComposer::new(source);

        let descriptor =
            descriptor_with(vec![ProfileMapping::new("p1"), ProfileMapping::new("p2")]);
        let result = composer.compose_for(&descriptor, &Default::default()).await;
        assert!(result.success);
        let manifest = result.composed_manifest.unwrap();
        let containers = manifest["spec"]["template"]["spec"]["containers"].as_array().unwrap();
        assert_eq!(containers.len(), 1);
    }

    #[tokio::test]
    async fn dangling_reference_is_a_collected_error() {
        let composer = RuntimeComposer::new(MapSource::default());
        let descriptor = descriptor_with(vec![ProfileMapping::new("ghost")]);
        let result = composer.compose_for(&descriptor, &Default::default()).await;
        assert!(!result.success);
        assert!(result.errors[0].contains("ghost"));
    }

    #[tokio::test]
    async fn source_failure_is_a_collected_error() {
        let mut source = MapSource::default();
        source.fail_on = Some("p1".to_string());
        let composer = RuntimeComposer::new(source);
        let descriptor = descriptor_with(vec![ProfileMapping::new("p1")]);
        let result = composer.compose_for(&descriptor, &Default::default()).await;
        assert!(!result.success);
        assert!(result.errors[0].contains("store unavailable"));
    }

    #[tokio::test]
    async fn join_level_order_overrides_profile_defaults() {
        let mut source = MapSource::default();
        source.containers.insert("p1".to_string(), container("second"));
        source.containers.insert("p2".to_string(), container("first"));
        let composer = RuntimeComposer::new(source);

        let descriptor = descriptor_with(vec![
            ProfileMapping::new("p1").with_order(2, 0),
            ProfileMapping::new("p2").with_order(1, 0),
        ]);
        let result = composer.compose_for(&descriptor, &Default::default()).await;
        let manifest = result.composed_manifest.unwrap();
        let names: Vec<&str> = manifest["spec"]["template"]["spec"]["containers"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["first", "second"]);
    }

    #[tokio::test]
    async fn runtime_overrides_reach_the_manifest() {
        let mut source = MapSource::default();
        source.containers.insert("p1".to_string(), container("web"));
        let composer = RuntimeComposer::new(source);

        let descriptor = descriptor_with(vec![ProfileMapping::new("p1")]);
        let mut overrides = RuntimeOverrides::default();
        overrides.images.insert("web".to_string(), "web:release-42".to_string());
        let result = composer.compose_for(&descriptor, &overrides).await;
        let manifest = result.composed_manifest.unwrap();
        assert_eq!(
            manifest["spec"]["template"]["spec"]["containers"][0]["image"],
            "web:release-42"
        );
    }
}
