//! End-to-end composition: profiles → fragments → composed manifest.

use deploykit_compose::{
    ComposeResult, ContainerProfile, DeploymentDescriptor, ProfileMapping, ProfileSource,
    ResolvedProfile, RuntimeComposer, RuntimeOverrides, SchedulingProfile, VolumeProfile,
};
use serde_json::json;
use std::collections::HashMap;

struct FixtureStore {
    containers: HashMap<String, ResolvedProfile<ContainerProfile>>,
    volumes: HashMap<String, ResolvedProfile<VolumeProfile>>,
    scheduling: HashMap<String, ResolvedProfile<SchedulingProfile>>,
}

impl FixtureStore {
    fn new() -> Self {
        let mut containers = HashMap::new();
        containers.insert(
            "web".to_string(),
            ResolvedProfile::new(
                "web-container",
                ContainerProfile {
                    name: "web".to_string(),
                    image: Some("web:v1".to_string()),
                    ports: vec![json!({"containerPort": 8080})],
                    volume_mounts: vec![json!({"name": "data", "mountPath": "/data"})],
                    ..Default::default()
                },
            ),
        );
        containers.insert(
            "metrics".to_string(),
            ResolvedProfile::new(
                "metrics-sidecar",
                ContainerProfile {
                    name: "metrics".to_string(),
                    image: Some("exporter:2".to_string()),
                    ..Default::default()
                },
            ),
        );

        let mut volumes = HashMap::new();
        volumes.insert(
            "data".to_string(),
            ResolvedProfile::new(
                "data-volume",
                VolumeProfile {
                    name: "data".to_string(),
                    config: serde_json::from_value(json!({"emptyDir": {}})).unwrap(),
                    ..Default::default()
                },
            ),
        );

        let mut scheduling = HashMap::new();
        scheduling.insert(
            "ssd".to_string(),
            ResolvedProfile::new(
                "ssd-nodes",
                SchedulingProfile {
                    node_selector: [("disktype".to_string(), "ssd".to_string())].into(),
                    ..Default::default()
                },
            ),
        );

        Self { containers, volumes, scheduling }
    }
}

#[async_trait::async_trait]
impl ProfileSource for FixtureStore {
    async fn fetch_container(
        &self,
        profile_id: &str,
    ) -> ComposeResult<Option<ResolvedProfile<ContainerProfile>>> {
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

fn descriptor() -> DeploymentDescriptor {
    let mut d = DeploymentDescriptor::new("api", "prod");
    d.replicas = 3;
    d.container_refs = vec![
        ProfileMapping::new("web").with_order(1, 0),
        ProfileMapping::new("metrics").with_order(2, 0),
    ];
    d.volume_refs = vec![ProfileMapping::new("data")];
    d.scheduling_refs = vec![ProfileMapping::new("ssd")];
    d
}

#[tokio::test]
async fn full_pipeline_produces_a_valid_workload_manifest() {
    let composer = RuntimeComposer::new(FixtureStore::new());
    let result = composer.compose_for(&descriptor(), &RuntimeOverrides::default()).await;

    assert!(result.success, "{:?}", result.errors);
    let manifest = result.composed_manifest.expect("manifest");

    assert_eq!(manifest["apiVersion"], "apps/v1");
    assert_eq!(manifest["kind"], "Deployment");
    assert_eq!(manifest["metadata"]["name"], "api");
    assert_eq!(manifest["spec"]["replicas"], 3);

    let pod_spec = &manifest["spec"]["template"]["spec"];
    let containers = pod_spec["containers"].as_array().unwrap();
    assert_eq!(containers.len(), 2);
    assert_eq!(containers[0]["name"], "web");
    assert_eq!(containers[0]["volumeMounts"][0]["name"], "data");
    assert_eq!(containers[1]["name"], "metrics");

    assert_eq!(pod_spec["volumes"][0]["name"], "data");
    assert_eq!(pod_spec["nodeSelector"]["disktype"], "ssd");

    assert_eq!(result.metadata.status, "composed");
    assert_eq!(result.metadata.fragment_count, 4);
}

#[tokio::test]
async fn release_time_overrides_land_after_composition() {
    let composer = RuntimeComposer::new(FixtureStore::new());
    let mut overrides = RuntimeOverrides::default();
    overrides.images.insert("web".to_string(), "web:release-7".to_string());
    overrides.replicas = Some(6);
    overrides.env.push(("RELEASE".to_string(), "7".to_string()));

    let result = composer.compose_for(&descriptor(), &overrides).await;
    let manifest = result.composed_manifest.expect("manifest");

    assert_eq!(manifest["spec"]["replicas"], 6);
    let containers = manifest["spec"]["template"]["spec"]["containers"].as_array().unwrap();
    assert_eq!(containers[0]["image"], "web:release-7");
    // Sidecar keeps its own image but gets the env var.
    assert_eq!(containers[1]["image"], "exporter:2");
    assert_eq!(containers[1]["env"][0]["name"], "RELEASE");
}

#[tokio::test]
async fn dangling_volume_reference_fails_the_run() {
    let composer = RuntimeComposer::new(FixtureStore::new());
    let mut d = descriptor();
    d.volume_refs.push(ProfileMapping::new("missing-volume"));

    let result = composer.compose_for(&d, &RuntimeOverrides::default()).await;
    assert!(!result.success);
    assert!(result.composed_manifest.is_none());
    assert!(result.errors.iter().any(|e| e.contains("missing-volume")));
}
