//! Resource type resolution.
//!
//! Maps a bare resource-type string (`"deployments"`, `"pods"`) to its
//! kind and a preference-ranked list of `group/version` candidates.
//! Discovery results are cached on the resolver instance; call
//! [`ResourceTypeResolver::invalidate`] after cluster upgrades. When
//! discovery yields nothing the static fallback table of well-known
//! resources answers, and as a last resort the core `v1` group with a
//! title-cased singular kind guess is returned.
//!
//! Version preference follows the cluster convention: stable versions
//! rank highest (larger major first), then beta (lower beta index
//! preferred), then alpha.

use crate::client::ClusterApi;
use crate::error::ReconcileResult;
use lazy_static::lazy_static;
use std::cmp::Reverse;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Resolution outcome: the kind plus ranked `group/version` candidates.
///
/// Callers try candidates in order until one resolves against the
/// cluster, short-circuiting on first success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedType {
    pub kind: String,
    /// Best first; entries are `group/version` or bare `v1` for core.
    pub group_versions: Vec<String>,
}

impl ResolvedType {
    /// The highest-ranked candidate.
    pub fn best(&self) -> &str {
        self.group_versions
            .first()
            .map(String::as_str)
            .unwrap_or("v1")
    }
}

#[derive(Debug, Clone, Default)]
struct DiscoveredResource {
    kind: String,
    group_versions: Vec<String>,
}

/// Resolves bare resource names against cluster discovery.
pub struct ResourceTypeResolver<C> {
    api: C,
    cache: RwLock<Option<HashMap<String, DiscoveredResource>>>,
}

impl<C: ClusterApi> ResourceTypeResolver<C> {
    pub fn new(api: C) -> Self {
        Self { api, cache: RwLock::new(None) }
    }

    /// Drop the discovery cache; the next resolve re-discovers.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    /// Resolve `resource` (a plural name) to its kind and ranked
    /// `group/version` candidates.
    #[instrument(skip(self))]
    pub async fn resolve(&self, resource: &str) -> ReconcileResult<ResolvedType> {
        self.ensure_discovered().await?;

        let cache = self.cache.read().await;
        if let Some(table) = cache.as_ref() {
            if let Some(found) = table.get(resource) {
                let mut group_versions = found.group_versions.clone();
                rank_group_versions(&mut group_versions);
                return Ok(ResolvedType { kind: found.kind.clone(), group_versions });
            }
        }
        drop(cache);

        if let Some((group_version, kind)) = WELL_KNOWN_RESOURCES.get(resource) {
            debug!(resource, "discovery miss, using static fallback");
            return Ok(ResolvedType {
                kind: (*kind).to_string(),
                group_versions: vec![(*group_version).to_string()],
            });
        }

        debug!(resource, "unknown resource type, defaulting to v1");
        Ok(ResolvedType {
            kind: guess_kind(resource),
            group_versions: vec!["v1".to_string()],
        })
    }

    /// Plural name for a kind, from discovery where possible.
    pub async fn plural_for_kind(&self, kind: &str) -> ReconcileResult<String> {
        self.ensure_discovered().await?;

        let cache = self.cache.read().await;
        if let Some(table) = cache.as_ref() {
            if let Some((plural, _)) = table.iter().find(|(_, r)| r.kind == kind) {
                return Ok(plural.clone());
            }
        }
        drop(cache);

        if let Some((plural, _)) =
            WELL_KNOWN_RESOURCES.iter().find(|(_, (_, k))| *k == kind)
        {
            return Ok((*plural).to_string());
        }
        Ok(format!("{}s", kind.to_ascii_lowercase()))
    }

    async fn ensure_discovered(&self) -> ReconcileResult<()> {
        if self.cache.read().await.is_some() {
            return Ok(());
        }

        // A discovery failure leaves the cache unset so the next resolve
        // retries; the static fallback answers in the meantime.
        match self.api.list_group_versions().await {
            Ok(group_versions) => {
                let mut table: HashMap<String, DiscoveredResource> = HashMap::new();
                for group_version in group_versions {
                    let Ok(resources) =
                        self.api.list_group_resources(&group_version).await
                    else {
                        continue;
                    };
                    for resource in resources {
                        let entry = table.entry(resource.name.clone()).or_default();
                        entry.kind = resource.kind;
                        entry.group_versions.push(group_version.clone());
                    }
                }
                *self.cache.write().await = Some(table);
            }
            Err(e) => debug!(error = %e, "api discovery failed, retrying on next resolve"),
        }
        Ok(())
    }
}

/// Sort `group_versions` in place, best first, comparing version parts.
fn rank_group_versions(group_versions: &mut [String]) {
    group_versions.sort_by_key(|gv| {
        let version = gv.rsplit('/').next().unwrap_or(gv);
        version_rank(version)
    });
}

/// Lower tuples rank earlier. Stable versions first (larger major
/// preferred), then beta (lower beta index preferred, then larger
/// major), then alpha, then anything unparsable.
fn version_rank(version: &str) -> (u8, u32, Reverse<u32>) {
    match parse_version(version) {
        Some((major, Stability::Stable)) => (0, 0, Reverse(major)),
        Some((major, Stability::Beta(index))) => (1, index, Reverse(major)),
        Some((major, Stability::Alpha(index))) => (2, index, Reverse(major)),
        None => (3, 0, Reverse(0)),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Stability {
    Stable,
    Beta(u32),
    Alpha(u32),
}

/// Parse `v<major>[alpha|beta<index>]`.
fn parse_version(version: &str) -> Option<(u32, Stability)> {
    let rest = version.strip_prefix('v')?;
    let split = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    let (major_digits, suffix) = rest.split_at(split);
    let major: u32 = major_digits.parse().ok()?;

    if suffix.is_empty() {
        return Some((major, Stability::Stable));
    }
    if let Some(index) = suffix.strip_prefix("beta") {
        return Some((major, Stability::Beta(index.parse().ok()?)));
    }
    if let Some(index) = suffix.strip_prefix("alpha") {
        return Some((major, Stability::Alpha(index.parse().ok()?)));
    }
    None
}

/// Title-cased singular guess for an unknown plural, e.g. `widgets` →
/// `Widget`.
fn guess_kind(resource: &str) -> String {
    let singular = resource.strip_suffix('s').unwrap_or(resource);
    let mut chars = singular.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

lazy_static! {
    /// Well-known resource plurals and their canonical group/version and
    /// kind, used when API discovery cannot answer.
    static ref WELL_KNOWN_RESOURCES: HashMap<&'static str, (&'static str, &'static str)> = {
        let mut m = HashMap::new();
        // Core group
        m.insert("pods", ("v1", "Pod"));
        m.insert("services", ("v1", "Service"));
        m.insert("endpoints", ("v1", "Endpoints"));
        m.insert("namespaces", ("v1", "Namespace"));
        m.insert("nodes", ("v1", "Node"));
        m.insert("configmaps", ("v1", "ConfigMap"));
        m.insert("secrets", ("v1", "Secret"));
        m.insert("serviceaccounts", ("v1", "ServiceAccount"));
        m.insert("persistentvolumes", ("v1", "PersistentVolume"));
        m.insert("persistentvolumeclaims", ("v1", "PersistentVolumeClaim"));
        m.insert("events", ("v1", "Event"));
        m.insert("limitranges", ("v1", "LimitRange"));
        m.insert("resourcequotas", ("v1", "ResourceQuota"));
        m.insert("replicationcontrollers", ("v1", "ReplicationController"));
        m.insert("podtemplates", ("v1", "PodTemplate"));
        m.insert("componentstatuses", ("v1", "ComponentStatus"));
        // apps
        m.insert("deployments", ("apps/v1", "Deployment"));
        m.insert("replicasets", ("apps/v1", "ReplicaSet"));
        m.insert("statefulsets", ("apps/v1", "StatefulSet"));
        m.insert("daemonsets", ("apps/v1", "DaemonSet"));
        m.insert("controllerrevisions", ("apps/v1", "ControllerRevision"));
        // batch
        m.insert("jobs", ("batch/v1", "Job"));
        m.insert("cronjobs", ("batch/v1", "CronJob"));
        // autoscaling
        m.insert("horizontalpodautoscalers", ("autoscaling/v2", "HorizontalPodAutoscaler"));
        // networking.k8s.io
        m.insert("ingresses", ("networking.k8s.io/v1", "Ingress"));
        m.insert("ingressclasses", ("networking.k8s.io/v1", "IngressClass"));
        m.insert("networkpolicies", ("networking.k8s.io/v1", "NetworkPolicy"));
        // policy
        m.insert("poddisruptionbudgets", ("policy/v1", "PodDisruptionBudget"));
        // rbac.authorization.k8s.io
        m.insert("roles", ("rbac.authorization.k8s.io/v1", "Role"));
        m.insert("rolebindings", ("rbac.authorization.k8s.io/v1", "RoleBinding"));
        m.insert("clusterroles", ("rbac.authorization.k8s.io/v1", "ClusterRole"));
        m.insert("clusterrolebindings", ("rbac.authorization.k8s.io/v1", "ClusterRoleBinding"));
        // storage.k8s.io
        m.insert("storageclasses", ("storage.k8s.io/v1", "StorageClass"));
        m.insert("volumeattachments", ("storage.k8s.io/v1", "VolumeAttachment"));
        m.insert("csidrivers", ("storage.k8s.io/v1", "CSIDriver"));
        m.insert("csinodes", ("storage.k8s.io/v1", "CSINode"));
        m.insert("csistoragecapacities", ("storage.k8s.io/v1", "CSIStorageCapacity"));
        // apiextensions.k8s.io
        m.insert("customresourcedefinitions", ("apiextensions.k8s.io/v1", "CustomResourceDefinition"));
        // apiregistration.k8s.io
        m.insert("apiservices", ("apiregistration.k8s.io/v1", "APIService"));
        // admissionregistration.k8s.io
        m.insert("mutatingwebhookconfigurations", ("admissionregistration.k8s.io/v1", "MutatingWebhookConfiguration"));
        m.insert("validatingwebhookconfigurations", ("admissionregistration.k8s.io/v1", "ValidatingWebhookConfiguration"));
        m.insert("validatingadmissionpolicies", ("admissionregistration.k8s.io/v1", "ValidatingAdmissionPolicy"));
        m.insert("validatingadmissionpolicybindings", ("admissionregistration.k8s.io/v1", "ValidatingAdmissionPolicyBinding"));
        // certificates.k8s.io
        m.insert("certificatesigningrequests", ("certificates.k8s.io/v1", "CertificateSigningRequest"));
        // coordination.k8s.io
        m.insert("leases", ("coordination.k8s.io/v1", "Lease"));
        // discovery.k8s.io
        m.insert("endpointslices", ("discovery.k8s.io/v1", "EndpointSlice"));
        // flowcontrol.apiserver.k8s.io
        m.insert("flowschemas", ("flowcontrol.apiserver.k8s.io/v1", "FlowSchema"));
        m.insert("prioritylevelconfigurations", ("flowcontrol.apiserver.k8s.io/v1", "PriorityLevelConfiguration"));
        // node.k8s.io
        m.insert("runtimeclasses", ("node.k8s.io/v1", "RuntimeClass"));
        // scheduling.k8s.io
        m.insert("priorityclasses", ("scheduling.k8s.io/v1", "PriorityClass"));
        // authentication / authorization
        m.insert("tokenreviews", ("authentication.k8s.io/v1", "TokenReview"));
        m.insert("subjectaccessreviews", ("authorization.k8s.io/v1", "SubjectAccessReview"));
        m.insert("selfsubjectaccessreviews", ("authorization.k8s.io/v1", "SelfSubjectAccessReview"));
        m.insert("selfsubjectrulesreviews", ("authorization.k8s.io/v1", "SelfSubjectRulesReview"));
        m.insert("localsubjectaccessreviews", ("authorization.k8s.io/v1", "LocalSubjectAccessReview"));
        // monitoring.coreos.com (prometheus-operator)
        m.insert("servicemonitors", ("monitoring.coreos.com/v1", "ServiceMonitor"));
        m.insert("podmonitors", ("monitoring.coreos.com/v1", "PodMonitor"));
        m.insert("prometheuses", ("monitoring.coreos.com/v1", "Prometheus"));
        m.insert("prometheusrules", ("monitoring.coreos.com/v1", "PrometheusRule"));
        m.insert("alertmanagers", ("monitoring.coreos.com/v1", "Alertmanager"));
        // cert-manager.io
        m.insert("certificates", ("cert-manager.io/v1", "Certificate"));
        m.insert("certificaterequests", ("cert-manager.io/v1", "CertificateRequest"));
        m.insert("issuers", ("cert-manager.io/v1", "Issuer"));
        m.insert("clusterissuers", ("cert-manager.io/v1", "ClusterIssuer"));
        // metrics.k8s.io
        m.insert("podmetrics", ("metrics.k8s.io/v1beta1", "PodMetrics"));
        m.insert("nodemetrics", ("metrics.k8s.io/v1beta1", "NodeMetrics"));
        // snapshot.storage.k8s.io
        m.insert("volumesnapshots", ("snapshot.storage.k8s.io/v1", "VolumeSnapshot"));
        m.insert("volumesnapshotclasses", ("snapshot.storage.k8s.io/v1", "VolumeSnapshotClass"));
        m.insert("volumesnapshotcontents", ("snapshot.storage.k8s.io/v1", "VolumeSnapshotContent"));
        // gateway.networking.k8s.io
        m.insert("gateways", ("gateway.networking.k8s.io/v1", "Gateway"));
        m.insert("gatewayclasses", ("gateway.networking.k8s.io/v1", "GatewayClass"));
        m.insert("httproutes", ("gateway.networking.k8s.io/v1", "HTTPRoute"));
        m.insert("grpcroutes", ("gateway.networking.k8s.io/v1", "GRPCRoute"));
        m.insert("referencegrants", ("gateway.networking.k8s.io/v1beta1", "ReferenceGrant"));
        // keda.sh
        m.insert("scaledobjects", ("keda.sh/v1alpha1", "ScaledObject"));
        m.insert("scaledjobs", ("keda.sh/v1alpha1", "ScaledJob"));
        // bindings and reviews
        m.insert("bindings", ("v1", "Binding"));
        m
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiResource;
    use crate::error::ReconcileError;
    use async_trait::async_trait;
    use deploykit_manifest::ResourceIdentity;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeDiscovery {
        groups: Vec<(String, Vec<ApiResource>)>,
        discovery_calls: AtomicUsize,
        failures_before_success: usize,
    }

    impl FakeDiscovery {
        fn new(groups: Vec<(&str, Vec<(&str, &str)>)>) -> Self {
            let groups = groups
                .into_iter()
                .map(|(gv, resources)| {
                    (
                        gv.to_string(),
                        resources
                            .into_iter()
                            .map(|(name, kind)| ApiResource {
                                name: name.to_string(),
                                kind: kind.to_string(),
                                namespaced: true,
                            })
                            .collect(),
                    )
                })
                .collect();
            Self { groups, discovery_calls: AtomicUsize::new(0), failures_before_success: 0 }
        }
    }

    #[async_trait]
    impl ClusterApi for FakeDiscovery {
        async fn get(
            &self,
            _identity: &ResourceIdentity,
            _plural: &str,
        ) -> crate::error::ReconcileResult<Option<Value>> {
            unimplemented!("discovery-only fake")
        }
        async fn create(
            &self,
            _identity: &ResourceIdentity,
            _plural: &str,
            _manifest: &Value,
        ) -> crate::error::ReconcileResult<Value> {
            unimplemented!("discovery-only fake")
        }
        async fn merge_patch(
            &self,
            _identity: &ResourceIdentity,
            _plural: &str,
            _patch: &Value,
        ) -> crate::error::ReconcileResult<Value> {
            unimplemented!("discovery-only fake")
        }
        async fn delete(
            &self,
            _identity: &ResourceIdentity,
            _plural: &str,
        ) -> crate::error::ReconcileResult<()> {
            unimplemented!("discovery-only fake")
        }

        async fn list_group_versions(&self) -> crate::error::ReconcileResult<Vec<String>> {
            let call = self.discovery_calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success || self.groups.is_empty() {
                return Err(ReconcileError::Api {
                    status: 503,
                    message: "discovery unavailable".to_string(),
                });
            }
            Ok(self.groups.iter().map(|(gv, _)| gv.clone()).collect())
        }

        async fn list_group_resources(
            &self,
            group_version: &str,
        ) -> crate::error::ReconcileResult<Vec<ApiResource>> {
            Ok(self
                .groups
                .iter()
                .find(|(gv, _)| gv == group_version)
                .map(|(_, resources)| resources.clone())
                .unwrap_or_default())
        }
    }

    #[test]
    fn version_ranking_orders_stable_beta_alpha() {
        let mut versions = vec![
            "v1beta1".to_string(),
            "v2".to_string(),
            "v1".to_string(),
            "v1alpha2".to_string(),
        ];
        rank_group_versions(&mut versions);
        assert_eq!(versions, ["v2", "v1", "v1beta1", "v1alpha2"]);
    }

    #[test]
    fn lower_beta_index_is_preferred() {
        let mut versions = vec!["v1beta2".to_string(), "v1beta1".to_string()];
        rank_group_versions(&mut versions);
        assert_eq!(versions, ["v1beta1", "v1beta2"]);
    }

    #[test]
    fn multi_digit_majors_compare_numerically() {
        let mut versions = vec!["v2".to_string(), "v10".to_string()];
        rank_group_versions(&mut versions);
        assert_eq!(versions, ["v10", "v2"]);
    }

    #[test]
    fn unparsable_versions_rank_last() {
        let mut versions = vec!["weird".to_string(), "v1".to_string()];
        rank_group_versions(&mut versions);
        assert_eq!(versions, ["v1", "weird"]);
    }

    #[test]
    fn guess_kind_title_cases_the_singular() {
        assert_eq!(guess_kind("widgets"), "Widget");
        assert_eq!(guess_kind("pods"), "Pod");
    }

    #[tokio::test]
    async fn resolve_uses_discovery_and_ranks_candidates() {
        let api = FakeDiscovery::new(vec![
            ("apps/v1beta1", vec![("deployments", "Deployment")]),
            ("apps/v1", vec![("deployments", "Deployment")]),
        ]);
        let resolver = ResourceTypeResolver::new(api);
        let resolved = resolver.resolve("deployments").await.unwrap();
        assert_eq!(resolved.kind, "Deployment");
        assert_eq!(resolved.best(), "apps/v1");
        assert_eq!(resolved.group_versions.len(), 2);
    }

    #[tokio::test]
    async fn discovery_runs_once_until_invalidated() {
        let api = FakeDiscovery::new(vec![("v1", vec![("pods", "Pod")])]);
        let resolver = ResourceTypeResolver::new(api);
        resolver.resolve("pods").await.unwrap();
        resolver.resolve("pods").await.unwrap();
        assert_eq!(resolver.api.discovery_calls.load(Ordering::SeqCst), 1);

        resolver.invalidate().await;
        resolver.resolve("pods").await.unwrap();
        assert_eq!(resolver.api.discovery_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn discovery_miss_falls_back_to_static_table() {
        let api = FakeDiscovery::new(vec![("v1", vec![("pods", "Pod")])]);
        let resolver = ResourceTypeResolver::new(api);
        let resolved = resolver.resolve("deployments").await.unwrap();
        assert_eq!(resolved.kind, "Deployment");
        assert_eq!(resolved.best(), "apps/v1");
    }

    #[tokio::test]
    async fn unknown_resource_defaults_to_v1_with_guessed_kind() {
        let api = FakeDiscovery::new(vec![("v1", vec![("pods", "Pod")])]);
        let resolver = ResourceTypeResolver::new(api);
        let resolved = resolver.resolve("frobnicators").await.unwrap();
        assert_eq!(resolved.kind, "Frobnicator");
        assert_eq!(resolved.group_versions, ["v1"]);
    }

    #[tokio::test]
    async fn transient_discovery_failure_is_retried_on_next_resolve() {
        let mut api =
            FakeDiscovery::new(vec![("apps/v1", vec![("frobnicators", "Frobnicator")])]);
        api.failures_before_success = 1;
        let resolver = ResourceTypeResolver::new(api);

        // First resolve rides the default while discovery is down.
        let first = resolver.resolve("frobnicators").await.unwrap();
        assert_eq!(first.group_versions, ["v1"]);

        // Next resolve re-runs discovery rather than trusting an empty cache.
        let second = resolver.resolve("frobnicators").await.unwrap();
        assert_eq!(second.best(), "apps/v1");
        assert_eq!(resolver.api.discovery_calls.load(Ordering::SeqCst), 2);

        // Successful discovery is cached as usual.
        resolver.resolve("frobnicators").await.unwrap();
        assert_eq!(resolver.api.discovery_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_discovery_still_answers_from_fallback() {
        let api = FakeDiscovery::new(vec![]);
        let resolver = ResourceTypeResolver::new(api);
        let resolved = resolver.resolve("services").await.unwrap();
        assert_eq!(resolved.kind, "Service");
        assert_eq!(resolved.best(), "v1");
    }

    #[tokio::test]
    async fn plural_for_kind_prefers_discovery() {
        let api = FakeDiscovery::new(vec![("apps/v1", vec![("deployments", "Deployment")])]);
        let resolver = ResourceTypeResolver::new(api);
        assert_eq!(resolver.plural_for_kind("Deployment").await.unwrap(), "deployments");
        assert_eq!(resolver.plural_for_kind("Widget").await.unwrap(), "widgets");
    }
}
