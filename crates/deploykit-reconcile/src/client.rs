//! HTTP transport to the cluster API server.
//!
//! [`ClusterApi`] is the seam the engine and resolver talk through;
//! [`ClusterClient`] is the reqwest-backed implementation. Patches go out
//! as `application/merge-patch+json`. Non-2xx responses are normalized
//! through [`ReconcileError::from_api_response`] so callers see the
//! server's structured `Status.message` when one is available.

use crate::config::ClusterConfig;
use crate::error::{ReconcileError, ReconcileResult};
use async_trait::async_trait;
use deploykit_manifest::ResourceIdentity;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

/// One resource as reported by API discovery.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResource {
    /// Plural name, e.g. `deployments`.
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub namespaced: bool,
}

/// Cluster operations the reconciliation engine depends on.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Fetch a live object; `Ok(None)` when the server reports 404.
    async fn get(&self, identity: &ResourceIdentity, plural: &str)
    -> ReconcileResult<Option<Value>>;

    async fn create(
        &self,
        identity: &ResourceIdentity,
        plural: &str,
        manifest: &Value,
    ) -> ReconcileResult<Value>;

    async fn merge_patch(
        &self,
        identity: &ResourceIdentity,
        plural: &str,
        patch: &Value,
    ) -> ReconcileResult<Value>;

    async fn delete(&self, identity: &ResourceIdentity, plural: &str) -> ReconcileResult<()>;

    /// Every groupVersion the server exposes, core group (`v1`) included.
    async fn list_group_versions(&self) -> ReconcileResult<Vec<String>>;

    /// Resources served under one groupVersion.
    async fn list_group_resources(&self, group_version: &str)
    -> ReconcileResult<Vec<ApiResource>>;
}

#[async_trait]
impl<T: ClusterApi + ?Sized> ClusterApi for std::sync::Arc<T> {
    async fn get(
        &self,
        identity: &ResourceIdentity,
        plural: &str,
    ) -> ReconcileResult<Option<Value>> {
        (**self).get(identity, plural).await
    }

    async fn create(
        &self,
        identity: &ResourceIdentity,
        plural: &str,
        manifest: &Value,
    ) -> ReconcileResult<Value> {
        (**self).create(identity, plural, manifest).await
    }

    async fn merge_patch(
        &self,
        identity: &ResourceIdentity,
        plural: &str,
        patch: &Value,
    ) -> ReconcileResult<Value> {
        (**self).merge_patch(identity, plural, patch).await
    }

    async fn delete(&self, identity: &ResourceIdentity, plural: &str) -> ReconcileResult<()> {
        (**self).delete(identity, plural).await
    }

    async fn list_group_versions(&self) -> ReconcileResult<Vec<String>> {
        (**self).list_group_versions().await
    }

    async fn list_group_resources(
        &self,
        group_version: &str,
    ) -> ReconcileResult<Vec<ApiResource>> {
        (**self).list_group_resources(group_version).await
    }
}

/// reqwest-backed [`ClusterApi`] implementation.
pub struct ClusterClient {
    base_url: String,
    token: Option<String>,
    client: Client,
}

impl ClusterClient {
    pub fn new(config: &ClusterConfig) -> ReconcileResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.insecure_skip_tls_verify)
            .build()?;
        Ok(Self {
            base_url: config.api_server.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            client,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, format!("{}{path}", self.base_url));
        if let Some(token) = &self.token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder
    }

    async fn expect_json(response: reqwest::Response) -> ReconcileResult<Value> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ReconcileError::from_api_response(status.as_u16(), &body));
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Discovery path for a groupVersion: the core group lives under
    /// `/api/v1`, everything else under `/apis/<group>/<version>`.
    fn discovery_path(group_version: &str) -> String {
        if group_version == "v1" {
            "/api/v1".to_string()
        } else {
            format!("/apis/{group_version}")
        }
    }
}

#[async_trait]
impl ClusterApi for ClusterClient {
    #[instrument(skip(self), fields(identity = %identity))]
    async fn get(
        &self,
        identity: &ResourceIdentity,
        plural: &str,
    ) -> ReconcileResult<Option<Value>> {
        let response = self
            .request(reqwest::Method::GET, &identity.object_path(plural))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("live object absent");
            return Ok(None);
        }
        Self::expect_json(response).await.map(Some)
    }

    #[instrument(skip(self, manifest), fields(identity = %identity))]
    async fn create(
        &self,
        identity: &ResourceIdentity,
        plural: &str,
        manifest: &Value,
    ) -> ReconcileResult<Value> {
        let response = self
            .request(reqwest::Method::POST, &identity.collection_path(plural))
            .header("content-type", "application/json")
            .json(manifest)
            .send()
            .await?;
        Self::expect_json(response).await
    }

    #[instrument(skip(self, patch), fields(identity = %identity))]
    async fn merge_patch(
        &self,
        identity: &ResourceIdentity,
        plural: &str,
        patch: &Value,
    ) -> ReconcileResult<Value> {
        let response = self
            .request(reqwest::Method::PATCH, &identity.object_path(plural))
            .header("content-type", "application/merge-patch+json")
            .json(patch)
            .send()
            .await?;
        Self::expect_json(response).await
    }

    #[instrument(skip(self), fields(identity = %identity))]
    async fn delete(&self, identity: &ResourceIdentity, plural: &str) -> ReconcileResult<()> {
        let response = self
            .request(reqwest::Method::DELETE, &identity.object_path(plural))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            let body = response.text().await?;
            return Err(ReconcileError::from_api_response(status.as_u16(), &body));
        }
        Ok(())
    }

    async fn list_group_versions(&self) -> ReconcileResult<Vec<String>> {
        // Grouped APIs from /apis, plus the core group.
        let body = Self::expect_json(
            self.request(reqwest::Method::GET, "/apis").send().await?,
        )
        .await?;

        let mut versions = vec!["v1".to_string()];
        if let Some(groups) = body.get("groups").and_then(Value::as_array) {
            for group in groups {
                if let Some(group_versions) = group.get("versions").and_then(Value::as_array) {
                    for gv in group_versions {
                        if let Some(name) = gv.get("groupVersion").and_then(Value::as_str) {
                            versions.push(name.to_string());
                        }
                    }
                }
            }
        }
        Ok(versions)
    }

    async fn list_group_resources(
        &self,
        group_version: &str,
    ) -> ReconcileResult<Vec<ApiResource>> {
        let body = Self::expect_json(
            self.request(reqwest::Method::GET, &Self::discovery_path(group_version))
                .send()
                .await?,
        )
        .await?;

        let resources = body
            .get("resources")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    // Subresources like `deployments/status` are not
                    // addressable resource types.
                    .filter(|r| {
                        r.get("name")
                            .and_then(Value::as_str)
                            .is_some_and(|n| !n.contains('/'))
                    })
                    .filter_map(|r| serde_json::from_value(r.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();
        Ok(resources)
    }
}
