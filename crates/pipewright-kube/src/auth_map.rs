//! Role bindings in the cluster authorization ConfigMap.
//!
//! `aws-auth` maps IAM roles to in-cluster users and groups. Other actors
//! (another pipewright run, eksctl, node group controllers) write to the same
//! object, so every update is a read-modify-replace guarded by the object's
//! resourceVersion and retried on conflict.
//!
//! Existing `mapRoles` content is never rewritten or validated; the new
//! binding is appended as text.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, PostParams};
use kube::Client;
use tracing::info;

#[cfg(test)]
use mockall::automock;

use pipewright_common::retry::{retry_on_conflict, RetryConfig};
use pipewright_common::{
    Result, AUTH_CONFIGMAP_NAME, AUTH_CONFIGMAP_NAMESPACE, MAP_ROLES_KEY,
};

/// Username every appended role maps to
pub const ADMIN_USERNAME: &str = "admin";

/// Group every appended role joins
pub const ADMIN_GROUP: &str = "system:masters";

/// Versioned storage for a single ConfigMap
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConfigMapStore: Send + Sync {
    /// Current object, including its resourceVersion
    async fn get(&self) -> Result<ConfigMap>;

    /// Replace the object. Fails with a 409 conflict if the resourceVersion
    /// in `config_map` is no longer current.
    async fn replace(&self, config_map: &ConfigMap) -> Result<ConfigMap>;
}

/// [`ConfigMapStore`] backed by the Kubernetes API
pub struct KubeConfigMapStore {
    api: Api<ConfigMap>,
    name: String,
}

impl KubeConfigMapStore {
    /// Store for `namespace/name`
    pub fn new(client: Client, namespace: &str, name: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            name: name.to_string(),
        }
    }

    /// Store for `kube-system/aws-auth`
    pub fn aws_auth(client: Client) -> Self {
        Self::new(client, AUTH_CONFIGMAP_NAMESPACE, AUTH_CONFIGMAP_NAME)
    }
}

#[async_trait]
impl ConfigMapStore for KubeConfigMapStore {
    async fn get(&self) -> Result<ConfigMap> {
        Ok(self.api.get(&self.name).await?)
    }

    async fn replace(&self, config_map: &ConfigMap) -> Result<ConfigMap> {
        Ok(self
            .api
            .replace(&self.name, &PostParams::default(), config_map)
            .await?)
    }
}

/// `mapRoles` entry granting `role_arn` cluster-admin
pub fn render_role_binding(role_arn: &str) -> String {
    format!(
        "    - rolearn: {}\n      username: {}\n      groups:\n        - {}\n",
        role_arn, ADMIN_USERNAME, ADMIN_GROUP
    )
}

/// Append `binding` to the current `mapRoles` value
pub fn merge_map_roles(current: &str, binding: &str) -> String {
    format!("{}\n{}", current, binding)
}

/// Append a cluster-admin binding for `role_arn` to the ConfigMap in `store`.
///
/// Each attempt re-reads the object so a conflicting writer's change is kept.
/// Exhausting `retry` returns the last conflict.
pub async fn append_role_binding(
    store: &dyn ConfigMapStore,
    role_arn: &str,
    retry: &RetryConfig,
) -> Result<()> {
    let binding = render_role_binding(role_arn);
    let binding = binding.as_str();

    retry_on_conflict(retry, "append aws-auth role binding", move || async move {
        let mut config_map = store.get().await?;
        let data = config_map.data.get_or_insert_with(BTreeMap::new);
        let current = data.get(MAP_ROLES_KEY).cloned().unwrap_or_default();
        data.insert(MAP_ROLES_KEY.to_string(), merge_map_roles(&current, binding));
        store.replace(&config_map).await?;
        Ok(())
    })
    .await?;

    info!(role = %role_arn, "Role binding appended to aws-auth");
    Ok(())
}
