//! Kubernetes client construction and kubeconfig inspection

use std::path::Path;
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

use pipewright_common::{Error, Result};

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a kube client from an optional kubeconfig path.
///
/// Without a path the usual chain applies: in-cluster config, then
/// `KUBECONFIG`, then `~/.kube/config`.
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = read_kubeconfig(Some(path))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::internal("create_client", format!("failed to load kubeconfig: {}", e))
                })?
        }
        None => Config::infer().await.map_err(|e| {
            Error::internal("create_client", format!("failed to infer config: {}", e))
        })?,
    };
    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);
    Client::try_from(config)
        .map_err(|e| Error::internal("create_client", format!("failed to create client: {}", e)))
}

/// Name of the cluster the kubeconfig's current context points at.
///
/// EKS kubeconfigs name clusters by ARN; the name is the segment after the
/// last `/`.
pub fn current_cluster_name(kubeconfig: Option<&Path>) -> Result<String> {
    cluster_name_from(&read_kubeconfig(kubeconfig)?)
}

fn read_kubeconfig(path: Option<&Path>) -> Result<Kubeconfig> {
    let result = match path {
        Some(path) => Kubeconfig::read_from(path),
        None => Kubeconfig::read(),
    };
    result.map_err(|e| Error::internal("kubeconfig", format!("failed to read kubeconfig: {}", e)))
}

fn cluster_name_from(kubeconfig: &Kubeconfig) -> Result<String> {
    let current = kubeconfig
        .current_context
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| Error::internal("kubeconfig", "current context not set in kubeconfig"))?;

    let cluster = kubeconfig
        .contexts
        .iter()
        .find(|c| c.name == current)
        .and_then(|c| c.context.as_ref())
        .map(|c| c.cluster.as_str())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| {
            Error::internal(
                "kubeconfig",
                format!("cluster name not found for context {}", current),
            )
        })?;

    Ok(cluster.rsplit('/').next().unwrap_or(cluster).to_string())
}
