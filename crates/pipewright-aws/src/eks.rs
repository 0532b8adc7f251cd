//! Managed cluster readiness

use std::time::Duration;

use pipewright_common::poll::{wait_until_ready, ProbeErrorPolicy, Readiness, WaitPolicy};
use pipewright_common::{Error, Result};

use crate::ClusterStatusApi;

/// Interval between cluster status queries
pub const CLUSTER_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Cluster lifecycle status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterStatus {
    /// Being created
    Creating,
    /// Ready for use
    Active,
    /// Being deleted
    Deleting,
    /// Creation failed
    Failed,
    /// Being updated
    Updating,
    /// Waiting to be created
    Pending,
    /// Status this client does not know
    Other(String),
}

impl From<&str> for ClusterStatus {
    fn from(s: &str) -> Self {
        match s {
            "CREATING" => Self::Creating,
            "ACTIVE" => Self::Active,
            "DELETING" => Self::Deleting,
            "FAILED" => Self::Failed,
            "UPDATING" => Self::Updating,
            "PENDING" => Self::Pending,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Creating => "CREATING",
            Self::Active => "ACTIVE",
            Self::Deleting => "DELETING",
            Self::Failed => "FAILED",
            Self::Updating => "UPDATING",
            Self::Pending => "PENDING",
            Self::Other(s) => s,
        };
        f.write_str(s)
    }
}

/// Attributes only available once the cluster is active
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterAttributes {
    /// OIDC issuer URL of the cluster's identity provider
    pub oidc_issuer: String,
}

/// Block until `cluster` is ACTIVE and return its issuer.
///
/// Any non-ACTIVE status keeps the wait going. A failed status query is
/// fatal: the cluster was created by an earlier stage, so the API should
/// always know about it.
pub async fn wait_for_cluster(
    api: &dyn ClusterStatusApi,
    cluster: &str,
    policy: &WaitPolicy,
) -> Result<ClusterAttributes> {
    let what = format!("cluster {}", cluster);
    wait_until_ready(policy, &what, ProbeErrorPolicy::Fail, move || async move {
        let description = api.describe_cluster(cluster).await?;
        if description.status != ClusterStatus::Active {
            return Ok(Readiness::Pending(description.status.to_string()));
        }
        let oidc_issuer = description.oidc_issuer.ok_or_else(|| {
            Error::aws(
                "eks describe-cluster",
                format!("cluster {} is ACTIVE but reports no OIDC issuer", cluster),
            )
        })?;
        Ok(Readiness::Ready(ClusterAttributes { oidc_issuer }))
    })
    .await
}
