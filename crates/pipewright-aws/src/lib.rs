//! AWS service seams for pipewright
//!
//! Each AWS capability the bootstrap needs sits behind a small async trait so
//! the reconciliation steps can be exercised without an account. [`AwsCli`]
//! implements all of them on top of the `aws` command line tool, passing the
//! profile and region from [`Credentials`] explicitly on every call.
//!
//! - [`iam`] - trust policy read-modify-write
//! - [`eks`] - cluster status and the OIDC issuer
//! - [`codecommit`] - repository existence
//! - [`cloudformation`] - stack outputs

#![deny(missing_docs)]

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use pipewright_common::Result;

pub mod cli;
pub mod cloudformation;
pub mod codecommit;
pub mod eks;
pub mod iam;

pub use cli::AwsCli;
pub use pipewright_common::Credentials;

/// Read and write role trust policies
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Current trust policy of `role`, as stored (possibly URL-encoded JSON)
    async fn get_trust_policy(&self, role: &str) -> Result<String>;

    /// Replace the trust policy of `role` wholesale
    async fn update_trust_policy(&self, role: &str, document: &str) -> Result<()>;
}

/// Status of a managed cluster as reported by the control plane API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterDescription {
    /// Lifecycle status
    pub status: eks::ClusterStatus,
    /// OIDC issuer URL, present once the cluster is active
    pub oidc_issuer: Option<String>,
}

/// Query managed cluster status
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterStatusApi: Send + Sync {
    /// Describe the cluster called `name`
    async fn describe_cluster(&self, name: &str) -> Result<ClusterDescription>;
}

/// Query source repositories
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RepositoryApi: Send + Sync {
    /// Succeeds once the repository called `name` exists
    async fn get_repository(&self, name: &str) -> Result<()>;
}

/// A single stack output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackOutput {
    /// Output logical key
    pub key: String,
    /// Output value
    pub value: String,
}

/// Query provisioning stacks
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StackApi: Send + Sync {
    /// Outputs of the stack called `name`, in the order they are reported
    async fn describe_stack_outputs(&self, name: &str) -> Result<Vec<StackOutput>>;
}
