//! `aws` command line backed implementation of the service traits
//!
//! Every call runs `aws <service> <operation> ... --output json` with the
//! profile and region from [`Credentials`], under a timeout.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::value::RawValue;
use tokio::process::Command;
use tracing::{debug, warn};

use pipewright_common::{Credentials, Error, Result};

use crate::eks::ClusterStatus;
use crate::{
    ClusterDescription, ClusterStatusApi, IdentityStore, RepositoryApi, StackApi, StackOutput,
};

/// Timeout for a single `aws` invocation
const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Service client that shells out to the `aws` CLI
#[derive(Debug, Clone)]
pub struct AwsCli {
    credentials: Credentials,
    program: String,
}

impl AwsCli {
    /// Client using the `aws` binary on `PATH`
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            program: "aws".to_string(),
        }
    }

    /// Client using a specific `aws` binary
    pub fn with_program(credentials: Credentials, program: impl Into<String>) -> Self {
        Self {
            credentials,
            program: program.into(),
        }
    }

    /// Run `aws <service> <operation> <args>` and return its stdout
    async fn run(&self, service: &str, operation: &str, args: &[&str]) -> Result<String> {
        let description = format!("{} {}", service, operation);
        let mut cmd = Command::new(&self.program);
        cmd.arg(service)
            .arg(operation)
            .args(args)
            .args(self.credentials.cli_args())
            .arg("--output")
            .arg("json")
            .kill_on_drop(true);

        debug!(command = %description, "running aws cli");
        let output = tokio::time::timeout(COMMAND_TIMEOUT, cmd.output())
            .await
            .map_err(|_| {
                Error::aws(&description, format!("timed out after {:?}", COMMAND_TIMEOUT))
            })?
            .map_err(|e| Error::aws(&description, format!("failed to execute: {}", e)))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let err = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(command = %description, error = %err, "aws cli failed");
            Err(Error::aws(description, err))
        }
    }
}

#[async_trait]
impl IdentityStore for AwsCli {
    async fn get_trust_policy(&self, role: &str) -> Result<String> {
        let out = self.run("iam", "get-role", &["--role-name", role]).await?;
        parse_trust_policy(&out)
    }

    async fn update_trust_policy(&self, role: &str, document: &str) -> Result<()> {
        self.run(
            "iam",
            "update-assume-role-policy",
            &["--role-name", role, "--policy-document", document],
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ClusterStatusApi for AwsCli {
    async fn describe_cluster(&self, name: &str) -> Result<ClusterDescription> {
        let out = self.run("eks", "describe-cluster", &["--name", name]).await?;
        parse_cluster(&out)
    }
}

#[async_trait]
impl RepositoryApi for AwsCli {
    async fn get_repository(&self, name: &str) -> Result<()> {
        self.run("codecommit", "get-repository", &["--repository-name", name])
            .await?;
        Ok(())
    }
}

#[async_trait]
impl StackApi for AwsCli {
    async fn describe_stack_outputs(&self, name: &str) -> Result<Vec<StackOutput>> {
        let out = self
            .run("cloudformation", "describe-stacks", &["--stack-name", name])
            .await?;
        parse_stack_outputs(name, &out)
    }
}

#[derive(Deserialize)]
struct GetRoleOutput {
    #[serde(rename = "Role")]
    role: RoleOutput,
}

#[derive(Deserialize)]
struct RoleOutput {
    #[serde(rename = "AssumeRolePolicyDocument")]
    assume_role_policy_document: Box<RawValue>,
}

/// The raw API returns the document URL-encoded; the CLI decodes it into an
/// object. A string is returned still encoded, an object as its exact text.
fn parse_trust_policy(out: &str) -> Result<String> {
    let unexpected =
        |e: serde_json::Error| Error::aws("iam get-role", format!("unexpected output: {}", e));
    let parsed: GetRoleOutput = serde_json::from_str(out).map_err(unexpected)?;
    let document = parsed.role.assume_role_policy_document;
    if document.get().starts_with('"') {
        serde_json::from_str(document.get()).map_err(unexpected)
    } else {
        Ok(document.get().to_string())
    }
}

#[derive(Deserialize)]
struct DescribeClusterOutput {
    cluster: ClusterOutput,
}

#[derive(Deserialize)]
struct ClusterOutput {
    status: String,
    #[serde(default)]
    identity: Option<IdentityOutput>,
}

#[derive(Deserialize)]
struct IdentityOutput {
    #[serde(default)]
    oidc: Option<OidcOutput>,
}

#[derive(Deserialize)]
struct OidcOutput {
    #[serde(default)]
    issuer: Option<String>,
}

fn parse_cluster(out: &str) -> Result<ClusterDescription> {
    let parsed: DescribeClusterOutput = serde_json::from_str(out)
        .map_err(|e| Error::aws("eks describe-cluster", format!("unexpected output: {}", e)))?;
    Ok(ClusterDescription {
        status: ClusterStatus::from(parsed.cluster.status.as_str()),
        oidc_issuer: parsed
            .cluster
            .identity
            .and_then(|i| i.oidc)
            .and_then(|o| o.issuer),
    })
}

#[derive(Deserialize)]
struct DescribeStacksOutput {
    #[serde(rename = "Stacks", default)]
    stacks: Vec<StackDescription>,
}

#[derive(Deserialize)]
struct StackDescription {
    #[serde(rename = "Outputs", default)]
    outputs: Vec<RawOutput>,
}

#[derive(Deserialize)]
struct RawOutput {
    #[serde(rename = "OutputKey", default)]
    key: String,
    #[serde(rename = "OutputValue", default)]
    value: String,
}

fn parse_stack_outputs(stack: &str, out: &str) -> Result<Vec<StackOutput>> {
    let parsed: DescribeStacksOutput = serde_json::from_str(out).map_err(|e| {
        Error::aws(
            "cloudformation describe-stacks",
            format!("unexpected output: {}", e),
        )
    })?;
    let first = parsed.stacks.into_iter().next().ok_or_else(|| {
        Error::aws(
            "cloudformation describe-stacks",
            format!("stack {} not found", stack),
        )
    })?;
    Ok(first
        .outputs
        .into_iter()
        .map(|o| StackOutput {
            key: o.key,
            value: o.value,
        })
        .collect())
}
