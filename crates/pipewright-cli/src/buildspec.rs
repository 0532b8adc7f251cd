//! Build specification (`buildspec.yml`) model
//!
//! Only the five fields pipewright edits are typed as strings. Every other
//! value is held as a YAML value, so numbers, booleans and quoting survive an
//! edit, and keys the model does not name land in an `extra` mapping.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use pipewright_common::naming::ResourceNames;

use crate::{Error, Result};

/// Top-level build specification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<BuildEnv>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phases: Option<Phases>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Artifacts>,
    #[serde(flatten)]
    pub extra: Mapping,
}

/// `env` group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildEnv {
    #[serde(
        rename = "secrets-manager",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub secrets_manager: Option<SecretRefs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Variables>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<Value>,
    #[serde(flatten)]
    pub extra: Mapping,
}

/// Secrets Manager references, `<secret>:<key>`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecretRefs {
    #[serde(rename = "SONAR_TOKEN", default, skip_serializing_if = "Option::is_none")]
    pub sonar_token: Option<String>,
    #[serde(rename = "SONAR_HOST_URL", default, skip_serializing_if = "Option::is_none")]
    pub sonar_host_url: Option<String>,
    #[serde(flatten)]
    pub extra: Mapping,
}

/// Plain environment variables handed to the build. Only
/// `IMAGE_REPO_NAME`, `EKS_CLUSTER_NAME` and `EKS_ROLE` are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Variables {
    #[serde(rename = "SourceBranch", default, skip_serializing_if = "Option::is_none")]
    pub source_branch: Option<Value>,
    #[serde(rename = "DestinationBranch", default, skip_serializing_if = "Option::is_none")]
    pub destination_branch: Option<Value>,
    #[serde(rename = "IMAGE_REPO_NAME", default, skip_serializing_if = "Option::is_none")]
    pub image_repo_name: Option<String>,
    #[serde(rename = "IMAGE_TAG", default, skip_serializing_if = "Option::is_none")]
    pub image_tag: Option<Value>,
    #[serde(rename = "EKS_CLUSTER_NAME", default, skip_serializing_if = "Option::is_none")]
    pub eks_cluster_name: Option<String>,
    #[serde(rename = "EKS_NS_APP", default, skip_serializing_if = "Option::is_none")]
    pub eks_ns_app: Option<Value>,
    #[serde(
        rename = "EKS_CODEBUILD_APP_SVC",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub eks_codebuild_app_svc: Option<Value>,
    #[serde(rename = "EKS_DEPLOY_APP", default, skip_serializing_if = "Option::is_none")]
    pub eks_deploy_app: Option<Value>,
    #[serde(rename = "EKS_ROLE", default, skip_serializing_if = "Option::is_none")]
    pub eks_role: Option<String>,
    #[serde(rename = "SONAR_PROJECT", default, skip_serializing_if = "Option::is_none")]
    pub sonar_project: Option<Value>,
    #[serde(rename = "PRKey", default, skip_serializing_if = "Option::is_none")]
    pub pr_key: Option<Value>,
    #[serde(flatten)]
    pub extra: Mapping,
}

/// `phases` group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Phases {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install: Option<Phase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_build: Option<Phase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<Phase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_build: Option<Phase>,
    #[serde(flatten)]
    pub extra: Mapping,
}

/// A single build phase
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    #[serde(
        rename = "runtime-versions",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub runtime_versions: Option<Mapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands: Option<Vec<Value>>,
    #[serde(flatten)]
    pub extra: Mapping,
}

/// `artifacts` group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<Value>>,
    #[serde(
        rename = "discard-paths",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub discard_paths: Option<Value>,
    #[serde(flatten)]
    pub extra: Mapping,
}

/// The values written into a build specification for one environment.
///
/// These five fields are the contract with the pipeline that consumes the
/// file; nothing else is changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSpecEdits {
    /// `env.secrets-manager.SONAR_TOKEN`
    pub sonar_token: String,
    /// `env.secrets-manager.SONAR_HOST_URL`
    pub sonar_host_url: String,
    /// `env.variables.IMAGE_REPO_NAME`
    pub image_repo_name: String,
    /// `env.variables.EKS_CLUSTER_NAME`
    pub eks_cluster_name: String,
    /// `env.variables.EKS_ROLE`
    pub eks_role: String,
}

impl BuildSpecEdits {
    pub fn from_names(names: &ResourceNames) -> Self {
        Self {
            sonar_token: names.sonar_token_ref(),
            sonar_host_url: names.sonar_host_ref(),
            image_repo_name: names.image_repository.clone(),
            eks_cluster_name: names.cluster.clone(),
            eks_role: names.admin_role.clone(),
        }
    }
}

impl BuildSpec {
    pub fn from_yaml(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    pub fn to_yaml(&self) -> std::result::Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Set the edited fields, creating missing groups on the way
    pub fn apply(&mut self, edits: &BuildSpecEdits) {
        let env = self.env.get_or_insert_with(BuildEnv::default);

        let secrets = env.secrets_manager.get_or_insert_with(SecretRefs::default);
        secrets.sonar_token = Some(edits.sonar_token.clone());
        secrets.sonar_host_url = Some(edits.sonar_host_url.clone());

        let variables = env.variables.get_or_insert_with(Variables::default);
        variables.image_repo_name = Some(edits.image_repo_name.clone());
        variables.eks_cluster_name = Some(edits.eks_cluster_name.clone());
        variables.eks_role = Some(edits.eks_role.clone());
    }
}

/// Rewrite the build specification at `path` in place
pub fn edit_file(path: &Path, edits: &BuildSpecEdits) -> Result<BuildSpec> {
    let content = std::fs::read_to_string(path)?;
    let mut spec =
        BuildSpec::from_yaml(&content).map_err(|e| Error::build_spec(path, e.to_string()))?;
    spec.apply(edits);
    std::fs::write(path, spec.to_yaml()?)?;
    Ok(spec)
}
