//! Settings loaded from the two JSON configuration files.
//!
//! - the per-environment file (`config.json`) names the application
//!   resources: repositories, cluster, roles, storage class
//! - the shared file (`config_crd.json`) carries account, region, SSO
//!   profile and the environment `Index` suffix
//!
//! Both are read once at startup and never written back. Missing keys
//! deserialize to empty values rather than failing; [`Settings::warnings`]
//! lists the ones the bootstrap depends on so the CLI can report them.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{Credentials, Error, Result};

/// Per-environment settings (`config.json`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentSettings {
    /// Source repository base name
    #[serde(rename = "Reponame")]
    pub repo_name: String,
    /// Source repository description
    #[serde(rename = "Desc")]
    pub description: String,
    /// URL of the template repository to clone
    #[serde(rename = "GitRepo")]
    pub git_repo: String,
    /// Container image repository base name
    #[serde(rename = "Recr")]
    pub image_repo: String,
    /// Container image tag
    #[serde(rename = "ImgTag")]
    pub image_tag: String,
    /// Build project base name
    #[serde(rename = "BuildPr")]
    pub build_project: String,
    /// Pipeline base name
    #[serde(rename = "PiplineN")]
    pub pipeline_name: String,
    /// Cluster base name
    #[serde(rename = "ClusterName")]
    pub cluster_name: String,
    /// Suffix of the cluster admin role name
    #[serde(rename = "EksAdminRole")]
    pub admin_role_suffix: String,
    /// Second branch kept in lockstep with `main`
    #[serde(rename = "SecondBramchName")]
    pub second_branch: String,
    /// VPC the cluster lives in
    #[serde(rename = "VPCid")]
    pub vpc_id: String,
    /// Kubernetes version of the cluster
    #[serde(rename = "K8sVersion")]
    pub k8s_version: String,
    /// Worker node count
    #[serde(rename = "Workernode")]
    pub worker_nodes: f64,
    /// Suffix of the EBS CSI driver role name
    #[serde(rename = "EBSRole")]
    pub ebs_role_suffix: String,
    /// Worker instance class
    #[serde(rename = "Instance")]
    pub instance: String,
    /// Worker instance size
    #[serde(rename = "InstanceSize")]
    pub instance_size: String,
    /// EBS CSI addon version
    #[serde(rename = "AddonVersion")]
    pub addon_version: String,
    /// StorageClass name
    #[serde(rename = "ScName")]
    pub storage_class_name: String,
    /// Path of the StorageClass manifest
    #[serde(rename = "ScNamef")]
    pub storage_class_file: String,
}

/// Shared account settings (`config_crd.json`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedSettings {
    /// AWS region
    #[serde(rename = "Region")]
    pub region: String,
    /// AWS account id
    #[serde(rename = "Account")]
    pub account: String,
    /// Named SSO profile used for every AWS and git call
    #[serde(rename = "SSOProfile")]
    pub sso_profile: String,
    /// Environment suffix appended to every generated name
    #[serde(rename = "Index")]
    pub index: String,
    /// Secrets Manager secret base name
    #[serde(rename = "AWSsecret")]
    pub secret_name: String,
}

/// Both configuration files, loaded together
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    /// Per-environment settings
    pub environment: EnvironmentSettings,
    /// Shared account settings
    pub shared: SharedSettings,
}

impl Settings {
    /// Load and parse both files. Either one failing is a configuration error.
    pub fn load(primary: &Path, shared: &Path) -> Result<Self> {
        Ok(Self {
            environment: read_json(primary)?,
            shared: read_json(shared)?,
        })
    }

    /// Credentials threaded through every AWS call
    pub fn credentials(&self) -> Credentials {
        Credentials::new(
            &self.shared.region,
            &self.shared.account,
            &self.shared.sso_profile,
        )
    }

    /// Keys the bootstrap relies on that were left empty
    pub fn warnings(&self) -> Vec<&'static str> {
        let env = &self.environment;
        let shared = &self.shared;
        [
            ("Reponame", env.repo_name.is_empty()),
            ("GitRepo", env.git_repo.is_empty()),
            ("Recr", env.image_repo.is_empty()),
            ("ClusterName", env.cluster_name.is_empty()),
            ("EksAdminRole", env.admin_role_suffix.is_empty()),
            ("SecondBramchName", env.second_branch.is_empty()),
            ("Region", shared.region.is_empty()),
            ("Account", shared.account.is_empty()),
            ("SSOProfile", shared.sso_profile.is_empty()),
            ("Index", shared.index.is_empty()),
            ("AWSsecret", shared.secret_name.is_empty()),
        ]
        .into_iter()
        .filter_map(|(key, missing)| missing.then_some(key))
        .collect()
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| Error::config(PathBuf::from(path), format!("failed to read: {}", e)))?;
    serde_json::from_str(&data)
        .map_err(|e| Error::config(PathBuf::from(path), format!("failed to parse: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let primary = write(
            &dir,
            "config.json",
            r#"{
                "Reponame": "app",
                "GitRepo": "https://example.com/app.git",
                "Recr": "app-images",
                "ClusterName": "demo",
                "EksAdminRole": "AdminRole",
                "SecondBramchName": "develop",
                "Workernode": 3,
                "ScName": "managed-csi"
            }"#,
        );
        let shared = write(
            &dir,
            "config_crd.json",
            r#"{
                "Region": "eu-central-1",
                "Account": "123456789012",
                "SSOProfile": "dev",
                "Index": "02",
                "AWSsecret": "sonar"
            }"#,
        );

        let settings = Settings::load(&primary, &shared).unwrap();
        assert_eq!(settings.environment.cluster_name, "demo");
        assert_eq!(settings.environment.second_branch, "develop");
        assert_eq!(settings.environment.worker_nodes, 3.0);
        assert_eq!(settings.shared.index, "02");
        assert_eq!(settings.credentials().profile, "dev");
        assert!(settings.warnings().is_empty());
    }

    #[test]
    fn missing_keys_become_empty_and_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let primary = write(&dir, "config.json", r#"{"ClusterName": "demo", "Extra": 1}"#);
        let shared = write(&dir, "config_crd.json", r#"{"Index": "02"}"#);

        let settings = Settings::load(&primary, &shared).unwrap();
        assert_eq!(settings.environment.repo_name, "");
        let warnings = settings.warnings();
        assert!(warnings.contains(&"Reponame"));
        assert!(warnings.contains(&"Account"));
        assert!(!warnings.contains(&"ClusterName"));
        assert!(!warnings.contains(&"Index"));
    }

    #[test]
    fn unreadable_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let shared = write(&dir, "config_crd.json", "{}");
        let err = Settings::load(&dir.path().join("absent.json"), &shared).unwrap_err();
        assert!(matches!(err, Error::Config { ref path, .. } if path.ends_with("absent.json")));
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let primary = write(&dir, "config.json", "{}");
        let shared = write(&dir, "config_crd.json", "{ not json");
        let err = Settings::load(&primary, &shared).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }
}
