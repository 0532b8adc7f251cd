//! Resource names derived from settings.
//!
//! Every generated name carries the environment `Index` so several
//! environments can share one account.

use crate::config::Settings;

/// Role assumed by the build project
const BUILD_ROLE_PREFIX: &str = "BuildAdminRole";
/// Stack that owns the pipeline resources and exports the build role ARN
const DEVOPS_STACK_PREFIX: &str = "DevopsStack";
/// Stack that owns cluster-side configuration (CSI role, addon)
const CLUSTER_CONFIG_STACK_PREFIX: &str = "EksStackConfig";

/// Branch the build specification is edited on
pub const PRIMARY_BRANCH: &str = "main";

/// Build specification path inside the repository
pub const BUILD_SPEC_FILE: &str = "buildspec.yml";

/// All names for one environment instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    /// Cluster name (`ClusterName` + `Index`)
    pub cluster: String,
    /// Cluster admin role (cluster name + `EksAdminRole`)
    pub admin_role: String,
    /// EBS CSI driver role (cluster name + `EBSRole`)
    pub ebs_role: String,
    /// Source repository (`Reponame-Index`)
    pub repository: String,
    /// Container image repository (`Recr-Index`)
    pub image_repository: String,
    /// Secrets Manager secret (`AWSsecret` + `Index`)
    pub secret: String,
    /// Build role (`BuildAdminRole` + `Index`)
    pub build_role: String,
    /// ARN of the build role
    pub build_role_arn: String,
    /// Pipeline stack name
    pub devops_stack: String,
    /// Cluster configuration stack name
    pub cluster_config_stack: String,
    /// Push URL of the provisioned repository
    pub push_url: String,
    /// Branch edited first
    pub primary_branch: String,
    /// Branch kept in lockstep with the primary
    pub secondary_branch: String,
}

impl ResourceNames {
    /// Derive every name from the loaded settings
    pub fn derive(settings: &Settings) -> Self {
        let env = &settings.environment;
        let shared = &settings.shared;
        let index = &shared.index;

        let cluster = format!("{}{}", env.cluster_name, index);
        let repository = format!("{}-{}", env.repo_name, index);
        let build_role = format!("{}{}", BUILD_ROLE_PREFIX, index);

        Self {
            admin_role: format!("{}{}", cluster, env.admin_role_suffix),
            ebs_role: format!("{}{}", cluster, env.ebs_role_suffix),
            image_repository: format!("{}-{}", env.image_repo, index),
            secret: format!("{}{}", shared.secret_name, index),
            build_role_arn: settings.credentials().role_arn(&build_role),
            devops_stack: format!("{}{}", DEVOPS_STACK_PREFIX, index),
            cluster_config_stack: format!("{}{}", CLUSTER_CONFIG_STACK_PREFIX, index),
            push_url: format!("codecommit://{}@{}", shared.sso_profile, repository),
            primary_branch: PRIMARY_BRANCH.to_string(),
            secondary_branch: env.second_branch.clone(),
            cluster,
            repository,
            build_role,
        }
    }

    /// Secrets Manager reference for the analysis token
    pub fn sonar_token_ref(&self) -> String {
        format!("{}:SONAR_TOKEN", self.secret)
    }

    /// Secrets Manager reference for the analysis server URL
    pub fn sonar_host_ref(&self) -> String {
        format!("{}:SONAR_HOST_URL", self.secret)
    }
}
