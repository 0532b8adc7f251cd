//! AWS credential selection
//!
//! The profile, region and account are passed explicitly to every call that
//! needs them. Child processes get them as flags or per-command environment
//! variables; the pipewright process environment is never modified.

/// Region, account and named profile used for AWS access
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// AWS region
    pub region: String,
    /// AWS account id
    pub account: String,
    /// Named profile (SSO or static) from the local AWS config
    pub profile: String,
}

impl Credentials {
    /// Build credentials from their parts
    pub fn new(region: &str, account: &str, profile: &str) -> Self {
        Self {
            region: region.to_string(),
            account: account.to_string(),
            profile: profile.to_string(),
        }
    }

    /// Global flags for the `aws` CLI. Empty values are left out so the CLI
    /// falls back to its own resolution chain.
    pub fn cli_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if !self.profile.is_empty() {
            args.push("--profile".to_string());
            args.push(self.profile.clone());
        }
        if !self.region.is_empty() {
            args.push("--region".to_string());
            args.push(self.region.clone());
        }
        args
    }

    /// Environment for child processes that load the shared AWS config
    /// themselves (e.g. the `git-remote-codecommit` helper)
    pub fn child_env(&self) -> Vec<(&'static str, String)> {
        let mut env = vec![("AWS_SDK_LOAD_CONFIG", "true".to_string())];
        if !self.profile.is_empty() {
            env.push(("AWS_PROFILE", self.profile.clone()));
        }
        if !self.region.is_empty() {
            env.push(("AWS_REGION", self.region.clone()));
        }
        env
    }

    /// ARN of an IAM role in this account
    pub fn role_arn(&self, role_name: &str) -> String {
        format!("arn:aws:iam::{}:role/{}", self.account, role_name)
    }
}
