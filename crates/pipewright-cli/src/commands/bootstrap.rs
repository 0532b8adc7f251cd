//! Bootstrap command - connect the pipeline to the cluster and seed the repository
//!
//! Runs strictly in order, stopping at the first failure:
//! 1. wait for the source repository to exist
//! 2. wait for the cluster to become ACTIVE
//! 3. let the build role assume the cluster admin role
//! 4. look up the build role ARN from the pipeline stack outputs
//! 5. check that the kubeconfig points at this environment's cluster
//! 6. bind the build role to `system:masters` in `aws-auth`
//! 7. propagate the edited build specification to both branches

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use pipewright_aws::{
    cloudformation, codecommit, eks, iam, AwsCli, ClusterStatusApi, IdentityStore,
    RepositoryApi, StackApi,
};
use pipewright_common::naming::ResourceNames;
use pipewright_common::retry::RetryConfig;
use pipewright_kube::{append_role_binding, ConfigMapStore, KubeConfigMapStore};

use super::{ensure_current_cluster, until_interrupted, wait_policy, SettingsArgs};
use crate::buildspec::BuildSpecEdits;
use crate::propagate::{propagate_build_spec, Propagation};
use crate::Result;

/// Connect the pipeline to the cluster and seed the source repository
#[derive(Args, Debug)]
pub struct BootstrapArgs {
    #[command(flatten)]
    pub settings: SettingsArgs,

    /// Directory the template repository is cloned into
    #[arg(long, default_value = ".")]
    pub workdir: PathBuf,

    /// Kubeconfig to use instead of the default resolution
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Give up waiting for the repository or cluster after this many seconds
    /// (waits forever when unset)
    #[arg(long)]
    pub wait_timeout_secs: Option<u64>,

    /// Remove the local clone even when propagation fails
    #[arg(long)]
    pub cleanup_on_failure: bool,
}

/// Services the cluster access steps talk to
pub struct Services<'a> {
    pub repositories: &'a dyn RepositoryApi,
    pub clusters: &'a dyn ClusterStatusApi,
    pub identities: &'a dyn IdentityStore,
    pub stacks: &'a dyn StackApi,
}

/// Steps 1 to 6: everything before the repository is touched.
///
/// `current_cluster` is only consulted after the stack outputs are known, so
/// a wrong kubeconfig is reported without having modified `aws-auth`.
/// Returns the build role ARN that was bound.
pub async fn prepare_cluster_access(
    services: &Services<'_>,
    names: &ResourceNames,
    wait_timeout_secs: Option<u64>,
    current_cluster: impl FnOnce() -> pipewright_common::Result<String>,
    auth_map: &dyn ConfigMapStore,
) -> Result<String> {
    codecommit::wait_for_repository(
        services.repositories,
        &names.repository,
        &wait_policy(codecommit::REPOSITORY_POLL_INTERVAL, wait_timeout_secs),
    )
    .await?;
    info!(repository = %names.repository, "Repository exists");

    let attributes = eks::wait_for_cluster(
        services.clusters,
        &names.cluster,
        &wait_policy(eks::CLUSTER_POLL_INTERVAL, wait_timeout_secs),
    )
    .await?;
    info!(cluster = %names.cluster, issuer = %attributes.oidc_issuer, "Cluster is active");

    iam::add_trust_statement(services.identities, &names.admin_role, &names.build_role_arn)
        .await?;

    let role_arn = cloudformation::build_role_arn(services.stacks, &names.devops_stack).await?;
    info!(stack = %names.devops_stack, role = %role_arn, "Resolved build role");

    ensure_current_cluster(&current_cluster()?, &names.cluster)?;

    append_role_binding(auth_map, &role_arn, &RetryConfig::default()).await?;
    Ok(role_arn)
}

/// Run the bootstrap command
pub async fn run(args: BootstrapArgs) -> Result<()> {
    let settings = args.settings.load()?;
    let names = ResourceNames::derive(&settings);
    let credentials = settings.credentials();
    let aws = AwsCli::new(credentials.clone());

    let client = pipewright_kube::create_client(args.kubeconfig.as_deref()).await?;
    let auth_map = KubeConfigMapStore::aws_auth(client);

    let services = Services {
        repositories: &aws,
        clusters: &aws,
        identities: &aws,
        stacks: &aws,
    };
    let kubeconfig = args.kubeconfig.as_deref();

    let propagation = Propagation {
        template_url: settings.environment.git_repo.clone(),
        target_url: names.push_url.clone(),
        workdir: args.workdir.join(&names.repository),
        primary_branch: names.primary_branch.clone(),
        secondary_branch: names.secondary_branch.clone(),
        edits: BuildSpecEdits::from_names(&names),
        credentials,
        cleanup_on_failure: args.cleanup_on_failure,
    };

    until_interrupted("bootstrap", async {
        prepare_cluster_access(
            &services,
            &names,
            args.wait_timeout_secs,
            || pipewright_kube::current_cluster_name(kubeconfig),
            &auth_map,
        )
        .await?;

        let report = propagate_build_spec(&propagation).await?;
        info!(
            repository = %names.repository,
            primary = %report.primary_commit,
            "Bootstrap complete"
        );
        Ok(())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use k8s_openapi::api::core::v1::ConfigMap;
    use pipewright_aws::eks::ClusterStatus;
    use pipewright_aws::{ClusterDescription, StackOutput};
    use pipewright_common::config::{EnvironmentSettings, Settings, SharedSettings};
    use pipewright_common::{Error as CommonError, Result as CommonResult, MAP_ROLES_KEY};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    const BUILD_ROLE_ARN: &str = "arn:aws:iam::123456789012:role/BuildAdminRole02";

    /// Records every call so the order of steps can be checked
    #[derive(Default)]
    struct FakeAws {
        calls: Mutex<Vec<String>>,
        cluster_polls: Mutex<u32>,
        trust_policy: Mutex<String>,
    }

    impl FakeAws {
        fn new() -> Self {
            let fake = Self::default();
            *fake.trust_policy.lock().unwrap() =
                r#"{"Version":"2012-10-17","Statement":[]}"#.to_string();
            fake
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RepositoryApi for FakeAws {
        async fn get_repository(&self, name: &str) -> CommonResult<()> {
            self.record(format!("get_repository {}", name));
            Ok(())
        }
    }

    #[async_trait]
    impl ClusterStatusApi for FakeAws {
        async fn describe_cluster(&self, name: &str) -> CommonResult<ClusterDescription> {
            self.record(format!("describe_cluster {}", name));
            let mut polls = self.cluster_polls.lock().unwrap();
            *polls += 1;
            if *polls < 2 {
                return Ok(ClusterDescription {
                    status: ClusterStatus::Creating,
                    oidc_issuer: None,
                });
            }
            Ok(ClusterDescription {
                status: ClusterStatus::Active,
                oidc_issuer: Some(
                    "https://oidc.eks.eu-central-1.amazonaws.com/id/ABC123".to_string(),
                ),
            })
        }
    }

    #[async_trait]
    impl IdentityStore for FakeAws {
        async fn get_trust_policy(&self, role: &str) -> CommonResult<String> {
            self.record(format!("get_trust_policy {}", role));
            Ok(self.trust_policy.lock().unwrap().clone())
        }

        async fn update_trust_policy(&self, role: &str, document: &str) -> CommonResult<()> {
            self.record(format!("update_trust_policy {}", role));
            *self.trust_policy.lock().unwrap() = document.to_string();
            Ok(())
        }
    }

    #[async_trait]
    impl StackApi for FakeAws {
        async fn describe_stack_outputs(&self, name: &str) -> CommonResult<Vec<StackOutput>> {
            self.record(format!("describe_stack_outputs {}", name));
            Ok(vec![StackOutput {
                key: "RoleBuildProjectArn".to_string(),
                value: BUILD_ROLE_ARN.to_string(),
            }])
        }
    }

    #[derive(Default)]
    struct FakeAuthMap {
        config_map: Mutex<ConfigMap>,
        writes: Mutex<u32>,
    }

    #[async_trait]
    impl ConfigMapStore for FakeAuthMap {
        async fn get(&self) -> CommonResult<ConfigMap> {
            Ok(self.config_map.lock().unwrap().clone())
        }

        async fn replace(&self, config_map: &ConfigMap) -> CommonResult<ConfigMap> {
            *self.writes.lock().unwrap() += 1;
            *self.config_map.lock().unwrap() = config_map.clone();
            Ok(config_map.clone())
        }
    }

    fn names() -> ResourceNames {
        ResourceNames::derive(&Settings {
            environment: EnvironmentSettings {
                repo_name: "java-app".into(),
                cluster_name: "demo".into(),
                admin_role_suffix: "AdminRole".into(),
                ..Default::default()
            },
            shared: SharedSettings {
                account: "123456789012".into(),
                index: "02".into(),
                ..Default::default()
            },
        })
    }

    fn services(aws: &FakeAws) -> Services<'_> {
        Services {
            repositories: aws,
            clusters: aws,
            identities: aws,
            stacks: aws,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn steps_run_in_order_and_bind_the_build_role() {
        let aws = FakeAws::new();
        let auth_map = FakeAuthMap::default();

        let role = prepare_cluster_access(
            &services(&aws),
            &names(),
            None,
            || Ok("demo02".to_string()),
            &auth_map,
        )
        .await
        .unwrap();

        assert_eq!(role, BUILD_ROLE_ARN);
        assert_eq!(
            aws.calls(),
            vec![
                "get_repository java-app-02",
                "describe_cluster demo02",
                "describe_cluster demo02",
                "get_trust_policy demo02AdminRole",
                "update_trust_policy demo02AdminRole",
                "describe_stack_outputs DevopsStack02",
            ]
        );

        let trust: serde_json::Value =
            serde_json::from_str(&aws.trust_policy.lock().unwrap()).unwrap();
        assert_eq!(
            trust["Statement"][0]["Principal"]["AWS"],
            "arn:aws:iam::123456789012:role/BuildAdminRole02"
        );

        let config_map = auth_map.config_map.lock().unwrap().clone();
        let map_roles = config_map
            .data
            .unwrap_or_default()
            .remove(MAP_ROLES_KEY)
            .unwrap();
        assert!(map_roles.contains(&format!("rolearn: {}", BUILD_ROLE_ARN)));
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_kubeconfig_stops_before_aws_auth() {
        let aws = FakeAws::new();
        let auth_map = FakeAuthMap::default();

        let err = prepare_cluster_access(
            &services(&aws),
            &names(),
            None,
            || Ok("prod01".to_string()),
            &auth_map,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, crate::Error::ClusterMismatch { .. }));
        assert_eq!(*auth_map.writes.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_kubeconfig_is_fatal() {
        let aws = FakeAws::new();
        let auth_map = FakeAuthMap::default();

        let result = prepare_cluster_access(
            &services(&aws),
            &names(),
            None,
            || Err(CommonError::internal("kubeconfig", "no current context")),
            &auth_map,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(*auth_map.writes.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn existing_bindings_are_kept() {
        let aws = FakeAws::new();
        let existing = "    - rolearn: arn:aws:iam::123456789012:role/NodeRole\n      username: system:node:{{EC2PrivateDNSName}}\n";
        let auth_map = FakeAuthMap::default();
        auth_map.config_map.lock().unwrap().data = Some(BTreeMap::from([(
            MAP_ROLES_KEY.to_string(),
            existing.to_string(),
        )]));

        prepare_cluster_access(
            &services(&aws),
            &names(),
            None,
            || Ok("demo02".to_string()),
            &auth_map,
        )
        .await
        .unwrap();

        let data = auth_map.config_map.lock().unwrap().data.clone().unwrap();
        let map_roles = &data[MAP_ROLES_KEY];
        assert!(map_roles.starts_with(existing));
        assert!(map_roles.contains(BUILD_ROLE_ARN));
    }
}
