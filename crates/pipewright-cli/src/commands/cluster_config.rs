//! Cluster-config command - node labels, CSI trust policy and StorageClass
//!
//! In apply mode the command waits for the cluster, prints the trust policy
//! the EBS CSI driver role needs, labels the worker nodes and applies the
//! StorageClass manifest. With `--destroy` it only deletes the StorageClass.

use std::path::{Path, PathBuf};

use clap::Args;
use tracing::{info, warn};

use pipewright_aws::{eks, AwsCli};
use pipewright_common::config::Settings;
use pipewright_common::naming::ResourceNames;
use pipewright_common::trust::{
    oidc_provider_id, Statement, TrustDocument, EBS_CSI_NAMESPACE, EBS_CSI_SERVICE_ACCOUNT,
};

use super::{ensure_current_cluster, until_interrupted, wait_policy, SettingsArgs};
use crate::{Error, Result};

/// Label worker nodes, render the CSI trust policy and manage the StorageClass
#[derive(Args, Debug)]
pub struct ClusterConfigArgs {
    #[command(flatten)]
    pub settings: SettingsArgs,

    /// Kubeconfig to use instead of the default resolution
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Delete the StorageClass instead of configuring the cluster
    #[arg(long)]
    pub destroy: bool,

    /// Give up waiting for the cluster after this many seconds
    /// (waits forever when unset)
    #[arg(long)]
    pub wait_timeout_secs: Option<u64>,
}

/// Trust policy letting the EBS CSI controller assume its role through the
/// cluster's OIDC provider
pub fn csi_trust_document(settings: &Settings, issuer: &str) -> TrustDocument {
    let mut document = TrustDocument::new();
    document.append_statement(Statement::web_identity(
        &settings.shared.account,
        &settings.shared.region,
        oidc_provider_id(issuer),
        EBS_CSI_NAMESPACE,
        EBS_CSI_SERVICE_ACCOUNT,
    ));
    document
}

/// Run the cluster-config command
pub async fn run(args: ClusterConfigArgs) -> Result<()> {
    let settings = args.settings.load()?;
    let names = ResourceNames::derive(&settings);
    let kubeconfig = args.kubeconfig.as_deref();

    ensure_current_cluster(
        &pipewright_kube::current_cluster_name(kubeconfig)?,
        &names.cluster,
    )?;
    let client = pipewright_kube::create_client(kubeconfig).await?;

    if args.destroy {
        let name = &settings.environment.storage_class_name;
        if name.is_empty() {
            return Err(Error::command_failed("ScName is not set"));
        }
        pipewright_kube::delete_storage_class(&client, name).await?;
        return Ok(());
    }

    until_interrupted("cluster-config", async {
        let aws = AwsCli::new(settings.credentials());
        let attributes = eks::wait_for_cluster(
            &aws,
            &names.cluster,
            &wait_policy(eks::CLUSTER_POLL_INTERVAL, args.wait_timeout_secs),
        )
        .await?;

        let document = csi_trust_document(&settings, &attributes.oidc_issuer);
        info!(role = %names.ebs_role, "Trust policy for the EBS CSI driver role");
        println!("{}", serde_json::to_string_pretty(&document)?);

        let labelled = pipewright_kube::label_worker_nodes(&client).await?;
        info!(nodes = labelled, "Worker nodes labelled");

        apply_storage_class(&client, &settings.environment.storage_class_file).await
    })
    .await
}

async fn apply_storage_class(client: &kube::Client, manifest_path: &str) -> Result<()> {
    if manifest_path.is_empty() {
        warn!("ScNamef is not set, skipping StorageClass");
        return Ok(());
    }
    let manifest = std::fs::read_to_string(Path::new(manifest_path))?;
    let applied = pipewright_kube::apply_storage_classes(client, &manifest).await?;
    info!(path = %manifest_path, classes = applied, "StorageClass manifest applied");
    Ok(())
}
