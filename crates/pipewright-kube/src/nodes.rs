//! Worker node role labels

use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::{Client, ResourceExt};
use tracing::{info, warn};

use pipewright_common::Result;

/// Label marking a node as a worker in `kubectl get nodes`
pub const WORKER_ROLE_LABEL: &str = "node-role.kubernetes.io/worker";

/// Merge patch adding the worker role label
pub fn worker_label_patch() -> serde_json::Value {
    serde_json::json!({
        "metadata": {
            "labels": {
                WORKER_ROLE_LABEL: "worker"
            }
        }
    })
}

/// Label every node in the cluster as a worker.
///
/// Listing nodes must succeed; labelling is best effort per node, with
/// failures logged and skipped. Returns how many nodes were labelled.
pub async fn label_worker_nodes(client: &Client) -> Result<usize> {
    let api: Api<Node> = Api::all(client.clone());
    let nodes = api.list(&ListParams::default()).await?;
    let patch = worker_label_patch();

    let mut labelled = 0;
    for node in &nodes.items {
        let name = node.name_any();
        match api
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => {
                info!(node = %name, "Labelled node as worker");
                labelled += 1;
            }
            Err(e) => warn!(node = %name, error = %e, "Failed to label node"),
        }
    }
    Ok(labelled)
}
