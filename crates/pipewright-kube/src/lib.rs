//! Kubernetes-side reconciliation for pipewright
//!
//! - [`client`] - client construction and kubeconfig inspection
//! - [`auth_map`] - role bindings in the `aws-auth` ConfigMap
//! - [`nodes`] - worker role labels
//! - [`storage`] - StorageClass apply and delete

#![deny(missing_docs)]

pub mod auth_map;
pub mod client;
pub mod nodes;
pub mod storage;

pub use auth_map::{append_role_binding, ConfigMapStore, KubeConfigMapStore};
pub use client::{create_client, current_cluster_name};
pub use nodes::label_worker_nodes;
pub use storage::{apply_storage_classes, delete_storage_class};
