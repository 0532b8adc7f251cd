//! Common types for pipewright: errors, retry, readiness polling, settings
//! and identity trust documents.

#![deny(missing_docs)]

pub mod config;
pub mod credentials;
pub mod error;
pub mod naming;
pub mod poll;
pub mod retry;
pub mod trust;

pub use credentials::Credentials;
pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Namespace holding the cluster authorization ConfigMap
pub const AUTH_CONFIGMAP_NAMESPACE: &str = "kube-system";

/// Name of the cluster authorization ConfigMap
pub const AUTH_CONFIGMAP_NAME: &str = "aws-auth";

/// Key inside the authorization ConfigMap holding role bindings
pub const MAP_ROLES_KEY: &str = "mapRoles";
