//! Error types for pipewright
//!
//! Errors are structured with fields to aid debugging: the file being read,
//! the AWS operation being run, or the role being patched travel with the
//! message so the top-level handler can print something actionable.

use std::path::PathBuf;

use thiserror::Error;

/// HTTP status the Kubernetes API returns for a stale resourceVersion
const CONFLICT_STATUS: u16 = 409;

/// HTTP status the Kubernetes API returns for a missing object
const NOT_FOUND_STATUS: u16 = 404;

/// Main error type for pipewright operations
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration file unreadable or malformed
    #[error("configuration error in {}: {message}", path.display())]
    Config {
        /// File that failed to load
        path: PathBuf,
        /// Description of what failed
        message: String,
    },

    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// AWS API or CLI failure
    #[error("aws error [{operation}]: {message}")]
    Aws {
        /// Operation that failed (e.g. "iam get-role")
        operation: String,
        /// Description of what failed
        message: String,
    },

    /// Trust policy document could not be decoded or encoded
    #[error("trust policy error for role {role}: {message}")]
    Policy {
        /// Role whose trust policy was being handled
        role: String,
        /// Description of what failed
        message: String,
    },

    /// A bounded wait ran out of time
    #[error("timed out waiting for {what}")]
    Timeout {
        /// What was being waited on
        what: String,
    },

    /// A wait was cancelled before the resource became ready
    #[error("cancelled while waiting for {what}")]
    Cancelled {
        /// What was being waited on
        what: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Context where the error occurred
        context: String,
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a configuration error for the given file
    pub fn config(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create an AWS error for the given operation
    pub fn aws(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Aws {
            operation: operation.into(),
            message: msg.into(),
        }
    }

    /// Create a trust policy error for the given role
    pub fn policy(role: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Policy {
            role: role.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// True when the Kubernetes API rejected a write because the stored
    /// resourceVersion changed since it was read.
    pub fn is_conflict(&self) -> bool {
        self.api_status() == Some(CONFLICT_STATUS)
    }

    /// True when the Kubernetes API reported the object as missing.
    pub fn is_not_found(&self) -> bool {
        self.api_status() == Some(NOT_FOUND_STATUS)
    }

    fn api_status(&self) -> Option<u16> {
        match self {
            Error::Kube {
                source: kube::Error::Api(response),
            } => Some(response.code),
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) fn api_error(code: u16, reason: &str) -> Error {
    Error::from(kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{} from test", reason),
        reason: reason.to_string(),
        code,
    }))
}
