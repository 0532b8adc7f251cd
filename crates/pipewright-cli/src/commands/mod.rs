//! CLI commands

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use tracing::warn;

use pipewright_common::config::Settings;
use pipewright_common::poll::WaitPolicy;

use crate::{Error, Result};

pub mod bootstrap;
pub mod cluster_config;
pub mod names;

/// Locations of the two configuration files
#[derive(Args, Debug, Clone)]
pub struct SettingsArgs {
    /// Per-environment configuration file
    #[arg(long, env = "PIPEWRIGHT_CONFIG", default_value = "config.json")]
    pub config: PathBuf,

    /// Shared account configuration file
    #[arg(
        long,
        env = "PIPEWRIGHT_SHARED_CONFIG",
        default_value = "../config_crd.json"
    )]
    pub shared_config: PathBuf,
}

impl SettingsArgs {
    /// Load both files, warning about keys the bootstrap needs but that
    /// were left empty
    pub fn load(&self) -> Result<Settings> {
        let settings = Settings::load(&self.config, &self.shared_config)?;
        for key in settings.warnings() {
            warn!(key, "Configuration key is missing or empty");
        }
        Ok(settings)
    }
}

/// Readiness wait polling every `interval`, bounded by `timeout_secs` if set
pub fn wait_policy(interval: Duration, timeout_secs: Option<u64>) -> WaitPolicy {
    WaitPolicy::every(interval).with_timeout(timeout_secs.map(Duration::from_secs))
}

/// Fail unless the kubeconfig points at the cluster this environment owns
pub fn ensure_current_cluster(current: &str, expected: &str) -> Result<()> {
    if current != expected {
        return Err(Error::ClusterMismatch {
            current: current.to_string(),
            expected: expected.to_string(),
        });
    }
    Ok(())
}

/// Run `fut`, abandoning it on Ctrl-C.
///
/// Ctrl-C is only seen while `fut` is suspended at an await point. The git
/// steps (clone, checkout, commit, libgit2 push) are synchronous and always
/// run to completion first; an `aws` or `git` child process is killed when
/// the future is dropped.
pub async fn until_interrupted<T, F>(what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    until_signalled(what, fut, tokio::signal::ctrl_c()).await
}

async fn until_signalled<T, F, S>(what: &str, fut: F, signal: S) -> Result<T>
where
    F: Future<Output = Result<T>>,
    S: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        biased;
        result = fut => result,
        _ = signal => {
            warn!(command = %what, "Interrupted");
            Err(pipewright_common::Error::Cancelled {
                what: what.to_string(),
            }
            .into())
        }
    }
}
