//! pipewright CLI library

pub mod buildspec;
pub mod commands;
pub mod error;
pub mod git;
pub mod propagate;

pub use error::{Error, Result};

use clap::{Parser, Subcommand};

/// pipewright - cross-service environment bootstrap
#[derive(Parser, Debug)]
#[command(name = "pipewright")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect the pipeline to the cluster and seed the source repository
    Bootstrap(commands::bootstrap::BootstrapArgs),
    /// Label worker nodes, render the CSI trust policy and manage the StorageClass
    ClusterConfig(commands::cluster_config::ClusterConfigArgs),
    /// Print the resource names derived from the configuration
    Names(commands::names::NamesArgs),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Bootstrap(args) => commands::bootstrap::run(args).await,
            Commands::ClusterConfig(args) => commands::cluster_config::run(args).await,
            Commands::Names(args) => commands::names::run(args),
        }
    }
}
