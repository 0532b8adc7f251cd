//! Build specification propagation
//!
//! Seeds the provisioned source repository from a template:
//!
//! 1. clone the template and create local branches for all of its branches
//! 2. edit the build specification on the primary branch and commit it
//! 3. check out the secondary branch, restore the file from the primary
//!    branch and commit it, so both branches carry identical content
//! 4. push every branch to the provisioned repository
//! 5. remove the local clone
//!
//! Any failure stops the run before the push; nothing is pushed partially.

use std::path::{Path, PathBuf};

use git2::Oid;
use tracing::info;

use pipewright_common::naming::BUILD_SPEC_FILE;
use pipewright_common::Credentials;

use crate::buildspec::{self, BuildSpecEdits};
use crate::git::{self, WorkingCopy};
use crate::{Error, Result};

/// Commit message on the primary branch
pub const PRIMARY_MESSAGE: &str = "Update buildspec.yml";
/// Commit message on the secondary branch
pub const SECONDARY_MESSAGE: &str = "update buildspec.yml";

/// Everything one propagation needs
#[derive(Debug, Clone)]
pub struct Propagation {
    /// Template repository to clone
    pub template_url: String,
    /// Provisioned repository all branches are pushed to
    pub target_url: String,
    /// Local clone location; must not exist yet
    pub workdir: PathBuf,
    /// Branch the file is edited on
    pub primary_branch: String,
    /// Branch that receives the primary branch's copy of the file
    pub secondary_branch: String,
    /// Field values written into the build specification
    pub edits: BuildSpecEdits,
    /// Profile and region for the push
    pub credentials: Credentials,
    /// Remove the clone even when propagation fails
    pub cleanup_on_failure: bool,
}

/// Commits created by a propagation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationReport {
    /// Edit commit on the primary branch
    pub primary_commit: Oid,
    /// Restore commit on the secondary branch; `None` when the branch already
    /// carried the edited file
    pub secondary_commit: Option<Oid>,
}

/// Run the whole propagation
pub async fn propagate_build_spec(request: &Propagation) -> Result<PropagationReport> {
    let copy = WorkingCopy::create(
        &request.template_url,
        &request.workdir,
        request.cleanup_on_failure,
    )?;
    let repo = copy.repo();
    let file = Path::new(BUILD_SPEC_FILE);

    let branches = git::track_remote_branches(repo)?;
    info!(branches = ?branches, "Cloned template repository");

    git::checkout_branch(repo, &request.primary_branch)?;
    buildspec::edit_file(&copy.path().join(file), &request.edits)?;
    let primary_commit = git::commit_file(repo, file, PRIMARY_MESSAGE)?.ok_or_else(|| {
        Error::command_failed(format!(
            "{} on {} already carries the edited values",
            BUILD_SPEC_FILE, request.primary_branch
        ))
    })?;
    info!(branch = %request.primary_branch, commit = %primary_commit, "Committed build specification");

    git::checkout_branch(repo, &request.secondary_branch)?;
    git::restore_from_branch(repo, &request.primary_branch, file)?;
    let secondary_commit = git::commit_file(repo, file, SECONDARY_MESSAGE)?;
    match secondary_commit {
        Some(oid) => {
            info!(branch = %request.secondary_branch, commit = %oid, "Committed build specification")
        }
        None => info!(
            branch = %request.secondary_branch,
            "Build specification already up to date, nothing to commit"
        ),
    }

    git::push_all(repo, &request.target_url, &request.credentials).await?;
    info!(url = %request.target_url, "Pushed repository");

    copy.finish()?;
    Ok(PropagationReport {
        primary_commit,
        secondary_commit,
    })
}
