//! Git operations for the CLI

use std::path::{Path, PathBuf};
use std::time::Duration;

use git2::build::CheckoutBuilder;
use git2::{BranchType, Cred, FetchOptions, Oid, PushOptions, RemoteCallbacks, Repository};
use tokio::process::Command;
use tracing::{debug, info, warn};

use pipewright_common::Credentials;

use crate::{Error, Result};

/// Identity used for every commit pipewright makes
pub const COMMIT_AUTHOR: &str = "pipewright";
/// Email of [`COMMIT_AUTHOR`]
pub const COMMIT_EMAIL: &str = "pipewright@localhost";

/// Remote helper scheme that libgit2 cannot speak; pushed through `git`
const CODECOMMIT_SCHEME: &str = "codecommit://";

const PUSH_TIMEOUT: Duration = Duration::from_secs(600);

/// An exclusively owned local clone.
///
/// The directory is removed by [`WorkingCopy::finish`]. A copy dropped
/// without finishing is left on disk for inspection, unless it was created
/// with `cleanup_on_failure`.
pub struct WorkingCopy {
    path: PathBuf,
    repo: Repository,
    cleanup_on_failure: bool,
    finished: bool,
}

impl WorkingCopy {
    /// Clone `url` into `path`
    pub fn create(url: &str, path: &Path, cleanup_on_failure: bool) -> Result<Self> {
        info!(url = %url, path = %path.display(), "Cloning repository");
        let repo = clone_repo(url, path)?;
        Ok(Self {
            path: path.to_path_buf(),
            repo,
            cleanup_on_failure,
            finished: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    /// Remove the working copy after a successful run
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        std::fs::remove_dir_all(&self.path)?;
        info!(path = %self.path.display(), "Working copy removed");
        Ok(())
    }
}

impl Drop for WorkingCopy {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if self.cleanup_on_failure {
            match std::fs::remove_dir_all(&self.path) {
                Ok(()) => info!(path = %self.path.display(), "Working copy removed after failure"),
                Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove working copy"),
            }
        } else {
            warn!(path = %self.path.display(), "Leaving working copy for inspection");
        }
    }
}

/// Clone a git repository to a local path
pub fn clone_repo(url: &str, path: &Path) -> Result<Repository> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(|_url, username_from_url, allowed_types| {
        if allowed_types.contains(git2::CredentialType::SSH_KEY) {
            return Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"));
        }
        Cred::default()
    });

    let mut fetch_options = FetchOptions::new();
    fetch_options.remote_callbacks(callbacks);

    let mut builder = git2::build::RepoBuilder::new();
    builder.fetch_options(fetch_options);

    Ok(builder.clone(url, path)?)
}

/// Create a local branch for every `origin` branch that lacks one.
///
/// A clone only checks out the remote's default branch; the rest exist as
/// remote-tracking refs until this runs. Returns the local branch names.
pub fn track_remote_branches(repo: &Repository) -> Result<Vec<String>> {
    for branch in repo.branches(Some(BranchType::Remote))? {
        let (branch, _) = branch?;
        let Some(remote_name) = branch.name()? else {
            continue;
        };
        let Some(local_name) = remote_name.strip_prefix("origin/") else {
            continue;
        };
        if local_name == "HEAD" || repo.find_branch(local_name, BranchType::Local).is_ok() {
            continue;
        }
        let commit = branch.get().peel_to_commit()?;
        let mut local = repo.branch(local_name, &commit, false)?;
        local.set_upstream(Some(remote_name))?;
        debug!(branch = %local_name, "Created local branch");
    }
    local_branches(repo)
}

/// Names of all local branches
pub fn local_branches(repo: &Repository) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for branch in repo.branches(Some(BranchType::Local))? {
        let (branch, _) = branch?;
        if let Some(name) = branch.name()? {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

/// Checkout a local branch
pub fn checkout_branch(repo: &Repository, branch: &str) -> Result<()> {
    let reference = repo.find_reference(&format!("refs/heads/{branch}"))?;
    let commit = reference.peel_to_commit()?;

    let mut checkout = CheckoutBuilder::new();
    checkout.safe();
    repo.checkout_tree(commit.as_object(), Some(&mut checkout))?;
    repo.set_head(&format!("refs/heads/{branch}"))?;

    Ok(())
}

/// Stage `file` and commit it on the current branch.
///
/// Returns `None` without committing when staging leaves the tree unchanged.
pub fn commit_file(repo: &Repository, file: &Path, message: &str) -> Result<Option<Oid>> {
    let mut index = repo.index()?;
    index.add_path(file)?;
    index.write()?;
    let tree_id = index.write_tree()?;

    let parent = repo.head()?.peel_to_commit()?;
    if parent.tree_id() == tree_id {
        return Ok(None);
    }

    let tree = repo.find_tree(tree_id)?;
    let signature = git2::Signature::now(COMMIT_AUTHOR, COMMIT_EMAIL)?;
    let oid = repo.commit(
        Some("HEAD"),
        &signature,
        &signature,
        message,
        &tree,
        &[&parent],
    )?;
    Ok(Some(oid))
}

/// Content of `file` at the tip of local branch `branch`
pub fn read_blob(repo: &Repository, branch: &str, file: &Path) -> Result<Vec<u8>> {
    let tree = repo
        .find_reference(&format!("refs/heads/{branch}"))?
        .peel_to_tree()?;
    let entry = tree.get_path(file)?;
    let blob = repo.find_blob(entry.id())?;
    Ok(blob.content().to_vec())
}

/// Overwrite `file` in the working tree with its content on `source_branch`
pub fn restore_from_branch(repo: &Repository, source_branch: &str, file: &Path) -> Result<()> {
    let workdir = repo
        .workdir()
        .ok_or_else(|| Error::command_failed("cannot restore into a bare repository"))?;
    let content = read_blob(repo, source_branch, file)?;
    std::fs::write(workdir.join(file), content)?;
    Ok(())
}

/// Push every local branch to `url`.
///
/// `codecommit://` URLs need the CodeCommit remote helper, so they go through
/// `git push --all` with the profile and region from `credentials` set on the
/// child process. Anything else is pushed directly with libgit2.
pub async fn push_all(repo: &Repository, url: &str, credentials: &Credentials) -> Result<()> {
    if url.starts_with(CODECOMMIT_SCHEME) {
        let workdir = repo
            .workdir()
            .ok_or_else(|| Error::command_failed("cannot push from a bare repository"))?;
        let mut cmd = Command::new("git");
        cmd.current_dir(workdir)
            .args(["push", "--all", url])
            .envs(credentials.child_env());
        return run_command(cmd, "git push --all").await;
    }

    let branches = local_branches(repo)?;
    let refspecs: Vec<String> = branches
        .iter()
        .map(|b| format!("refs/heads/{b}:refs/heads/{b}"))
        .collect();

    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(|_url, username_from_url, allowed_types| {
        if allowed_types.contains(git2::CredentialType::SSH_KEY) {
            return Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"));
        }
        Cred::default()
    });
    callbacks.push_update_reference(|refname, status| match status {
        Some(msg) => Err(git2::Error::from_str(&format!(
            "remote rejected {}: {}",
            refname, msg
        ))),
        None => Ok(()),
    });
    let mut options = PushOptions::new();
    options.remote_callbacks(callbacks);

    let mut remote = repo.remote_anonymous(url)?;
    remote.push(&refspecs, Some(&mut options))?;
    info!(url = %url, branches = ?branches, "Pushed branches");
    Ok(())
}

/// Run a command to completion under [`PUSH_TIMEOUT`]
async fn run_command(mut cmd: Command, description: &str) -> Result<()> {
    cmd.kill_on_drop(true);
    debug!(command = %description, "running");

    let output = tokio::time::timeout(PUSH_TIMEOUT, cmd.output())
        .await
        .map_err(|_| {
            Error::command_failed(format!("{} timed out after {:?}", description, PUSH_TIMEOUT))
        })?
        .map_err(|e| Error::command_failed(format!("failed to execute {}: {}", description, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::command_failed(format!(
            "{} failed: {}",
            description,
            stderr.trim()
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Repository fixtures shared by the git and propagation tests

    use super::*;

    /// Commit `files` on the current branch of `repo`, creating the first
    /// commit if HEAD is unborn
    pub fn commit_files(repo: &Repository, files: &[(&str, &str)], message: &str) -> Oid {
        let workdir = repo.workdir().unwrap().to_path_buf();
        let mut index = repo.index().unwrap();
        for (name, content) in files {
            std::fs::write(workdir.join(name), content).unwrap();
            index.add_path(Path::new(name)).unwrap();
        }
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = git2::Signature::now("fixture", "fixture@localhost").unwrap();
        let parents = match repo.head() {
            Ok(head) => vec![head.peel_to_commit().unwrap()],
            Err(_) => vec![],
        };
        let parents: Vec<&git2::Commit> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap()
    }

    /// A template repository with `main` and `develop` branches, HEAD on `main`
    pub fn template_repo(path: &Path, build_spec: &str) -> Repository {
        let mut opts = git2::RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(path, &opts).unwrap();

        commit_files(&repo, &[("buildspec.yml", build_spec)], "initial");
        {
            let head = repo.head().unwrap().peel_to_commit().unwrap();
            repo.branch("develop", &head, false).unwrap();
        }
        checkout_branch(&repo, "develop").unwrap();
        commit_files(&repo, &[("DEVELOP.md", "work in progress\n")], "develop only");
        checkout_branch(&repo, "main").unwrap();
        repo
    }
}
