//! Local working tree of the desired-state repository.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use tokio::process::Command;

use super::auth::{build_auth_env, GitAuth};
use super::parse::{format_git_error, is_already_exists, is_already_up_to_date, parse_commit_id};
use super::types::RepoRef;
use crate::gitops::error::{classify_git_error, GitOpsError, Result};

/// Git repository operations against one remote.
pub struct GitRepository {
    repo_path: PathBuf,
    remote: String,
    auth: GitAuth,
}

impl GitRepository {
    /// Creates a new git repository handle. Nothing touches disk until used.
    pub fn new(repo_path: impl Into<PathBuf>, remote: impl Into<String>, auth: GitAuth) -> Self {
        Self {
            repo_path: repo_path.into(),
            remote: remote.into(),
            auth,
        }
    }

    /// Returns the repository path.
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Checks if the directory is a git repository.
    pub fn is_git_repo(&self) -> bool {
        self.repo_path.join(".git").exists()
    }

    /// Clones the remote at `reference`, including nested submodules.
    ///
    /// An existing working tree is reused as-is; the next update brings it
    /// to the tracked revision.
    pub async fn clone_at(&self, reference: &RepoRef) -> Result<()> {
        if self.is_git_repo() {
            log::info!(
                "Repository already present at {}, skipping clone",
                self.repo_path.display()
            );
            return Ok(());
        }

        if let Some(parent) = self.repo_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let target = self.repo_path.to_string_lossy().to_string();
        let output = self
            .run_git_in(
                None,
                &[
                    "clone",
                    "--recurse-submodules",
                    "--branch",
                    reference.name(),
                    &self.remote,
                    &target,
                ],
            )
            .await?;

        if output.status.success() {
            log::info!("Cloned {} ({}) into {}", self.remote, reference, target);
            Ok(())
        } else {
            Err(GitOpsError::Clone {
                remote: self.remote.clone(),
                message: classify_git_error(&format_git_error(&output)).to_string(),
            })
        }
    }

    /// Fetches all branches and tags from `origin`.
    pub async fn fetch(&self) -> Result<()> {
        self.ensure_repo()?;
        let output = self
            .run_git(&["fetch", "--tags", "--force", "--recurse-submodules=yes", "origin"])
            .await?;

        if output.status.success() || is_already_up_to_date(&format_git_error(&output)) {
            Ok(())
        } else {
            let message = format_git_error(&output);
            match classify_git_error(&message) {
                GitOpsError::GitOperation(message) => Err(GitOpsError::Fetch {
                    remote: self.remote.clone(),
                    message,
                }),
                other => Err(other),
            }
        }
    }

    /// Creates a local branch tracking `origin/<branch>` if it does not exist yet.
    pub async fn checkout_create(&self, branch: &str) -> Result<()> {
        self.ensure_repo()?;
        let remote_ref = format!("origin/{}", branch);
        let output = self
            .run_git(&["checkout", "-f", "-b", branch, &remote_ref])
            .await?;

        let text = format_git_error(&output);
        if output.status.success() || is_already_exists(&text) {
            Ok(())
        } else {
            Err(GitOpsError::Checkout {
                reference: branch.to_string(),
                message: text,
            })
        }
    }

    /// Checks out an existing local branch, discarding local modifications.
    pub async fn checkout(&self, branch: &str) -> Result<()> {
        self.ensure_repo()?;
        let output = self.run_git(&["checkout", "-f", branch]).await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(GitOpsError::Checkout {
                reference: branch.to_string(),
                message: format_git_error(&output),
            })
        }
    }

    /// Pulls a single branch from `origin`, updating submodules recursively.
    pub async fn pull_branch(&self, branch: &str) -> Result<()> {
        self.ensure_repo()?;
        let output = self
            .run_git(&[
                "pull",
                "--ff-only",
                "--recurse-submodules",
                "origin",
                branch,
            ])
            .await?;

        let text = format_git_error(&output);
        if output.status.success() || is_already_up_to_date(&text) {
            Ok(())
        } else {
            Err(GitOpsError::Pull(text))
        }
    }

    /// Checks out the exact commit a tag points at (detached HEAD).
    pub async fn checkout_tag(&self, tag: &str) -> Result<()> {
        self.ensure_repo()?;
        let spec = format!("refs/tags/{}^{{commit}}", tag);
        let output = self.run_git(&["rev-parse", "--verify", &spec]).await?;
        let commit = parse_commit_id(&String::from_utf8_lossy(&output.stdout))
            .filter(|_| output.status.success())
            .ok_or_else(|| GitOpsError::ResolveTag {
                tag: tag.to_string(),
                message: format_git_error(&output),
            })?;

        let output = self.run_git(&["checkout", "-f", "--detach", &commit]).await?;
        if !output.status.success() {
            return Err(GitOpsError::Checkout {
                reference: format!("tag {}", tag),
                message: format_git_error(&output),
            });
        }

        let output = self
            .run_git(&["submodule", "update", "--init", "--recursive", "--force"])
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(GitOpsError::Checkout {
                reference: format!("tag {} (submodules)", tag),
                message: format_git_error(&output),
            })
        }
    }

    /// Removes untracked files and directories from the working tree.
    pub async fn clean(&self) -> Result<()> {
        self.ensure_repo()?;
        let output = self.run_git(&["clean", "-fd"]).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(GitOpsError::Clean(format_git_error(&output)))
        }
    }

    /// Returns the commit id HEAD points at.
    pub async fn head(&self) -> Result<String> {
        self.ensure_repo()?;
        let output = self.run_git(&["rev-parse", "HEAD"]).await?;
        if !output.status.success() {
            return Err(GitOpsError::Head(format_git_error(&output)));
        }
        parse_commit_id(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| GitOpsError::Head("unexpected rev-parse output".to_string()))
    }

    /// Brings the working tree to the tracked revision and returns its head.
    pub async fn update_to(&self, reference: &RepoRef) -> Result<String> {
        self.fetch().await?;

        match reference {
            RepoRef::Branch(branch) => {
                self.checkout_create(branch).await?;
                self.checkout(branch).await?;
                self.pull_branch(branch).await?;
            }
            RepoRef::Tag(tag) => self.checkout_tag(tag).await?,
        }

        self.clean().await?;
        self.head().await
    }

    fn ensure_repo(&self) -> Result<()> {
        if self.is_git_repo() {
            Ok(())
        } else {
            Err(GitOpsError::NotARepository(self.repo_path.clone()))
        }
    }

    async fn run_git(&self, args: &[&str]) -> Result<Output> {
        self.run_git_in(Some(&self.repo_path), args).await
    }

    /// Runs git with the transport auth environment applied.
    async fn run_git_in(&self, dir: Option<&Path>, args: &[&str]) -> Result<Output> {
        let auth = build_auth_env(&self.auth)?;

        let mut cmd = Command::new("git");
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &auth.env_vars {
            cmd.env(key, value);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| GitOpsError::GitOperation(e.to_string()))?;

        // Drop auth env (cleanup guard) after command completes
        drop(auth);

        log::debug!("git {} -> {}", args.join(" "), output.status);
        Ok(output)
    }
}
