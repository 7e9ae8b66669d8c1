//! Git working tree operations, driven through the `git` command line.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum GitError {
    #[error("Failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("git {args} failed: {stderr}")]
    Command { args: String, stderr: String },
}

pub type Result<T> = std::result::Result<T, GitError>;

/// Version control operations the sync driver needs.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Set the committer identity for this repository only
    async fn configure_identity(&self, name: &str, email: &str) -> Result<()>;

    /// Stage every change, including deletions and new files
    async fn stage_all(&self) -> Result<()>;

    async fn commit(&self, message: &str) -> Result<()>;

    /// Rebase local commits onto the remote branch (no-op for an empty remote)
    async fn pull(&self) -> Result<()>;

    async fn push(&self) -> Result<()>;

    /// Human-readable status, for logging
    async fn status(&self) -> Result<String>;

    /// Whether the working tree or index has uncommitted changes
    async fn is_dirty(&self) -> Result<bool>;

    /// Local HEAD commit id
    async fn head_rev(&self) -> Result<String>;

    /// Commit id of the remote branch tip, `None` if the branch does not exist there
    async fn remote_rev(&self) -> Result<Option<String>>;
}

/// A local clone operated on with the `git` binary
pub struct GitRepo {
    dir: PathBuf,
}

impl GitRepo {
    /// Open an existing working tree
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Shallow-clone `url` (`--depth 1`) into `dir`
    pub async fn shallow_clone(url: &str, dir: &Path) -> Result<Self> {
        info!("Cloning repository into {:?}", dir);
        let dir_arg = dir.to_string_lossy();
        run_git(None, &["clone", "--depth", "1", url, dir_arg.as_ref()]).await?;
        Ok(Self::open(dir))
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        run_git(Some(&self.dir), args).await
    }

    /// Name of the checked-out branch (works before the first commit too)
    async fn current_branch(&self) -> Result<String> {
        Ok(self
            .git(&["symbolic-ref", "--short", "HEAD"])
            .await?
            .trim()
            .to_string())
    }
}

async fn run_git(dir: Option<&Path>, args: &[&str]) -> Result<String> {
    debug!("git {}", args.join(" "));
    let mut command = Command::new("git");
    command.args(args).env("GIT_TERMINAL_PROMPT", "0");
    if let Some(dir) = dir {
        command.current_dir(dir);
    }

    let output = command.output().await?;
    if !output.status.success() {
        return Err(GitError::Command {
            args: args.join(" "),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Commit id from `git ls-remote` output: "<sha>\t<ref>"
fn parse_ls_remote(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .find(|sha| !sha.is_empty())
        .map(str::to_string)
}

/// Any line in `git status --porcelain` output means a change
fn porcelain_is_dirty(stdout: &str) -> bool {
    stdout.lines().any(|line| !line.trim().is_empty())
}

#[async_trait]
impl VersionControl for GitRepo {
    async fn configure_identity(&self, name: &str, email: &str) -> Result<()> {
        self.git(&["config", "user.name", name]).await?;
        self.git(&["config", "user.email", email]).await?;
        Ok(())
    }

    async fn stage_all(&self) -> Result<()> {
        self.git(&["add", "-A"]).await?;
        Ok(())
    }

    async fn commit(&self, message: &str) -> Result<()> {
        self.git(&["commit", "--no-gpg-sign", "-m", message]).await?;
        Ok(())
    }

    async fn pull(&self) -> Result<()> {
        if self.remote_rev().await?.is_none() {
            debug!("Remote branch does not exist yet, nothing to pull");
            return Ok(());
        }
        let branch = self.current_branch().await?;
        self.git(&["pull", "--rebase", "origin", branch.as_str()]).await?;
        Ok(())
    }

    async fn push(&self) -> Result<()> {
        let branch = self.current_branch().await?;
        let refspec = format!("HEAD:refs/heads/{}", branch);
        self.git(&["push", "origin", refspec.as_str()]).await?;
        Ok(())
    }

    async fn status(&self) -> Result<String> {
        self.git(&["status"]).await
    }

    async fn is_dirty(&self) -> Result<bool> {
        let stdout = self.git(&["status", "--porcelain"]).await?;
        Ok(porcelain_is_dirty(&stdout))
    }

    async fn head_rev(&self) -> Result<String> {
        Ok(self.git(&["rev-parse", "HEAD"]).await?.trim().to_string())
    }

    async fn remote_rev(&self) -> Result<Option<String>> {
        let branch = self.current_branch().await?;
        let reference = format!("refs/heads/{}", branch);
        let stdout = self.git(&["ls-remote", "origin", reference.as_str()]).await?;
        Ok(parse_ls_remote(&stdout))
    }
}
