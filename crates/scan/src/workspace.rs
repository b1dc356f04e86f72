use std::{
    future::Future,
    io,
    path::{Path, PathBuf},
    process::Output,
    time::Duration,
};

use tempfile::TempDir;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to clone {url}: {stderr}")]
    Clone { url: String, stderr: String },
    #[error("commit {commit} not found: {stderr}")]
    CommitNotFound { commit: String, stderr: String },
    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout { operation: String, after: Duration },
}

/// An ephemeral directory holding a repository's working tree.
///
/// The directory is removed by [`Workspace::remove`], or on drop if that never happens.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn create() -> io::Result<Self> {
        Ok(Self { dir: tempfile::Builder::new().prefix("scanbot-").tempdir()? })
    }

    pub fn root(&self) -> &Path { self.dir.path() }

    /// Recursively delete the workspace. Blocking.
    pub fn remove(self) -> io::Result<()> {
        let root = self.root().to_path_buf();
        match self.dir.close() {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("Workspace {} was already removed", root.display());
                Ok(())
            }
            result => result,
        }
    }
}

/// Produces workspaces for push jobs.
pub trait Materializer: Send + Sync + 'static {
    /// Clone `url` into a fresh workspace.
    fn materialize(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Workspace, MaterializeError>> + Send;

    /// Check out `commit` inside the workspace.
    fn checkout(
        &self,
        workspace: &Workspace,
        commit: &str,
    ) -> impl Future<Output = Result<(), MaterializeError>> + Send;

    /// Schedule removal of the workspace without waiting for it.
    fn teardown(&self, workspace: Workspace);
}

/// Materializes repositories with the `git` command line.
#[derive(Debug, Clone)]
pub struct GitMaterializer {
    git: PathBuf,
    clone_timeout: Duration,
    checkout_timeout: Duration,
}

impl GitMaterializer {
    pub fn new(clone_timeout: Duration, checkout_timeout: Duration) -> Self {
        Self { git: PathBuf::from("git"), clone_timeout, checkout_timeout }
    }

    fn command(&self, workdir: &Path) -> Command {
        let mut cmd = Command::new(&self.git);
        cmd.current_dir(workdir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_CONFIG_NOSYSTEM", "1")
            .kill_on_drop(true);
        cmd
    }

    async fn run(
        &self,
        mut cmd: Command,
        operation: String,
        limit: Duration,
    ) -> Result<Output, MaterializeError> {
        match tokio::time::timeout(limit, cmd.output()).await {
            Ok(output) => Ok(output?),
            Err(_) => Err(MaterializeError::Timeout { operation, after: limit }),
        }
    }
}

impl Materializer for GitMaterializer {
    async fn materialize(&self, url: &str) -> Result<Workspace, MaterializeError> {
        let workspace = Workspace::create()?;
        let mut cmd = self.command(workspace.root());
        cmd.args(["clone", "--quiet", "--no-tags", "--", url, "."]);
        tracing::debug!("Cloning {url} into {}", workspace.root().display());
        // On failure the workspace drops here, removing the partial clone.
        let output = self.run(cmd, format!("clone of {url}"), self.clone_timeout).await?;
        if !output.status.success() {
            return Err(MaterializeError::Clone {
                url: url.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(workspace)
    }

    async fn checkout(&self, workspace: &Workspace, commit: &str) -> Result<(), MaterializeError> {
        let mut cmd = self.command(workspace.root());
        cmd.args(["checkout", "--quiet", "--force", "--detach", commit]);
        let output =
            self.run(cmd, format!("checkout of {commit}"), self.checkout_timeout).await?;
        if !output.status.success() {
            return Err(MaterializeError::CommitNotFound {
                commit: commit.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn teardown(&self, workspace: Workspace) {
        let root = workspace.root().display().to_string();
        tokio::task::spawn_blocking(move || match workspace.remove() {
            Ok(()) => tracing::debug!("Removed workspace {root}"),
            Err(e) => tracing::warn!("Failed to remove workspace {root}: {e}"),
        });
    }
}
