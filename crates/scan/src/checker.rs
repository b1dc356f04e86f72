use std::{path::Path, process::Stdio, time::Duration};

use scanbot_core::{
    config::CheckerConfig,
    models::ScanReport,
    util::{join_normalized, strip_all},
};
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("checker {checker} could not be started: {source}")]
    Launch { checker: String, source: std::io::Error },
    #[error("checker {checker} timed out after {}s", .after.as_secs())]
    Timeout { checker: String, after: Duration },
    #[error("checker {checker} failed while collecting output: {source}")]
    Io { checker: String, source: std::io::Error },
}

/// An external executable invoked with absolute file paths; whatever it prints is a finding.
#[derive(Debug, Clone)]
pub struct Checker {
    pub name: String,
    program: String,
    args: Vec<String>,
}

impl Checker {
    /// Returns `None` for an empty command.
    pub fn from_config(config: &CheckerConfig) -> Option<Self> {
        let (program, args) = config.command.split_first()?;
        Some(Self { name: config.name.clone(), program: program.clone(), args: args.to_vec() })
    }

    async fn run(&self, files: &[String], limit: Duration) -> Result<String, ScanError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .args(files)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let child = cmd
            .spawn()
            .map_err(|source| ScanError::Launch { checker: self.name.clone(), source })?;
        let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(result) => {
                result.map_err(|source| ScanError::Io { checker: self.name.clone(), source })?
            }
            Err(_) => return Err(ScanError::Timeout { checker: self.name.clone(), after: limit }),
        };
        if !output.status.success() {
            // Checkers commonly exit non-zero when they find something; stdout is what counts.
            tracing::debug!("Checker {} exited with {}", self.name, output.status);
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Runs every configured checker, in order, against a commit's files.
#[derive(Debug, Clone)]
pub struct Scanner {
    checkers: Vec<Checker>,
    timeout: Duration,
}

impl Scanner {
    pub fn new(checkers: Vec<Checker>, timeout: Duration) -> Self { Self { checkers, timeout } }

    /// Empty commands are rejected by `Config::validate`; any that remain are skipped.
    pub fn from_config(configs: &[CheckerConfig], timeout: Duration) -> Self {
        Self::new(configs.iter().filter_map(Checker::from_config).collect(), timeout)
    }

    pub fn checkers(&self) -> &[Checker] { &self.checkers }

    /// Scan `commit`'s `files` (relative to `root`). Returns `None` when no checker printed
    /// anything.
    ///
    /// The workspace root is stripped from the report so local paths don't leak.
    pub async fn scan(
        &self,
        root: &Path,
        commit: &str,
        files: &[String],
    ) -> Result<Option<ScanReport>, ScanError> {
        let paths = files
            .iter()
            .map(|file| join_normalized(root, file).display().to_string())
            .collect::<Vec<_>>();
        let mut outputs = Vec::with_capacity(self.checkers.len());
        for checker in &self.checkers {
            tracing::debug!("Running checker {} on {} files", checker.name, paths.len());
            outputs.push(checker.run(&paths, self.timeout).await?);
        }
        Ok(aggregate(&outputs).map(|text| ScanReport {
            commit: commit.to_string(),
            text: strip_all(&text, &root.display().to_string()),
        }))
    }
}

/// Join non-blank outputs with a newline, in checker order.
pub fn aggregate(outputs: &[String]) -> Option<String> {
    let text = outputs
        .iter()
        .filter(|output| !output.trim().is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n");
    if text.is_empty() { None } else { Some(text) }
}
