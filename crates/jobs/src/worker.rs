use std::sync::Arc;

use scanbot_core::models::{CommitRecord, PushJob};
use scanbot_scan::{Materializer, Scanner, Workspace};

use crate::{
    notify::{Notification, Notifier},
    queue::JobReceiver,
};

/// Per-job counts, logged when a job finishes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JobSummary {
    pub scanned: usize,
    pub clean: usize,
    pub findings: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Drains the job queue one job at a time: materialize, scan each commit, notify, tear down.
pub struct Worker<M, N> {
    materializer: M,
    scanner: Scanner,
    notifier: N,
}

impl<M: Materializer, N: Notifier> Worker<M, N> {
    pub fn new(materializer: M, scanner: Scanner, notifier: N) -> Self {
        Self { materializer, scanner, notifier }
    }

    /// Run until the queue closes.
    ///
    /// Every job runs in its own task so that a panic is contained to that job; its workspace
    /// is removed as the task unwinds.
    pub async fn run(self: Arc<Self>, mut jobs: JobReceiver) {
        tracing::info!("Worker started");
        while let Some(job) = jobs.recv().await {
            let repository = job.repository.clone();
            let worker = self.clone();
            match tokio::spawn(async move { worker.process_job(job).await }).await {
                Ok(summary) => tracing::info!(
                    repository = %repository,
                    scanned = summary.scanned,
                    clean = summary.clean,
                    findings = summary.findings,
                    skipped = summary.skipped,
                    failed = summary.failed,
                    "Finished push job"
                ),
                Err(e) => tracing::error!("Worker task for {repository} failed: {e}"),
            }
        }
        tracing::info!("Job queue closed, worker stopping");
    }

    pub async fn process_job(&self, job: PushJob) -> JobSummary {
        let mut summary = JobSummary::default();
        if job.commits.is_empty() {
            tracing::debug!("Push to {} has no commits, skipping", job.repository);
            return summary;
        }
        tracing::info!("Processing {} commits from {}", job.commits.len(), job.repository);

        let workspace = match self.materializer.materialize(&job.clone_url).await {
            Ok(workspace) => workspace,
            Err(e) => {
                tracing::error!("Failed to materialize {}: {e}", job.repository);
                summary.failed = job.commits.len();
                self.deliver(Notification::job_failed(&job, &e)).await;
                return summary;
            }
        };
        for commit in &job.commits {
            self.process_commit(&workspace, commit, &mut summary).await;
        }
        self.materializer.teardown(workspace);
        summary
    }

    async fn process_commit(
        &self,
        workspace: &Workspace,
        commit: &CommitRecord,
        summary: &mut JobSummary,
    ) {
        let files = commit.changed_files();
        if files.is_empty() {
            tracing::debug!("Commit {} has no added or modified files", commit.id);
            summary.skipped += 1;
            return;
        }
        // A commit that can't be checked out is reported and skipped: scanning whatever tree is
        // checked out instead would attribute findings to the wrong commit.
        if let Err(e) = self.materializer.checkout(workspace, &commit.id).await {
            tracing::warn!("Failed to check out {}: {e}", commit.id);
            summary.failed += 1;
            self.deliver(Notification::commit_failed(commit, &e)).await;
            return;
        }
        summary.scanned += 1;
        match self.scanner.scan(workspace.root(), &commit.id, &files).await {
            Ok(Some(report)) => {
                tracing::info!("Findings in commit {}", commit.id);
                summary.findings += 1;
                self.deliver(Notification::findings(commit, &report)).await;
            }
            Ok(None) => {
                tracing::debug!("Commit {} is clean", commit.id);
                summary.clean += 1;
            }
            Err(e) => {
                tracing::error!("Failed to scan {}: {e}", commit.id);
                summary.failed += 1;
                self.deliver(Notification::commit_failed(commit, &e)).await;
            }
        }
    }

    async fn deliver(&self, notification: Notification) {
        if let Err(e) = self.notifier.notify(&notification).await {
            tracing::error!("{e:?}");
        }
    }
}
