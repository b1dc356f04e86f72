use std::{fmt::Display, future::Future, time::Duration};

use anyhow::{Context, Result};
use scanbot_core::models::{CommitRecord, PushJob, ScanReport};
use serde::Serialize;
use url::Url;

/// A message for the team channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub text: String,
}

impl Notification {
    pub fn findings(commit: &CommitRecord, report: &ScanReport) -> Self {
        Self {
            text: format!(
                "Possible PII violations found in:\n{}\nAuthor: {}\n\n{}\n",
                commit.url, commit.author_name, report.text
            ),
        }
    }

    pub fn commit_failed(commit: &CommitRecord, err: impl Display) -> Self {
        Self { text: format!("An error occurred while scanning {}:\n{}", commit.url, err) }
    }

    pub fn job_failed(job: &PushJob, err: impl Display) -> Self {
        Self {
            text: format!(
                "An error occurred while fetching {} for scanning:\n{}",
                job.repository, err
            ),
        }
    }
}

/// Delivers notifications. One attempt, no retries.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, notification: &Notification) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Serialize)]
struct SlackMessage<'a> {
    text: &'a str,
}

/// Posts `{"text": ...}` to a Slack incoming webhook.
#[derive(Debug, Clone)]
pub struct SlackNotifier {
    client: reqwest::Client,
    url: Url,
    timeout: Duration,
}

impl SlackNotifier {
    pub fn new(client: reqwest::Client, url: Url, timeout: Duration) -> Self {
        Self { client, url, timeout }
    }
}

impl Notifier for SlackNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        self.client
            .post(self.url.clone())
            .timeout(self.timeout)
            .json(&SlackMessage { text: &notification.text })
            .send()
            .await
            .context("Failed to send notification")?
            .error_for_status()
            .context("Notification rejected")?;
        Ok(())
    }
}
