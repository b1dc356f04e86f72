use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{FromRef, FromRequest, Request},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use hmac::{Hmac, Mac};
use octocrab::models::{
    InstallationId,
    webhook_events::{
        WebhookEvent, WebhookEventPayload,
        payload::{InstallationWebhookEventAction, PushWebhookEventCommit},
    },
};
use scanbot_core::{
    config::Config,
    models::{CommitRecord, PushJob},
};
use serde::de::Error as _;
use sha2::Sha256;
use thiserror::Error;

pub const HEADER_EVENT: &str = "X-GitHub-Event";
pub const HEADER_DELIVERY: &str = "X-GitHub-Delivery";
pub const HEADER_SIGNATURE: &str = "X-Hub-Signature-256";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("{0} header missing")]
    MissingHeader(&'static str),
    #[error("X-Hub-Signature-256 malformed")]
    MalformedSignature,
    #[error("signature mismatch")]
    SignatureMismatch,
    #[error("error reading body")]
    Body,
    #[error("error parsing body: {0}")]
    Payload(#[from] serde_json::Error),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        tracing::error!("Rejected webhook: {self}");
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

/// Verify and extract a GitHub event.
///
/// The signature is checked against the configured webhook secret before the body is parsed.
#[derive(Debug, Clone)]
#[must_use]
pub struct GitHubEvent {
    pub delivery: Option<String>,
    pub event: InboundEvent,
}

impl<S> FromRequest<S> for GitHubEvent
where
    Arc<Config>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = WebhookError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let headers = req.headers();
        let kind = header(headers, HEADER_EVENT)?.to_string();
        let signature = header(headers, HEADER_SIGNATURE)?.to_string();
        let delivery = header(headers, HEADER_DELIVERY).ok().map(str::to_string);
        let config = <Arc<Config>>::from_ref(state);
        let body = Bytes::from_request(req, state).await.map_err(|_| WebhookError::Body)?;
        verify_signature(config.github.app.webhook_secret.as_bytes(), &body, &signature)?;
        let event = InboundEvent::parse(&kind, &body)?;
        Ok(GitHubEvent { delivery, event })
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, WebhookError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::MissingHeader(name))
}

/// Check an `X-Hub-Signature-256` header value (`sha256=<hex>`) against the body.
pub fn verify_signature(secret: &[u8], body: &[u8], header: &str) -> Result<(), WebhookError> {
    let signature = header
        .strip_prefix("sha256=")
        .and_then(|digest| hex::decode(digest).ok())
        .ok_or(WebhookError::MalformedSignature)?;
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(body);
    mac.verify_slice(&signature).map_err(|_| WebhookError::SignatureMismatch)
}

/// The webhook events this service distinguishes.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Ping,
    Push(PushEvent),
    InstallationCreated(NewInstallation),
    Unhandled { kind: String, action: Option<String> },
}

#[derive(Debug, Clone)]
pub struct PushEvent {
    pub git_ref: String,
    pub job: PushJob,
}

#[derive(Debug, Clone)]
pub struct NewInstallation {
    pub id: InstallationId,
    /// `owner/name` of each repository the app was installed on.
    pub repositories: Vec<String>,
}

impl InboundEvent {
    pub fn parse(kind: &str, body: &[u8]) -> Result<Self, serde_json::Error> {
        let event = WebhookEvent::try_from_header_and_body(kind, body)?;
        match event.specific {
            WebhookEventPayload::Ping(_) => Ok(Self::Ping),
            WebhookEventPayload::Push(push) => {
                let push = *push;
                let repository = event.repository.ok_or_else(|| missing("repository"))?;
                let job = PushJob {
                    repository: repository.full_name.ok_or_else(|| missing("full_name"))?,
                    clone_url: repository
                        .clone_url
                        .ok_or_else(|| missing("clone_url"))?
                        .to_string(),
                    commits: push.commits.into_iter().map(commit_record).collect(),
                };
                Ok(Self::Push(PushEvent { git_ref: push.r#ref, job }))
            }
            WebhookEventPayload::Installation(inner)
                if inner.action == InstallationWebhookEventAction::Created =>
            {
                let installation = event.installation.ok_or_else(|| missing("installation"))?;
                Ok(Self::InstallationCreated(NewInstallation {
                    id: installation.id(),
                    repositories: inner
                        .repositories
                        .unwrap_or_default()
                        .into_iter()
                        .map(|r| r.full_name)
                        .collect(),
                }))
            }
            WebhookEventPayload::Installation(inner) => Ok(Self::Unhandled {
                kind: kind.to_string(),
                action: serde_json::to_value(&inner.action)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string)),
            }),
            _ => Ok(Self::Unhandled { kind: kind.to_string(), action: None }),
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Ping => "ping",
            Self::Push(_) => "push",
            Self::InstallationCreated(_) => "installation",
            Self::Unhandled { kind, .. } => kind,
        }
    }
}

fn missing(field: &'static str) -> serde_json::Error {
    serde_json::Error::missing_field(field)
}

fn commit_record(commit: PushWebhookEventCommit) -> CommitRecord {
    CommitRecord {
        id: commit.id,
        url: commit.url.to_string(),
        author_name: commit.author.user.name,
        added: commit.added,
        modified: commit.modified,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sign(secret: &[u8], body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn signature_roundtrip() {
        let body = br#"{"zen":"Keep it logically awesome."}"#;
        let header = sign(b"secret", body);
        assert!(verify_signature(b"secret", body, &header).is_ok());
        assert!(matches!(
            verify_signature(b"other", body, &header),
            Err(WebhookError::SignatureMismatch)
        ));
        assert!(matches!(
            verify_signature(b"secret", b"tampered", &header),
            Err(WebhookError::SignatureMismatch)
        ));
    }

    #[test]
    fn malformed_signatures() {
        for header in ["", "sha1=abcd", "sha256=zz", "abcdef"] {
            assert!(matches!(
                verify_signature(b"secret", b"{}", header),
                Err(WebhookError::MalformedSignature)
            ));
        }
    }

    fn commit(id: &str, author: &str, added: &[&str], modified: &[&str]) -> serde_json::Value {
        json!({
            "id": id,
            "tree_id": "9c2e3ad5e6b6a0d8e7c0e28f0f3b1f1d5d0a7b41",
            "distinct": true,
            "message": "Update files",
            "timestamp": "2024-05-01T12:00:00Z",
            "url": format!("https://github.com/octo/repo/commit/{id}"),
            "author": { "name": author, "email": "octo@example.com", "username": "octo" },
            "committer": { "name": author, "email": "octo@example.com" },
            "added": added,
            "removed": [],
            "modified": modified
        })
    }

    fn push_body(commits: Vec<serde_json::Value>) -> String {
        json!({
            "ref": "refs/heads/main",
            "before": "0000000000000000000000000000000000000000",
            "after": "2222222222222222222222222222222222222222",
            "created": false,
            "deleted": false,
            "forced": false,
            "base_ref": null,
            "compare": "https://github.com/octo/repo/compare/000000000000...222222222222",
            "commits": commits,
            "head_commit": null,
            "pusher": { "name": "octo", "email": "octo@example.com" },
            "repository": {
                "id": 1296269,
                "name": "repo",
                "full_name": "octo/repo",
                "url": "https://api.github.com/repos/octo/repo",
                "clone_url": "https://github.com/octo/repo.git"
            }
        })
        .to_string()
    }

    #[test]
    fn classify_ping() {
        let body = json!({ "zen": "Design for failure.", "hook_id": 1 }).to_string();
        assert!(matches!(InboundEvent::parse("ping", body.as_bytes()), Ok(InboundEvent::Ping)));
    }

    #[test]
    fn classify_push() {
        let body = push_body(vec![
            commit("1111", "Mona", &["secrets.txt"], &["readme.md"]),
            commit("2222", "Hubot", &[], &[]),
        ]);
        let Ok(InboundEvent::Push(PushEvent { git_ref, job })) =
            InboundEvent::parse("push", body.as_bytes())
        else {
            panic!("expected push");
        };
        assert_eq!(git_ref, "refs/heads/main");
        assert_eq!(job.repository, "octo/repo");
        assert_eq!(job.clone_url, "https://github.com/octo/repo.git");
        assert_eq!(job.commits.len(), 2);
        assert_eq!(job.commits[0].url, "https://github.com/octo/repo/commit/1111");
        assert_eq!(job.commits[0].author_name, "Mona");
        assert_eq!(job.commits[0].changed_files(), vec!["readme.md", "secrets.txt"]);
        assert_eq!(job.commits[1].id, "2222");
        assert!(job.commits[1].changed_files().is_empty());
    }

    #[test]
    fn push_without_commits() {
        let body = push_body(vec![]);
        let Ok(InboundEvent::Push(PushEvent { job, .. })) =
            InboundEvent::parse("push", body.as_bytes())
        else {
            panic!("expected push");
        };
        assert!(job.commits.is_empty());
    }

    #[test]
    fn classify_installation() {
        let created = json!({
            "action": "created",
            "installation": { "id": 42, "node_id": "MDIzOkludGVncmF0aW9uSW5zdGFsbGF0aW9uNDI=" },
            "repositories": [{
                "id": 1296269,
                "node_id": "MDEwOlJlcG9zaXRvcnkxMjk2MjY5",
                "name": "repo",
                "full_name": "octo/repo",
                "private": false
            }]
        })
        .to_string();
        let Ok(InboundEvent::InstallationCreated(installation)) =
            InboundEvent::parse("installation", created.as_bytes())
        else {
            panic!("expected installation created");
        };
        assert_eq!(installation.id, InstallationId(42));
        assert_eq!(installation.repositories, vec!["octo/repo"]);

        let deleted = json!({
            "action": "deleted",
            "installation": { "id": 42, "node_id": "MDIzOkludGVncmF0aW9uSW5zdGFsbGF0aW9uNDI=" }
        })
        .to_string();
        let event = InboundEvent::parse("installation", deleted.as_bytes()).unwrap();
        assert!(matches!(
            event,
            InboundEvent::Unhandled { ref kind, action: Some(ref action) }
                if kind == "installation" && action == "deleted"
        ));
    }

    #[test]
    fn classify_other_kinds() {
        let body = json!({ "action": "created", "starred_at": null }).to_string();
        let event = InboundEvent::parse("star", body.as_bytes()).unwrap();
        assert_eq!(event.kind(), "star");
        assert!(matches!(event, InboundEvent::Unhandled { action: None, .. }));

        let event = InboundEvent::parse("not_a_github_event", b"{}").unwrap();
        assert_eq!(event.kind(), "not_a_github_event");
    }

    #[test]
    fn malformed_payloads() {
        assert!(InboundEvent::parse("push", b"not json").is_err());
        assert!(InboundEvent::parse("push", br#"{"commits": []}"#).is_err());
        assert!(InboundEvent::parse("ping", b"").is_err());
        assert!(InboundEvent::parse("installation", br#"{"action": "created"}"#).is_err());

        let mut body: serde_json::Value = serde_json::from_str(&push_body(vec![])).unwrap();
        body["repository"].as_object_mut().unwrap().remove("clone_url");
        assert!(InboundEvent::parse("push", body.to_string().as_bytes()).is_err());
    }
}
