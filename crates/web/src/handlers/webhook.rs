use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use scanbot_core::AppError;
use scanbot_github::webhook::{GitHubEvent, InboundEvent, PushEvent};
use scanbot_jobs::QueueError;

use crate::AppState;

/// Classifies a verified GitHub event. Push events are queued for the worker and acknowledged
/// immediately; scanning happens out of band.
pub async fn webhook(
    State(state): State<AppState>,
    GitHubEvent { delivery, event }: GitHubEvent,
) -> Result<Response, AppError> {
    let delivery = delivery.as_deref().unwrap_or("[unknown]");
    tracing::info!("Received webhook event {} (delivery {delivery})", event.kind());

    match event {
        InboundEvent::Ping => Ok((StatusCode::OK, "Pong").into_response()),
        InboundEvent::Push(PushEvent { git_ref, job }) => {
            let repository = job.repository.clone();
            let commits = job.commits.len();
            match state.queue.try_enqueue(job) {
                Ok(()) => {
                    tracing::info!("Queued push to {repository} {git_ref} ({commits} commits)");
                    Ok((StatusCode::OK, "Queued").into_response())
                }
                Err(e @ QueueError::Full { .. }) => {
                    tracing::warn!("Rejected push to {repository}: {e}");
                    Err(AppError::Status(StatusCode::SERVICE_UNAVAILABLE))
                }
                Err(e) => Err(e.into()),
            }
        }
        InboundEvent::InstallationCreated(installation) => {
            tracing::info!("Installation {} created", installation.id);
            if let Err(e) = state.github.welcome(&installation).await {
                tracing::error!("{e:?}");
            }
            Ok((StatusCode::OK, "Event processed").into_response())
        }
        InboundEvent::Unhandled { kind, action } => {
            tracing::warn!(
                "Unhandled webhook event {kind} (action {})",
                action.as_deref().unwrap_or("none")
            );
            Err(AppError::Status(StatusCode::BAD_REQUEST))
        }
    }
}
