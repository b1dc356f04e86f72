mod handlers;

use std::{
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use axum::{
    Router,
    extract::FromRef,
    http::{Request, StatusCode, header},
};
use scanbot_core::config::Config;
use scanbot_github::{GitHubApp, webhook::HEADER_DELIVERY};
use scanbot_jobs::{JobQueue, SlackNotifier, spawn_worker};
use scanbot_scan::{GitMaterializer, Scanner};
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    timeout::TimeoutLayer,
    trace::{DefaultOnResponse, MakeSpan, TraceLayer},
};
use tracing::{Level, Span};
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

use crate::handlers::build_router;

/// Shared application context, created once at startup and handed to every handler.
#[derive(Clone, FromRef)]
pub struct AppState {
    config: Arc<Config>,
    github: Arc<GitHubApp>,
    queue: JobQueue,
}

#[tokio::main]
async fn main() {
    let env_filter = EnvFilter::builder()
        // Default to info level
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config_path = std::env::var_os("SCANBOT_CONFIG")
        .map_or_else(|| PathBuf::from("config.yml"), PathBuf::from);
    let config = Arc::new(Config::load(&config_path).expect("Failed to load configuration"));
    let github = Arc::new(GitHubApp::new(&config.github).expect("Failed to set up GitHub App"));
    let client = reqwest::Client::builder()
        .user_agent(concat!("scanbot/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("Failed to create HTTP client");
    let notify_url =
        config.slack.webhook_url.clone().expect("Notification URL is checked when loading config");
    let notifier = SlackNotifier::new(client, notify_url, config.worker.notify_timeout());
    let materializer =
        GitMaterializer::new(config.worker.clone_timeout(), config.worker.checkout_timeout());
    let scanner = Scanner::from_config(&config.checkers, config.worker.checker_timeout());
    for checker in scanner.checkers() {
        tracing::info!("Checker enabled: {}", checker.name);
    }

    let (queue, jobs) = JobQueue::bounded(config.worker.queue_capacity);
    let worker = spawn_worker(materializer, scanner, notifier, jobs);

    let state = AppState { config: config.clone(), github, queue: queue.clone() };
    let router = app(state);
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.server.port));
    tracing::info!("Web server: Listening on {}", addr);
    let listener = TcpListener::bind(addr).await.expect("bind error");
    if let Err(e) = axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await {
        tracing::error!("Web server error: {e}");
    }
    tracing::info!("Web server stopped");

    // Queued jobs live only in memory.
    if !queue.is_empty() {
        tracing::warn!("Discarding {} queued push jobs", queue.len());
    }
    worker.abort();
    tracing::info!("Shut down gracefully");
}

fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(WebhookMakeSpan)
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(60),
        ));
    build_router().with_state(state).layer(middleware)
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        tokio::select! {
            _ = signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
    }
}

#[derive(Debug, Clone)]
pub struct WebhookMakeSpan;

impl<B> MakeSpan<B> for WebhookMakeSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let get = |name: &str| request.headers().get(name).and_then(|v| v.to_str().ok());
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            user_agent = %get(header::USER_AGENT.as_str()).unwrap_or("[unknown]"),
            delivery = %get(HEADER_DELIVERY).unwrap_or("-"),
        )
    }
}
