//! ridebot - group ride scheduling assistant for Telegram
//!
//! Collects rides through a step-by-step wizard or parameter commands,
//! posts them into chats, tracks who joins, and keeps every posted copy of
//! a ride up to date.

mod api;
mod bot;
mod commands;
mod config;
mod db;
mod error;
mod fields;
mod participation;
mod render;
mod repository;
mod ride;
mod route;
mod sync;
#[cfg(test)]
mod testing;
mod transport;
mod wizard;

use api::{create_router, AppState};
use bot::Dispatcher;
use commands::CommandService;
use config::Config;
use db::Database;
use participation::ParticipationStore;
use render::HtmlRenderer;
use repository::RideRepository;
use route::HttpRouteInspector;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sync::MessageSynchronizer;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::{BoundedTransport, TelegramTransport, Transport};
use wizard::{SessionStore, WizardEngine};

/// How often idle wizard sessions are swept
const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ridebot=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env()?;

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path, "Opening database");
    let db = Database::open(&config.db_path)?;

    // Chat platform and route pages
    let telegram = Arc::new(TelegramTransport::new(&config.api_url, &config.bot_token));
    let transport: Arc<dyn Transport> = Arc::new(BoundedTransport::new(
        telegram.clone(),
        config.transport_timeout,
    ));
    let inspector = Arc::new(HttpRouteInspector::new(config.route_timeout)?);

    // Core components
    let repo = RideRepository::new(db.clone());
    let sync = Arc::new(MessageSynchronizer::new(
        repo.clone(),
        transport.clone(),
        Arc::new(HtmlRenderer),
    ));
    let sessions = Arc::new(SessionStore::new(config.session_ttl));
    let wizard = Arc::new(WizardEngine::new(
        sessions.clone(),
        repo.clone(),
        sync.clone(),
        transport.clone(),
        inspector,
        config.route_timeout,
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        CommandService::new(repo, sync.clone(), wizard.clone()),
        wizard.clone(),
        ParticipationStore::new(db),
        sync,
        transport,
    ));

    let shutdown = CancellationToken::new();
    let evictor = tokio::spawn(evict_sessions(
        wizard,
        sessions.clone(),
        shutdown.clone(),
    ));

    if let Some(url) = config.webhook_url() {
        match telegram
            .set_webhook(&url, config.webhook_secret.as_deref())
            .await
        {
            Ok(()) => tracing::info!(%url, "Webhook registered"),
            Err(e) => tracing::error!(error = %e, "Failed to register webhook"),
        }
    } else {
        tracing::warn!("RIDEBOT_PUBLIC_URL not set; the webhook must be registered manually");
    }

    let state = AppState::new(dispatcher, sessions, config.webhook_secret.clone());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "ridebot listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    evictor.await?;
    tracing::info!("ridebot stopped");
    Ok(())
}

/// Periodically drop idle wizard sessions until shutdown
async fn evict_sessions(
    wizard: Arc<WizardEngine>,
    sessions: Arc<SessionStore>,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(EVICTION_INTERVAL);
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let evicted = wizard.evict_idle().await;
                if evicted > 0 {
                    tracing::info!(evicted, active = sessions.len(), "Session sweep finished");
                }
            }
        }
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    };
    tokio::select! {
        () = shutdown.cancelled() => {}
        () = ctrl_c => {
            tracing::info!("Shutdown requested");
            shutdown.cancel();
        }
    }
}
