//! HTTP request handlers

use super::AppState;
use crate::bot::Update;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

/// Header carrying the secret registered with `setWebhook`
const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Path segment used when no webhook secret is configured
const OPEN_PATH_SECRET: &str = "-";

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Bot API updates
        .route("/webhook/:secret", post(receive_update))
        .route("/health", get(health))
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Webhook
// ============================================================

/// Accept an update and process it in the background.
///
/// The platform only needs a fast 200; slow chat calls must not hold the
/// webhook connection.
async fn receive_update(
    State(state): State<AppState>,
    Path(secret): Path<String>,
    headers: HeaderMap,
    Json(update): Json<Update>,
) -> Result<StatusCode, AppError> {
    authorize(state.webhook_secret.as_deref(), &secret, &headers)?;

    tracing::debug!(update_id = update.update_id, "Update received");
    let dispatcher = state.dispatcher.clone();
    tokio::spawn(async move {
        dispatcher.dispatch(update).await;
    });
    Ok(StatusCode::OK)
}

fn authorize(expected: Option<&str>, path_secret: &str, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(expected) = expected else {
        if path_secret == OPEN_PATH_SECRET {
            return Ok(());
        }
        return Err(AppError::NotFound("Unknown webhook".to_string()));
    };
    let header_secret = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
    if path_secret != expected || header_secret != Some(expected) {
        tracing::warn!(has_header = header_secret.is_some(), "Rejected webhook call with bad secret");
        return Err(AppError::Unauthorized("Bad webhook secret".to_string()));
    }
    Ok(())
}

// ============================================================
// Health & Version
// ============================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    active_sessions: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        active_sessions: state.sessions.len(),
    })
}

async fn get_version() -> &'static str {
    concat!("ridebot ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

enum AppError {
    Unauthorized(String),
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}
