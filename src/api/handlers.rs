//! HTTP request handlers

use super::types::{ErrorResponse, HealthResponse};
use super::AppState;
use crate::telegram::{handle_update, types::Update};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;

/// Header Telegram echoes back from `setWebhook`'s `secret_token`
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(receive_update))
        .route("/health", get(health))
        .route("/version", get(get_version))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Accept an update and process it off the request path; Telegram only
/// needs a quick 200
async fn receive_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<Update>,
) -> Response {
    if !secret_matches(&headers, state.webhook_secret.as_deref()) {
        tracing::warn!(update_id = update.update_id, "Webhook secret mismatch");
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("invalid secret token")),
        )
            .into_response();
    }

    let runtime = state.runtime.clone();
    tokio::spawn(async move {
        handle_update(&runtime, update).await;
    });
    StatusCode::OK.into_response()
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        active_sessions: state.runtime.active_sessions().await,
    })
}

async fn get_version() -> &'static str {
    concat!("learnbot ", env!("CARGO_PKG_VERSION"))
}

fn secret_matches(headers: &HeaderMap, expected: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    headers
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|given| given == expected)
}
