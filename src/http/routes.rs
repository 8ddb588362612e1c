//! HTTP route definitions

use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use crate::app::AppState;
use crate::config::GameConfig;
use crate::sync::SessionId;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.client_origin);

    Router::new()
        .route("/health", get(health_handler))
        .route("/sessions", post(host_session_handler))
        .route("/sessions/:id", get(session_handler))
        .route("/sessions/:id/ws", get(ws_handler))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// CORS for a comma separated origin list, or any origin for `*`
fn cors_layer(client_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if client_origin.trim() == "*" {
        return cors.allow_origin(Any);
    }

    let allowed_origins: Vec<header::HeaderValue> = client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();
    cors.allow_origin(allowed_origins)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_sessions: usize,
    active_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_sessions: state.sessions.active_sessions(),
        active_players: state.sessions.total_players(),
    })
}

// ============================================================================
// Session endpoints
// ============================================================================

/// Optional per-session overrides of the server's game settings
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HostRequest {
    min_players: Option<usize>,
    round_ticks: Option<u32>,
    countdown_secs: Option<u64>,
    seed: Option<u64>,
}

impl HostRequest {
    fn apply(self, base: &GameConfig) -> GameConfig {
        GameConfig {
            min_players: self.min_players.unwrap_or(base.min_players),
            round_ticks: self.round_ticks.unwrap_or(base.round_ticks),
            countdown_secs: self.countdown_secs.unwrap_or(base.countdown_secs),
            seed: self.seed.or(base.seed),
            ..base.clone()
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HostResponse {
    session_id: SessionId,
    ws_path: String,
}

async fn host_session_handler(
    State(state): State<AppState>,
    body: Option<Json<HostRequest>>,
) -> Result<(StatusCode, Json<HostResponse>), AppError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let config = request.apply(&state.config.game);
    config
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let session_id = state.sessions.host(config);
    info!(session_id = %session_id, "Session hosted over HTTP");

    Ok((
        StatusCode::CREATED,
        Json(HostResponse {
            session_id,
            ws_path: format!("/sessions/{session_id}/ws"),
        }),
    ))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    session_id: SessionId,
    player_count: usize,
    ticks_remaining: Option<u32>,
}

async fn session_handler(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> Result<Json<SessionResponse>, AppError> {
    let handle = state
        .sessions
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("session {id}")))?;

    Ok(Json(SessionResponse {
        session_id: handle.id,
        player_count: handle.player_count(),
        ticks_remaining: handle.latest_snapshot().map(|s| s.ticks_remaining),
    }))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_keep_unset_fields() {
        let base = GameConfig::default();
        let config = HostRequest {
            min_players: Some(2),
            ..HostRequest::default()
        }
        .apply(&base);
        assert_eq!(config.min_players, 2);
        assert_eq!(config.round_ticks, base.round_ticks);
        assert_eq!(config.cols, base.cols);
        assert_eq!(config.countdown_secs, base.countdown_secs);

        let instant: HostRequest = serde_json::from_str(r#"{"countdownSecs": 0}"#).unwrap();
        assert_eq!(instant.apply(&base).countdown_ticks(), 0);
    }

    #[test]
    fn invalid_override_fails_validation() {
        let config = HostRequest {
            min_players: Some(9),
            ..HostRequest::default()
        }
        .apply(&GameConfig::default());
        assert!(config.validate().is_err());
    }

    #[test]
    fn error_maps_to_status() {
        let response = AppError::NotFound("session x".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
