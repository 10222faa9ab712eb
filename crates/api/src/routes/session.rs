//! Session Routes

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use monitor::SessionError;
use serde::Serialize;
use tracing::{info, warn};

use crate::AppState;

/// Command accepted by the session task
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub accepted: bool,
    pub command: &'static str,
}

/// Error body returned when the session cannot be reached
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub retryable: bool,
}

pub struct ApiError(SessionError);

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!("Session request failed: {}", self.0);
        let body = ErrorResponse {
            error: self.0.to_string(),
            retryable: self.0.is_retryable(),
        };
        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    }
}

/// Latest state snapshot, or 204 before the first processed frame
pub async fn get_assessment(State(state): State<Arc<AppState>>) -> Response {
    match state.session.latest() {
        Some(snapshot) => Json(snapshot).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// Driver acknowledged the active alert
pub async fn acknowledge(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CommandResponse>, ApiError> {
    state.session.acknowledge().await?;
    info!("Acknowledgment forwarded to session");
    Ok(Json(CommandResponse {
        accepted: true,
        command: "acknowledge",
    }))
}

/// Start the session over
pub async fn reset(State(state): State<Arc<AppState>>) -> Result<Json<CommandResponse>, ApiError> {
    state.session.reset().await?;
    info!("Reset forwarded to session");
    Ok(Json(CommandResponse {
        accepted: true,
        command: "reset",
    }))
}
