use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::api::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub version: String,
    pub model_loaded: bool,
    pub memory: String,
    pub rate_limiter: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        message: "Void Z1 is running.".into(),
    })
}

pub async fn readiness_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let limiter = state.rate_limiter.name();
    let limiter_status = match state.rate_limiter.ping().await {
        Ok(()) => format!("{limiter}: connected"),
        Err(e) => {
            tracing::warn!(error = %e, backend = limiter, "rate limiter unreachable");
            format!("{limiter}: disconnected")
        }
    };
    let is_ready = limiter_status.ends_with(": connected");

    let memory = state
        .chat_service
        .memory()
        .map(|m| m.store_name())
        .unwrap_or("disabled");

    let response = ReadinessResponse {
        status: if is_ready { "ready" } else { "not_ready" }.into(),
        version: env!("CARGO_PKG_VERSION").into(),
        model_loaded: state.chat_service.model_loaded(),
        memory: memory.into(),
        rate_limiter: limiter_status,
    };

    let status = if is_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}
