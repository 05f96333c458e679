use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{error, warn};

use crate::api::state::AppState;
use crate::domain::RateDecision;

#[derive(Debug, Serialize)]
pub struct RateLimitedResponse {
    pub error: String,
    pub reset_time: String,
}

/// SHA-256 of the `X-Forwarded-For` value, or of the peer IP when the header
/// is absent.
pub fn client_fingerprint(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let source = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string());

    hex::encode(Sha256::digest(source.as_bytes()))
}

pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_fingerprint(request.headers(), peer);

    match state.rate_limiter.check(&key).await {
        Ok(RateDecision::Allowed { .. }) => next.run(request).await,
        Ok(RateDecision::Limited { reset_at }) => {
            warn!(client = &key[..12], reset_at = %reset_at, "rate limit exceeded");
            let body = RateLimitedResponse {
                error: "Rate limit exceeded".to_string(),
                reset_time: reset_at.to_rfc3339(),
            };
            (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
        }
        Err(e) => {
            // Fail open.
            error!(error = %e, backend = state.rate_limiter.name(), "rate limiter check failed");
            next.run(request).await
        }
    }
}
