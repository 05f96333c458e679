pub mod chat;
pub mod health;
pub mod train;

use std::path::Path;

use axum::http::{header, Method};
use axum::{middleware, routing::get, routing::post, Router};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::api::middleware::{no_cache_assets, rate_limit, request_logger, security_headers};
use crate::api::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let cors = build_cors(&state.config.cors.allowed_origins);
    let frontend = frontend_service(&state.config.server.frontend_dir);

    Router::new()
        .merge(api_routes(state.clone()))
        .fallback_service(frontend)
        .layer(middleware::from_fn(no_cache_assets))
        .layer(middleware::from_fn(security_headers))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn api_routes(state: AppState) -> Router<AppState> {
    let chat = Router::new()
        .route("/chat", post(chat::chat_handler))
        .route_layer(middleware::from_fn_with_state(state, rate_limit));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/train", post(train::train_handler))
        .route("/status", get(train::training_status))
        .merge(chat)
        .route_layer(middleware::from_fn(request_logger))
}

/// Built frontend, with unknown paths falling back to `index.html` so client
/// side routes resolve.
fn frontend_service(dir: &Path) -> ServeDir<ServeFile> {
    ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html")))
}

fn build_cors(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        cors.allow_origin(origins)
    }
}
