//! # app-server
//!
//! HTTP host for the application router. Serves the contract's procedures
//! under the RPC prefix, a plain-text health check at `/`, and a JSON 404
//! for everything else.

pub mod config;
pub mod rpc;
pub mod transport;

pub use config::{ConfigError, DevSession, ServerConfig};
pub use rpc::{AppState, InMemorySessionStore, StartupError, create_router};

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router, middleware};
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// How long browsers may cache a preflight response.
const CORS_MAX_AGE: Duration = Duration::from_secs(600);

/// Build the HTTP application.
pub fn app(state: AppState, config: &ServerConfig) -> Result<Router, ConfigError> {
    Ok(Router::new()
        .route("/", get(health))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state, transport::rpc_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(config)?))
}

/// CORS policy for the configured origins.
pub fn cors_layer(config: &ServerConfig) -> Result<CorsLayer, ConfigError> {
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(config.origin_headers()?))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(CORS_MAX_AGE))
}

async fn health() -> &'static str {
    "OK"
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "kind": "NOT_FOUND", "message": "Not found" })),
    )
}
