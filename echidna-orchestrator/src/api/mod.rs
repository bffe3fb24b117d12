//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod health;
pub mod request;
pub mod status;
pub mod version;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header::CONTENT_TYPE, request::Parts},
    routing::{get, post},
};
use regex::Regex;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::service::auth::Authenticator;
use crate::service::request_service::RequestService;

/// Largest accepted request body, uploaded archives included
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RequestService>,
    pub authenticator: Arc<dyn Authenticator>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.service.config().allowed_clients);

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Publication requests
        .route("/api/request", post(request::submit_request))
        .route("/api/status", get(status::get_status))
        // Versions
        .route("/api/version", get(version::get_version))
        .route(
            "/api/version-specberus",
            get(version::get_specberus_version),
        )
        // Add state and middleware
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// CORS for the allowed client origins
///
/// Patterns are matched anywhere in the `Origin` header. Invalid patterns
/// are rejected by config validation and skipped here.
fn cors_layer(allowed_clients: &[String]) -> CorsLayer {
    let patterns: Vec<Regex> = allowed_clients
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &Parts| {
                origin
                    .to_str()
                    .is_ok_and(|origin| patterns.iter().any(|re| re.is_match(origin)))
            },
        ))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
}
