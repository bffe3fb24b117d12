//! Version API Handlers

use axum::extract::State;

use crate::api::AppState;
use crate::service::request_service::VERSION;

/// GET /api/version
pub async fn get_version() -> &'static str {
    VERSION
}

/// GET /api/version-specberus
pub async fn get_specberus_version(State(state): State<AppState>) -> String {
    state.service.config().specberus_version.clone()
}
