//! Status API Handler
//!
//! Serves the result file of a finished request, or the live record of one
//! that is still in memory.

use axum::{
    Json,
    extract::{Query, State},
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
};
use echidna_core::dto::request::StatusQuery;
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::repository::result_repository;

/// GET /api/status?id=<id>
pub async fn get_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Response> {
    let raw = match query.id.filter(|id| !id.is_empty()) {
        Some(id) => id,
        None => {
            return Err(ApiError::BadRequest(
                "Missing required parameter “ID”.".to_string(),
            ));
        }
    };
    let not_found = || ApiError::NotFound(format!("No job found with ID “{}”.", raw));

    let id = Uuid::parse_str(&raw).map_err(|_| not_found())?;
    tracing::debug!("Getting status of request: {}", id);

    let config = state.service.config();
    if let Some(bytes) = result_repository::load(&config.result_location, id).await? {
        return Ok(([(CONTENT_TYPE, "application/json")], bytes).into_response());
    }

    match state.service.registry().get(id) {
        Some(record) => Ok(Json(record.as_ref()).into_response()),
        None => Err(not_found()),
    }
}
