//! API Error Handling
//!
//! Unified error types and conversion for API responses. Bodies are plain
//! text, the way clients of the publication API read them.

use axum::{
    http::{StatusCode, header::WWW_AUTHENTICATE},
    response::{IntoResponse, Response},
};

use crate::repository::result::PersistError;
use crate::service::request_service::SubmitError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    MissingParameters(String),
    UnsupportedMediaType(String),
    ServiceUnavailable(String),
    InternalError(String),
}

/// Challenge sent with `401` answers
const BASIC_CHALLENGE: &str = "Basic realm=\"Users\"";

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized(msg) => {
                return (
                    StatusCode::UNAUTHORIZED,
                    [(WWW_AUTHENTICATE, BASIC_CHALLENGE)],
                    msg,
                )
                    .into_response();
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::MissingParameters(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::UnsupportedMediaType(msg) => (StatusCode::NOT_IMPLEMENTED, msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, message).into_response()
    }
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::InvalidSubmission(msg) => ApiError::MissingParameters(msg),
            SubmitError::StagingError(err) => {
                ApiError::InternalError(format!("Failed to stage upload: {}", err))
            }
            SubmitError::ShuttingDown => {
                ApiError::ServiceUnavailable("Service is shutting down".to_string())
            }
        }
    }
}

impl From<PersistError> for ApiError {
    fn from(err: PersistError) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_carries_basic_challenge() {
        let response = ApiError::Unauthorized("Unauthorized".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(WWW_AUTHENTICATE).unwrap(),
            BASIC_CHALLENGE
        );
    }

    #[test]
    fn test_shutting_down_is_unavailable() {
        let response = ApiError::from(SubmitError::ShuttingDown).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
