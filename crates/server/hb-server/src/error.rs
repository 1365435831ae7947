//! HTTP mapping of the core error taxonomy.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hb_core::CoreError;
use tracing::error;

/// Error with an explicit HTTP status. Internal details are logged, never sent.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound(what) => Self::new(StatusCode::NOT_FOUND, format!("{} not found", what)),
            CoreError::InvalidState => Self::new(StatusCode::FORBIDDEN, "Invalid state"),
            CoreError::ProviderAuthFailure(_) => {
                Self::new(StatusCode::FORBIDDEN, "Authentication failure")
            }
            CoreError::Unauthorized => Self::new(StatusCode::FORBIDDEN, "You must log in"),
            CoreError::AlreadyExists(what) => {
                Self::new(StatusCode::CONFLICT, format!("{} already exists", what))
            }
            other => {
                error!("Request failed: {}", other);
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}
