use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use loadgen_common::error::LoadError;
use serde::Serialize;
use thiserror::Error;

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub status: &'static str,
    pub message: String,
}

/// Errors returned by handlers, rendered as `{"status": "error", "message": ...}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Endpoint not found")]
    NotFound,
    #[error("{0}")]
    Internal(String),
    #[error("{0}")]
    Unavailable(String),
}

impl From<LoadError> for ApiError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::InvalidArgument(_) => ApiError::BadRequest(err.to_string()),
            LoadError::Spawn(err) => {
                ApiError::Internal(format!("Failed to start CPU load: {}", err))
            }
            LoadError::ShuttingDown => ApiError::Unavailable(
                "Service is shutting down, CPU load can no longer be started".to_owned(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = ErrorBody {
            status: "error",
            message: self.to_string(),
        };
        (code, Json(body)).into_response()
    }
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
