use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tally_core::cache::FetchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Upstream request failed: {0}")]
    Upstream(#[from] FetchError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl ShellError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }
}

impl IntoResponse for ShellError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(FetchError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
