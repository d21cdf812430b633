//! HTTP error responses for the dreamlens server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use dreamlens_core::error::{StoreLoadError, SubmitError};

#[derive(Debug)]
pub enum ServerError {
    /// Unusable request input (blank dream, unreadable form).
    BadRequest(String),
    /// The classifier failed. Details stay in the logs.
    Classification,
    /// The vector store did not load at startup.
    StoreUnavailable(String),
    NotFound(String),
    Internal(String),
}

/// JSON body returned on error.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: u16,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ServerError::Classification => (
                StatusCode::BAD_GATEWAY,
                "dream could not be classified".to_string(),
            ),
            ServerError::StoreUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ServerError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ServerError::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: message,
            code: status.as_u16(),
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<SubmitError> for ServerError {
    fn from(e: SubmitError) -> Self {
        match e {
            SubmitError::EmptyDream => ServerError::BadRequest("field `dream` is required".into()),
            SubmitError::Classification(_) => ServerError::Classification,
        }
    }
}

impl From<StoreLoadError> for ServerError {
    fn from(e: StoreLoadError) -> Self {
        ServerError::StoreUnavailable(format!("nearest-neighbor data unavailable: {e}"))
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(e: anyhow::Error) -> Self {
        ServerError::Internal(format!("{e:#}"))
    }
}

impl From<tokio::task::JoinError> for ServerError {
    fn from(e: tokio::task::JoinError) -> Self {
        ServerError::Internal(format!("blocking task failed: {e}"))
    }
}
