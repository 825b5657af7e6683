use axum::{Json, http::StatusCode, response::{IntoResponse, Response}};
use tracing::error;

use justsave_types::api::ErrorResponse;

/// Failures of the room endpoints. Validation problems are the caller's to
/// fix; store problems are reported without detail.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(&'static str),

    #[error("room store failure: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message))).into_response()
            }
            ApiError::Store(e) => {
                error!("Room store error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new("Internal server error")),
                )
                    .into_response()
            }
        }
    }
}
