use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use parlor_core::error::ChatError;

/// Wraps [`ChatError`] so handlers can bubble coordinator errors straight
/// into HTTP responses with `?`.
pub struct ApiError(pub ChatError);

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        ApiError(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            ChatError::Unauthenticated => (StatusCode::UNAUTHORIZED, self.0.to_string()),
            ChatError::Validation(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            ChatError::NotFound(_) => (StatusCode::NOT_FOUND, self.0.to_string()),
            ChatError::Forbidden(_) => (StatusCode::FORBIDDEN, self.0.to_string()),
            ChatError::Conflict(_) => (StatusCode::CONFLICT, self.0.to_string()),
            ChatError::Storage(e) => {
                error!("Storage failure: {:#}", e);
                // Internal details stay out of the response body.
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

pub fn validation(message: impl Into<String>) -> ApiError {
    ApiError(ChatError::Validation(message.into()))
}
