//! Mapping of engine errors to HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use stall_core::error::CommerceError;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<serde_json::Value>,
}

/// Error returned by every API handler.
#[derive(Debug)]
pub struct ApiError(pub CommerceError);

impl From<CommerceError> for ApiError {
    fn from(err: CommerceError) -> Self {
        ApiError(err)
    }
}

fn status_of(err: &CommerceError) -> StatusCode {
    match err {
        CommerceError::NotFound { .. } => StatusCode::NOT_FOUND,
        CommerceError::Conflict(_) => StatusCode::CONFLICT,
        CommerceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CommerceError::Configuration(_) => StatusCode::PRECONDITION_FAILED,
        CommerceError::ExternalService { .. } => StatusCode::BAD_GATEWAY,
        CommerceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_of(&self.0);
        let body = match self.0 {
            CommerceError::Store(e) => {
                tracing::error!(error = %e, "API persistence error");
                ErrorBody {
                    error: "internal server error".into(),
                    provider: None,
                }
            }
            CommerceError::ExternalService { reason, provider } => {
                tracing::warn!(reason = %reason, "Payment provider failure");
                ErrorBody {
                    error: format!("payment verification failed, please retry: {reason}"),
                    provider,
                }
            }
            other => ErrorBody {
                error: other.to_string(),
                provider: None,
            },
        };
        (status, Json(body)).into_response()
    }
}
