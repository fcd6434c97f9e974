use thiserror::Error;
use crate::domain::error::NormalizeError; // ドメインエラーをラップするため
use crate::infrastructure::error::InfrastructureError; // InfrastructureError をラップするため

#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("Normalization failed: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("Infrastructure error occurred: {0}")]
    InfrastructureError(#[from] InfrastructureError),
}

// IntoResponse implementation for ApplicationError
use axum::response::{IntoResponse, Response};
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use tracing::error;

impl ApplicationError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApplicationError::Normalize(err) => match err {
                NormalizeError::SizeRejected { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                NormalizeError::DecodeFailed(_) | NormalizeError::EncodeFailed(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                NormalizeError::Superseded => StatusCode::CONFLICT,
            },
            ApplicationError::InfrastructureError(infra_err) => match infra_err {
                InfrastructureError::MultipartError { status, .. } => *status,
                InfrastructureError::TooManyForms(_) => StatusCode::SERVICE_UNAVAILABLE,
                InfrastructureError::TaskJoinError(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_REQUEST,
            },
        }
    }
}

impl IntoResponse for ApplicationError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_message = match &self {
            ApplicationError::Normalize(err) => err.user_message().to_string(),
            ApplicationError::InfrastructureError(infra_err) => {
                if status.is_server_error() {
                    error!("InfrastructureError: {:?}", infra_err);
                }
                infra_err.to_string()
            }
        };
        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}
