use axum::http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InfrastructureError {
    #[error("Multipart error: {message}")]
    MultipartError { status: StatusCode, message: String },

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Too many open forms (limit {0})")]
    TooManyForms(usize),

    #[error("Request is missing the `{0}` field")]
    MissingField(&'static str),

    #[error("Invalid data URL: {0}")]
    InvalidDataUrl(String),

    #[error("Base64 decode error")]
    Base64DecodeError(#[from] base64::DecodeError), // base64::DecodeError をラップ

    #[error("Background task failed: {0}")]
    TaskJoinError(String),
}

impl From<axum::extract::multipart::MultipartError> for InfrastructureError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        InfrastructureError::MultipartError {
            status: err.status(),
            message: err.body_text(),
        }
    }
}
