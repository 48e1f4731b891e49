use actix_web::error::BlockingError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Failures reported by a capture source
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Error from pcap library
    #[error("PCAP error: {0}")]
    Pcap(#[from] pcap::Error),

    /// Read failure from a non-pcap source
    #[error("Capture error: {0}")]
    Source(String),

    /// The blocking capture task died before reporting an outcome
    #[error("Capture task failed: {0}")]
    Task(String),
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or malformed filter input
    #[error("{0}")]
    Validation(String),

    /// Error from the capture source
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// A blocking helper task was cancelled or panicked
    #[error("Blocking task failed: {0}")]
    Blocking(#[from] BlockingError),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.to_string()
        }))
    }
}

/// Result type for application
pub type AppResult<T> = Result<T, AppError>;
