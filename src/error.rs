use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Request-level failures. Every variant maps to exactly one HTTP status.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or empty upload field.
    #[error("{0}")]
    Validation(String),

    /// Upload larger than the configured body limit.
    #[error("{0}")]
    PayloadTooLarge(String),

    /// Anything that went wrong while decoding, preprocessing or classifying.
    #[error("{0}")]
    Processing(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<ModelError> for AppError {
    fn from(err: ModelError) -> Self {
        AppError::Processing(err.to_string())
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::Processing(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Processing(err.to_string())
    }
}

/// Failures while loading or running the classifier.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tensorflow: {0}")]
    Tensorflow(#[from] tensorflow::Status),

    #[error("operation '{0}' not found in graph")]
    MissingOperation(String),

    #[error("invalid label file: {0}")]
    Labels(String),

    #[error("predicted index {index} is outside the label table ({len} labels)")]
    LabelOutOfRange { index: usize, len: usize },

    #[error("classifier produced no scores")]
    EmptyOutput,
}

/// Startup configuration and provisioning failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("failed to download {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
