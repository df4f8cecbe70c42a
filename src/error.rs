use crate::encoding::Envelope;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

pub type ServerResult<T> = Result<T, ServerError>;

/// Message sent for any failure on the storage side. Never carries paths.
pub const SAVE_FAILED: &str = "Error happened during save!";

/// Per-request error taxonomy
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid upload identifier")]
    InvalidIdentifier,

    #[error("Missing file field")]
    MissingField,

    #[error("Malformed multipart body: {0}")]
    Multipart(String),

    #[error("Upload exceeds {0} MiB")]
    PayloadTooLarge(usize),

    #[error("Storage failure: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Not found")]
    NotFound,

    #[error("Server is shutting down")]
    ShuttingDown,
}

impl ServerError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServerError::InvalidIdentifier
            | ServerError::MissingField
            | ServerError::Multipart(_) => StatusCode::BAD_REQUEST,
            ServerError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::Storage(_) | ServerError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::NotFound => StatusCode::NOT_FOUND,
        }
    }

    /// Client-facing message. Multipart and storage details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            ServerError::Multipart(_) => "Malformed multipart body".to_string(),
            ServerError::Storage(_) => SAVE_FAILED.to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 401 goes out bare: no envelope, no hint about what was wrong.
        if status == StatusCode::UNAUTHORIZED {
            return status.into_response();
        }

        Envelope::new(status, self.public_message()).into_response()
    }
}
