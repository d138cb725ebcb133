//! Error taxonomy for the drop service and its mapping onto HTTP responses.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use log::error;

/// Errors raised by the stores and services.
#[derive(Debug, thiserror::Error)]
pub enum DropError {
    /// File type is not in the extension allow-list.
    #[error("File type not accepted: {0}")]
    Rejected(String),

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Identifier collision on insert. Retried by the ingestor with a fresh id.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Incomplete upload: expected {expected} bytes, received {received}")]
    IncompleteBody { expected: u64, received: u64 },

    #[error("Upload exceeds the limit of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    #[error("Error reading request body: {0}")]
    Payload(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<std::io::Error> for DropError {
    fn from(e: std::io::Error) -> Self {
        DropError::Storage(e.to_string())
    }
}

impl From<rusqlite::Error> for DropError {
    fn from(e: rusqlite::Error) -> Self {
        DropError::Storage(e.to_string())
    }
}

impl ResponseError for DropError {
    fn status_code(&self) -> StatusCode {
        match self {
            DropError::Rejected(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            DropError::InvalidFilename(_)
            | DropError::IncompleteBody { .. }
            | DropError::Payload(_) => StatusCode::BAD_REQUEST,
            DropError::NotFound(_) => StatusCode::NOT_FOUND,
            DropError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            DropError::DuplicateKey(_) | DropError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            // Internal details stay in the log.
            error!("{}", self);
            return HttpResponse::build(status)
                .content_type("text/plain; charset=utf-8")
                .body("Internal server error\n");
        }
        HttpResponse::build(status)
            .content_type("text/plain; charset=utf-8")
            .body(format!("{}\n", self))
    }
}
