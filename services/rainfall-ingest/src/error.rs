//! Error taxonomy for the ingest pipeline and its HTTP translation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, warn};

/// Errors that fail an ingest request.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("File size must be less than {}", display_limit(.limit_bytes))]
    PayloadTooLarge { size_bytes: usize, limit_bytes: usize },

    #[error("No data could be extracted from the PDF")]
    NoDataExtracted,

    #[error("{0}")]
    Configuration(String),

    #[error("MongoDB upload failed: {0}")]
    Persistence(String),

    /// Carries the raw underlying message back to the caller.
    #[error("Failed to process PDF: {0}")]
    Internal(String),
}

/// Whole mebibyte limits read as `10MB`; anything else is given in bytes
fn display_limit(limit_bytes: &usize) -> String {
    const MIB: usize = 1024 * 1024;
    let limit_bytes = *limit_bytes;
    if limit_bytes >= MIB && limit_bytes % MIB == 0 {
        format!("{}MB", limit_bytes / MIB)
    } else {
        format!("{limit_bytes} bytes")
    }
}

/// Errors raised by a [`crate::document_parser::DocumentParser`].
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("failed to launch extractor `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("extractor exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("extractor timed out after {0:?}")]
    Timeout(Duration),

    #[error("extractor produced invalid output: {0}")]
    InvalidOutput(String),
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IngestError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::InvalidInput(_) => "INVALID_INPUT",
            IngestError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            IngestError::NoDataExtracted => "NO_DATA_EXTRACTED",
            IngestError::Configuration(_) => "CONFIGURATION_ERROR",
            IngestError::Persistence(_) => "PERSISTENCE_ERROR",
            IngestError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            IngestError::InvalidInput(_)
            | IngestError::PayloadTooLarge { .. }
            | IngestError::NoDataExtracted => StatusCode::BAD_REQUEST,
            IngestError::Configuration(_)
            | IngestError::Persistence(_)
            | IngestError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ParserError> for IngestError {
    fn from(err: ParserError) -> Self {
        IngestError::Internal(err.to_string())
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        if status.is_server_error() {
            error!(code, error = %self, "Request failed");
        } else {
            warn!(code, error = %self, "Request rejected");
        }
        metrics::counter!("rainfall.requests.failed", "code" => code).increment(1);

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
