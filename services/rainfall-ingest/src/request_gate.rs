use crate::config::IngestConfig;
use crate::error::IngestError;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::fmt;
use tracing::info;

/// How the document reached the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestSource {
    /// Multipart form upload carrying the original file name
    Multipart { filename: String },
    /// Base64 payload inside a JSON body
    Base64,
}

impl fmt::Display for IngestSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestSource::Multipart { .. } => f.write_str("multipart"),
            IngestSource::Base64 => f.write_str("base64"),
        }
    }
}

/// Canonical request produced by either ingress shape
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// Raw document bytes
    pub bytes: Vec<u8>,
    /// Caller-supplied date, kept verbatim
    pub date: String,
    /// Ingress shape
    pub source: IngestSource,
}

/// Validates both ingress shapes into an [`IngestRequest`]
#[derive(Debug, Clone)]
pub struct RequestGate {
    max_upload_bytes: usize,
    limit_base64_payloads: bool,
}

impl RequestGate {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            max_upload_bytes: config.max_upload_bytes,
            limit_base64_payloads: config.limit_base64_payloads,
        }
    }

    /// Accept a multipart upload.
    ///
    /// The extension check runs before the size check, and both run before
    /// anything touches the disk.
    pub fn accept_multipart(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        date: String,
    ) -> Result<IngestRequest, IngestError> {
        if !has_pdf_extension(filename) {
            return Err(IngestError::InvalidInput("File must be a PDF".to_string()));
        }

        let request = IngestRequest {
            bytes,
            date,
            source: IngestSource::Multipart {
                filename: filename.to_string(),
            },
        };
        self.check_size(&request)?;

        info!(
            filename = %filename,
            size_bytes = request.bytes.len(),
            date = %request.date,
            "Processing PDF upload"
        );

        Ok(request)
    }

    /// Accept a base64 encoded payload. Line-wrapped encodings (MIME, the
    /// `base64` CLI) are accepted; whitespace anywhere is ignored.
    pub fn accept_base64(&self, payload: &str, date: String) -> Result<IngestRequest, IngestError> {
        info!(date = %date, "Processing base64 PDF");

        let compact: String = payload.split_ascii_whitespace().collect();
        let bytes = STANDARD
            .decode(compact)
            .map_err(|e| IngestError::InvalidInput(format!("Invalid base64 data: {e}")))?;

        let request = IngestRequest {
            bytes,
            date,
            source: IngestSource::Base64,
        };
        self.check_size(&request)?;

        Ok(request)
    }

    fn check_size(&self, request: &IngestRequest) -> Result<(), IngestError> {
        let bounded = match request.source {
            IngestSource::Multipart { .. } => true,
            IngestSource::Base64 => self.limit_base64_payloads,
        };

        if bounded && request.bytes.len() > self.max_upload_bytes {
            return Err(IngestError::PayloadTooLarge {
                size_bytes: request.bytes.len(),
                limit_bytes: self.max_upload_bytes,
            });
        }

        Ok(())
    }
}

fn has_pdf_extension(filename: &str) -> bool {
    filename.to_lowercase().ends_with(".pdf")
}
