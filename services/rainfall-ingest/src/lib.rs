//! Rainfall Ingest Service
//!
//! HTTP service that turns rainfall report PDFs into documents in MongoDB.
//! A report arrives either as a multipart upload or as base64 inside JSON,
//! together with the report date. The service stages the bytes in a
//! temporary file, runs the table extractor over it, stamps every extracted
//! row with the date and inserts the rows as one batch.
//!
//! ## Architecture
//!
//! ```text
//!  POST /process-pdf         POST /process-pdf-base64
//!  (multipart)               (JSON)
//!        │                         │
//!        ▼                         ▼
//! ┌─────────────────────────────────────┐
//! │ Request Gate                        │  extension, size, base64
//! └─────────────────────────────────────┘
//!                   │
//!                   ▼
//! ┌──────────────┐     ┌──────────────┐
//! │ Staging Area │────▶│ Document     │  external extractor
//! │ (temp file)  │     │ Parser       │
//! └──────────────┘     └──────────────┘
//!                             │
//!                             ▼
//!                      ┌──────────────┐     ┌──────────────┐
//!                      │ Record       │────▶│ Record Store │  MongoDB
//!                      │ Assembler    │     │              │
//!                      └──────────────┘     └──────────────┘
//! ```

pub mod api;
pub mod config;
pub mod document_parser;
pub mod error;
pub mod pipeline;
pub mod record_assembler;
pub mod record_store;
pub mod request_gate;
pub mod staging_area;

pub use api::{create_router, start_api_server, AppState};
pub use config::Config;
pub use document_parser::{CommandParser, DocumentParser, ParsedRecord};
pub use error::{ErrorResponse, IngestError, ParserError};
pub use pipeline::{IngestPipeline, ProcessResult};
pub use record_assembler::{stamp_records, StampedRecord};
pub use record_store::{MongoRecordStore, RecordStore};
pub use request_gate::{IngestRequest, IngestSource, RequestGate};
pub use staging_area::{StagedDocument, StagingArea};
