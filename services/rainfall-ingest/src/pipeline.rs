//! Per-request ingest pipeline.
//!
//! ```text
//! IngestRequest -> StagingArea -> DocumentParser -> stamp_records -> RecordStore
//!                  (temp file)    (rows)            (date field)     (MongoDB)
//! ```
//!
//! The stages run in order and any error short-circuits the request. The
//! staged file lives only for the parse step.

use crate::document_parser::{DocumentParser, ParsedRecord};
use crate::error::IngestError;
use crate::record_assembler::stamp_records;
use crate::record_store::RecordStore;
use crate::request_gate::IngestRequest;
use crate::staging_area::StagingArea;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

/// Outcome returned to the caller on success
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessResult {
    pub success: bool,
    pub records_count: usize,
    pub message: String,
    pub processing_time_ms: u64,
}

impl ProcessResult {
    fn completed(records_count: usize, processing_time_ms: u64) -> Self {
        Self {
            success: true,
            records_count,
            message: format!(
                "PDF processed successfully. {records_count} records extracted and uploaded to MongoDB."
            ),
            processing_time_ms,
        }
    }
}

/// Stage, parse, stamp and persist one document
pub struct IngestPipeline {
    staging: StagingArea,
    parser: Arc<dyn DocumentParser>,
    store: Arc<dyn RecordStore>,
}

impl IngestPipeline {
    pub fn new(
        staging: StagingArea,
        parser: Arc<dyn DocumentParser>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            staging,
            parser,
            store,
        }
    }

    /// The configured parser, for diagnostics
    pub fn parser(&self) -> &dyn DocumentParser {
        self.parser.as_ref()
    }

    /// Run a validated request through the pipeline.
    ///
    /// `started` marks request entry; the reported processing time covers
    /// everything from there up to building the result.
    #[instrument(skip(self, request, started), fields(source = %request.source, size_bytes = request.bytes.len()))]
    pub async fn process(
        &self,
        request: IngestRequest,
        started: Instant,
    ) -> Result<ProcessResult, IngestError> {
        let records = self.extract(&request.bytes).await?;
        if records.is_empty() {
            return Err(IngestError::NoDataExtracted);
        }

        let stamped = stamp_records(records, &request.date);
        let records_count = stamped.len();

        let inserted = self.store.insert_batch(stamped).await?;
        metrics::counter!("rainfall.records.inserted").increment(inserted as u64);

        let processing_time_ms = started.elapsed().as_millis() as u64;
        metrics::counter!("rainfall.requests.processed").increment(1);
        metrics::histogram!("rainfall.processing.duration_ms").record(processing_time_ms as f64);

        info!(
            records = records_count,
            processing_time_ms,
            "Successfully processed PDF"
        );

        Ok(ProcessResult::completed(records_count, processing_time_ms))
    }

    /// Stage the bytes and run the parser over them. The staged file is gone
    /// by the time this returns, whatever the outcome.
    async fn extract(&self, bytes: &[u8]) -> Result<Vec<ParsedRecord>, IngestError> {
        let staged = self.staging.stage(bytes).await?;
        let extracted = self.parser.extract(staged.path()).await;
        staged.release();

        extracted.map_err(Into::into)
    }
}
