use crate::config::{Config, ServerConfig};
use crate::document_parser::CommandParser;
use crate::error::{ErrorResponse, IngestError};
use crate::pipeline::{IngestPipeline, ProcessResult};
use crate::record_store::MongoRecordStore;
use crate::request_gate::RequestGate;
use crate::staging_area::StagingArea;
use anyhow::{Context, Result};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<RequestGate>,
    pub pipeline: Arc<IngestPipeline>,
}

impl AppState {
    /// Wire the production parser and MongoDB store from configuration
    pub fn from_config(config: &Config) -> Self {
        let pipeline = IngestPipeline::new(
            StagingArea::new(&config.staging),
            Arc::new(CommandParser::new(&config.parser)),
            Arc::new(MongoRecordStore::new(config.database.clone())),
        );

        Self {
            gate: Arc::new(RequestGate::new(&config.ingest)),
            pipeline: Arc::new(pipeline),
        }
    }
}

/// JSON body for base64 submissions
#[derive(Debug, Deserialize)]
pub struct Base64ProcessRequest {
    /// Base64 encoded PDF
    pub pdf_data: String,
    /// Report date, stored verbatim
    pub date: String,
}

/// Fields collected from a multipart upload
struct UploadForm {
    filename: String,
    bytes: Vec<u8>,
    date: String,
}

/// Create the API router
pub fn create_router(state: AppState, config: &ServerConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(AnyOrigin)
                .allow_methods(AnyOrigin)
                .allow_headers(AnyOrigin)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(AnyOrigin)
                .allow_headers(AnyOrigin)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/test-parser", get(test_parser))
        .route("/process-pdf", post(process_pdf))
        .route("/process-pdf-base64", post(process_pdf_base64))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Service banner
async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Rainfall PDF Parser API is running",
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Health check backed by the parser capability probe
async fn health_check(State(state): State<AppState>) -> Response {
    match state.pipeline.parser().probe().await {
        Ok(()) => Json(serde_json::json!({
            "status": "healthy",
            "parser": "available",
            "timestamp": Utc::now().to_rfc3339()
        }))
        .into_response(),
        Err(e) => {
            error!(error = %e, "Health check failed");
            parser_unavailable(format!("Service unhealthy: {e}"))
        }
    }
}

/// Report which parser is configured and whether it responds
async fn test_parser(State(state): State<AppState>) -> Response {
    let parser = state.pipeline.parser();
    match parser.probe().await {
        Ok(()) => Json(serde_json::json!({
            "status": "success",
            "message": "Parser is working correctly",
            "parser_class": parser.kind()
        }))
        .into_response(),
        Err(e) => parser_unavailable(format!("Parser test failed: {e}")),
    }
}

/// Process an uploaded PDF file
#[instrument(skip_all, fields(request_id = %Uuid::new_v4()))]
async fn process_pdf(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ProcessResult>, IngestError> {
    let started = Instant::now();

    let multipart = multipart.map_err(|e| IngestError::InvalidInput(e.body_text()))?;
    let form = read_upload_form(multipart).await?;
    let request = state
        .gate
        .accept_multipart(form.bytes, &form.filename, form.date)?;

    let result = state.pipeline.process(request, started).await?;
    Ok(Json(result))
}

/// Process a base64 encoded PDF
#[instrument(skip_all, fields(request_id = %Uuid::new_v4()))]
async fn process_pdf_base64(
    State(state): State<AppState>,
    payload: Result<Json<Base64ProcessRequest>, JsonRejection>,
) -> Result<Json<ProcessResult>, IngestError> {
    let started = Instant::now();

    let Json(payload) = payload.map_err(|e| IngestError::InvalidInput(e.body_text()))?;
    let request = state.gate.accept_base64(&payload.pdf_data, payload.date)?;

    let result = state.pipeline.process(request, started).await?;
    Ok(Json(result))
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, IngestError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut date: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(invalid_form)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "pdf_file" | "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(invalid_form)?;
                file = Some((filename, bytes.to_vec()));
            }
            "date" => {
                date = Some(field.text().await.map_err(invalid_form)?);
            }
            _ => {}
        }
    }

    let (filename, bytes) = file
        .ok_or_else(|| IngestError::InvalidInput("Missing form field `pdf_file`".to_string()))?;
    let date =
        date.ok_or_else(|| IngestError::InvalidInput("Missing form field `date`".to_string()))?;

    Ok(UploadForm {
        filename,
        bytes,
        date,
    })
}

fn invalid_form(err: MultipartError) -> IngestError {
    IngestError::InvalidInput(format!("Invalid multipart form: {}", err.body_text()))
}

fn parser_unavailable(message: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: message,
            code: "PARSER_UNAVAILABLE".to_string(),
        }),
    )
        .into_response()
}

/// Convert a handler panic into an internal error response
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };

    IngestError::Internal(detail).into_response()
}

/// Start the ingest API server, serving until `shutdown` resolves
pub async fn start_api_server(
    state: AppState,
    config: &ServerConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting rainfall ingest API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
