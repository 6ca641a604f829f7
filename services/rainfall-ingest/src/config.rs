use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the rainfall ingest service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Ingress validation limits
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Temporary document staging
    #[serde(default)]
    pub staging: StagingConfig,
    /// External table extractor
    #[serde(default)]
    pub parser: ParserConfig,
    /// Document store configuration
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Install the Prometheus exporter
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// API listen address
    #[serde(default = "default_host")]
    pub host: String,
    /// API listen port, also settable through `PORT`
    #[serde(default = "default_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins (empty = any)
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Upper bound on any request body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Ingress validation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Maximum size of an uploaded document (10MB default)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Apply `max_upload_bytes` to decoded base64 payloads as well
    #[serde(default)]
    pub limit_base64_payloads: bool,
}

/// Staging area configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StagingConfig {
    /// Directory for staged documents (system temp dir when unset)
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// File name prefix
    #[serde(default = "default_staging_prefix")]
    pub prefix: String,
    /// File name suffix
    #[serde(default = "default_staging_suffix")]
    pub suffix: String,
}

/// External extractor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ParserConfig {
    /// Extractor executable
    #[serde(default = "default_parser_program")]
    pub program: String,
    /// Arguments placed before the staged document path
    #[serde(default)]
    pub args: Vec<String>,
    /// Arguments used for the capability probe
    #[serde(default = "default_probe_args")]
    pub probe_args: Vec<String>,
    /// Extraction timeout in seconds
    #[serde(default = "default_parser_timeout_secs")]
    pub timeout_secs: u64,
}

/// Document store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// MongoDB connection string. Resolved per request, never at startup.
    #[serde(default)]
    pub uri: Option<String>,
    /// Environment variable consulted when `uri` is unset
    #[serde(default = "default_uri_env")]
    pub uri_env: String,
    /// Database name
    #[serde(default = "default_database")]
    pub database: String,
    /// Collection name
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Server selection / connect timeout in seconds
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
}

// Default value functions
fn default_service_name() -> String {
    "rainfall-ingest".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_body_bytes() -> usize {
    64 * 1024 * 1024 // 64MB
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024 // 10MB
}

fn default_staging_prefix() -> String {
    "rainfall-".to_string()
}

fn default_staging_suffix() -> String {
    ".pdf".to_string()
}

fn default_parser_program() -> String {
    "rainfall-extract".to_string()
}

fn default_probe_args() -> Vec<String> {
    vec!["--version".to_string()]
}

fn default_parser_timeout_secs() -> u64 {
    120
}

fn default_uri_env() -> String {
    "MONGODB_URI".to_string()
}

fn default_database() -> String {
    "rainfall-data".to_string()
}

fn default_collection() -> String {
    "rainfalldatas".to_string()
}

fn default_handshake_timeout_secs() -> u64 {
    10
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Add config file if present
            .add_source(config::File::with_name("config/rainfall").required(false))
            .add_source(config::File::with_name("/etc/rainfall/ingest").required(false))
            // Override with environment variables
            // RAINFALL__PARSER__PROGRAM -> parser.program
            .add_source(
                config::Environment::with_prefix("RAINFALL")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("parser.args")
                    .with_list_parse_key("parser.probe_args")
                    .with_list_parse_key("server.cors_origins")
                    .try_parsing(true),
            )
            // Hosting platforms hand out the listen port as plain PORT
            .set_override_option("server.port", std::env::var("PORT").ok())?
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Get listen address as `host:port`
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl ParserConfig {
    /// Get extraction timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl DatabaseConfig {
    /// Get handshake timeout as Duration
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_enabled: default_true(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            limit_base64_payloads: false,
        }
    }
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            prefix: default_staging_prefix(),
            suffix: default_staging_suffix(),
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            program: default_parser_program(),
            args: Vec::new(),
            probe_args: default_probe_args(),
            timeout_secs: default_parser_timeout_secs(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            uri: None,
            uri_env: default_uri_env(),
            database: default_database(),
            collection: default_collection(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
        }
    }
}
