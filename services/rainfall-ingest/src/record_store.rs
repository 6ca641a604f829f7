use crate::config::DatabaseConfig;
use crate::error::IngestError;
use crate::record_assembler::StampedRecord;
use async_trait::async_trait;
use mongodb::bson::{doc, Document};
use mongodb::options::ClientOptions;
use mongodb::Client;
use tracing::{debug, info, instrument, warn};

/// Persistence for stamped record batches
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist the whole batch, returning the number of inserted records
    async fn insert_batch(&self, records: Vec<StampedRecord>) -> Result<usize, IngestError>;
}

/// MongoDB-backed record store.
///
/// Opens a fresh client for every batch and shuts it down afterwards; no
/// connection state survives between requests. The connection string is
/// resolved on each call so a missing value fails the request, not startup.
pub struct MongoRecordStore {
    config: DatabaseConfig,
}

impl MongoRecordStore {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    /// Resolve the connection string from config, then from the environment
    pub fn resolve_connection_string(&self) -> Result<String, IngestError> {
        self.config
            .uri
            .clone()
            .or_else(|| std::env::var(&self.config.uri_env).ok())
            .filter(|uri| !uri.trim().is_empty())
            .ok_or_else(|| {
                IngestError::Configuration(format!(
                    "{} environment variable not set",
                    self.config.uri_env
                ))
            })
    }

    /// Open a client and verify it with a ping, bounded by the handshake timeout
    async fn connect(&self, uri: &str) -> Result<Client, IngestError> {
        let timeout = self.config.handshake_timeout();

        let handshake = async {
            let mut options = ClientOptions::parse(uri).await.map_err(persistence)?;
            options.server_selection_timeout = Some(timeout);
            options.connect_timeout = Some(timeout);

            let client = Client::with_options(options).map_err(persistence)?;
            let ping = client
                .database("admin")
                .run_command(doc! { "ping": 1 })
                .await;
            match ping {
                Ok(_) => Ok::<_, IngestError>(client),
                Err(e) => {
                    client.shutdown().await;
                    Err(persistence(e))
                }
            }
        };

        let client = tokio::time::timeout(timeout, handshake)
            .await
            .map_err(|_| {
                IngestError::Persistence(format!("handshake timed out after {timeout:?}"))
            })??;

        debug!(database = %self.config.database, "Connected to MongoDB");
        Ok(client)
    }

    async fn insert_documents(
        &self,
        client: &Client,
        documents: Vec<Document>,
    ) -> Result<usize, IngestError> {
        if documents.is_empty() {
            warn!("No records to upload to MongoDB");
            return Ok(0);
        }

        let batch_size = documents.len();
        let collection = client
            .database(&self.config.database)
            .collection::<Document>(&self.config.collection);

        // Ordered insert: on failure, records ahead of the failing one stay
        let result = collection.insert_many(documents).await.map_err(|e| {
            IngestError::Persistence(format!(
                "{e} (batch of {batch_size} records may be partially persisted)"
            ))
        })?;

        Ok(result.inserted_ids.len())
    }
}

#[async_trait]
impl RecordStore for MongoRecordStore {
    #[instrument(skip(self, records), fields(records = records.len(), collection = %self.config.collection))]
    async fn insert_batch(&self, records: Vec<StampedRecord>) -> Result<usize, IngestError> {
        let uri = self.resolve_connection_string()?;
        let documents = to_documents(&records)?;

        let client = self.connect(&uri).await?;
        let result = self.insert_documents(&client, documents).await;
        client.shutdown().await;

        let inserted = result?;
        info!(inserted, "Uploaded records to MongoDB");
        Ok(inserted)
    }
}

/// Convert stamped records to BSON documents, keeping column order
pub fn to_documents(records: &[StampedRecord]) -> Result<Vec<Document>, IngestError> {
    records
        .iter()
        .map(|record| mongodb::bson::to_document(record.fields()).map_err(persistence))
        .collect()
}

fn persistence(err: impl std::fmt::Display) -> IngestError {
    IngestError::Persistence(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record_assembler::stamp_records;
    use serde_json::json;

    fn store(uri: Option<&str>) -> MongoRecordStore {
        MongoRecordStore::new(DatabaseConfig {
            uri: uri.map(String::from),
            uri_env: "RAINFALL_TEST_URI_THAT_IS_NEVER_SET".to_string(),
            ..DatabaseConfig::default()
        })
    }

    fn stamped(rows: Vec<serde_json::Value>, date: &str) -> Vec<StampedRecord> {
        let records = rows
            .into_iter()
            .map(|row| match row {
                serde_json::Value::Object(map) => map,
                _ => panic!("row must be an object"),
            })
            .collect();
        stamp_records(records, date)
    }

    #[test]
    fn test_resolve_prefers_configured_uri() {
        let uri = store(Some("mongodb://db:27017"))
            .resolve_connection_string()
            .unwrap();
        assert_eq!(uri, "mongodb://db:27017");
    }

    #[test]
    fn test_resolve_missing_uri_is_configuration_error() {
        let err = store(None).resolve_connection_string().unwrap_err();
        assert!(matches!(err, IngestError::Configuration(_)));
        assert_eq!(
            err.to_string(),
            "RAINFALL_TEST_URI_THAT_IS_NEVER_SET environment variable not set"
        );
    }

    #[test]
    fn test_resolve_blank_uri_is_configuration_error() {
        let err = store(Some("   ")).resolve_connection_string().unwrap_err();
        assert!(matches!(err, IngestError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_insert_without_uri_fails_before_connecting() {
        let records = stamped(vec![json!({"station": "Alpha"})], "15/01/2024");
        let err = store(None).insert_batch(records).await.unwrap_err();
        assert!(matches!(err, IngestError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_malformed_uri_is_persistence_error() {
        let records = stamped(vec![json!({"station": "Alpha"})], "15/01/2024");
        let err = store(Some("postgres://not-mongo"))
            .insert_batch(records)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Persistence(_)));
        assert!(err.to_string().starts_with("MongoDB upload failed"));
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_within_handshake_bound() {
        let store = MongoRecordStore::new(DatabaseConfig {
            uri: Some("mongodb://127.0.0.1:1/?directConnection=true".to_string()),
            handshake_timeout_secs: 1,
            ..DatabaseConfig::default()
        });
        let records = stamped(vec![json!({"station": "Alpha"})], "15/01/2024");

        let started = std::time::Instant::now();
        let err = store.insert_batch(records).await.unwrap_err();
        let elapsed = started.elapsed();

        assert_eq!(err.code(), "PERSISTENCE_ERROR");
        assert!(err.to_string().starts_with("MongoDB upload failed"));
        assert!(
            elapsed < std::time::Duration::from_secs(5),
            "handshake took {elapsed:?}"
        );
    }

    #[test]
    fn test_to_documents_keeps_fields_and_order() {
        let records = stamped(
            vec![
                json!({"station": "Alpha", "rainfall_mm": 12.5, "gauges": 3}),
                json!({"station": "Beta", "rainfall_mm": null, "gauges": 1}),
            ],
            "15/01/2024",
        );

        let documents = to_documents(&records).unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].get_str("station").unwrap(), "Alpha");
        assert_eq!(documents[0].get_f64("rainfall_mm").unwrap(), 12.5);
        assert_eq!(documents[1].get_str("date").unwrap(), "15/01/2024");

        let keys: Vec<&str> = documents[0].keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["station", "rainfall_mm", "gauges", "date"]);
    }
}
