//! Scoped staging of raw document bytes on local disk.
//!
//! The external extractor works on file paths, so each request writes its
//! document to a uniquely named temporary file. The file lives exactly as
//! long as the returned [`StagedDocument`]: it is removed on
//! [`StagedDocument::release`] or when the guard is dropped, whichever comes
//! first. Removal is best-effort and its failures are discarded.

use crate::config::StagingConfig;
use crate::error::IngestError;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Creates staged documents
#[derive(Debug, Clone)]
pub struct StagingArea {
    directory: Option<PathBuf>,
    prefix: String,
    suffix: String,
}

/// A document written to disk, removed when released or dropped
#[derive(Debug)]
pub struct StagedDocument {
    path: PathBuf,
    temp_file: Option<NamedTempFile>,
}

impl StagingArea {
    pub fn new(config: &StagingConfig) -> Self {
        Self {
            directory: config.directory.clone(),
            prefix: config.prefix.clone(),
            suffix: config.suffix.clone(),
        }
    }

    /// Write `bytes` to a fresh uniquely named file
    pub async fn stage(&self, bytes: &[u8]) -> Result<StagedDocument, IngestError> {
        let directory = self.directory.clone();
        let prefix = self.prefix.clone();
        let suffix = self.suffix.clone();

        let temp_file = tokio::task::spawn_blocking(move || {
            let mut builder = tempfile::Builder::new();
            builder.prefix(&prefix).suffix(&suffix);
            match &directory {
                Some(dir) => builder.tempfile_in(dir),
                None => builder.tempfile(),
            }
        })
        .await
        .map_err(|e| IngestError::Internal(format!("staging task failed: {e}")))?
        .map_err(|e| IngestError::Internal(format!("failed to create staging file: {e}")))?;

        // Write through a duplicate of the handle tempfile opened
        let handle = temp_file
            .as_file()
            .try_clone()
            .map_err(|e| IngestError::Internal(format!("failed to open staging file: {e}")))?;

        // Guard owns the file from here on, so write failures still clean up
        let staged = StagedDocument {
            path: temp_file.path().to_path_buf(),
            temp_file: Some(temp_file),
        };

        let mut file = File::from_std(handle);
        file.write_all(bytes)
            .await
            .map_err(|e| IngestError::Internal(format!("failed to write staging file: {e}")))?;
        file.flush()
            .await
            .map_err(|e| IngestError::Internal(format!("failed to flush staging file: {e}")))?;

        debug!(
            path = %staged.path.display(),
            size_bytes = bytes.len(),
            "Document staged"
        );

        Ok(staged)
    }
}

impl StagedDocument {
    /// Location of the staged file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the staged file now
    pub fn release(mut self) {
        if let Some(temp_file) = self.temp_file.take() {
            let _ = temp_file.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staging_in(dir: &Path) -> StagingArea {
        StagingArea::new(&StagingConfig {
            directory: Some(dir.to_path_buf()),
            ..StagingConfig::default()
        })
    }

    #[tokio::test]
    async fn test_stage_writes_bytes_with_configured_naming() {
        let dir = tempfile::tempdir().unwrap();
        let staged = staging_in(dir.path()).stage(b"%PDF-1.4 rain").await.unwrap();

        assert_eq!(std::fs::read(staged.path()).unwrap(), b"%PDF-1.4 rain");
        let name = staged.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("rainfall-"));
        assert!(name.ends_with(".pdf"));
        assert_eq!(staged.path().parent().unwrap(), dir.path());
    }

    #[tokio::test]
    async fn test_stage_keeps_exact_length() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = vec![7u8; 256 * 1024];
        let staged = staging_in(dir.path()).stage(&bytes).await.unwrap();

        assert_eq!(std::fs::metadata(staged.path()).unwrap().len(), bytes.len() as u64);
        assert_eq!(std::fs::read(staged.path()).unwrap(), bytes);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_release_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let staged = staging_in(dir.path()).stage(b"data").await.unwrap();
        let path = staged.path().to_path_buf();

        staged.release();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_drop_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let staged = staging_in(dir.path()).stage(b"data").await.unwrap();
            staged.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_release_swallows_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let staged = staging_in(dir.path()).stage(b"data").await.unwrap();

        std::fs::remove_file(staged.path()).unwrap();
        staged.release();
    }

    #[tokio::test]
    async fn test_concurrent_stages_get_distinct_paths() {
        let dir = tempfile::tempdir().unwrap();
        let area = staging_in(dir.path());

        let (a, b) = tokio::join!(area.stage(b"a"), area.stage(b"b"));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.path(), b.path());
    }

    #[tokio::test]
    async fn test_missing_directory_is_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        let area = staging_in(&dir.path().join("does-not-exist"));

        let err = area.stage(b"data").await.unwrap_err();
        assert!(matches!(err, IngestError::Internal(_)));
    }
}
