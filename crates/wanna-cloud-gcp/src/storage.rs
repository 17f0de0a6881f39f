//! `gs://` の BlobStore
//!
//! `gcloud storage cp` / `cat` で読み書きします。

use crate::error::GcpError;
use crate::gcloud::Gcloud;
use async_trait::async_trait;
use std::io::Write;
use std::path::Path;
use tracing::debug;
use wanna_core::blob::uri_scheme;
use wanna_core::{BlobStore, CoreError};

pub const GCS_SCHEME: &str = "gs";

pub struct GcsBlobStore {
    gcloud: Gcloud,
}

impl GcsBlobStore {
    pub fn new(gcloud: Gcloud) -> Self {
        Self { gcloud }
    }

    fn check_uri(uri: &str) -> wanna_core::Result<()> {
        if uri_scheme(uri) == Some(GCS_SCHEME) {
            Ok(())
        } else {
            Err(CoreError::UnsupportedUri(uri.to_string()))
        }
    }

    fn blob_error(uri: &str, error: GcpError) -> CoreError {
        match error {
            GcpError::NotFound(_) => CoreError::ManifestNotFound(uri.to_string()),
            other => CoreError::Blob {
                uri: uri.to_string(),
                message: other.to_string(),
            },
        }
    }
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    async fn write(&self, uri: &str, bytes: &[u8]) -> wanna_core::Result<()> {
        Self::check_uri(uri)?;
        let mut file = tempfile::NamedTempFile::new().map_err(|e| CoreError::Blob {
            uri: uri.to_string(),
            message: e.to_string(),
        })?;
        file.write_all(bytes).map_err(|e| CoreError::Blob {
            uri: uri.to_string(),
            message: e.to_string(),
        })?;
        self.copy_file(file.path(), uri).await
    }

    async fn read(&self, uri: &str) -> wanna_core::Result<Vec<u8>> {
        Self::check_uri(uri)?;
        self.gcloud
            .run_raw(&["storage", "cat", uri])
            .await
            .map_err(|e| Self::blob_error(uri, e))
    }

    async fn copy_file(&self, source: &Path, destination: &str) -> wanna_core::Result<()> {
        Self::check_uri(destination)?;
        let source_str = source.to_string_lossy();
        self.gcloud
            .run_command(&["storage", "cp", &source_str, destination])
            .await
            .map_err(|e| Self::blob_error(destination, e))?;
        debug!(source = %source.display(), destination, "Uploaded to GCS");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_other_schemes() {
        let store = GcsBlobStore::new(Gcloud::new("p").with_program("/nonexistent/gcloud"));
        assert!(matches!(
            store.write("s3://bucket/key", b"x").await,
            Err(CoreError::UnsupportedUri(_))
        ));
        assert!(matches!(
            store.read("/local/path").await,
            Err(CoreError::UnsupportedUri(_))
        ));
    }

    #[test]
    fn test_not_found_maps_to_manifest_not_found() {
        let err = GcsBlobStore::blob_error(
            "gs://b/wanna-manifest.json",
            GcpError::NotFound("No URLs matched".into()),
        );
        assert!(matches!(err, CoreError::ManifestNotFound(_)));
    }
}
