//! URI で指定するバイト列ストア
//!
//! ローカルパス（または `file://`）は [`LocalBlobStore`]、その他のスキームは
//! [`BlobRouter`] に登録した実装へ振り分けます。

use crate::error::{CoreError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn write(&self, uri: &str, bytes: &[u8]) -> Result<()>;

    async fn read(&self, uri: &str) -> Result<Vec<u8>>;

    /// ローカルファイルをそのままコピー
    async fn copy_file(&self, source: &Path, destination: &str) -> Result<()> {
        let bytes = tokio::fs::read(source).await.map_err(|e| CoreError::IoError {
            path: source.to_path_buf(),
            message: e.to_string(),
        })?;
        self.write(destination, &bytes).await
    }
}

/// URI のスキーム部分（`gs://x` → `gs`）
pub fn uri_scheme(uri: &str) -> Option<&str> {
    uri.split_once("://").map(|(scheme, _)| scheme)
}

/// ローカルファイルシステム
#[derive(Debug, Clone, Default)]
pub struct LocalBlobStore;

impl LocalBlobStore {
    fn to_path(uri: &str) -> Result<PathBuf> {
        match uri_scheme(uri) {
            None => Ok(PathBuf::from(uri)),
            Some("file") => Ok(PathBuf::from(&uri["file://".len()..])),
            Some(_) => Err(CoreError::UnsupportedUri(uri.to_string())),
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn write(&self, uri: &str, bytes: &[u8]) -> Result<()> {
        let path = Self::to_path(uri)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreError::Blob {
                    uri: uri.to_string(),
                    message: e.to_string(),
                })?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| CoreError::Blob {
                uri: uri.to_string(),
                message: e.to_string(),
            })?;
        debug!(path = %path.display(), bytes = bytes.len(), "Wrote local blob");
        Ok(())
    }

    async fn read(&self, uri: &str) -> Result<Vec<u8>> {
        let path = Self::to_path(uri)?;
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::ManifestNotFound(uri.to_string())
            } else {
                CoreError::Blob {
                    uri: uri.to_string(),
                    message: e.to_string(),
                }
            }
        })
    }
}

/// スキームごとにストアを振り分ける
#[derive(Clone, Default)]
pub struct BlobRouter {
    local: LocalBlobStore,
    remotes: HashMap<String, Arc<dyn BlobStore>>,
}

impl BlobRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// スキームに対応するストアを登録
    pub fn with_scheme(mut self, scheme: impl Into<String>, store: Arc<dyn BlobStore>) -> Self {
        self.remotes.insert(scheme.into(), store);
        self
    }

    fn route(&self, uri: &str) -> Result<&dyn BlobStore> {
        match uri_scheme(uri) {
            None | Some("file") => Ok(&self.local),
            Some(scheme) => self
                .remotes
                .get(scheme)
                .map(|s| s.as_ref())
                .ok_or_else(|| CoreError::UnsupportedUri(uri.to_string())),
        }
    }
}

#[async_trait]
impl BlobStore for BlobRouter {
    async fn write(&self, uri: &str, bytes: &[u8]) -> Result<()> {
        self.route(uri)?.write(uri, bytes).await
    }

    async fn read(&self, uri: &str) -> Result<Vec<u8>> {
        self.route(uri)?.read(uri).await
    }

    async fn copy_file(&self, source: &Path, destination: &str) -> Result<()> {
        self.route(destination)?.copy_file(source, destination).await
    }
}
