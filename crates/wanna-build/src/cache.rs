//! ビルドキャッシュ
//!
//! (イメージ, リポジトリ, バージョン) ごとに直近に成功したビルドのダイジェストを
//! 1行のファイルとして保存します。ロックは行わず、単一プロセスからの利用を前提とします。

use crate::error::{BuildError, Result};
use crate::fingerprint::Fingerprint;
use std::path::{Path, PathBuf};
use tracing::debug;

/// キャッシュのキー
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// イメージの論理名
    pub artifact: String,
    /// イメージ名を除いたリポジトリパス
    pub repository: String,
    pub version: String,
}

impl CacheKey {
    pub fn new(
        artifact: impl Into<String>,
        repository: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            artifact: artifact.into(),
            repository: repository.into(),
            version: version.into(),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.artifact, self.repository, self.version)
    }
}

/// ファイルシステム上のビルドキャッシュ
#[derive(Debug, Clone)]
pub struct BuildCache {
    dir: PathBuf,
}

impl BuildCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// キーに対応するファイルパス
    ///
    /// `{dir}/{repository}/{version}/{artifact}.hash`（パス区切りなどは `_` に置換）
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir
            .join(sanitize(&key.repository))
            .join(sanitize(&key.version))
            .join(format!("{}.hash", sanitize(&key.artifact)))
    }

    /// 保存済みのダイジェスト（16進）
    pub fn stored_digest(&self, key: &CacheKey) -> Result<Option<String>> {
        let path = self.entry_path(key);
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let digest = content.trim();
                if digest.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(digest.to_string()))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BuildError::Cache {
                path,
                message: e.to_string(),
            }),
        }
    }

    /// 再ビルドが必要か
    ///
    /// エントリが無い、または保存済みダイジェストと異なる場合に true。
    pub fn should_build(&self, key: &CacheKey, fingerprint: &Fingerprint) -> Result<bool> {
        let stored = self.stored_digest(key)?;
        let new_digest = fingerprint.hex();
        let should = stored.as_deref() != Some(new_digest.as_str());
        debug!(
            key = %key,
            stored = ?stored,
            new = %new_digest,
            should_build = should,
            "Build cache decision"
        );
        Ok(should)
    }

    /// ビルド成功後にダイジェストを記録
    pub fn record(&self, key: &CacheKey, fingerprint: &Fingerprint) -> Result<()> {
        let path = self.entry_path(key);
        let cache_err = |e: std::io::Error, path: &Path| BuildError::Cache {
            path: path.to_path_buf(),
            message: e.to_string(),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| cache_err(e, parent))?;
        }
        std::fs::write(&path, format!("{}\n", fingerprint.hex())).map_err(|e| cache_err(e, &path))?;
        debug!(key = %key, path = %path.display(), "Build cache updated");
        Ok(())
    }
}

fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
