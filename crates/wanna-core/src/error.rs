use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO エラー: {path}\n理由: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("YAMLパースエラー: {path}\n理由: {message}")]
    YamlParse { path: PathBuf, message: String },

    #[error("JSON エラー: {0}")]
    Json(#[from] serde_json::Error),

    #[error("無効な設定: {0}")]
    InvalidConfig(String),

    #[error("テンプレート展開エラー: {0}")]
    TemplateRenderError(String),

    #[error("テンプレート展開エラー: {file}\n{message}")]
    TemplateError { file: PathBuf, message: String },

    #[error("GCPプロファイルが見つかりません: {0}")]
    ProfileNotFound(String),

    #[error("{kind} '{name}' が見つかりません")]
    ResourceNotFound { kind: &'static str, name: String },

    #[error("マニフェストが破損しています: {path}\n理由: {reason}")]
    ManifestCorrupt { path: String, reason: String },

    #[error("マニフェストが見つかりません: {0}")]
    ManifestNotFound(String),

    #[error("ストレージエラー: {uri}\n理由: {message}")]
    Blob { uri: String, message: String },

    #[error("サポートされていない URI です: {0}")]
    UnsupportedUri(String),
}

impl CoreError {
    pub fn manifest_corrupt(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ManifestCorrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
