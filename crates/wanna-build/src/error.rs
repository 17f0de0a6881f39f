use std::path::PathBuf;
use thiserror::Error;
use wanna_core::CoreError;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Dockerfile not found: {0}")]
    DockerfileNotFound(PathBuf),

    #[error("Build context directory not found: {0}")]
    ContextNotFound(PathBuf),

    #[error("Failed to read build context {path}: {message}")]
    FingerprintIo { path: PathBuf, message: String },

    #[error("Build cache error at {path}: {message}")]
    Cache { path: PathBuf, message: String },

    #[error("Docker connection error: {0}")]
    DockerConnection(#[from] bollard::errors::Error),

    #[error("Build failed for '{image}': {message}")]
    BuildFailed { image: String, message: String },

    #[error("Image '{0}' is not declared in docker.images")]
    UnknownImageRef(String),

    #[error("Provided image does not exist: {0}")]
    ImageNotFound(String),

    #[error("Push failed: {message}")]
    PushFailed { message: String },

    #[error("Invalid tag: {tag}")]
    InvalidTag { tag: String },

    #[error("Registry authentication failed for {registry}: {message}")]
    AuthFailed { registry: String, message: String },

    #[error("Pipeline compilation failed for '{pipeline}': {message}")]
    CompileFailed { pipeline: String, message: String },

    #[error("Command failed: {command}\n{stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("No build backend is available (quick mode resolves tags only)")]
    NoBackend,

    #[error("Invalid build configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    pub fn build_failed(image: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BuildFailed {
            image: image.into(),
            message: message.into(),
        }
    }

    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            BuildError::DockerfileNotFound(path) => {
                format!(
                    "Dockerfileが見つかりません: {}\n\
                     \n\
                     解決方法:\n\
                     1. Dockerfileのパスを確認してください\n\
                     2. wanna.yaml で明示的にパスを指定してください:\n\
                        dockerfile: path/to/Dockerfile",
                    path.display()
                )
            }
            BuildError::ContextNotFound(path) => {
                format!(
                    "ビルドコンテキストが見つかりません: {}\n\
                     \n\
                     wanna.yaml の context_dir を確認してください。",
                    path.display()
                )
            }
            BuildError::FingerprintIo { path, message } => {
                format!(
                    "ビルドコンテキストを読み込めません: {}\n理由: {}\n\
                     \n\
                     ファイルの権限を確認するか、.dockerignore で除外してください。",
                    path.display(),
                    message
                )
            }
            BuildError::BuildFailed { image, message } => {
                format!(
                    "イメージ '{}' のビルドに失敗しました: {}\n\
                     \n\
                     Dockerfileの内容を確認してください。キャッシュは更新されていません。",
                    image, message
                )
            }
            BuildError::ImageNotFound(url) => {
                format!(
                    "指定されたイメージがレジストリに存在しません: {}\n\
                     \n\
                     image_url を確認するか、--mode quick で存在確認を省略してください。",
                    url
                )
            }
            BuildError::DockerConnection(_) => {
                "Dockerデーモンに接続できません。\n\
                 \n\
                 Dockerが起動しているか確認するか、docker.cloud_build: true で\n\
                 Cloud Build を使用してください。"
                    .to_string()
            }
            _ => format!("{}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
