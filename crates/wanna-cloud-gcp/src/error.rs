//! Google Cloud プロバイダーのエラー型

use thiserror::Error;
use wanna_cloud::CloudError;
use wanna_core::CoreError;

#[derive(Error, Debug)]
pub enum GcpError {
    #[error("gcloud not found. Please install the Google Cloud SDK: https://cloud.google.com/sdk/docs/install")]
    GcloudNotFound,

    #[error("gcloud authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("gcloud {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// Vertex AI REST API がエラーを返した
    #[error("Vertex AI API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Cloud(#[from] CloudError),
}

pub type Result<T> = std::result::Result<T, GcpError>;

impl GcpError {
    /// gcloud の標準エラー出力からエラーを分類
    pub fn from_stderr(command: &str, stderr: &str) -> Self {
        let message = stderr.trim().to_string();
        let lower = message.to_lowercase();

        if message.contains("NOT_FOUND")
            || lower.contains("not found")
            || lower.contains("does not exist")
            || lower.contains("matched no objects")
        {
            GcpError::NotFound(message)
        } else if message.contains("PERMISSION_DENIED") || lower.contains("permission denied") {
            GcpError::PermissionDenied(message)
        } else if lower.contains("gcloud auth login") || lower.contains("no active account") {
            GcpError::AuthenticationFailed(message)
        } else {
            GcpError::CommandFailed {
                command: command.to_string(),
                stderr: message,
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GcpError::NotFound(_))
    }
}

impl From<GcpError> for CloudError {
    fn from(error: GcpError) -> Self {
        match error {
            GcpError::NotFound(message) => CloudError::ResourceNotFound(message),
            GcpError::GcloudNotFound => CloudError::CommandFailed(error.to_string()),
            GcpError::AuthenticationFailed(message) | GcpError::PermissionDenied(message) => {
                CloudError::AuthenticationFailed(message)
            }
            GcpError::CommandFailed { .. } => CloudError::CommandFailed(error.to_string()),
            GcpError::Cloud(inner) => inner,
            GcpError::Core(inner) => CloudError::Core(inner),
            GcpError::Io(inner) => CloudError::Io(inner),
            GcpError::Json(inner) => CloudError::Json(inner),
            other => CloudError::ApiError(other.to_string()),
        }
    }
}
