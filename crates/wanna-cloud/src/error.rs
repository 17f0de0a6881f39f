//! クラウドリソース操作のエラー型

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// 同じ安定名で別種のリソースが存在する
    #[error("Resource conflict: '{name}' exists as {found}, expected {expected}")]
    ResourceConflict {
        name: String,
        expected: String,
        found: String,
    },

    #[error("Timed out waiting for {resource} after {}s (last state: {last_state})", elapsed.as_secs())]
    RemoteTimeout {
        resource: String,
        elapsed: Duration,
        last_state: String,
    },

    #[error("Resource {resource} entered a failed state: {state}")]
    RemoteFailed { resource: String, state: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Worker for '{member}' aborted: {message}")]
    WorkerAborted { member: String, message: String },

    #[error(transparent)]
    Core(#[from] wanna_core::CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
