//! Google Cloud プロバイダー
//!
//! `gcloud` CLI と Vertex AI REST API で wanna-cloud のトレイトを実装します。
//!
//! - [`GcpResourceApi`]: 通知チャネル・ログメトリクス・Cloud Functions・
//!   Cloud Scheduler・アラートポリシーの取得/作成/更新
//! - [`NotebookApi`] / [`TensorboardApi`]: 所有者ラベル付きインスタンス群
//! - [`CustomJobClient`] / [`PipelineJobClient`]: ジョブとパイプラインの実行
//! - [`GcsBlobStore`]: `gs://` の読み書き

pub mod error;
pub mod gcloud;
pub mod jobs;
pub mod notebooks;
pub mod pipelines;
pub mod resources;
pub mod storage;
pub mod tensorboards;

pub use error::{GcpError, Result};
pub use gcloud::Gcloud;
pub use jobs::{CustomJobClient, SubmittedJob};
pub use notebooks::{NotebookApi, NotebookImage, NotebookSpec, NotebookStatus};
pub use pipelines::{PipelineJob, PipelineJobClient};
pub use resources::GcpResourceApi;
pub use storage::{GCS_SCHEME, GcsBlobStore};
pub use tensorboards::{TensorboardApi, TensorboardInfo, TensorboardSpec};
