//! プッシュ計画の実行
//!
//! コンテナ → ファイル → JSON の順に処理し、コンテナより先に
//! それを参照するマニフェストが書き込まれることはありません。
//! 途中で失敗した場合はそこで中断します。

use crate::error::Result;
use crate::pusher::ContainerPusher;
use colored::Colorize;
use std::sync::Arc;
use tracing::{debug, info};
use wanna_core::BlobStore;
use wanna_core::push::{PushArtifact, PushTask};

/// 実行結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// プッシュしたイメージタグ
    pub containers: Vec<String>,
    /// 書き込んだ URI（ファイルと JSON）
    pub uploads: Vec<String>,
}

impl PushReport {
    pub fn total(&self) -> usize {
        self.containers.len() + self.uploads.len()
    }
}

pub struct PushExecutor {
    pusher: Arc<dyn ContainerPusher>,
    store: Arc<dyn BlobStore>,
}

impl PushExecutor {
    pub fn new(pusher: Arc<dyn ContainerPusher>, store: Arc<dyn BlobStore>) -> Self {
        Self { pusher, store }
    }

    /// タスク内のすべての操作を順に実行
    pub async fn execute(&self, task: &PushTask) -> Result<PushReport> {
        let mut report = PushReport::default();

        if task.is_empty() {
            debug!("Nothing to push");
            return Ok(report);
        }

        for artifact in task.ordered() {
            debug!(artifact = %artifact.describe(), "Pushing artifact");
            match artifact {
                PushArtifact::Container(container) => {
                    for tag in &container.tags {
                        let pushed = self.pusher.push_tag(tag).await?;
                        report.containers.push(pushed);
                    }
                    println!("  {} {}", "✓".green(), container.image_ref.cyan());
                }
                PushArtifact::Path(path) => {
                    self.store.copy_file(&path.source, &path.destination).await?;
                    println!("  {} {}", "✓".green(), path.destination);
                    report.uploads.push(path.destination);
                }
                PushArtifact::Json(json) => {
                    let body = serde_json::to_vec_pretty(&json.body)
                        .map_err(wanna_core::CoreError::from)?;
                    self.store.write(&json.destination, &body).await?;
                    println!("  {} {}", "✓".green(), json.destination);
                    report.uploads.push(json.destination);
                }
            }
        }

        info!(
            containers = report.containers.len(),
            uploads = report.uploads.len(),
            "Push completed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BuildError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use wanna_core::push::{ContainerArtifact, JsonArtifact, PathArtifact};

    type Log = Arc<Mutex<Vec<String>>>;

    struct RecordingPusher {
        log: Log,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl ContainerPusher for RecordingPusher {
        async fn push_tag(&self, full_tag: &str) -> Result<String> {
            if self.fail_on.as_deref() == Some(full_tag) {
                return Err(BuildError::PushFailed {
                    message: "denied".into(),
                });
            }
            self.log.lock().unwrap().push(format!("push {}", full_tag));
            Ok(full_tag.to_string())
        }
    }

    struct RecordingStore {
        log: Log,
    }

    #[async_trait]
    impl BlobStore for RecordingStore {
        async fn write(&self, uri: &str, _bytes: &[u8]) -> wanna_core::Result<()> {
            self.log.lock().unwrap().push(format!("write {}", uri));
            Ok(())
        }

        async fn read(&self, uri: &str) -> wanna_core::Result<Vec<u8>> {
            Err(wanna_core::CoreError::ManifestNotFound(uri.to_string()))
        }
    }

    fn task(source: PathBuf) -> PushTask {
        PushTask {
            containers: vec![
                ContainerArtifact {
                    image_ref: "trainer".into(),
                    tags: vec!["r/trainer:v1".into(), "r/trainer:latest".into()],
                },
                ContainerArtifact {
                    image_ref: "serving".into(),
                    tags: vec!["r/serving:v1".into()],
                },
            ],
            manifests: vec![PathArtifact {
                source,
                destination: "gs://b/release/v1/wanna-manifest.json".into(),
            }],
            json: vec![JsonArtifact {
                body: json!({"epochs": 3}),
                destination: "gs://b/release/v1/runtime-parameters.json".into(),
            }],
        }
    }

    fn executor(log: &Log, fail_on: Option<&str>) -> PushExecutor {
        PushExecutor::new(
            Arc::new(RecordingPusher {
                log: log.clone(),
                fail_on: fail_on.map(str::to_string),
            }),
            Arc::new(RecordingStore { log: log.clone() }),
        )
    }

    #[tokio::test]
    async fn test_every_artifact_in_order() {
        let temp_dir = tempfile::tempdir().unwrap();
        let manifest = temp_dir.path().join("wanna-manifest.json");
        std::fs::write(&manifest, "{}").unwrap();

        let log: Log = Arc::default();
        let report = executor(&log, None).execute(&task(manifest)).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "push r/trainer:v1",
                "push r/trainer:latest",
                "push r/serving:v1",
                "write gs://b/release/v1/wanna-manifest.json",
                "write gs://b/release/v1/runtime-parameters.json",
            ]
        );
        assert_eq!(report.containers.len(), 3);
        assert_eq!(report.uploads.len(), 2);
        assert_eq!(report.total(), 5);
    }

    #[tokio::test]
    async fn test_container_failure_blocks_manifests() {
        let temp_dir = tempfile::tempdir().unwrap();
        let manifest = temp_dir.path().join("wanna-manifest.json");
        std::fs::write(&manifest, "{}").unwrap();

        let log: Log = Arc::default();
        let result = executor(&log, Some("r/serving:v1"))
            .execute(&task(manifest))
            .await;

        assert!(matches!(result, Err(BuildError::PushFailed { .. })));
        assert!(log.lock().unwrap().iter().all(|entry| entry.starts_with("push")));
    }

    #[tokio::test]
    async fn test_empty_task() {
        let log: Log = Arc::default();
        let report = executor(&log, None).execute(&PushTask::default()).await.unwrap();
        assert_eq!(report, PushReport::default());
        assert!(log.lock().unwrap().is_empty());
    }
}
