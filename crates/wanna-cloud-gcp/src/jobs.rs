//! Vertex AI カスタムジョブの実行
//!
//! プッシュ済みマニフェストの `jobSpec` を設定ファイルとして
//! `gcloud ai custom-jobs create --config` に渡します。

use crate::error::{GcpError, Result};
use crate::gcloud::{Gcloud, join_labels};
use serde_json::Value;
use std::io::Write;
use tracing::{debug, info};
use wanna_cloud::{CloudError, Readiness, Waiter};
use wanna_core::{CoreError, Manifest, ManifestKind};

/// ジョブ・パイプラインの状態をポーリング結果に変換
///
/// `JOB_STATE_*` と `PIPELINE_STATE_*` の両方を扱う。
pub fn job_state_readiness(state: &str) -> Readiness {
    if state.ends_with("_SUCCEEDED") {
        Readiness::Ready
    } else if ["_FAILED", "_CANCELLED", "_EXPIRED"]
        .iter()
        .any(|suffix| state.ends_with(suffix))
    {
        Readiness::Failed(state.to_string())
    } else {
        Readiness::Pending(state.to_string())
    }
}

/// 投入済みジョブ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedJob {
    /// `projects/.../locations/.../customJobs/<id>`
    pub name: String,
    pub display_name: String,
    pub region: String,
}

/// `--config` に渡す CustomJobSpec
///
/// `tensorboard` が指定されていれば解決済みのリソース名で置き換える。
pub fn custom_job_config(manifest: &Manifest, tensorboard: Option<&str>) -> Result<Value> {
    if manifest.kind != ManifestKind::Job {
        return Err(CoreError::InvalidConfig(format!(
            "'{}' is a {} manifest, not a job",
            manifest.name, manifest.kind
        ))
        .into());
    }
    let mut config = manifest
        .payload
        .get("jobSpec")
        .cloned()
        .ok_or_else(|| CoreError::ManifestCorrupt {
            path: manifest.name.clone().into(),
            reason: "payload has no jobSpec".to_string(),
        })?;
    if let Some(tensorboard) = tensorboard {
        config["tensorboard"] = Value::String(tensorboard.to_string());
    }
    Ok(config)
}

pub struct CustomJobClient {
    gcloud: Gcloud,
}

impl CustomJobClient {
    pub fn new(gcloud: Gcloud) -> Self {
        Self { gcloud }
    }

    /// マニフェストからジョブを投入
    pub async fn submit(&self, manifest: &Manifest, tensorboard: Option<&str>) -> Result<SubmittedJob> {
        let config = custom_job_config(manifest, tensorboard)?;
        let mut file = tempfile::Builder::new().suffix(".json").tempfile()?;
        file.write_all(&serde_json::to_vec_pretty(&config)?)?;

        let region = format!("--region={}", manifest.location);
        let display_name = format!("--display-name={}", manifest.name);
        let config_flag = format!("--config={}", file.path().display());
        let labels = format!("--labels={}", join_labels(&manifest.labels));
        let mut args = vec!["ai", "custom-jobs", "create", &region, &display_name, &config_flag];
        if !manifest.labels.is_empty() {
            args.push(&labels);
        }

        info!(job = %manifest.name, version = %manifest.version, "Submitting custom job");
        let created: Value = self.gcloud.run_json(&args).await?;
        let name = created["name"]
            .as_str()
            .ok_or_else(|| GcpError::UnexpectedResponse("custom job without name".to_string()))?;

        Ok(SubmittedJob {
            name: name.to_string(),
            display_name: manifest.name.clone(),
            region: manifest.location.clone(),
        })
    }

    pub async fn state(&self, job: &SubmittedJob) -> Result<String> {
        let region = format!("--region={}", job.region);
        let described: Value = self
            .gcloud
            .run_json(&["ai", "custom-jobs", "describe", &job.name, &region])
            .await?;
        let state = described["state"].as_str().unwrap_or("JOB_STATE_UNSPECIFIED");
        debug!(job = %job.name, state, "Custom job state");
        Ok(state.to_string())
    }

    /// 完了まで待つ
    pub async fn wait(&self, job: &SubmittedJob, waiter: &Waiter) -> wanna_cloud::Result<()> {
        let resource = format!("custom-job/{}", job.display_name);
        waiter
            .wait_until(&resource, || async {
                let state = self.state(job).await.map_err(CloudError::from)?;
                Ok(job_state_readiness(&state))
            })
            .await
    }
}
