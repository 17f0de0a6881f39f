//! Vertex AI PipelineJob の REST クライアント
//!
//! gcloud で取得したアクセストークンを Bearer 認証に使います。

use crate::error::{GcpError, Result};
use crate::gcloud::Gcloud;
use crate::jobs::job_state_readiness;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};
use wanna_cloud::{CloudError, Waiter};
use wanna_core::{CoreError, Manifest, ManifestKind};

/// リージョンごとの API エンドポイント
pub fn api_base(region: &str) -> String {
    format!("https://{}-aiplatform.googleapis.com/v1", region)
}

pub fn pipeline_jobs_url(project: &str, region: &str) -> String {
    format!(
        "{}/projects/{}/locations/{}/pipelineJobs",
        api_base(region),
        project,
        region
    )
}

/// PipelineJob ID（小文字・数字・ハイフンのみ、128文字以内）
pub fn pipeline_job_id(name: &str, now: DateTime<Utc>) -> String {
    let base: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let suffix = now.format("%Y%m%d%H%M%S").to_string();
    let max_base = 128 - suffix.len() - 1;
    let base = base.trim_matches('-');
    let base = &base[..base.len().min(max_base)];
    format!("{}-{}", base, suffix)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineJob {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub state: String,
}

impl PipelineJob {
    /// コンソールの URL
    pub fn console_url(&self, project: &str, region: &str) -> String {
        let id = crate::gcloud::short_name(&self.name);
        format!(
            "https://console.cloud.google.com/vertex-ai/locations/{}/pipelines/runs/{}?project={}",
            region, id, project
        )
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

pub struct PipelineJobClient {
    client: reqwest::Client,
    gcloud: Gcloud,
}

impl PipelineJobClient {
    pub fn new(gcloud: Gcloud) -> Self {
        Self {
            client: reqwest::Client::new(),
            gcloud,
        }
    }

    async fn check(response: reqwest::Response) -> Result<PipelineJob> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await?;
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|body| body.error.message)
                .unwrap_or(text);
            return Err(GcpError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    /// マニフェストの payload をそのまま作成リクエストとして送る
    pub async fn submit(&self, manifest: &Manifest) -> Result<PipelineJob> {
        if manifest.kind != ManifestKind::Pipeline {
            return Err(CoreError::InvalidConfig(format!(
                "'{}' is a {} manifest, not a pipeline",
                manifest.name, manifest.kind
            ))
            .into());
        }

        let url = pipeline_jobs_url(&manifest.project, &manifest.location);
        let job_id = pipeline_job_id(&manifest.name, Utc::now());
        let token = self.gcloud.access_token().await?;

        info!(pipeline = %manifest.name, version = %manifest.version, job_id = %job_id, "Submitting pipeline job");
        let response = self
            .client
            .post(&url)
            .query(&[("pipelineJobId", job_id.as_str())])
            .bearer_auth(&token)
            .json(&Value::Object(manifest.payload.clone()))
            .send()
            .await?;

        Self::check(response).await
    }

    pub async fn get(&self, name: &str, region: &str) -> Result<PipelineJob> {
        let token = self.gcloud.access_token().await?;
        let url = format!("{}/{}", api_base(region), name);
        let response = self.client.get(&url).bearer_auth(&token).send().await?;
        let job = Self::check(response).await?;
        debug!(job = %job.name, state = %job.state, "Pipeline job state");
        Ok(job)
    }

    /// 完了まで待つ
    pub async fn wait(&self, job: &PipelineJob, region: &str, waiter: &Waiter) -> wanna_cloud::Result<()> {
        let resource = format!("pipeline-job/{}", crate::gcloud::short_name(&job.name));
        waiter
            .wait_until(&resource, || async {
                let current = self.get(&job.name, region).await.map_err(CloudError::from)?;
                Ok(job_state_readiness(&current.state))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_pipeline_jobs_url() {
        assert_eq!(
            pipeline_jobs_url("p", "europe-west1"),
            "https://europe-west1-aiplatform.googleapis.com/v1/projects/p/locations/europe-west1/pipelineJobs"
        );
    }

    #[test]
    fn test_pipeline_job_id() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(pipeline_job_id("Churn_Model", now), "churn-model-20260301123000");

        let long = "x".repeat(200);
        let id = pipeline_job_id(&long, now);
        assert_eq!(id.len(), 128);
        assert!(id.ends_with("-20260301123000"));
    }

    #[test]
    fn test_job_deserialize_and_console_url() {
        let job: PipelineJob = serde_json::from_str(
            r#"{"name": "projects/1/locations/europe-west1/pipelineJobs/churn-1", "state": "PIPELINE_STATE_PENDING"}"#,
        )
        .unwrap();
        assert_eq!(job.state, "PIPELINE_STATE_PENDING");
        assert!(job.display_name.is_empty());
        assert!(
            job.console_url("p", "europe-west1")
                .contains("/pipelines/runs/churn-1?project=p")
        );
    }

    #[tokio::test]
    async fn test_submit_rejects_job_manifest() {
        let client = PipelineJobClient::new(Gcloud::new("p").with_program("/nonexistent/gcloud"));
        let manifest = Manifest::new(ManifestKind::Job, "train", "p", "europe-west1", "v1");
        assert!(matches!(
            client.submit(&manifest).await,
            Err(GcpError::Core(CoreError::InvalidConfig(_)))
        ));
    }
}
