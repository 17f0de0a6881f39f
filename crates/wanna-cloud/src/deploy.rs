//! パイプラインのデプロイ
//!
//! プッシュ済みマニフェストから、通知チャネル → ログメトリクス → Cloud Function →
//! Cloud Scheduler → アラートポリシーの順に調停します。依存するリソースは
//! 依存先の調停が終わってから処理されます。

use crate::error::{CloudError, Result};
use crate::reconciler::{UpsertOutcome, UpsertReconciler};
use crate::resource::{
    AlertPolicyResource, CloudFunctionResource, CloudSchedulerResource, GcpResource,
    LogMetricResource, NotificationChannelResource, ResourceKind, ResourceLocator,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};
use wanna_core::template::TemplateProcessor;
use wanna_core::{Manifest, ManifestKind, NotificationChannelConfig, ScheduleConfig};

/// ログメトリクスとアラートポリシーはグローバル
const GLOBAL_LOCATION: &str = "global";

const TRIGGER_RUNTIME: &str = "python311";
const TRIGGER_ENTRY_POINT: &str = "process_request";

const TRIGGER_MAIN_TEMPLATE: &str = r#"import json
import os

import google.auth
import google.auth.transport.requests

PIPELINE_NAME = "{{ pipeline }}"
LOCATION = "{{ location }}"
PROJECT = "{{ project }}"


def process_request(request):
    with open(os.path.join(os.path.dirname(__file__), "payload.json")) as f:
        payload = json.load(f)

    credentials, _ = google.auth.default()
    session = google.auth.transport.requests.AuthorizedSession(credentials)
    url = f"https://{LOCATION}-aiplatform.googleapis.com/v1/projects/{PROJECT}/locations/{LOCATION}/pipelineJobs"
    response = session.post(url, json=payload)
    response.raise_for_status()
    return response.json()["name"]
"#;

const TRIGGER_REQUIREMENTS: &str = "google-auth>=2.0\nrequests>=2.28\n";

/// パイプラインに紐づくリソースの安定名
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentNames {
    pub log_metric: String,
    pub function: String,
    pub scheduler: String,
    pub alert_policy: String,
}

impl DeploymentNames {
    pub fn for_pipeline(pipeline: &str) -> Self {
        Self {
            log_metric: format!("wanna-{}-failures", pipeline),
            function: format!("wanna-{}-trigger", pipeline),
            scheduler: format!("wanna-{}-schedule", pipeline),
            alert_policy: format!("wanna-{}-alert", pipeline),
        }
    }
}

/// デプロイ入力
#[derive(Debug, Clone)]
pub struct PipelineDeploySpec {
    pub pipeline: String,
    pub project: String,
    pub region: String,
    pub version: String,
    pub channels: Vec<NotificationChannelConfig>,
    pub schedule: Option<ScheduleConfig>,
    pub sla_hours: Option<f64>,
    pub service_account: Option<String>,
    pub labels: BTreeMap<String, String>,
    /// トリガー関数のソースディレクトリ
    pub function_source: PathBuf,
}

impl PipelineDeploySpec {
    /// プッシュ済みのパイプラインマニフェストから作成
    pub fn from_manifest(manifest: &Manifest, function_source: impl Into<PathBuf>) -> Result<Self> {
        if manifest.kind != ManifestKind::Pipeline {
            return Err(CloudError::InvalidConfig(format!(
                "'{}' is a {} manifest, not a pipeline",
                manifest.name, manifest.kind
            )));
        }
        let deployment = manifest.deployment.clone().unwrap_or(wanna_core::manifest::PipelineDeployment {
            schedule: None,
            notification_channels: Vec::new(),
            sla_hours: None,
        });

        Ok(Self {
            pipeline: manifest.name.clone(),
            project: manifest.project.clone(),
            region: manifest.location.clone(),
            version: manifest.version.clone(),
            channels: deployment.notification_channels,
            schedule: deployment.schedule,
            sla_hours: deployment.sla_hours,
            service_account: manifest.service_account.clone(),
            labels: manifest.labels.clone(),
            function_source: function_source.into(),
        })
    }

    pub fn names(&self) -> DeploymentNames {
        DeploymentNames::for_pipeline(&self.pipeline)
    }

    fn locator(&self, name: &str, location: &str) -> ResourceLocator {
        ResourceLocator::new(name, &self.project, location)
    }

    /// 通知チャネル（宛先ごとに1つ）
    pub fn channel_resources(&self) -> Vec<GcpResource> {
        let mut resources = Vec::new();
        for channel in &self.channels {
            let targets = channel.channel.targets();
            for (index, target) in targets.iter().enumerate() {
                let stable_name = if targets.len() == 1 {
                    channel.name.clone()
                } else {
                    format!("{}-{}", channel.name, index)
                };
                let label_key = match channel.channel.monitoring_type() {
                    "email" => "email_address",
                    _ => "topic",
                };
                let mut channel_labels = BTreeMap::new();
                channel_labels.insert(label_key.to_string(), target.clone());
                resources.push(GcpResource::NotificationChannel(NotificationChannelResource {
                    locator: self.locator(&stable_name, GLOBAL_LOCATION),
                    channel_type: channel.channel.monitoring_type().to_string(),
                    channel_labels,
                    user_labels: self.labels.clone(),
                }));
            }
        }
        resources
    }

    pub fn log_metric(&self) -> GcpResource {
        GcpResource::LogMetric(LogMetricResource {
            locator: self.locator(&self.names().log_metric, GLOBAL_LOCATION),
            filter: format!(
                r#"resource.type="aiplatform.googleapis.com/PipelineJob" AND severity>=ERROR AND jsonPayload.pipelineName="{}""#,
                self.pipeline
            ),
            description: format!("Failures of WANNA pipeline {}", self.pipeline),
        })
    }

    pub fn function(&self, manifest_uri: &str) -> GcpResource {
        let mut env_vars = BTreeMap::new();
        env_vars.insert("WANNA_MANIFEST_URI".to_string(), manifest_uri.to_string());
        env_vars.insert("WANNA_PIPELINE_VERSION".to_string(), self.version.clone());
        if let Some(sla) = self.sla_hours {
            env_vars.insert("WANNA_SLA_HOURS".to_string(), sla.to_string());
        }
        GcpResource::CloudFunction(CloudFunctionResource {
            locator: self.locator(&self.names().function, &self.region),
            runtime: TRIGGER_RUNTIME.to_string(),
            entry_point: TRIGGER_ENTRY_POINT.to_string(),
            source_dir: self.function_source.clone(),
            env_vars,
            service_account: self.service_account.clone(),
            labels: self.labels.clone(),
        })
    }

    pub fn scheduler(&self, schedule: &ScheduleConfig, target_url: &str) -> GcpResource {
        GcpResource::CloudScheduler(CloudSchedulerResource {
            locator: self.locator(&self.names().scheduler, &self.region),
            cron: schedule.cron.clone(),
            timezone: schedule.timezone.clone(),
            target_url: target_url.to_string(),
            body: json!({ "pipeline": self.pipeline, "version": self.version }),
            service_account: self.service_account.clone(),
        })
    }

    pub fn alert_policy(&self, metric_name: &str, channels: Vec<String>) -> GcpResource {
        GcpResource::AlertPolicy(AlertPolicyResource {
            locator: self.locator(&self.names().alert_policy, GLOBAL_LOCATION),
            metric_name: metric_name.to_string(),
            notification_channels: channels,
            user_labels: self.labels.clone(),
        })
    }
}

/// トリガー関数のソースを書き出す
///
/// `payload` は Vertex AI PipelineJob の作成リクエスト本文。
pub fn write_trigger_source(dir: &Path, manifest: &Manifest) -> Result<()> {
    std::fs::create_dir_all(dir)?;

    let mut processor = TemplateProcessor::new();
    processor
        .set("pipeline", &manifest.name)
        .set("location", &manifest.location)
        .set("project", &manifest.project);
    let main_py = processor.render_str(TRIGGER_MAIN_TEMPLATE)?;

    std::fs::write(dir.join("main.py"), main_py)?;
    std::fs::write(dir.join("requirements.txt"), TRIGGER_REQUIREMENTS)?;
    std::fs::write(
        dir.join("payload.json"),
        serde_json::to_vec_pretty(&manifest.payload)?,
    )?;
    debug!(dir = %dir.display(), "Trigger function source written");
    Ok(())
}

/// デプロイ結果（実行順）
#[derive(Debug, Clone, Default)]
pub struct DeployReport {
    pub outcomes: Vec<(ResourceKind, UpsertOutcome)>,
}

impl DeployReport {
    fn push(&mut self, kind: ResourceKind, outcome: UpsertOutcome) {
        self.outcomes.push((kind, outcome));
    }

    pub fn created(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.was_created()).count()
    }

    pub fn updated(&self) -> usize {
        self.outcomes.len() - self.created()
    }
}

pub struct PipelineDeployer {
    reconciler: UpsertReconciler,
}

impl PipelineDeployer {
    pub fn new(reconciler: UpsertReconciler) -> Self {
        Self { reconciler }
    }

    /// 固定順で調停する
    ///
    /// スケジュールの無いパイプラインでは Function と Scheduler を作らない。
    #[instrument(skip(self, spec), fields(pipeline = %spec.pipeline))]
    pub async fn deploy(&self, spec: &PipelineDeploySpec, manifest_uri: &str) -> Result<DeployReport> {
        let mut report = DeployReport::default();

        let mut channel_names = Vec::new();
        for channel in spec.channel_resources() {
            let outcome = self.reconciler.upsert(&channel).await?;
            channel_names.push(outcome.remote.name.clone());
            report.push(ResourceKind::NotificationChannel, outcome);
        }

        let metric = self.reconciler.upsert(&spec.log_metric()).await?;
        let metric_name = metric.remote.name.clone();
        report.push(ResourceKind::LogMetric, metric);

        if let Some(schedule) = &spec.schedule {
            let function = self.reconciler.upsert(&spec.function(manifest_uri)).await?;
            let target_url = function.remote.uri.clone().ok_or_else(|| {
                CloudError::ApiError(format!(
                    "function {} has no invocation URL",
                    function.remote.name
                ))
            })?;
            report.push(ResourceKind::CloudFunction, function);

            let scheduler = self
                .reconciler
                .upsert(&spec.scheduler(schedule, &target_url))
                .await?;
            report.push(ResourceKind::CloudScheduler, scheduler);
        } else {
            debug!("No schedule; skipping trigger function and scheduler");
        }

        let alert = self
            .reconciler
            .upsert(&spec.alert_policy(&metric_name, channel_names))
            .await?;
        report.push(ResourceKind::AlertPolicy, alert);

        info!(
            created = report.created(),
            updated = report.updated(),
            "Pipeline deployment reconciled"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::tests::InMemoryApi;
    use std::sync::Arc;
    use wanna_core::ChannelType;
    use wanna_core::manifest::PipelineDeployment;

    fn manifest(schedule: bool) -> Manifest {
        let mut manifest = Manifest::new(ManifestKind::Pipeline, "churn", "p", "europe-west1", "v1");
        manifest.deployment = Some(PipelineDeployment {
            schedule: schedule.then(|| ScheduleConfig {
                cron: "0 2 * * *".into(),
                timezone: "Etc/UTC".into(),
            }),
            notification_channels: vec![NotificationChannelConfig {
                name: "ops".into(),
                channel: ChannelType::Email {
                    emails: vec!["a@example.com".into(), "b@example.com".into()],
                },
            }],
            sla_hours: Some(2.0),
        });
        manifest
    }

    fn deployer(api: &Arc<InMemoryApi>) -> PipelineDeployer {
        PipelineDeployer::new(UpsertReconciler::new(api.clone()))
    }

    #[tokio::test]
    async fn test_fixed_order() {
        let api = Arc::new(InMemoryApi::default());
        let spec = PipelineDeploySpec::from_manifest(&manifest(true), "/tmp/fn").unwrap();

        let report = deployer(&api).deploy(&spec, "gs://b/m.json").await.unwrap();

        let creates: Vec<String> = api
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("create"))
            .collect();
        assert_eq!(
            creates,
            vec![
                "create notification-channel/ops-0",
                "create notification-channel/ops-1",
                "create log-metric/wanna-churn-failures",
                "create cloud-function/wanna-churn-trigger",
                "create cloud-scheduler/wanna-churn-schedule",
                "create alert-policy/wanna-churn-alert",
            ]
        );
        assert_eq!(report.created(), 6);

        // Function の URL が Scheduler の呼び出し先になる
        let objects = api.objects.lock().unwrap();
        match &objects["wanna-churn-schedule"].1 {
            GcpResource::CloudScheduler(s) => {
                assert_eq!(s.target_url, "https://fn.example/wanna-churn-trigger")
            }
            other => panic!("unexpected {:?}", other),
        }
        match &objects["wanna-churn-alert"].1 {
            GcpResource::AlertPolicy(a) => {
                assert_eq!(a.notification_channels.len(), 2);
                assert_eq!(a.metric_name, "projects/p/log-metric/wanna-churn-failures");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_redeploy_updates_in_place() {
        let api = Arc::new(InMemoryApi::default());
        let spec = PipelineDeploySpec::from_manifest(&manifest(true), "/tmp/fn").unwrap();

        deployer(&api).deploy(&spec, "gs://b/m.json").await.unwrap();
        let second = deployer(&api).deploy(&spec, "gs://b/m.json").await.unwrap();

        assert_eq!(second.created(), 0);
        assert_eq!(second.updated(), 6);
        assert_eq!(api.count(), 6);
    }

    #[tokio::test]
    async fn test_without_schedule() {
        let api = Arc::new(InMemoryApi::default());
        let spec = PipelineDeploySpec::from_manifest(&manifest(false), "/tmp/fn").unwrap();

        let report = deployer(&api).deploy(&spec, "gs://b/m.json").await.unwrap();
        let kinds: Vec<ResourceKind> = report.outcomes.iter().map(|(k, _)| *k).collect();
        assert!(!kinds.contains(&ResourceKind::CloudFunction));
        assert!(!kinds.contains(&ResourceKind::CloudScheduler));
        assert_eq!(kinds.last(), Some(&ResourceKind::AlertPolicy));
    }

    #[test]
    fn test_job_manifest_rejected() {
        let manifest = Manifest::new(ManifestKind::Job, "train", "p", "europe-west1", "v1");
        assert!(PipelineDeploySpec::from_manifest(&manifest, "/tmp/fn").is_err());
    }

    #[test]
    fn test_write_trigger_source() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut m = manifest(true);
        m.payload.insert("displayName".into(), json!("churn"));

        write_trigger_source(temp_dir.path(), &m).unwrap();

        let main_py = std::fs::read_to_string(temp_dir.path().join("main.py")).unwrap();
        assert!(main_py.contains(r#"PIPELINE_NAME = "churn""#));
        assert!(main_py.contains("def process_request"));
        let payload: serde_json::Value = serde_json::from_slice(
            &std::fs::read(temp_dir.path().join("payload.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(payload["displayName"], "churn");
    }
}
