//! デプロイ対象リソースの gcloud 実装
//!
//! 通知チャネルとアラートポリシーはリモートで ID が割り当てられるため、
//! 表示名（= 安定名）で一覧を絞り込んで取得します。その他は安定名が
//! そのままリソース名になります。

use crate::error::{GcpError, Result};
use crate::gcloud::{Gcloud, join_labels};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::io::Write;
use tracing::{debug, info};
use wanna_cloud::resource::{
    AlertPolicyResource, CloudFunctionResource, CloudSchedulerResource, LogMetricResource,
    NotificationChannelResource,
};
use wanna_cloud::{GcpResource, Probe, RemoteResource, ResourceApi, ResourceKind};

/// ログベースメトリクスのメトリクス型
pub fn log_metric_type(metric_name: &str) -> String {
    format!("logging.googleapis.com/user/{}", metric_name)
}

/// [`ResourceApi`] の gcloud 実装
#[derive(Debug, Clone)]
pub struct GcpResourceApi {
    gcloud: Gcloud,
}

impl GcpResourceApi {
    pub fn new(gcloud: Gcloud) -> Self {
        Self { gcloud }
    }

    /// 表示名で1件検索（monitoring 系）
    async fn find_by_display_name(&self, group: &str, display_name: &str) -> Result<Option<String>> {
        let filter = format!("--filter=displayName=\"{}\"", display_name);
        let items: Vec<Value> = self
            .gcloud
            .run_list(&["beta", "monitoring", group, "list", &filter])
            .await?;
        Ok(items
            .into_iter()
            .find_map(|item| item["name"].as_str().map(str::to_string)))
    }

    async fn get_inner(&self, desired: &GcpResource) -> Result<Option<RemoteResource>> {
        let kind = desired.kind();
        let stable = desired.stable_name();

        let remote = match desired {
            GcpResource::NotificationChannel(_) => self
                .find_by_display_name("channels", stable)
                .await?
                .map(|name| RemoteResource::new(kind, stable, name)),
            GcpResource::AlertPolicy(_) => self
                .find_by_display_name("policies", stable)
                .await?
                .map(|name| RemoteResource::new(kind, stable, name)),
            GcpResource::LogMetric(_) => {
                let found: Value = self
                    .gcloud
                    .run_json(&["logging", "metrics", "describe", stable])
                    .await?;
                let name = found["name"].as_str().unwrap_or(stable);
                Some(RemoteResource::new(kind, stable, name).with_uri(log_metric_type(name)))
            }
            GcpResource::CloudFunction(r) => Some(self.describe_function(r).await?),
            GcpResource::CloudScheduler(r) => {
                let location = format!("--location={}", r.locator.location);
                let found: Value = self
                    .gcloud
                    .run_json(&["scheduler", "jobs", "describe", stable, &location])
                    .await?;
                let name = found["name"].as_str().unwrap_or(stable);
                Some(RemoteResource::new(kind, stable, name))
            }
        };
        Ok(remote)
    }

    async fn describe_function(&self, r: &CloudFunctionResource) -> Result<RemoteResource> {
        let region = format!("--region={}", r.locator.location);
        let found: Value = self
            .gcloud
            .run_json(&["functions", "describe", &r.locator.stable_name, "--gen2", &region])
            .await?;
        let name = found["name"].as_str().unwrap_or(&r.locator.stable_name);
        let uri = found["serviceConfig"]["uri"]
            .as_str()
            .or_else(|| found["url"].as_str())
            .ok_or_else(|| {
                GcpError::UnexpectedResponse(format!("function {} has no URL", r.locator.stable_name))
            })?;
        Ok(RemoteResource::new(ResourceKind::CloudFunction, &r.locator.stable_name, name).with_uri(uri))
    }

    async fn apply_channel(&self, r: &NotificationChannelResource, current: Option<&str>) -> Result<RemoteResource> {
        let args = channel_args(r, current);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let created: Value = self.gcloud.run_json(&args).await?;
        let name = created["name"]
            .as_str()
            .or(current)
            .ok_or_else(|| GcpError::UnexpectedResponse("channel without name".to_string()))?;
        Ok(RemoteResource::new(ResourceKind::NotificationChannel, &r.locator.stable_name, name))
    }

    async fn apply_metric(&self, r: &LogMetricResource, verb: &str) -> Result<RemoteResource> {
        let description = format!("--description={}", r.description);
        let filter = format!("--log-filter={}", r.filter);
        self.gcloud
            .run_command(&["logging", "metrics", verb, &r.locator.stable_name, &description, &filter])
            .await?;
        Ok(
            RemoteResource::new(ResourceKind::LogMetric, &r.locator.stable_name, &r.locator.stable_name)
                .with_uri(log_metric_type(&r.locator.stable_name)),
        )
    }

    async fn apply_function(&self, r: &CloudFunctionResource) -> Result<RemoteResource> {
        // deploy は作成と更新の両方を扱う
        let args = function_deploy_args(r);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.gcloud.run_command(&args).await?;
        self.describe_function(r).await
    }

    async fn apply_scheduler(&self, r: &CloudSchedulerResource, verb: &str) -> Result<RemoteResource> {
        let args = scheduler_args(r, verb)?;
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let applied: Value = self.gcloud.run_json(&args).await?;
        let name = applied["name"].as_str().unwrap_or(&r.locator.stable_name);
        Ok(RemoteResource::new(ResourceKind::CloudScheduler, &r.locator.stable_name, name))
    }

    async fn apply_alert_policy(&self, r: &AlertPolicyResource, current: Option<&str>) -> Result<RemoteResource> {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile()?;
        file.write_all(&serde_json::to_vec_pretty(&alert_policy_body(r))?)?;
        let policy_file = format!("--policy-from-file={}", file.path().display());

        let mut args = vec!["alpha", "monitoring", "policies"];
        match current {
            Some(name) => args.extend(["update", name]),
            None => args.push("create"),
        }
        args.push(&policy_file);

        let applied: Value = self.gcloud.run_json(&args).await?;
        let name = applied["name"]
            .as_str()
            .or(current)
            .ok_or_else(|| GcpError::UnexpectedResponse("policy without name".to_string()))?;
        Ok(RemoteResource::new(ResourceKind::AlertPolicy, &r.locator.stable_name, name))
    }

    async fn create_inner(&self, desired: &GcpResource) -> Result<RemoteResource> {
        info!(resource = %desired.describe(), "Creating");
        match desired {
            GcpResource::NotificationChannel(r) => self.apply_channel(r, None).await,
            GcpResource::LogMetric(r) => self.apply_metric(r, "create").await,
            GcpResource::CloudFunction(r) => self.apply_function(r).await,
            GcpResource::CloudScheduler(r) => self.apply_scheduler(r, "create").await,
            GcpResource::AlertPolicy(r) => self.apply_alert_policy(r, None).await,
        }
    }

    async fn update_inner(&self, current: &RemoteResource, desired: &GcpResource) -> Result<RemoteResource> {
        info!(resource = %desired.describe(), remote = %current.name, "Updating");
        match desired {
            GcpResource::NotificationChannel(r) => self.apply_channel(r, Some(&current.name)).await,
            GcpResource::LogMetric(r) => self.apply_metric(r, "update").await,
            GcpResource::CloudFunction(r) => self.apply_function(r).await,
            GcpResource::CloudScheduler(r) => self.apply_scheduler(r, "update").await,
            GcpResource::AlertPolicy(r) => self.apply_alert_policy(r, Some(&current.name)).await,
        }
    }
}

#[async_trait]
impl ResourceApi for GcpResourceApi {
    async fn get(&self, desired: &GcpResource) -> wanna_cloud::Result<Probe> {
        let probe = match self.get_inner(desired).await {
            Ok(Some(remote)) => Probe::Found(remote),
            Ok(None) | Err(GcpError::NotFound(_)) => Probe::NotFound,
            Err(GcpError::PermissionDenied(message)) => {
                debug!(resource = %desired.describe(), %message, "Probe forbidden");
                Probe::Forbidden
            }
            Err(e) => return Err(e.into()),
        };
        Ok(probe)
    }

    async fn create(&self, desired: &GcpResource) -> wanna_cloud::Result<RemoteResource> {
        Ok(self.create_inner(desired).await?)
    }

    async fn update(&self, current: &RemoteResource, desired: &GcpResource) -> wanna_cloud::Result<RemoteResource> {
        Ok(self.update_inner(current, desired).await?)
    }
}

/// 通知チャネルの作成・更新引数
pub fn channel_args(r: &NotificationChannelResource, current: Option<&str>) -> Vec<String> {
    let mut args: Vec<String> = ["beta", "monitoring", "channels"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let channel_labels = join_labels(&r.channel_labels);
    let user_labels = join_labels(&r.user_labels);

    match current {
        Some(name) => {
            args.push("update".into());
            args.push(name.to_string());
            args.push(format!("--display-name={}", r.locator.stable_name));
            args.push(format!("--update-channel-labels={}", channel_labels));
            if !r.user_labels.is_empty() {
                args.push(format!("--update-user-labels={}", user_labels));
            }
        }
        None => {
            args.push("create".into());
            args.push(format!("--display-name={}", r.locator.stable_name));
            args.push(format!("--type={}", r.channel_type));
            args.push(format!("--channel-labels={}", channel_labels));
            if !r.user_labels.is_empty() {
                args.push(format!("--user-labels={}", user_labels));
            }
        }
    }
    args
}

/// Cloud Functions (2nd gen) のデプロイ引数
pub fn function_deploy_args(r: &CloudFunctionResource) -> Vec<String> {
    let mut args = vec![
        "functions".to_string(),
        "deploy".to_string(),
        r.locator.stable_name.clone(),
        "--gen2".to_string(),
        format!("--region={}", r.locator.location),
        format!("--runtime={}", r.runtime),
        format!("--entry-point={}", r.entry_point),
        format!("--source={}", r.source_dir.display()),
        "--trigger-http".to_string(),
        "--no-allow-unauthenticated".to_string(),
    ];
    if !r.env_vars.is_empty() {
        args.push(format!("--set-env-vars={}", join_labels(&r.env_vars)));
    }
    if let Some(sa) = &r.service_account {
        args.push(format!("--service-account={}", sa));
    }
    if !r.labels.is_empty() {
        args.push(format!("--update-labels={}", join_labels(&r.labels)));
    }
    args
}

/// Cloud Scheduler HTTP ジョブの作成・更新引数
pub fn scheduler_args(r: &CloudSchedulerResource, verb: &str) -> Result<Vec<String>> {
    let mut args = vec![
        "scheduler".to_string(),
        "jobs".to_string(),
        verb.to_string(),
        "http".to_string(),
        r.locator.stable_name.clone(),
        format!("--location={}", r.locator.location),
        format!("--schedule={}", r.cron),
        format!("--time-zone={}", r.timezone),
        format!("--uri={}", r.target_url),
        "--http-method=POST".to_string(),
        format!("--message-body={}", serde_json::to_string(&r.body)?),
    ];
    let headers_flag = if verb == "create" { "--headers" } else { "--update-headers" };
    args.push(format!("{}=Content-Type=application/json", headers_flag));

    if let Some(sa) = &r.service_account {
        args.push(format!("--oidc-service-account-email={}", sa));
        args.push(format!("--oidc-token-audience={}", r.target_url));
    }
    Ok(args)
}

/// アラートポリシー本文（ログメトリクスが 0 を超えたら通知）
pub fn alert_policy_body(r: &AlertPolicyResource) -> Value {
    let metric_type = log_metric_type(crate::gcloud::short_name(&r.metric_name));
    json!({
        "displayName": r.locator.stable_name,
        "combiner": "OR",
        "enabled": true,
        "conditions": [{
            "displayName": format!("{} > 0", r.metric_name),
            "conditionThreshold": {
                "filter": format!("metric.type=\"{}\"", metric_type),
                "comparison": "COMPARISON_GT",
                "thresholdValue": 0,
                "duration": "0s",
                "aggregations": [{
                    "alignmentPeriod": "60s",
                    "perSeriesAligner": "ALIGN_COUNT"
                }]
            }
        }],
        "notificationChannels": r.notification_channels,
        "userLabels": r.user_labels,
    })
}
