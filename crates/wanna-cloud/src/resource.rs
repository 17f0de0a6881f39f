//! 調停対象のリモートリソース
//!
//! 各リソースは `stable_name` をキーに一意に識別され、同じ名前で何度 upsert しても
//! リモートには1つしか存在しません。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// リソース種別
///
/// 並び順がデプロイ順（依存される側が先）になっている。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    NotificationChannel,
    LogMetric,
    CloudFunction,
    CloudScheduler,
    AlertPolicy,
}

impl ResourceKind {
    /// デプロイ順での位置
    pub fn deploy_rank(&self) -> u8 {
        match self {
            ResourceKind::NotificationChannel => 0,
            ResourceKind::LogMetric => 1,
            ResourceKind::CloudFunction => 2,
            ResourceKind::CloudScheduler => 3,
            ResourceKind::AlertPolicy => 4,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceKind::NotificationChannel => "notification-channel",
            ResourceKind::LogMetric => "log-metric",
            ResourceKind::CloudFunction => "cloud-function",
            ResourceKind::CloudScheduler => "cloud-scheduler",
            ResourceKind::AlertPolicy => "alert-policy",
        };
        write!(f, "{}", s)
    }
}

/// 全リソース共通の識別情報
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceLocator {
    /// 調停キー
    pub stable_name: String,
    pub project: String,
    pub location: String,
}

impl ResourceLocator {
    pub fn new(
        stable_name: impl Into<String>,
        project: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            stable_name: stable_name.into(),
            project: project.into(),
            location: location.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationChannelResource {
    pub locator: ResourceLocator,
    /// Cloud Monitoring のチャネル種別（email, pubsub）
    pub channel_type: String,
    /// `email_address` / `topic` など種別ごとのラベル
    pub channel_labels: BTreeMap<String, String>,
    pub user_labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMetricResource {
    pub locator: ResourceLocator,
    pub filter: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudFunctionResource {
    pub locator: ResourceLocator,
    pub runtime: String,
    pub entry_point: String,
    /// デプロイするソースのディレクトリ
    pub source_dir: PathBuf,
    pub env_vars: BTreeMap<String, String>,
    pub service_account: Option<String>,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudSchedulerResource {
    pub locator: ResourceLocator,
    pub cron: String,
    pub timezone: String,
    /// 呼び出し先（Cloud Function の URL）
    pub target_url: String,
    pub body: Value,
    /// OIDC トークンを発行するサービスアカウント
    pub service_account: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPolicyResource {
    pub locator: ResourceLocator,
    /// 監視対象のログメトリクス名
    pub metric_name: String,
    /// 通知チャネルの完全なリソース名
    pub notification_channels: Vec<String>,
    pub user_labels: BTreeMap<String, String>,
}

/// 調停対象のリソース
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GcpResource {
    NotificationChannel(NotificationChannelResource),
    LogMetric(LogMetricResource),
    CloudFunction(CloudFunctionResource),
    CloudScheduler(CloudSchedulerResource),
    AlertPolicy(AlertPolicyResource),
}

impl GcpResource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            GcpResource::NotificationChannel(_) => ResourceKind::NotificationChannel,
            GcpResource::LogMetric(_) => ResourceKind::LogMetric,
            GcpResource::CloudFunction(_) => ResourceKind::CloudFunction,
            GcpResource::CloudScheduler(_) => ResourceKind::CloudScheduler,
            GcpResource::AlertPolicy(_) => ResourceKind::AlertPolicy,
        }
    }

    pub fn locator(&self) -> &ResourceLocator {
        match self {
            GcpResource::NotificationChannel(r) => &r.locator,
            GcpResource::LogMetric(r) => &r.locator,
            GcpResource::CloudFunction(r) => &r.locator,
            GcpResource::CloudScheduler(r) => &r.locator,
            GcpResource::AlertPolicy(r) => &r.locator,
        }
    }

    pub fn stable_name(&self) -> &str {
        &self.locator().stable_name
    }

    /// 表示用（`kind/name`）
    pub fn describe(&self) -> String {
        format!("{}/{}", self.kind(), self.stable_name())
    }
}

/// リモートに存在するリソースの識別情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteResource {
    pub kind: ResourceKind,
    pub stable_name: String,
    /// リモートで割り当てられた完全なリソース名
    pub name: String,
    /// 呼び出し URL など依存リソースが参照する値
    #[serde(default)]
    pub uri: Option<String>,
}

impl RemoteResource {
    pub fn new(kind: ResourceKind, stable_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            stable_name: stable_name.into(),
            name: name.into(),
            uri: None,
        }
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }
}
