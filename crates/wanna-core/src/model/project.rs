//! プロジェクト・GCPプロファイル定義

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// リソースの所有者を示すラベルキー
pub const OWNERSHIP_LABEL_KEY: &str = "wanna_project";

/// wanna.yaml の `wanna_project` セクション
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WannaProject {
    pub name: String,
    /// CLI で --version が省略された場合のバージョン
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub authors: Vec<String>,
}

fn default_version() -> String {
    "dev".to_string()
}

/// GCPプロファイル
///
/// ```yaml
/// gcp_profiles:
///   - profile_name: default
///     project_id: my-project
///     region: europe-west1
///     zone: europe-west1-b
///     bucket: my-bucket
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GcpProfile {
    #[serde(default = "default_profile_name")]
    pub profile_name: String,
    pub project_id: String,
    pub region: String,
    #[serde(default)]
    pub zone: Option<String>,
    /// マニフェスト等のリリース先バケット（gs:// は省略可）
    pub bucket: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub subnet: Option<String>,
    #[serde(default)]
    pub service_account: Option<String>,
    #[serde(default)]
    pub kms_key: Option<String>,
}

fn default_profile_name() -> String {
    "default".to_string()
}

impl GcpProfile {
    /// `gs://` 付きのバケットURI
    pub fn bucket_uri(&self) -> String {
        if self.bucket.starts_with("gs://") {
            self.bucket.trim_end_matches('/').to_string()
        } else {
            format!("gs://{}", self.bucket.trim_end_matches('/'))
        }
    }

    /// ゾーン（未指定時はリージョン + "-b"）
    pub fn zone_or_default(&self) -> String {
        self.zone
            .clone()
            .unwrap_or_else(|| format!("{}-b", self.region))
    }
}

/// 所有者ラベル（FleetDiff のスコープ）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnershipLabel {
    pub key: String,
    pub value: String,
}

impl OwnershipLabel {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// プロジェクト名からラベルを作成
    pub fn for_project(project_name: &str) -> Self {
        Self::new(OWNERSHIP_LABEL_KEY, sanitize_label_value(project_name))
    }

    /// ラベル集合がこの所有者ラベルを含むか
    pub fn is_carried_by(&self, labels: &BTreeMap<String, String>) -> bool {
        labels.get(&self.key) == Some(&self.value)
    }

    /// gcloud の --filter 形式
    pub fn as_filter(&self) -> String {
        format!("labels.{}={}", self.key, self.value)
    }
}

impl std::fmt::Display for OwnershipLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// GCPラベル値に使えない文字を置換
pub fn sanitize_label_value(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .take(63)
        .collect()
}
