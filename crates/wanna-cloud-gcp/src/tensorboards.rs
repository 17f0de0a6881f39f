//! Vertex AI Tensorboard インスタンス
//!
//! Tensorboard のリソースIDは数値で払い出されるため、表示名を安定名として扱います。

use crate::error::{GcpError, Result};
use crate::gcloud::{Gcloud, join_labels};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};
use wanna_cloud::{FleetApi, FleetMember};
use wanna_core::OwnershipLabel;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorboardSpec {
    pub name: String,
    pub region: String,
    /// 所有者ラベルを含む
    pub labels: BTreeMap<String, String>,
}

impl TensorboardSpec {
    pub fn member(&self) -> FleetMember {
        FleetMember {
            name: self.name.clone(),
            location: self.region.clone(),
            labels: self.labels.clone(),
        }
    }
}

/// `tensorboard list` 用の情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorboardInfo {
    pub display_name: String,
    /// `projects/.../locations/.../tensorboards/<id>`
    pub resource_name: String,
    pub region: String,
    pub labels: BTreeMap<String, String>,
}

impl TensorboardInfo {
    fn from_item(item: &Value, region: &str) -> Option<Self> {
        Some(Self {
            display_name: item["displayName"].as_str()?.to_string(),
            resource_name: item["name"].as_str()?.to_string(),
            region: region.to_string(),
            labels: item["labels"]
                .as_object()
                .map(|labels| {
                    labels
                        .iter()
                        .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    /// コンソールの URL
    pub fn console_url(&self) -> String {
        format!(
            "https://console.cloud.google.com/vertex-ai/experiments/{}",
            self.resource_name
        )
    }
}

pub struct TensorboardApi {
    gcloud: Gcloud,
    regions: Vec<String>,
}

impl TensorboardApi {
    pub fn new(gcloud: Gcloud, regions: Vec<String>) -> Self {
        let mut regions = regions;
        regions.sort();
        regions.dedup();
        Self { gcloud, regions }
    }

    async fn list_region(&self, region: &str, filter: &str) -> Result<Vec<TensorboardInfo>> {
        let region_flag = format!("--region={}", region);
        let items: Vec<Value> = self
            .gcloud
            .run_list(&["ai", "tensorboards", "list", &region_flag, filter])
            .await?;
        Ok(items
            .iter()
            .filter_map(|item| TensorboardInfo::from_item(item, region))
            .collect())
    }

    /// 所有者ラベルを持つ Tensorboard の一覧
    pub async fn list_details(&self, scope: &OwnershipLabel) -> Result<Vec<TensorboardInfo>> {
        let filter = format!("--filter=labels.{}={}", scope.key, scope.value);
        let mut all = Vec::new();
        for region in &self.regions {
            all.extend(self.list_region(region, &filter).await?);
        }
        Ok(all)
    }

    /// 表示名から検索
    pub async fn find(&self, display_name: &str, region: &str) -> Result<Option<TensorboardInfo>> {
        let filter = format!("--filter=displayName={}", display_name);
        Ok(self
            .list_region(region, &filter)
            .await?
            .into_iter()
            .find(|tb| tb.display_name == display_name))
    }
}

#[async_trait]
impl FleetApi for TensorboardApi {
    type Spec = TensorboardSpec;

    fn kind(&self) -> &'static str {
        "tensorboard"
    }

    async fn list(&self, scope: &OwnershipLabel) -> wanna_cloud::Result<Vec<FleetMember>> {
        let members: Vec<FleetMember> = self
            .list_details(scope)
            .await?
            .into_iter()
            .map(|tb| FleetMember {
                name: tb.display_name,
                location: tb.region,
                labels: tb.labels,
            })
            .collect();
        debug!(count = members.len(), "Listed tensorboards");
        Ok(members)
    }

    async fn create(&self, spec: &TensorboardSpec) -> wanna_cloud::Result<()> {
        info!(tensorboard = %spec.name, region = %spec.region, "Creating tensorboard");
        let display_name = format!("--display-name={}", spec.name);
        let region = format!("--region={}", spec.region);
        let labels = format!("--labels={}", join_labels(&spec.labels));
        self.gcloud
            .run_command(&["ai", "tensorboards", "create", &display_name, &region, &labels])
            .await?;
        Ok(())
    }

    async fn delete(&self, member: &FleetMember) -> wanna_cloud::Result<()> {
        let found = self
            .find(&member.name, &member.location)
            .await?
            .ok_or_else(|| GcpError::NotFound(format!("tensorboard {}", member.name)))?;

        info!(tensorboard = %member.name, resource = %found.resource_name, "Deleting tensorboard");
        self.gcloud
            .run_command(&["ai", "tensorboards", "delete", &found.resource_name, "--quiet"])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_info_from_item() {
        let item = json!({
            "name": "projects/1/locations/europe-west1/tensorboards/42",
            "displayName": "team-board",
            "labels": { "wanna_project": "sample" }
        });
        let info = TensorboardInfo::from_item(&item, "europe-west1").unwrap();
        assert_eq!(info.display_name, "team-board");
        assert_eq!(info.labels.get("wanna_project").map(String::as_str), Some("sample"));
        assert!(info.console_url().ends_with("tensorboards/42"));

        assert!(TensorboardInfo::from_item(&json!({ "name": "x" }), "r").is_none());
    }

    #[test]
    fn test_spec_member() {
        let mut labels = BTreeMap::new();
        labels.insert("wanna_project".to_string(), "sample".to_string());
        let spec = TensorboardSpec {
            name: "team-board".into(),
            region: "europe-west1".into(),
            labels,
        };
        let member = spec.member();
        assert_eq!(member.location, "europe-west1");
        assert!(member.is_owned_by(&OwnershipLabel::for_project("sample")));
    }
}
