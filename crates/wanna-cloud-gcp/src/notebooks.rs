//! Vertex AI Workbench インスタンス
//!
//! [`FleetApi`] として一覧・作成・削除を提供します。作成は `--async` で投げ、
//! `ACTIVE` になるまで [`Waiter`] でポーリングします。

use crate::error::Result;
use crate::gcloud::{Gcloud, join_labels, short_name};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};
use wanna_cloud::{CloudError, FleetApi, FleetMember, Readiness, Waiter};
use wanna_core::OwnershipLabel;

/// 作成完了を示す状態
pub const ACTIVE_STATE: &str = "ACTIVE";

/// 待っても改善しない状態
const TERMINAL_STATES: [&str; 3] = ["FAILED", "DELETED", "SUSPENDED"];

/// ノートブックのイメージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotebookImage {
    /// 解決済みのコンテナイメージURI
    Container { uri: String },
    Vm { project: String, family: String },
}

/// 作成するノートブック1台分の仕様
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotebookSpec {
    pub name: String,
    pub zone: String,
    pub machine_type: String,
    pub image: NotebookImage,
    pub owner: Option<String>,
    /// 所有者ラベルを含む
    pub labels: BTreeMap<String, String>,
    pub boot_disk_gb: u32,
    pub network: Option<String>,
    pub subnet: Option<String>,
    pub service_account: Option<String>,
}

impl NotebookSpec {
    pub fn member(&self) -> FleetMember {
        FleetMember {
            name: self.name.clone(),
            location: self.zone.clone(),
            labels: self.labels.clone(),
        }
    }

    /// `workbench instances create` の引数
    pub fn create_args(&self) -> Vec<String> {
        let mut args = vec![
            "workbench".to_string(),
            "instances".to_string(),
            "create".to_string(),
            self.name.clone(),
            format!("--location={}", self.zone),
            format!("--machine-type={}", self.machine_type),
            format!("--boot-disk-size={}", self.boot_disk_gb),
            format!("--labels={}", join_labels(&self.labels)),
            "--async".to_string(),
        ];
        match &self.image {
            NotebookImage::Container { uri } => {
                let (repository, tag) = split_container_uri(uri);
                args.push(format!("--container-repository={}", repository));
                args.push(format!("--container-tag={}", tag));
            }
            NotebookImage::Vm { project, family } => {
                args.push(format!("--vm-image-project={}", project));
                args.push(format!("--vm-image-family={}", family));
            }
        }
        if let Some(owner) = &self.owner {
            args.push(format!("--instance-owners={}", owner));
        }
        if let Some(network) = &self.network {
            args.push(format!("--network={}", network));
        }
        if let Some(subnet) = &self.subnet {
            args.push(format!("--subnet={}", subnet));
        }
        if let Some(sa) = &self.service_account {
            args.push(format!("--service-account-email={}", sa));
        }
        args
    }
}

/// `repo/image:tag` をリポジトリとタグに分割（タグ無しは latest）
pub fn split_container_uri(uri: &str) -> (&str, &str) {
    let last_slash = uri.rfind('/').unwrap_or(0);
    match uri[last_slash..].rfind(':') {
        Some(pos) => (&uri[..last_slash + pos], &uri[last_slash + pos + 1..]),
        None => (uri, "latest"),
    }
}

/// 状態文字列をポーリング結果に変換
pub fn readiness_of(state: &str) -> Readiness {
    if state == ACTIVE_STATE {
        Readiness::Ready
    } else if TERMINAL_STATES.contains(&state) {
        Readiness::Failed(state.to_string())
    } else {
        Readiness::Pending(state.to_string())
    }
}

/// `notebook report` 用の状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotebookStatus {
    pub name: String,
    pub zone: String,
    pub state: String,
    pub proxy_uri: Option<String>,
    pub creator: Option<String>,
}

fn labels_of(item: &Value) -> BTreeMap<String, String> {
    item["labels"]
        .as_object()
        .map(|labels| {
            labels
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Workbench インスタンスの gcloud 実装
pub struct NotebookApi {
    gcloud: Gcloud,
    /// 一覧を取得するゾーン
    zones: Vec<String>,
    waiter: Waiter,
}

impl NotebookApi {
    pub fn new(gcloud: Gcloud, zones: Vec<String>) -> Self {
        let mut zones = zones;
        zones.sort();
        zones.dedup();
        Self {
            gcloud,
            zones,
            waiter: Waiter::default(),
        }
    }

    pub fn with_waiter(mut self, waiter: Waiter) -> Self {
        self.waiter = waiter;
        self
    }

    pub async fn describe(&self, name: &str, zone: &str) -> Result<NotebookStatus> {
        let location = format!("--location={}", zone);
        let item: Value = self
            .gcloud
            .run_json(&["workbench", "instances", "describe", name, &location])
            .await?;
        Ok(NotebookStatus {
            name: name.to_string(),
            zone: zone.to_string(),
            state: item["state"].as_str().unwrap_or("STATE_UNSPECIFIED").to_string(),
            proxy_uri: item["proxyUri"].as_str().map(|uri| format!("https://{}", uri)),
            creator: item["creator"].as_str().map(str::to_string),
        })
    }
}

#[async_trait]
impl FleetApi for NotebookApi {
    type Spec = NotebookSpec;

    fn kind(&self) -> &'static str {
        "notebook"
    }

    async fn list(&self, scope: &OwnershipLabel) -> wanna_cloud::Result<Vec<FleetMember>> {
        let mut members = Vec::new();

        for zone in &self.zones {
            let args = list_args(zone, scope);
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            let items: Vec<Value> = self.gcloud.run_list(&args).await?;
            for item in items {
                let Some(name) = item["name"].as_str() else {
                    continue;
                };
                members.push(FleetMember {
                    name: short_name(name).to_string(),
                    location: zone.clone(),
                    labels: labels_of(&item),
                });
            }
        }
        debug!(count = members.len(), "Listed notebooks");
        Ok(members)
    }

    async fn create(&self, spec: &NotebookSpec) -> wanna_cloud::Result<()> {
        info!(notebook = %spec.name, zone = %spec.zone, "Creating notebook");
        let args = spec.create_args();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.gcloud.run_command(&args).await?;

        let resource = format!("notebook/{}", spec.name);
        self.waiter
            .wait_until(&resource, || async {
                let status = self
                    .describe(&spec.name, &spec.zone)
                    .await
                    .map_err(CloudError::from)?;
                Ok(readiness_of(&status.state))
            })
            .await
    }

    async fn delete(&self, member: &FleetMember) -> wanna_cloud::Result<()> {
        info!(notebook = %member.name, zone = %member.location, "Deleting notebook");
        let location = format!("--location={}", member.location);
        self.gcloud
            .run_command(&["workbench", "instances", "delete", &member.name, &location, "--quiet"])
            .await?;
        Ok(())
    }
}

/// ゾーン内で所有者ラベルを持つインスタンスの一覧引数
fn list_args(zone: &str, scope: &OwnershipLabel) -> Vec<String> {
    vec![
        "workbench".to_string(),
        "instances".to_string(),
        "list".to_string(),
        format!("--location={}", zone),
        format!("--filter={}", scope.as_filter()),
    ]
}
