//! wanna.yaml 全体のモデル

use super::{
    DockerConfig, GcpProfile, ImageDeclaration, JobConfig, NotebookConfig,
    NotificationChannelConfig, OwnershipLabel, PipelineConfig, TensorboardConfig, WannaProject,
};
use serde::{Deserialize, Serialize};

/// wanna.yaml のトップレベル
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WannaConfig {
    pub wanna_project: WannaProject,
    #[serde(default)]
    pub gcp_profiles: Vec<GcpProfile>,
    #[serde(default)]
    pub docker: Option<DockerConfig>,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
    #[serde(default)]
    pub pipelines: Vec<PipelineConfig>,
    #[serde(default)]
    pub notebooks: Vec<NotebookConfig>,
    #[serde(default)]
    pub tensorboards: Vec<TensorboardConfig>,
    #[serde(default)]
    pub notification_channels: Vec<NotificationChannelConfig>,
}

impl WannaConfig {
    pub fn image(&self, name: &str) -> Option<&ImageDeclaration> {
        self.docker.as_ref().and_then(|d| d.image(name))
    }

    pub fn job(&self, name: &str) -> Option<&JobConfig> {
        self.jobs.iter().find(|j| j.name == name)
    }

    pub fn pipeline(&self, name: &str) -> Option<&PipelineConfig> {
        self.pipelines.iter().find(|p| p.name == name)
    }

    pub fn notebook(&self, name: &str) -> Option<&NotebookConfig> {
        self.notebooks.iter().find(|n| n.name == name)
    }

    pub fn tensorboard(&self, name: &str) -> Option<&TensorboardConfig> {
        self.tensorboards.iter().find(|t| t.name == name)
    }

    pub fn notification_channel(&self, name: &str) -> Option<&NotificationChannelConfig> {
        self.notification_channels.iter().find(|c| c.name == name)
    }

    /// このプロジェクトが作成したリソースに付与するラベル
    pub fn ownership_label(&self) -> OwnershipLabel {
        OwnershipLabel::for_project(&self.wanna_project.name)
    }
}
