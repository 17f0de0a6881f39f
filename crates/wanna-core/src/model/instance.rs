//! 長期稼働インスタンス（ノートブック、Tensorboard）定義

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// wanna.yaml の `notebooks` 要素
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotebookConfig {
    pub name: String,
    /// 未指定時はプロファイルのゾーン
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default = "default_notebook_machine_type")]
    pub machine_type: String,
    #[serde(default)]
    pub environment: NotebookEnvironment,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default = "default_boot_disk_gb")]
    pub boot_disk_gb: u32,
    #[serde(default)]
    pub tensorboard_ref: Option<String>,
}

fn default_notebook_machine_type() -> String {
    "e2-standard-2".to_string()
}

fn default_boot_disk_gb() -> u32 {
    150
}

/// ノートブックの実行環境
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotebookEnvironment {
    /// `docker.images` の論理名を参照
    Container { docker_image_ref: String },
    Vm { vm_image: VmImage },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmImage {
    pub project: String,
    pub family: String,
}

impl Default for NotebookEnvironment {
    fn default() -> Self {
        NotebookEnvironment::Vm {
            vm_image: VmImage {
                project: "deeplearning-platform-release".to_string(),
                family: "common-cpu-notebooks".to_string(),
            },
        }
    }
}

impl NotebookEnvironment {
    pub fn docker_image_ref(&self) -> Option<&str> {
        match self {
            NotebookEnvironment::Container { docker_image_ref } => Some(docker_image_ref),
            NotebookEnvironment::Vm { .. } => None,
        }
    }
}

/// wanna.yaml の `tensorboards` 要素
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorboardConfig {
    pub name: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notebook_environment() {
        let yaml = r#"
name: exploration
environment:
  docker_image_ref: notebook
"#;
        let nb: NotebookConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(nb.environment.docker_image_ref(), Some("notebook"));
        assert_eq!(nb.boot_disk_gb, 150);

        let nb: NotebookConfig = serde_yaml::from_str("name: plain").unwrap();
        assert!(matches!(nb.environment, NotebookEnvironment::Vm { .. }));
    }
}
