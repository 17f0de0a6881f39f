//! Vertex AI カスタムジョブ定義

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// wanna.yaml の `jobs` 要素
///
/// ```yaml
/// jobs:
///   - name: train
///     worker:
///       docker_image_ref: trainer
///       args: ["--epochs", "10"]
///       machine_type: n1-standard-8
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    /// 未指定時はプロファイルのリージョン
    #[serde(default)]
    pub region: Option<String>,
    pub worker: WorkerSpec,
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    #[serde(default)]
    pub service_account: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// 未指定時は gs://<bucket>/wanna-jobs/<name>/outputs
    #[serde(default)]
    pub base_output_directory: Option<String>,
    #[serde(default)]
    pub tensorboard_ref: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// ワーカープール定義
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub docker_image_ref: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_machine_type")]
    pub machine_type: String,
    #[serde(default = "default_replica_count")]
    pub replica_count: u32,
    #[serde(default)]
    pub accelerator: Option<AcceleratorSpec>,
}

fn default_machine_type() -> String {
    "n1-standard-4".to_string()
}

fn default_replica_count() -> u32 {
    1
}

/// GPU 等のアクセラレータ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceleratorSpec {
    #[serde(rename = "type")]
    pub accelerator_type: String,
    #[serde(default = "default_accelerator_count")]
    pub count: u32,
}

fn default_accelerator_count() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_defaults() {
        let yaml = r#"
name: train
worker:
  docker_image_ref: trainer
"#;
        let job: JobConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(job.worker.machine_type, "n1-standard-4");
        assert_eq!(job.worker.replica_count, 1);
        assert!(job.worker.accelerator.is_none());
        assert!(job.region.is_none());
    }

    #[test]
    fn test_job_with_accelerator() {
        let yaml = r#"
name: train
worker:
  docker_image_ref: trainer
  accelerator:
    type: NVIDIA_TESLA_T4
"#;
        let job: JobConfig = serde_yaml::from_str(yaml).unwrap();
        let acc = job.worker.accelerator.unwrap();
        assert_eq!(acc.accelerator_type, "NVIDIA_TESLA_T4");
        assert_eq!(acc.count, 1);
    }
}
