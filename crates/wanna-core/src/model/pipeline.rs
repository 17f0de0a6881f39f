//! Kubeflow パイプライン定義

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// wanna.yaml の `pipelines` 要素
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    /// コンパイル対象の Python ファイル
    pub pipeline_file: PathBuf,
    /// 実行時パラメータ（YAML ファイルパスまたはインライン値）
    #[serde(default)]
    pub pipeline_params: Option<PipelineParams>,
    /// コンテナイメージの論理名
    #[serde(default)]
    pub docker_image_ref: Vec<String>,
    /// コンパイル時に子プロセスへ渡す追加パラメータ
    #[serde(default)]
    pub compile_env_params: BTreeMap<String, String>,
    #[serde(default)]
    pub schedule: Option<ScheduleConfig>,
    #[serde(default)]
    pub notification_channels_ref: Vec<String>,
    #[serde(default)]
    pub sla_hours: Option<f64>,
    #[serde(default)]
    pub service_account: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// 未指定時はプロファイルのバケット
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PipelineParams {
    File(PathBuf),
    Inline(BTreeMap<String, serde_json::Value>),
}

/// Cloud Scheduler のスケジュール
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub cron: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "Etc/UTC".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_with_schedule() {
        let yaml = r#"
name: churn
pipeline_file: pipelines/churn/pipeline.py
docker_image_ref: [trainer, serving]
schedule:
  cron: "0 2 * * *"
notification_channels_ref: [ops]
pipeline_params:
  epochs: 3
"#;
        let pipeline: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(pipeline.docker_image_ref.len(), 2);
        let schedule = pipeline.schedule.unwrap();
        assert_eq!(schedule.timezone, "Etc/UTC");
        match pipeline.pipeline_params.unwrap() {
            PipelineParams::Inline(map) => assert_eq!(map["epochs"], serde_json::json!(3)),
            other => panic!("unexpected params: {:?}", other),
        }
    }

    #[test]
    fn test_pipeline_params_file() {
        let yaml = r#"
name: churn
pipeline_file: pipeline.py
pipeline_params: params.yaml
"#;
        let pipeline: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            pipeline.pipeline_params,
            Some(PipelineParams::File(PathBuf::from("params.yaml")))
        );
    }
}
