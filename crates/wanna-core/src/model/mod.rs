//! モデル定義
//!
//! wanna.yaml で宣言される各リソースのデータモデルを定義します。
//! 各モデルはリソース種別ごとにモジュールに分離されています。

mod config;
mod docker;
mod instance;
mod job;
mod notification;
mod pipeline;
mod project;

// Re-exports
pub use config::*;
pub use docker::*;
pub use instance::*;
pub use job::*;
pub use notification::*;
pub use pipeline::*;
pub use project::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let yaml = r#"
wanna_project:
  name: sample
gcp_profiles:
  - project_id: my-project
    region: europe-west1
    bucket: my-bucket
"#;
        let config: WannaConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.wanna_project.name, "sample");
        assert_eq!(config.wanna_project.version, "dev");
        assert_eq!(config.gcp_profiles[0].profile_name, "default");
        assert!(config.docker.is_none());
        assert!(config.jobs.is_empty());
        assert_eq!(config.ownership_label().to_string(), "wanna_project=sample");
    }

    #[test]
    fn test_lookup_helpers() {
        let yaml = r#"
wanna_project:
  name: sample
docker:
  repository: repo
  images:
    - name: trainer
      build_type: provided_image
      image_url: gcr.io/p/trainer:1
jobs:
  - name: train
    worker:
      docker_image_ref: trainer
tensorboards:
  - name: board
"#;
        let config: WannaConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.image("trainer").is_some());
        assert!(config.image("missing").is_none());
        assert!(config.job("train").is_some());
        assert!(config.tensorboard("board").is_some());
        assert!(config.pipeline("train").is_none());
    }
}
