//! Dockerイメージ定義

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// `notebook_ready_image` のデフォルトベースイメージ
pub const DEFAULT_NOTEBOOK_BASE_IMAGE: &str = "gcr.io/deeplearning-platform-release/base-cpu";

/// wanna.yaml の `docker` セクション
///
/// ```yaml
/// docker:
///   repository: wanna-samples
///   cloud_build: false
///   images:
///     - name: trainer
///       build_type: local_build_image
///       context_dir: ./trainer
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Artifact Registry のリポジトリ名
    pub repository: String,
    /// レジストリホスト（省略時は {region}-docker.pkg.dev）
    #[serde(default)]
    pub registry: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageDeclaration>,
    /// true の場合 Cloud Build でビルドする
    #[serde(default)]
    pub cloud_build: bool,
    #[serde(default = "default_cloud_build_timeout")]
    pub cloud_build_timeout: u64,
    #[serde(default)]
    pub cloud_build_workerpool: Option<String>,
    #[serde(default)]
    pub cloud_build_workerpool_location: Option<String>,
}

fn default_cloud_build_timeout() -> u64 {
    12000
}

impl DockerConfig {
    /// レジストリホストを解決
    pub fn registry_for(&self, region: &str) -> String {
        self.registry
            .clone()
            .unwrap_or_else(|| format!("{}-docker.pkg.dev", region))
    }

    pub fn image(&self, name: &str) -> Option<&ImageDeclaration> {
        self.images.iter().find(|i| i.name == name)
    }
}

/// 論理名付きのイメージ宣言
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDeclaration {
    /// `docker_image_ref` で参照される論理名
    pub name: String,
    #[serde(flatten)]
    pub build: BuildSpec,
}

/// イメージの入手方法
///
/// `Provided` はビルド対象ではなく参照のみ（ハッシュ計算も再ビルドも行わない）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "build_type")]
pub enum BuildSpec {
    /// ローカルの Dockerfile からビルド
    #[serde(rename = "local_build_image")]
    LocalBuild {
        context_dir: PathBuf,
        #[serde(default)]
        dockerfile: Option<PathBuf>,
        #[serde(default)]
        build_args: BTreeMap<String, String>,
    },
    /// 既存イメージをそのまま使う
    #[serde(rename = "provided_image")]
    Provided { image_url: String },
    /// テンプレートから Dockerfile を生成してビルド
    #[serde(rename = "notebook_ready_image")]
    Generated {
        #[serde(default)]
        template: Option<PathBuf>,
        #[serde(default)]
        base_image: Option<String>,
        #[serde(default, alias = "requirements_txt")]
        requirements: Option<PathBuf>,
    },
}

impl BuildSpec {
    /// ビルド対象か（Provided 以外）
    pub fn is_buildable(&self) -> bool {
        !matches!(self, BuildSpec::Provided { .. })
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            BuildSpec::LocalBuild { .. } => "local_build_image",
            BuildSpec::Provided { .. } => "provided_image",
            BuildSpec::Generated { .. } => "notebook_ready_image",
        }
    }
}
