//! プッシュ計画
//!
//! マニフェストとプッシュモードから、実行すべきアップロード操作の集合を求めます。
//! 実際のアップロードは wanna-build 側で行います。

use crate::error::{CoreError, Result};
use crate::manifest::{MANIFEST_FILE_NAME, Manifest};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// プッシュモード
///
/// | モード | コンテナ | マニフェスト |
/// |---|---|---|
/// | all | ✓ | ✓ |
/// | containers | ✓ | - |
/// | manifests | - | ✓ |
/// | quick | - | - |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushMode {
    #[default]
    All,
    Containers,
    Manifests,
    /// タグの解決のみ。ビルドもアップロードも行わない
    Quick,
}

impl PushMode {
    pub fn pushes_containers(&self) -> bool {
        matches!(self, PushMode::All | PushMode::Containers)
    }

    pub fn pushes_manifests(&self) -> bool {
        matches!(self, PushMode::All | PushMode::Manifests)
    }

    /// ビルドとリモート存在確認を省略するか
    pub fn is_quick(&self) -> bool {
        matches!(self, PushMode::Quick)
    }
}

impl FromStr for PushMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "all" => Ok(PushMode::All),
            "containers" => Ok(PushMode::Containers),
            "manifests" => Ok(PushMode::Manifests),
            "quick" => Ok(PushMode::Quick),
            other => Err(CoreError::InvalidConfig(format!(
                "不明なプッシュモード: '{}'（all, containers, manifests, quick のいずれか）",
                other
            ))),
        }
    }
}

impl std::fmt::Display for PushMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PushMode::All => "all",
            PushMode::Containers => "containers",
            PushMode::Manifests => "manifests",
            PushMode::Quick => "quick",
        };
        write!(f, "{}", s)
    }
}

/// コンテナイメージのプッシュ（タグ一式）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerArtifact {
    /// `docker.images` の論理名
    pub image_ref: String,
    pub tags: Vec<String>,
}

/// ファイルのバイト単位コピー
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathArtifact {
    pub source: PathBuf,
    pub destination: String,
}

/// JSON 本文の書き込み
#[derive(Debug, Clone, PartialEq)]
pub struct JsonArtifact {
    pub body: serde_json::Value,
    pub destination: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushArtifact {
    Container(ContainerArtifact),
    Path(PathArtifact),
    Json(JsonArtifact),
}

impl PushArtifact {
    /// 表示用の説明
    pub fn describe(&self) -> String {
        match self {
            PushArtifact::Container(c) => format!("container {} ({})", c.image_ref, c.tags.join(", ")),
            PushArtifact::Path(p) => format!("{} -> {}", p.source.display(), p.destination),
            PushArtifact::Json(j) => format!("json -> {}", j.destination),
        }
    }
}

/// 1つのマニフェストに対するプッシュ操作
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushTask {
    pub containers: Vec<ContainerArtifact>,
    pub manifests: Vec<PathArtifact>,
    pub json: Vec<JsonArtifact>,
}

impl PushTask {
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty() && self.manifests.is_empty() && self.json.is_empty()
    }

    pub fn len(&self) -> usize {
        self.containers.len() + self.manifests.len() + self.json.len()
    }

    /// 実行順（コンテナ → ファイル → JSON）に並べた操作一覧
    pub fn ordered(&self) -> Vec<PushArtifact> {
        self.containers
            .iter()
            .cloned()
            .map(PushArtifact::Container)
            .chain(self.manifests.iter().cloned().map(PushArtifact::Path))
            .chain(self.json.iter().cloned().map(PushArtifact::Json))
            .collect()
    }
}

/// 計画の入力（ビルドフェーズの成果物の所在）
#[derive(Debug, Clone, Default)]
pub struct PushSources {
    /// ローカルのマニフェストファイル
    pub manifest_path: PathBuf,
    /// リモートのリリースディレクトリ URI
    pub release_uri: String,
    /// ビルド済みイメージのタグ
    pub containers: Vec<ContainerArtifact>,
    /// マニフェストと一緒にアップロードするファイル
    pub extra_files: Vec<PathBuf>,
    /// リリースディレクトリに書き込む JSON（ファイル名, 本文）
    pub json: Vec<(String, serde_json::Value)>,
}

/// プッシュ計画を作成
///
/// コンテナはマニフェストが参照する論理名のものだけを対象にする。
pub fn plan(manifest: &Manifest, mode: PushMode, sources: &PushSources) -> PushTask {
    let mut task = PushTask::default();

    if mode.pushes_containers() {
        for image_ref in &manifest.image_refs {
            if let Some(container) = sources.containers.iter().find(|c| &c.image_ref == image_ref)
                && !task.containers.iter().any(|c| &c.image_ref == image_ref)
            {
                task.containers.push(container.clone());
            }
        }
    }

    if mode.pushes_manifests() {
        let release = sources.release_uri.trim_end_matches('/');
        task.manifests.push(PathArtifact {
            source: sources.manifest_path.clone(),
            destination: format!("{}/{}", release, MANIFEST_FILE_NAME),
        });
        for file in &sources.extra_files {
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            task.manifests.push(PathArtifact {
                source: file.clone(),
                destination: format!("{}/{}", release, file_name),
            });
        }
        for (file_name, body) in &sources.json {
            task.json.push(JsonArtifact {
                body: body.clone(),
                destination: format!("{}/{}", release, file_name),
            });
        }
    }

    task
}
