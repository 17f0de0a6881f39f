//! イメージタグの組み立て
//!
//! `{registry}/{namespace}/{repository}/{project}/{image}:{version}` と `:latest` の
//! 2つのタグを決定的に生成します。空のセグメントは省略します。

use crate::error::{BuildError, Result};
use wanna_core::{DockerConfig, GcpProfile};

pub const LATEST_TAG: &str = "latest";

/// Docker タグの最大長
const MAX_TAG_LEN: usize = 128;

/// バージョン付きタグと latest タグの組
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageTags {
    pub versioned: String,
    pub latest: String,
}

impl ImageTags {
    pub fn to_vec(&self) -> Vec<String> {
        vec![self.versioned.clone(), self.latest.clone()]
    }
}

/// 空でないセグメントを `/` で連結
fn join_segments(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|s| s.trim_matches('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// タグを生成（純粋関数）
pub fn tag(
    registry: &str,
    namespace: &str,
    repository: &str,
    project_scope: &str,
    name: &str,
    version: &str,
) -> ImageTags {
    let base = join_segments(&[registry, namespace, repository, project_scope, name]);
    ImageTags {
        versioned: format!("{}:{}", base, version),
        latest: format!("{}:{}", base, LATEST_TAG),
    }
}

/// プロジェクト設定に束縛されたタグ生成器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTagger {
    registry: String,
    namespace: String,
    repository: String,
    project_scope: String,
}

impl ImageTagger {
    pub fn new(
        registry: impl Into<String>,
        namespace: impl Into<String>,
        repository: impl Into<String>,
        project_scope: impl Into<String>,
    ) -> Self {
        Self {
            registry: registry.into(),
            namespace: namespace.into(),
            repository: repository.into(),
            project_scope: project_scope.into(),
        }
    }

    /// Artifact Registry の規約で作成
    ///
    /// `{region}-docker.pkg.dev/{project_id}/{repository}/{project_name}/{image}`
    pub fn for_project(docker: &DockerConfig, profile: &GcpProfile, project_name: &str) -> Self {
        Self::new(
            docker.registry_for(&profile.region),
            profile.project_id.clone(),
            docker.repository.clone(),
            project_name.to_string(),
        )
    }

    pub fn tag(&self, name: &str, version: &str) -> ImageTags {
        tag(
            &self.registry,
            &self.namespace,
            &self.repository,
            &self.project_scope,
            name,
            version,
        )
    }

    /// イメージ名を除いたリポジトリ部分（キャッシュキーに使う）
    pub fn repository_path(&self) -> String {
        join_segments(&[
            &self.registry,
            &self.namespace,
            &self.repository,
            &self.project_scope,
        ])
    }
}

/// `repo:tag` をリポジトリとタグに分ける（タグがなければ `latest`）
///
/// 最後の `/` より後ろの `:` だけをタグ区切りとみなすので、`host:5000/app` のポートは残ります。
pub fn split_image_tag(image: &str) -> (String, String) {
    let name_start = image.rfind('/').map_or(0, |i| i + 1);
    match image[name_start..].rfind(':') {
        Some(i) => {
            let at = name_start + i;
            (image[..at].to_string(), image[at + 1..].to_string())
        }
        None => (image.to_string(), LATEST_TAG.to_string()),
    }
}

/// 英数字と `.` `-` `_` のみ、先頭は `.` `-` 以外、128文字以下
pub fn validate_tag(tag: &str) -> Result<()> {
    let allowed = tag
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if !tag.is_empty() && tag.len() <= MAX_TAG_LEN && !tag.starts_with(['.', '-']) && allowed {
        Ok(())
    } else {
        Err(BuildError::InvalidTag {
            tag: tag.to_string(),
        })
    }
}
