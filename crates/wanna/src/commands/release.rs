//! ビルドとプッシュ（job / pipeline / notebook 共通）

use crate::utils::{self, Workspace};
use colored::Colorize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use wanna_build::{
    BuildBackend, BuildCache, BuildOrchestrator, CloudBuilder, ImagePusher, ImageTagger, LocalBuilder,
    OrchestratorOptions, PushExecutor, ResolvedImage,
};
use wanna_core::push::{ContainerArtifact, PushSources, plan};
use wanna_core::{DockerConfig, Manifest, PushMode, PushTask};

/// ビルドフェーズの成果物（1リソース分）
#[derive(Debug, Clone)]
pub struct BuiltRelease {
    pub manifest: Manifest,
    pub manifest_path: PathBuf,
    /// `gs://.../deployment/release/<version>`
    pub release_uri: String,
    pub images: Vec<ResolvedImage>,
    pub extra_files: Vec<PathBuf>,
    pub json: Vec<(String, Value)>,
}

/// `docker` セクションが無いプロジェクト用
fn empty_docker_config(project_name: &str) -> DockerConfig {
    DockerConfig {
        repository: project_name.to_string(),
        registry: None,
        images: Vec::new(),
        cloud_build: false,
        cloud_build_timeout: 12000,
        cloud_build_workerpool: None,
        cloud_build_workerpool_location: None,
    }
}

pub fn docker_config(workspace: &Workspace) -> DockerConfig {
    workspace
        .project
        .config
        .docker
        .clone()
        .unwrap_or_else(|| empty_docker_config(workspace.project.name()))
}

/// 設定に応じたバックエンドでオーケストレーターを作る
///
/// quick モードはタグを決めるだけなので Docker にも Cloud Build にも接続しない。
pub fn orchestrator(
    workspace: &Workspace,
    version: &str,
    mode: PushMode,
) -> anyhow::Result<BuildOrchestrator> {
    let project = &workspace.project;
    let docker = docker_config(workspace);

    let backend: Option<Arc<dyn BuildBackend>> = if mode.is_quick() {
        None
    } else if docker.cloud_build {
        Some(Arc::new(CloudBuilder::for_project(&docker, &project.profile)))
    } else {
        Some(Arc::new(LocalBuilder::connect()?))
    };

    Ok(BuildOrchestrator::new(
        docker.images.clone(),
        ImageTagger::for_project(&docker, &project.profile, project.name()),
        BuildCache::new(&workspace.cache_dir),
        backend,
        OrchestratorOptions {
            version: version.to_string(),
            mode,
            project_root: project.root.clone(),
            build_dir: workspace.build_dir.clone(),
        },
    ))
}

/// プッシュ対象のコンテナ
///
/// Cloud Build はビルド時にプッシュ済みなので対象外。
pub fn container_artifacts(images: &[ResolvedImage], cloud_build: bool) -> Vec<ContainerArtifact> {
    if cloud_build {
        return Vec::new();
    }
    images
        .iter()
        .filter(|image| image.is_pushable())
        .map(|image| ContainerArtifact {
            image_ref: image.image_ref.clone(),
            tags: image.tags.to_vec(),
        })
        .collect()
}

/// 各リリースのプッシュ計画を立てて実行
pub async fn push_releases(
    workspace: &Workspace,
    mode: PushMode,
    releases: &[BuiltRelease],
) -> anyhow::Result<()> {
    let cloud_build = docker_config(workspace).cloud_build;
    let executor = PushExecutor::new(Arc::new(ImagePusher::from_env()), workspace.blob_store());

    for release in releases {
        let sources = PushSources {
            manifest_path: release.manifest_path.clone(),
            release_uri: release.release_uri.clone(),
            containers: container_artifacts(&release.images, cloud_build),
            extra_files: release.extra_files.clone(),
            json: release.json.clone(),
        };
        let task = plan(&release.manifest, mode, &sources);
        if task.is_empty() {
            utils::print_step(&format!(
                "Nothing to push for {} ({} mode)",
                release.manifest.name, mode
            ));
            continue;
        }

        utils::print_step(&format!(
            "Pushing {} {} ({} artifacts)",
            release.manifest.kind,
            release.manifest.name.cyan(),
            task.len()
        ));
        let report = executor
            .execute(&task)
            .await
            .map_err(|e| anyhow::anyhow!(e.user_message()))?;
        utils::print_ok(&format!(
            "Pushed {} version {} ({} containers, {} files) to {}",
            release.manifest.name,
            release.manifest.version,
            report.containers.len(),
            report.uploads.len(),
            release.release_uri
        ));
    }
    Ok(())
}

/// イメージだけをプッシュ（ノートブック用）
pub async fn push_images(workspace: &Workspace, images: &[ResolvedImage]) -> anyhow::Result<()> {
    let task = PushTask {
        containers: container_artifacts(images, docker_config(workspace).cloud_build),
        ..Default::default()
    };
    if task.is_empty() {
        return Ok(());
    }
    let executor = PushExecutor::new(Arc::new(ImagePusher::from_env()), workspace.blob_store());
    let report = executor
        .execute(&task)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    utils::print_ok(&format!("Pushed {} container image(s)", report.containers.len()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use wanna_build::ImageTags;
    use wanna_core::BuildSpec;

    fn image(name: &str, spec: BuildSpec) -> ResolvedImage {
        ResolvedImage {
            image_ref: name.to_string(),
            spec,
            tags: ImageTags {
                versioned: format!("registry/{}:v1", name),
                latest: format!("registry/{}:latest", name),
            },
            built: true,
        }
    }

    #[test]
    fn test_container_artifacts_skip_provided_and_cloud_build() {
        let images = vec![
            image(
                "trainer",
                BuildSpec::LocalBuild {
                    context_dir: "trainer".into(),
                    dockerfile: None,
                    build_args: BTreeMap::new(),
                },
            ),
            image(
                "base",
                BuildSpec::Provided {
                    image_url: "gcr.io/x/base:1".into(),
                },
            ),
        ];

        let artifacts = container_artifacts(&images, false);
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].image_ref, "trainer");
        assert_eq!(artifacts[0].tags.len(), 2);

        assert!(container_artifacts(&images, true).is_empty());
    }
}
