use super::ReleaseOptions;
use super::release::{self, BuiltRelease};
use crate::utils::{self, Workspace};
use colored::Colorize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use wanna_build::PipelineCompiler;
use wanna_build::compile::compile_params;
use wanna_cloud::deploy::write_trigger_source;
use wanna_cloud::waiter::DEFAULT_POLL_INTERVAL;
use wanna_cloud::{PipelineDeploySpec, PipelineDeployer, UpsertReconciler, Waiter};
use wanna_cloud_gcp::{GcpResourceApi, PipelineJobClient};
use wanna_core::manifest::{
    PIPELINE_SPEC_FILE_NAME, RUNTIME_PARAMETERS_FILE_NAME, read_manifest_uri, release_dir_uri,
    release_manifest_uri,
};
use wanna_core::payload::{pipeline_bucket_uri, pipeline_manifest, pipeline_parameter_values};
use wanna_core::{Manifest, ManifestKind, PipelineConfig};

/// `--sync` でパイプラインの完了を待つ上限
const PIPELINE_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

fn selected<'a>(
    workspace: &'a Workspace,
    options: &ReleaseOptions,
) -> anyhow::Result<Vec<&'a PipelineConfig>> {
    let pipelines = utils::select(
        &workspace.project.config.pipelines,
        options.name.as_deref(),
        "pipeline",
        |pipeline| pipeline.name.as_str(),
    )?;
    if pipelines.is_empty() {
        utils::print_step("No pipelines declared in wanna.yaml");
    }
    Ok(pipelines)
}

/// イメージを解決し、パイプラインをコンパイルしてマニフェストを書き出す
async fn build_releases(
    workspace: &Workspace,
    options: &ReleaseOptions,
) -> anyhow::Result<Vec<BuiltRelease>> {
    let project = &workspace.project;
    let version = workspace.version(options.version.as_deref());
    let pipelines = selected(workspace, options)?;
    let mut orchestrator = release::orchestrator(workspace, &version, options.mode)?;
    let store = workspace.manifest_store();
    let compiler = PipelineCompiler::from_env();

    let mut releases = Vec::with_capacity(pipelines.len());
    for pipeline in pipelines {
        utils::print_step(&format!(
            "Building pipeline {} version {}",
            pipeline.name.cyan(),
            version
        ));
        let images = orchestrator
            .resolve_all(&pipeline.docker_image_ref)
            .await
            .map_err(|e| anyhow::anyhow!(e.user_message()))?;

        let version_dir = store.version_dir(ManifestKind::Pipeline, &pipeline.name, &version);
        let spec_output = version_dir.join(PIPELINE_SPEC_FILE_NAME);
        let params = compile_params(project, pipeline, &version, &images, &spec_output);
        let spec_path = compiler
            .compile(
                &pipeline.name,
                &project.resolve_path(&pipeline.pipeline_file),
                &version_dir,
                &params,
            )
            .await
            .map_err(|e| anyhow::anyhow!(e.user_message()))?;

        let parameter_values = pipeline_parameter_values(project, pipeline)?;
        let mut manifest = pipeline_manifest(project, pipeline, &version, parameter_values.clone());
        let manifest_path = store.write(&mut manifest)?;
        utils::print_ok(&format!(
            "Pipeline {} built: {}",
            pipeline.name,
            manifest_path.display()
        ));

        let bucket_uri = pipeline_bucket_uri(project, pipeline);
        releases.push(BuiltRelease {
            release_uri: release_dir_uri(&bucket_uri, ManifestKind::Pipeline, &pipeline.name, &version),
            manifest,
            manifest_path,
            images,
            extra_files: vec![spec_path],
            json: vec![(
                RUNTIME_PARAMETERS_FILE_NAME.to_string(),
                Value::Object(parameter_values),
            )],
        });
    }
    Ok(releases)
}

pub async fn build(workspace: &Workspace, options: &ReleaseOptions) -> anyhow::Result<()> {
    build_releases(workspace, options).await?;
    Ok(())
}

pub async fn push(workspace: &Workspace, options: &ReleaseOptions) -> anyhow::Result<()> {
    let releases = build_releases(workspace, options).await?;
    release::push_releases(workspace, options.mode, &releases).await
}

fn manifest_uri(workspace: &Workspace, pipeline: &PipelineConfig, version: &str) -> String {
    release_manifest_uri(
        &pipeline_bucket_uri(&workspace.project, pipeline),
        ManifestKind::Pipeline,
        &pipeline.name,
        version,
    )
}

async fn pushed_manifest(workspace: &Workspace, uri: &str) -> anyhow::Result<Manifest> {
    let manifest = read_manifest_uri(workspace.blob_store().as_ref(), uri).await?;
    if manifest.kind != ManifestKind::Pipeline {
        anyhow::bail!("{} is a {} manifest, not a pipeline", uri, manifest.kind);
    }
    Ok(manifest)
}

/// 通知チャネル → ログメトリクス → トリガー関数 → スケジューラ → アラートポリシー
pub async fn deploy(workspace: &Workspace, options: &ReleaseOptions) -> anyhow::Result<()> {
    let version = workspace.version(options.version.as_deref());
    let deployer = PipelineDeployer::new(UpsertReconciler::new(Arc::new(GcpResourceApi::new(
        workspace.gcloud(),
    ))));

    for pipeline in selected(workspace, options)? {
        let uri = manifest_uri(workspace, pipeline, &version);
        let manifest = pushed_manifest(workspace, &uri).await?;

        let function_source = workspace
            .manifest_store()
            .version_dir(ManifestKind::Pipeline, &pipeline.name, &version)
            .join("trigger");
        write_trigger_source(&function_source, &manifest)?;
        let spec = PipelineDeploySpec::from_manifest(&manifest, &function_source)?;

        utils::print_step(&format!(
            "Deploying pipeline {} version {}",
            pipeline.name.cyan(),
            version
        ));
        let report = deployer.deploy(&spec, &uri).await?;
        utils::print_ok(&format!(
            "Pipeline {} deployed ({} created, {} updated)",
            pipeline.name,
            report.created(),
            report.updated()
        ));
    }
    Ok(())
}

pub async fn run(workspace: &Workspace, options: &ReleaseOptions, sync: bool) -> anyhow::Result<()> {
    let version = workspace.version(options.version.as_deref());
    let client = PipelineJobClient::new(workspace.gcloud());
    let mut failed = Vec::new();

    for pipeline in selected(workspace, options)? {
        let uri = manifest_uri(workspace, pipeline, &version);
        let manifest = pushed_manifest(workspace, &uri).await?;

        utils::print_step(&format!(
            "Running pipeline {} version {}",
            pipeline.name.cyan(),
            version
        ));
        let job = client.submit(&manifest).await?;
        utils::print_ok(&format!(
            "Submitted {}\n  {}",
            job.name,
            job.console_url(&manifest.project, &manifest.location)
        ));

        if sync {
            let waiter = Waiter::new(DEFAULT_POLL_INTERVAL, PIPELINE_WAIT);
            match client.wait(&job, &manifest.location, &waiter).await {
                Ok(()) => utils::print_ok(&format!("Pipeline {} succeeded", pipeline.name)),
                Err(e) => {
                    utils::print_failed(&format!("Pipeline {}: {}", pipeline.name, e));
                    failed.push(pipeline.name.as_str());
                }
            }
        }
    }
    utils::ensure_none_failed("pipeline run", &failed)
}
