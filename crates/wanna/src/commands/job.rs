use super::ReleaseOptions;
use super::release::{self, BuiltRelease};
use crate::utils::{self, Workspace};
use colored::Colorize;
use std::time::Duration;
use wanna_cloud::Waiter;
use wanna_cloud::waiter::DEFAULT_POLL_INTERVAL;
use wanna_cloud_gcp::{CustomJobClient, TensorboardApi};
use wanna_core::manifest::{read_manifest_uri, release_dir_uri, release_manifest_uri};
use wanna_core::payload::job_manifest;
use wanna_core::{JobConfig, Manifest, ManifestKind};

/// `timeout_seconds` 未指定のジョブを待つ上限
const DEFAULT_JOB_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

fn selected<'a>(workspace: &'a Workspace, options: &ReleaseOptions) -> anyhow::Result<Vec<&'a JobConfig>> {
    let jobs = utils::select(
        &workspace.project.config.jobs,
        options.name.as_deref(),
        "job",
        |job| job.name.as_str(),
    )?;
    if jobs.is_empty() {
        utils::print_step("No jobs declared in wanna.yaml");
    }
    Ok(jobs)
}

async fn build_releases(workspace: &Workspace, options: &ReleaseOptions) -> anyhow::Result<Vec<BuiltRelease>> {
    let version = workspace.version(options.version.as_deref());
    let jobs = selected(workspace, options)?;
    let mut orchestrator = release::orchestrator(workspace, &version, options.mode)?;
    let store = workspace.manifest_store();
    let bucket_uri = workspace.project.profile.bucket_uri();

    let mut releases = Vec::with_capacity(jobs.len());
    for job in jobs {
        utils::print_step(&format!("Building job {} version {}", job.name.cyan(), version));
        let image = orchestrator
            .resolve(&job.worker.docker_image_ref)
            .await
            .map_err(|e| anyhow::anyhow!(e.user_message()))?;

        let mut manifest = job_manifest(&workspace.project, job, &version, image.image_uri());
        let manifest_path = store.write(&mut manifest)?;
        utils::print_ok(&format!(
            "Job {} built: {}",
            job.name,
            manifest_path.display()
        ));

        releases.push(BuiltRelease {
            release_uri: release_dir_uri(&bucket_uri, ManifestKind::Job, &job.name, &version),
            manifest,
            manifest_path,
            images: vec![image],
            extra_files: Vec::new(),
            json: Vec::new(),
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

/// プッシュ済みのマニフェストを読む
async fn pushed_manifest(workspace: &Workspace, job: &JobConfig, version: &str) -> anyhow::Result<Manifest> {
    let uri = release_manifest_uri(
        &workspace.project.profile.bucket_uri(),
        ManifestKind::Job,
        &job.name,
        version,
    );
    let manifest = read_manifest_uri(workspace.blob_store().as_ref(), &uri).await?;
    if manifest.kind != ManifestKind::Job {
        anyhow::bail!("{} is a {} manifest, not a job", uri, manifest.kind);
    }
    Ok(manifest)
}

/// ジョブはデプロイ対象のリソースを持たないため、プッシュ済みマニフェストの確認のみ
pub async fn deploy(workspace: &Workspace, options: &ReleaseOptions) -> anyhow::Result<()> {
    let version = workspace.version(options.version.as_deref());
    for job in selected(workspace, options)? {
        let manifest = pushed_manifest(workspace, job, &version).await?;
        utils::print_ok(&format!(
            "Job {} version {} is ready to run in {}",
            manifest.name.cyan(),
            manifest.version,
            manifest.location
        ));
    }
    Ok(())
}

/// Tensorboard の表示名をリソース名に解決
async fn resolve_tensorboard(workspace: &Workspace, job: &JobConfig, location: &str) -> anyhow::Result<Option<String>> {
    let Some(tensorboard_ref) = &job.tensorboard_ref else {
        return Ok(None);
    };
    let region = workspace
        .project
        .config
        .tensorboard(tensorboard_ref)
        .and_then(|tb| tb.region.clone())
        .unwrap_or_else(|| location.to_string());

    let api = TensorboardApi::new(workspace.gcloud(), vec![region.clone()]);
    match api.find(tensorboard_ref, &region).await? {
        Some(found) => Ok(Some(found.resource_name)),
        None => anyhow::bail!(
            "tensorboard '{}' not found in {} (run `wanna tensorboard create -n {}` first)",
            tensorboard_ref,
            region,
            tensorboard_ref
        ),
    }
}

pub async fn run(workspace: &Workspace, options: &ReleaseOptions, sync: bool) -> anyhow::Result<()> {
    let version = workspace.version(options.version.as_deref());
    let client = CustomJobClient::new(workspace.gcloud());
    let mut failed = Vec::new();

    for job in selected(workspace, options)? {
        let manifest = pushed_manifest(workspace, job, &version).await?;
        let tensorboard = resolve_tensorboard(workspace, job, &manifest.location).await?;

        utils::print_step(&format!("Submitting job {} version {}", job.name.cyan(), version));
        let submitted = client.submit(&manifest, tensorboard.as_deref()).await?;
        utils::print_ok(&format!("Submitted {}", submitted.name));

        if sync {
            let timeout = job
                .timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_JOB_WAIT);
            let waiter = Waiter::new(DEFAULT_POLL_INTERVAL, timeout);
            match client.wait(&submitted, &waiter).await {
                Ok(()) => utils::print_ok(&format!("Job {} succeeded", job.name)),
                Err(e) => {
                    utils::print_failed(&format!("Job {}: {}", job.name, e));
                    failed.push(job.name.as_str());
                }
            }
        }
    }
    utils::ensure_none_failed("job run", &failed)
}
