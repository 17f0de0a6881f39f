//! Cloud Build によるリモートビルド
//!
//! gcloud CLI をラップし、ビルドコンテキストを tar.gz にまとめて
//! `gcloud builds submit` に渡します。

use crate::backend::{BuildBackend, BuildRequest};
use crate::context::ContextBuilder;
use crate::error::{BuildError, Result};
use async_trait::async_trait;
use colored::Colorize;
use serde_json::{Value, json};
use std::process::Stdio;
use tokio::process::Command;
use wanna_core::{DockerConfig, GcpProfile};

/// Cloud Build バックエンド
#[derive(Debug, Clone)]
pub struct CloudBuilder {
    project_id: String,
    region: String,
    timeout_secs: u64,
    worker_pool: Option<String>,
    worker_pool_location: Option<String>,
}

impl CloudBuilder {
    pub fn new(project_id: impl Into<String>, region: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            project_id: project_id.into(),
            region: region.into(),
            timeout_secs,
            worker_pool: None,
            worker_pool_location: None,
        }
    }

    pub fn for_project(docker: &DockerConfig, profile: &GcpProfile) -> Self {
        Self {
            project_id: profile.project_id.clone(),
            region: profile.region.clone(),
            timeout_secs: docker.cloud_build_timeout,
            worker_pool: docker.cloud_build_workerpool.clone(),
            worker_pool_location: docker.cloud_build_workerpool_location.clone(),
        }
    }

    /// ワーカープールの完全名
    fn worker_pool_name(&self) -> Option<String> {
        self.worker_pool.as_ref().map(|pool| {
            if pool.starts_with("projects/") {
                pool.clone()
            } else {
                let location = self
                    .worker_pool_location
                    .as_deref()
                    .unwrap_or(&self.region);
                format!(
                    "projects/{}/locations/{}/workerPools/{}",
                    self.project_id, location, pool
                )
            }
        })
    }

    /// Run a gcloud command and return stdout
    async fn run_gcloud(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new("gcloud");
        cmd.args(args);
        cmd.arg("--project").arg(&self.project_id);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: gcloud {} --project {}", args.join(" "), self.project_id);

        let output = cmd.output().await?;

        if !output.status.success() {
            return Err(BuildError::CommandFailed {
                command: format!("gcloud {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// cloudbuild.json の内容を生成
///
/// コンテキストは Dockerfile を直下に置いた tar.gz として送るため、
/// `-f Dockerfile` 固定でビルドします。
pub fn cloudbuild_config(request: &BuildRequest, timeout_secs: u64) -> Value {
    let mut args = vec![
        "build".to_string(),
        "-t".to_string(),
        request.tags.versioned.clone(),
        "-t".to_string(),
        request.tags.latest.clone(),
        "-f".to_string(),
        "Dockerfile".to_string(),
    ];
    for (key, value) in &request.build_args {
        args.push("--build-arg".to_string());
        args.push(format!("{}={}", key, value));
    }
    args.push(".".to_string());

    json!({
        "steps": [{
            "name": "gcr.io/cloud-builders/docker",
            "args": args,
        }],
        "images": request.tags.to_vec(),
        "timeout": format!("{}s", timeout_secs),
    })
}

#[async_trait]
impl BuildBackend for CloudBuilder {
    fn name(&self) -> &'static str {
        "cloud-build"
    }

    async fn build(&self, request: &BuildRequest) -> Result<()> {
        crate::builder::warn_sensitive_args(&request.image_ref, request.build_args.keys());

        let staging = tempfile::tempdir()?;
        let archive = ContextBuilder::create_context(
            &request.context_dir,
            &request.dockerfile,
            &request.ignore,
        )?;
        let source_path = staging.path().join("source.tgz");
        tokio::fs::write(&source_path, archive).await?;

        let config_path = staging.path().join("cloudbuild.json");
        let config = cloudbuild_config(request, self.timeout_secs);
        tokio::fs::write(&config_path, serde_json::to_vec_pretty(&config).map_err(|e| {
            BuildError::InvalidConfig(format!("cloudbuild.json: {}", e))
        })?)
        .await?;

        let config_arg = config_path.to_string_lossy().to_string();
        let source_arg = source_path.to_string_lossy().to_string();
        let timeout_arg = format!("{}s", self.timeout_secs);
        let pool = self.worker_pool_name();

        let mut args = vec![
            "builds",
            "submit",
            source_arg.as_str(),
            "--config",
            config_arg.as_str(),
            "--timeout",
            timeout_arg.as_str(),
            "--region",
            self.region.as_str(),
        ];
        if let Some(ref pool) = pool {
            args.push("--worker-pool");
            args.push(pool.as_str());
        }

        tracing::info!(image = %request.image_ref, tag = %request.tags.versioned, "Submitting Cloud Build");
        println!("  → Cloud Build: {}", request.tags.versioned.cyan());

        self.run_gcloud(&args)
            .await
            .map_err(|e| BuildError::build_failed(&request.image_ref, e.to_string()))?;

        Ok(())
    }

    async fn image_exists(&self, image_url: &str) -> Result<bool> {
        match self
            .run_gcloud(&["artifacts", "docker", "images", "describe", image_url, "--format", "json"])
            .await
        {
            Ok(_) => Ok(true),
            Err(BuildError::CommandFailed { stderr, .. })
                if stderr.contains("NOT_FOUND") || stderr.contains("not found") =>
            {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
