//! パイプラインのコンパイル
//!
//! Kubeflow パイプラインの Python ファイルを子プロセスで実行し、
//! `pipeline_spec.json` を生成します。コンパイル時パラメータは
//! 子プロセスの環境変数としてのみ渡し、自プロセスの環境は変更しません。

use crate::error::{BuildError, Result};
use crate::orchestrator::ResolvedImage;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, instrument};
use wanna_core::Project;
use wanna_core::PipelineConfig;
use wanna_core::manifest::PIPELINE_SPEC_FILE_NAME;
use wanna_core::payload::pipeline_bucket_uri;

/// 使用する Python を上書きする環境変数
pub const PYTHON_ENV_VAR: &str = "WANNA_PYTHON";

/// 生成先を子プロセスに伝える環境変数
pub const SPEC_OUTPUT_ENV_VAR: &str = "PIPELINE_SPEC_OUTPUT";

/// 論理名から `<NAME>_DOCKER_URI` 形式の変数名を作る
pub fn image_env_key(image_ref: &str) -> String {
    let normalized: String = image_ref
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_DOCKER_URI", normalized)
}

/// コンパイル時パラメータを組み立てる
///
/// `compile_env_params` は最後に適用されるため、既定値を上書きできる。
pub fn compile_params(
    project: &Project,
    pipeline: &PipelineConfig,
    version: &str,
    images: &[ResolvedImage],
    spec_output: &Path,
) -> BTreeMap<String, String> {
    let profile = &project.profile;
    let bucket_uri = pipeline_bucket_uri(project, pipeline);
    let region = pipeline
        .region
        .clone()
        .unwrap_or_else(|| profile.region.clone());
    let labels = wanna_core::payload::resource_labels(project, &pipeline.labels);

    let mut params = BTreeMap::new();
    params.insert("PROJECT_ID".to_string(), profile.project_id.clone());
    params.insert("REGION".to_string(), region);
    params.insert("BUCKET".to_string(), bucket_uri.clone());
    params.insert("PIPELINE_NAME".to_string(), pipeline.name.clone());
    params.insert("PIPELINE_VERSION".to_string(), version.to_string());
    params.insert(
        "PIPELINE_ROOT".to_string(),
        format!("{}/wanna-pipelines/{}/executions", bucket_uri, pipeline.name),
    );
    params.insert(
        "PIPELINE_LABELS".to_string(),
        serde_json::to_string(&labels).unwrap_or_default(),
    );
    if let Some(sa) = pipeline.service_account.as_ref().or(profile.service_account.as_ref()) {
        params.insert("SERVICE_ACCOUNT".to_string(), sa.clone());
    }
    for image in images {
        params.insert(image_env_key(&image.image_ref), image.image_uri().to_string());
    }
    params.insert(
        SPEC_OUTPUT_ENV_VAR.to_string(),
        spec_output.to_string_lossy().to_string(),
    );
    params.extend(pipeline.compile_env_params.clone());
    params
}

pub struct PipelineCompiler {
    python: String,
}

impl PipelineCompiler {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }

    /// `WANNA_PYTHON`（未設定なら `python`）を使う
    pub fn from_env() -> Self {
        Self::new(std::env::var(PYTHON_ENV_VAR).unwrap_or_else(|_| "python".to_string()))
    }

    /// パイプラインをコンパイルし、生成された spec のパスを返す
    #[instrument(skip(self, params), fields(python = %self.python))]
    pub async fn compile(
        &self,
        pipeline_name: &str,
        pipeline_file: &Path,
        output_dir: &Path,
        params: &BTreeMap<String, String>,
    ) -> Result<PathBuf> {
        if !pipeline_file.is_file() {
            return Err(BuildError::CompileFailed {
                pipeline: pipeline_name.to_string(),
                message: format!("pipeline file not found: {}", pipeline_file.display()),
            });
        }
        tokio::fs::create_dir_all(output_dir).await?;

        let spec_path = output_dir.join(PIPELINE_SPEC_FILE_NAME);
        if spec_path.exists() {
            tokio::fs::remove_file(&spec_path).await?;
        }

        debug!(params = ?params.keys().collect::<Vec<_>>(), "Compile parameters");
        info!(pipeline = %pipeline_name, file = %pipeline_file.display(), "Compiling pipeline");

        let mut cmd = Command::new(&self.python);
        cmd.arg(pipeline_file);
        cmd.envs(params);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let output = cmd.output().await.map_err(|e| BuildError::CompileFailed {
            pipeline: pipeline_name.to_string(),
            message: format!("failed to run {}: {}", self.python, e),
        })?;

        if !output.status.success() {
            return Err(BuildError::CompileFailed {
                pipeline: pipeline_name.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        if !spec_path.is_file() {
            return Err(BuildError::CompileFailed {
                pipeline: pipeline_name.to_string(),
                message: format!(
                    "compiler did not produce {} (write it to ${})",
                    spec_path.display(),
                    SPEC_OUTPUT_ENV_VAR
                ),
            });
        }

        Ok(spec_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tagger::ImageTags;
    use wanna_core::BuildSpec;
    use wanna_core::loader::{parse_config, select_profile};

    fn project() -> Project {
        let config = parse_config(
            r#"
wanna_project:
  name: sample
gcp_profiles:
  - project_id: my-project
    region: europe-west1
    bucket: my-bucket
docker:
  repository: repo
  images:
    - name: trainer-gpu
      build_type: local_build_image
      context_dir: trainer
pipelines:
  - name: churn
    pipeline_file: pipeline.py
    docker_image_ref: [trainer-gpu]
    compile_env_params:
      REGION: us-central1
      EXTRA: "1"
"#,
            Path::new("wanna.yaml"),
        )
        .unwrap();
        let profile = select_profile(&config, None).unwrap().clone();
        Project {
            config,
            profile,
            root: PathBuf::from("/project"),
        }
    }

    #[test]
    fn test_image_env_key() {
        assert_eq!(image_env_key("trainer-gpu"), "TRAINER_GPU_DOCKER_URI");
        assert_eq!(image_env_key("serving"), "SERVING_DOCKER_URI");
    }

    #[test]
    fn test_python_from_env() {
        temp_env::with_var(PYTHON_ENV_VAR, Some("python3.11"), || {
            assert_eq!(PipelineCompiler::from_env().python, "python3.11");
        });
        temp_env::with_var_unset(PYTHON_ENV_VAR, || {
            assert_eq!(PipelineCompiler::from_env().python, "python");
        });
    }

    #[test]
    fn test_compile_params() {
        let project = project();
        let pipeline = project.config.pipeline("churn").unwrap().clone();
        let images = vec![ResolvedImage {
            image_ref: "trainer-gpu".into(),
            spec: BuildSpec::Provided {
                image_url: "x".into(),
            },
            tags: ImageTags {
                versioned: "r/trainer-gpu:v1".into(),
                latest: "r/trainer-gpu:latest".into(),
            },
            built: false,
        }];

        let params = compile_params(&project, &pipeline, "v1", &images, Path::new("/out/spec.json"));
        assert_eq!(params["PROJECT_ID"], "my-project");
        assert_eq!(params["BUCKET"], "gs://my-bucket");
        assert_eq!(params["TRAINER_GPU_DOCKER_URI"], "r/trainer-gpu:v1");
        assert_eq!(params[SPEC_OUTPUT_ENV_VAR], "/out/spec.json");
        assert_eq!(params["PIPELINE_ROOT"], "gs://my-bucket/wanna-pipelines/churn/executions");
        // compile_env_params が優先される
        assert_eq!(params["REGION"], "us-central1");
        assert_eq!(params["EXTRA"], "1");
        assert!(params["PIPELINE_LABELS"].contains("wanna_project"));
    }

    #[tokio::test]
    async fn test_missing_pipeline_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = PipelineCompiler::new("python")
            .compile(
                "churn",
                &temp_dir.path().join("missing.py"),
                temp_dir.path(),
                &BTreeMap::new(),
            )
            .await;
        assert!(matches!(result, Err(BuildError::CompileFailed { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_params_are_passed_to_child() {
        let temp_dir = tempfile::tempdir().unwrap();
        let script = temp_dir.path().join("pipeline.sh");
        std::fs::write(&script, "printf '{\"bucket\": \"%s\"}' \"$BUCKET\" > \"$PIPELINE_SPEC_OUTPUT\"\n")
            .unwrap();

        let output_dir = temp_dir.path().join("out");
        let mut params = BTreeMap::new();
        params.insert("BUCKET".to_string(), "gs://compile-only".to_string());
        params.insert(
            SPEC_OUTPUT_ENV_VAR.to_string(),
            output_dir.join(PIPELINE_SPEC_FILE_NAME).to_string_lossy().to_string(),
        );

        let spec = PipelineCompiler::new("sh")
            .compile("churn", &script, &output_dir, &params)
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(spec).unwrap(),
            r#"{"bucket": "gs://compile-only"}"#
        );
    }
}
