//! テンプレートから生成するイメージ（notebook_ready_image）
//!
//! Dockerfile を `build/docker/<image>/` に展開し、requirements ファイルを
//! その隣にコピーします。以降は生成ディレクトリを通常のビルドコンテキストとして扱います。

use crate::error::{BuildError, Result};
use std::path::{Path, PathBuf};
use wanna_core::DEFAULT_NOTEBOOK_BASE_IMAGE;
use wanna_core::template::TemplateProcessor;

/// 生成コンテキスト内の requirements ファイル名
pub const GENERATED_REQUIREMENTS_FILE: &str = "requirements.txt";

const NOTEBOOK_DOCKERFILE_TEMPLATE: &str = r#"FROM {{ base_image }}

ENV PYTHONUNBUFFERED=1
{% if requirements %}
COPY requirements.txt /tmp/requirements.txt
RUN pip install --no-cache-dir -r /tmp/requirements.txt && rm /tmp/requirements.txt
{% endif %}
"#;

/// 生成済みのビルドコンテキスト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedContext {
    pub context_dir: PathBuf,
    pub dockerfile: PathBuf,
}

/// Dockerfile を生成する
///
/// `template` と `requirements` はプロジェクトルートからの相対パスとして解決済みであること。
pub fn generate_context(
    build_dir: &Path,
    image_ref: &str,
    template: Option<&Path>,
    base_image: Option<&str>,
    requirements: Option<&Path>,
) -> Result<GeneratedContext> {
    let context_dir = build_dir.join("docker").join(image_ref);
    std::fs::create_dir_all(&context_dir)?;

    let mut processor = TemplateProcessor::new();
    processor
        .set("base_image", base_image.unwrap_or(DEFAULT_NOTEBOOK_BASE_IMAGE))
        .set("requirements", &requirements.is_some())
        .set("image_ref", image_ref);

    let rendered = match template {
        Some(path) => processor.render_file(path)?,
        None => processor.render_str(NOTEBOOK_DOCKERFILE_TEMPLATE)?,
    };

    let dockerfile = context_dir.join("Dockerfile");
    std::fs::write(&dockerfile, rendered)?;

    let copied = context_dir.join(GENERATED_REQUIREMENTS_FILE);
    match requirements {
        Some(source) => {
            if !source.is_file() {
                return Err(BuildError::InvalidConfig(format!(
                    "requirements file not found for image '{}': {}",
                    image_ref,
                    source.display()
                )));
            }
            std::fs::copy(source, &copied)?;
        }
        None => {
            // 前回の生成物が残っているとハッシュが変わらないため削除
            if copied.exists() {
                std::fs::remove_file(&copied)?;
            }
        }
    }

    tracing::debug!(
        image = %image_ref,
        dir = %context_dir.display(),
        "Generated build context"
    );

    Ok(GeneratedContext {
        context_dir,
        dockerfile,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_builtin_template() {
        let temp_dir = tempdir().unwrap();
        let requirements = temp_dir.path().join("reqs.txt");
        fs::write(&requirements, "pandas==2.2.0\n").unwrap();

        let build_dir = temp_dir.path().join("build");
        let generated =
            generate_context(&build_dir, "notebook", None, None, Some(&requirements)).unwrap();

        assert_eq!(generated.context_dir, build_dir.join("docker/notebook"));
        let dockerfile = fs::read_to_string(&generated.dockerfile).unwrap();
        assert!(dockerfile.starts_with(&format!("FROM {}", DEFAULT_NOTEBOOK_BASE_IMAGE)));
        assert!(dockerfile.contains("pip install"));
        assert_eq!(
            fs::read_to_string(generated.context_dir.join("requirements.txt")).unwrap(),
            "pandas==2.2.0\n"
        );
    }

    #[test]
    fn test_without_requirements() {
        let temp_dir = tempdir().unwrap();
        let generated =
            generate_context(temp_dir.path(), "notebook", None, Some("python:3.11"), None).unwrap();

        let dockerfile = fs::read_to_string(&generated.dockerfile).unwrap();
        assert!(dockerfile.starts_with("FROM python:3.11"));
        assert!(!dockerfile.contains("pip install"));
        assert!(!generated.context_dir.join("requirements.txt").exists());
    }

    #[test]
    fn test_user_template() {
        let temp_dir = tempdir().unwrap();
        let template = temp_dir.path().join("Dockerfile.tera");
        fs::write(&template, "FROM {{ base_image }}\nLABEL image={{ image_ref }}\n").unwrap();

        let generated = generate_context(
            &temp_dir.path().join("build"),
            "custom",
            Some(&template),
            Some("alpine:3.20"),
            None,
        )
        .unwrap();

        assert_eq!(
            fs::read_to_string(&generated.dockerfile).unwrap(),
            "FROM alpine:3.20\nLABEL image=custom\n"
        );
    }

    #[test]
    fn test_missing_requirements() {
        let temp_dir = tempdir().unwrap();
        let result = generate_context(
            temp_dir.path(),
            "notebook",
            None,
            None,
            Some(&temp_dir.path().join("missing.txt")),
        );
        assert!(matches!(result, Err(BuildError::InvalidConfig(_))));
    }
}
