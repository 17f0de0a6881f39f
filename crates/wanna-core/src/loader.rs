//! 統合ローダー
//!
//! テンプレート展開、YAMLパース、プロファイル選択、検証を統合

use crate::error::{CoreError, Result};
use crate::model::{GcpProfile, WannaConfig};
use crate::template::TemplateProcessor;
use crate::validate::validate_config;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// プロファイル名を指定する環境変数
pub const PROFILE_ENV_VAR: &str = "WANNA_GCP_PROFILE_NAME";

/// ロード済みプロジェクト
#[derive(Debug, Clone)]
pub struct Project {
    pub config: WannaConfig,
    /// 選択された GCP プロファイル
    pub profile: GcpProfile,
    /// wanna.yaml が置かれたプロジェクトルート
    pub root: PathBuf,
}

impl Project {
    /// プロジェクトルートからの相対パスを解決
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn name(&self) -> &str {
        &self.config.wanna_project.name
    }
}

/// wanna.yaml をロード
///
/// 以下の処理を実行:
/// 1. テンプレート展開（.env / WANNA_* / CI_* / GCP_* 変数）
/// 2. YAMLパース
/// 3. GCPプロファイル選択
/// 4. 意味検証
#[instrument(skip(wanna_file, project_root), fields(file = %wanna_file.display()))]
pub fn load_project(
    wanna_file: &Path,
    project_root: &Path,
    profile: Option<&str>,
) -> Result<Project> {
    debug!("Step 1: Expanding template");
    let mut processor = TemplateProcessor::for_project(project_root)?;
    let expanded = processor.render_file(wanna_file)?;

    debug!("Step 2: Parsing YAML");
    let config = parse_config(&expanded, wanna_file)?;

    debug!("Step 3: Selecting GCP profile");
    let env_profile = std::env::var(PROFILE_ENV_VAR).ok();
    let requested = profile.or(env_profile.as_deref());
    let profile = select_profile(&config, requested)?.clone();

    debug!("Step 4: Validating");
    validate_config(&config)?;

    info!(
        project = %config.wanna_project.name,
        profile = %profile.profile_name,
        jobs = config.jobs.len(),
        pipelines = config.pipelines.len(),
        notebooks = config.notebooks.len(),
        "Project loaded successfully"
    );

    Ok(Project {
        config,
        profile,
        root: project_root.to_path_buf(),
    })
}

/// 展開済み YAML をパース
pub fn parse_config(content: &str, path: &Path) -> Result<WannaConfig> {
    serde_yaml::from_str(content).map_err(|e| CoreError::YamlParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// GCPプロファイルを選択
///
/// 優先順位: 明示指定 → "default" → 唯一のプロファイル
pub fn select_profile<'a>(config: &'a WannaConfig, requested: Option<&str>) -> Result<&'a GcpProfile> {
    let profiles = &config.gcp_profiles;

    if let Some(name) = requested {
        return profiles
            .iter()
            .find(|p| p.profile_name == name)
            .ok_or_else(|| CoreError::ProfileNotFound(name.to_string()));
    }

    if let Some(default) = profiles.iter().find(|p| p.profile_name == "default") {
        return Ok(default);
    }

    match profiles.as_slice() {
        [only] => Ok(only),
        [] => Err(CoreError::ProfileNotFound(
            "gcp_profiles が定義されていません".to_string(),
        )),
        _ => Err(CoreError::ProfileNotFound(format!(
            "複数のプロファイルがあります。--profile で選択してください: {}",
            profiles
                .iter()
                .map(|p| p.profile_name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}
