use colored::Colorize;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use wanna_cloud::Result as CloudResult;
use wanna_cloud_gcp::{GCS_SCHEME, Gcloud, GcsBlobStore};
use wanna_core::{BlobRouter, BlobStore, CoreError, ManifestStore, Project};

/// wanna.yaml の探し方（グローバルオプション）
#[derive(Debug, Clone, Default)]
pub struct Locate {
    pub file: Option<PathBuf>,
    pub profile: Option<String>,
}

impl Locate {
    /// `--file` → WANNA_FILE → カレントディレクトリ → ./.wanna/
    pub fn wanna_file(&self) -> anyhow::Result<PathBuf> {
        match &self.file {
            Some(path) if path.is_file() => Ok(path.clone()),
            Some(path) => Err(anyhow::anyhow!(
                "wanna file not found: {}",
                path.display()
            )),
            None => Ok(wanna_config::find_wanna_file()?),
        }
    }

    pub fn load_project(&self) -> anyhow::Result<(PathBuf, Project)> {
        let wanna_file = self.wanna_file()?;
        let root = wanna_config::project_root_of(&wanna_file);
        let project = wanna_core::load_project(&wanna_file, &root, self.profile.as_deref())?;
        Ok((wanna_file, project))
    }
}

/// ロード済みのプロジェクトと作業ディレクトリ
pub struct Workspace {
    pub project: Project,
    pub build_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl Workspace {
    pub fn load(locate: &Locate) -> anyhow::Result<Self> {
        let (wanna_file, project) = locate.load_project()?;
        tracing::debug!(
            file = %wanna_file.display(),
            profile = %project.profile.profile_name,
            "Workspace loaded"
        );
        Ok(Self {
            build_dir: wanna_config::build_dir(&project.root),
            cache_dir: wanna_config::cache_dir(&project.root),
            project,
        })
    }

    /// `--version` 省略時は wanna_project.version
    pub fn version(&self, requested: Option<&str>) -> String {
        requested
            .map(str::to_string)
            .unwrap_or_else(|| self.project.config.wanna_project.version.clone())
    }

    pub fn gcloud(&self) -> Gcloud {
        Gcloud::new(self.project.profile.project_id.clone())
    }

    /// ローカルパスと gs:// を振り分けるストア
    pub fn blob_store(&self) -> Arc<dyn BlobStore> {
        let gcs: Arc<dyn BlobStore> = Arc::new(GcsBlobStore::new(self.gcloud()));
        Arc::new(BlobRouter::new().with_scheme(GCS_SCHEME, gcs))
    }

    pub fn manifest_store(&self) -> ManifestStore {
        ManifestStore::new(&self.build_dir)
    }

    pub fn root(&self) -> &Path {
        &self.project.root
    }
}

/// 名前で絞り込む（省略または "all" で全て）
pub fn select<'a, T>(
    items: &'a [T],
    name: Option<&str>,
    kind: &'static str,
    name_of: impl Fn(&T) -> &str,
) -> anyhow::Result<Vec<&'a T>> {
    match name {
        None | Some("all") => Ok(items.iter().collect()),
        Some(name) => items
            .iter()
            .find(|item| name_of(item) == name)
            .map(|item| vec![item])
            .ok_or_else(|| {
                CoreError::ResourceNotFound {
                    kind,
                    name: name.to_string(),
                }
                .into()
            }),
    }
}

/// 確認プロンプト（y/yes で続行）
pub fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{} [y/N]: ", prompt);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

pub fn print_step(message: &str) {
    println!("{} {}", "→".blue(), message);
}

pub fn print_ok(message: &str) {
    println!("{} {}", "✓".green(), message);
}

pub fn print_failed(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

/// メンバーごとの結果を表示し、失敗があればまとめてエラーにする
///
/// 全メンバーの完了後に呼ぶこと。
pub fn finish_members(action: &str, results: &[(String, CloudResult<()>)]) -> anyhow::Result<()> {
    let mut failed = Vec::new();
    for (name, result) in results {
        match result {
            Ok(()) => print_ok(&format!("{} {}", action, name.cyan())),
            Err(e) => {
                print_failed(&format!("{} {}: {}", action, name, e));
                failed.push(name.as_str());
            }
        }
    }
    ensure_none_failed(action, &failed)
}

pub fn ensure_none_failed(action: &str, failed: &[&str]) -> anyhow::Result<()> {
    if failed.is_empty() {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "{} failed for {} member(s): {}",
            action,
            failed.len(),
            failed.join(", ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wanna_cloud::CloudError;

    #[test]
    fn test_select_all_and_by_name() {
        let items = vec!["train".to_string(), "eval".to_string()];
        assert_eq!(select(&items, None, "job", |s| s.as_str()).unwrap().len(), 2);
        assert_eq!(select(&items, Some("all"), "job", |s| s.as_str()).unwrap().len(), 2);

        let one = select(&items, Some("eval"), "job", |s| s.as_str()).unwrap();
        assert_eq!(one, vec![&"eval".to_string()]);
    }

    #[test]
    fn test_select_unknown_name() {
        let items = vec!["train".to_string()];
        let err = select(&items, Some("missing"), "job", |s| s.as_str()).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_finish_members_reports_every_failure() {
        let results = vec![
            ("a".to_string(), Ok(())),
            ("b".to_string(), Err(CloudError::ApiError("boom".into()))),
            ("c".to_string(), Err(CloudError::ApiError("boom".into()))),
        ];
        let err = finish_members("Created", &results).unwrap_err();
        assert!(err.to_string().contains("2 member(s): b, c"));

        assert!(finish_members("Created", &results[..1]).is_ok());
    }
}
