//! WANNA の設定ファイル・作業ディレクトリの解決

pub mod error;

pub use error::*;

use std::path::{Path, PathBuf};

/// プロジェクトファイルの候補（優先順）
const WANNA_FILE_CANDIDATES: [&str; 3] = ["wanna.yaml", "wanna.yml", ".wanna.yaml"];

/// プロジェクト内の WANNA 作業ディレクトリ
pub const WANNA_DIR: &str = ".wanna";

/// WANNAの設定ディレクトリを取得 (~/.config/wanna)
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("wanna");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// プロジェクトの wanna.yaml を探す
///
/// 以下の優先順位で設定ファイルを検索:
/// 1. 環境変数 WANNA_FILE (直接パス指定)
/// 2. カレントディレクトリ: wanna.yaml, wanna.yml, .wanna.yaml
/// 3. ./.wanna/ ディレクトリ内: 同様の順序
pub fn find_wanna_file() -> Result<PathBuf> {
    let current_dir = std::env::current_dir()?;
    find_wanna_file_in(&current_dir)
}

/// 指定ディレクトリを起点に wanna.yaml を探す
pub fn find_wanna_file_in(dir: &Path) -> Result<PathBuf> {
    // 1. 環境変数で直接指定（存在しない場合は探索に進まずエラー）
    if let Ok(explicit) = std::env::var("WANNA_FILE") {
        let path = PathBuf::from(&explicit);
        if path.exists() {
            tracing::debug!(path = %path.display(), "Using WANNA_FILE");
            return Ok(path);
        }
        return Err(ConfigError::ExplicitFileMissing(explicit));
    }

    // 2. 指定ディレクトリで検索
    for filename in &WANNA_FILE_CANDIDATES {
        let path = dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    // 3. ./.wanna/ ディレクトリで検索
    let wanna_dir = dir.join(WANNA_DIR);
    if wanna_dir.is_dir() {
        for filename in &WANNA_FILE_CANDIDATES {
            let path = wanna_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    Err(ConfigError::WannaFileNotFound)
}

/// wanna.yaml のパスからプロジェクトルートを求める
///
/// `.wanna/` 配下に置かれた場合はその親をルートとする
pub fn project_root_of(wanna_file: &Path) -> PathBuf {
    let parent = wanna_file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    if parent.file_name().and_then(|n| n.to_str()) == Some(WANNA_DIR) {
        parent
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or(parent)
    } else {
        parent
    }
}

/// ビルド成果物（マニフェスト、生成 Dockerfile 等）の出力先
pub fn build_dir(project_root: &Path) -> PathBuf {
    project_root.join("build")
}

/// ビルドキャッシュの格納先
///
/// 環境変数 WANNA_CACHE_DIR で上書き可能
pub fn cache_dir(project_root: &Path) -> PathBuf {
    match std::env::var("WANNA_CACHE_DIR") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => project_root.join(WANNA_DIR).join("cache"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    fn test_get_config_dir() {
        let result = get_config_dir();
        assert!(result.is_ok());

        let config_dir = result.unwrap();
        assert!(config_dir.ends_with("wanna"));
        assert!(config_dir.exists());
    }

    #[test]
    #[serial]
    fn test_find_wanna_file_in_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("wanna.yaml"), "# test").unwrap();

        temp_env::with_var_unset("WANNA_FILE", || {
            let found = find_wanna_file_in(temp_dir.path()).unwrap();
            assert!(found.ends_with("wanna.yaml"));
        });
    }

    #[test]
    #[serial]
    fn test_yaml_preferred_over_yml() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("wanna.yml"), "# yml").unwrap();
        fs::write(temp_dir.path().join("wanna.yaml"), "# yaml").unwrap();

        temp_env::with_var_unset("WANNA_FILE", || {
            let found = find_wanna_file_in(temp_dir.path()).unwrap();
            assert!(found.ends_with("wanna.yaml"));
        });
    }

    #[test]
    #[serial]
    fn test_find_wanna_file_in_wanna_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wanna_dir = temp_dir.path().join(".wanna");
        fs::create_dir(&wanna_dir).unwrap();
        fs::write(wanna_dir.join("wanna.yaml"), "# in .wanna").unwrap();

        temp_env::with_var_unset("WANNA_FILE", || {
            let found = find_wanna_file_in(temp_dir.path()).unwrap();
            assert!(found.ends_with(".wanna/wanna.yaml"));
            assert_eq!(project_root_of(&found), temp_dir.path());
        });
    }

    #[test]
    #[serial]
    fn test_find_wanna_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.yaml");
        fs::write(&config_path, "# custom").unwrap();

        temp_env::with_var("WANNA_FILE", Some(config_path.to_str().unwrap()), || {
            let found = find_wanna_file_in(Path::new("/nonexistent")).unwrap();
            assert_eq!(found, config_path);
        });
    }

    #[test]
    #[serial]
    fn test_env_var_pointing_nowhere_is_error() {
        temp_env::with_var("WANNA_FILE", Some("/nonexistent/wanna.yaml"), || {
            let result = find_wanna_file_in(Path::new("/tmp"));
            assert!(matches!(result, Err(ConfigError::ExplicitFileMissing(_))));
        });
    }

    #[test]
    #[serial]
    fn test_find_wanna_file_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();

        temp_env::with_var_unset("WANNA_FILE", || {
            let result = find_wanna_file_in(temp_dir.path());
            assert!(matches!(result, Err(ConfigError::WannaFileNotFound)));
        });
    }

    #[test]
    #[serial]
    fn test_cache_dir_override() {
        let root = Path::new("/project");
        temp_env::with_var("WANNA_CACHE_DIR", Some("/tmp/wanna-cache"), || {
            assert_eq!(cache_dir(root), PathBuf::from("/tmp/wanna-cache"));
        });
        temp_env::with_var_unset("WANNA_CACHE_DIR", || {
            assert_eq!(cache_dir(root), PathBuf::from("/project/.wanna/cache"));
        });
    }
}
