//! ビルドコンテキストのフィンガープリント
//!
//! ディレクトリ内容とビルドパラメータから SHA-256 を計算し、再ビルドの要否判定に使います。
//! ファイルの更新時刻などのメタデータは含めません。

use crate::error::{BuildError, Result};
use crate::ignore::IgnoreRules;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const FINGERPRINT_ALGORITHM: &str = "sha256";

/// コンテキストの内容ハッシュ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub algorithm: &'static str,
    pub digest: [u8; 32],
    /// ハッシュ対象となった相対パス
    pub scope: BTreeSet<PathBuf>,
}

impl Fingerprint {
    /// 16進表記のダイジェスト
    pub fn hex(&self) -> String {
        hex::encode(self.digest)
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex())
    }
}

/// ディレクトリのフィンガープリントを計算
///
/// エントリはパス順にソートしてからハッシュするため、列挙順に依存しない。
/// 読めないファイルがあれば `FingerprintIo` を返す。
pub fn fingerprint(dir: &Path, ignore: &IgnoreRules) -> Result<Fingerprint> {
    fingerprint_with_params(dir, ignore, &BTreeMap::new())
}

/// ビルドパラメータ込みでフィンガープリントを計算
///
/// build args や Dockerfile の内容などコンテキスト外の入力は `params` で渡す。
pub fn fingerprint_with_params(
    dir: &Path,
    ignore: &IgnoreRules,
    params: &BTreeMap<String, String>,
) -> Result<Fingerprint> {
    if !dir.is_dir() {
        return Err(BuildError::ContextNotFound(dir.to_path_buf()));
    }

    let mut entries: Vec<(String, String)> = Vec::new();
    let mut scope = BTreeSet::new();

    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| match e.path().strip_prefix(dir) {
            Ok(rel) if !rel.as_os_str().is_empty() => !ignore.should_prune(rel),
            _ => true,
        });

    for entry in walker {
        let entry = entry.map_err(|e| BuildError::FingerprintIo {
            path: e
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| dir.to_path_buf()),
            message: e.to_string(),
        })?;
        let entry_path = entry.path();
        let rel = match entry_path.strip_prefix(dir) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
            _ => continue,
        };
        if ignore.is_ignored(&rel) {
            continue;
        }
        let rel_str = rel.to_string_lossy().replace('\\', "/");

        let file_type = entry.file_type();
        let line = if file_type.is_file() {
            format!("F:{}:{}", rel_str, hash_file(entry_path)?)
        } else if file_type.is_dir() {
            format!("D:{}", rel_str)
        } else if file_type.is_symlink() {
            let target = fs::read_link(entry_path).map_err(|e| BuildError::FingerprintIo {
                path: entry_path.to_path_buf(),
                message: e.to_string(),
            })?;
            format!("L:{}:{}", rel_str, target.to_string_lossy())
        } else {
            continue;
        };

        scope.insert(rel);
        entries.push((rel_str, line));
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Sha256::new();
    for (_, line) in &entries {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    for pattern in ignore.sources() {
        hasher.update(format!("I:{}\n", pattern).as_bytes());
    }
    for (key, value) in params {
        hasher.update(format!("P:{}={}\n", key, value).as_bytes());
    }

    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    tracing::debug!(
        dir = %dir.display(),
        files = scope.len(),
        digest = %hex::encode(digest),
        "Computed context fingerprint"
    );

    Ok(Fingerprint {
        algorithm: FINGERPRINT_ALGORITHM,
        digest,
        scope,
    })
}

/// ファイル内容の SHA-256（16進）
pub fn hash_file(path: &Path) -> Result<String> {
    let io_err = |e: std::io::Error| BuildError::FingerprintIo {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    let mut file = fs::File::open(path).map_err(io_err)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = file.read(&mut buffer).map_err(io_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_tree(root: &Path, files: &[(&str, &str)]) {
        for (path, content) in files {
            let full = root.join(path);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(full, content).unwrap();
        }
    }

    #[test]
    fn test_same_content_same_digest_regardless_of_creation_order() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        write_tree(a.path(), &[("src/main.py", "print(1)"), ("Dockerfile", "FROM python"), ("z.txt", "z")]);
        write_tree(b.path(), &[("z.txt", "z"), ("Dockerfile", "FROM python"), ("src/main.py", "print(1)")]);

        let fa = fingerprint(a.path(), &IgnoreRules::none()).unwrap();
        let fb = fingerprint(b.path(), &IgnoreRules::none()).unwrap();
        assert_eq!(fa.digest, fb.digest);
        assert_eq!(fa.scope, fb.scope);
        assert!(fa.to_string().starts_with("sha256:"));
        assert_eq!(fa.hex().len(), 64);
    }

    #[test]
    fn test_mtime_does_not_matter() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path(), &[("train.py", "x = 1")]);
        let before = fingerprint(dir.path(), &IgnoreRules::none()).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(dir.path().join("train.py"), "x = 1").unwrap();
        let after = fingerprint(dir.path(), &IgnoreRules::none()).unwrap();
        assert_eq!(before.digest, after.digest);
    }

    #[test]
    fn test_single_byte_change_changes_digest() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path(), &[("train.py", "x = 1")]);
        let before = fingerprint(dir.path(), &IgnoreRules::none()).unwrap();
        fs::write(dir.path().join("train.py"), "x = 2").unwrap();
        let after = fingerprint(dir.path(), &IgnoreRules::none()).unwrap();
        assert_ne!(before.digest, after.digest);
    }

    #[test]
    fn test_ignored_files_do_not_affect_digest() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path(), &[("train.py", "x"), (".dockerignore", "*.log\ncache/\n")]);
        let rules = IgnoreRules::load(dir.path()).unwrap();
        let before = fingerprint(dir.path(), &rules).unwrap();

        write_tree(dir.path(), &[("debug.log", "noise"), ("cache/blob.bin", "noise")]);
        let after = fingerprint(dir.path(), &rules).unwrap();
        assert_eq!(before.digest, after.digest);
        assert!(!after.scope.contains(Path::new("debug.log")));

        // 除外規則自体の変更はダイジェストに反映される
        let looser = IgnoreRules::from_patterns(&["*.log"]).unwrap();
        let other = fingerprint(dir.path(), &looser).unwrap();
        assert_ne!(after.digest, other.digest);
    }

    #[test]
    fn test_params_affect_digest() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path(), &[("train.py", "x")]);
        let mut params = BTreeMap::new();
        params.insert("build_arg:PY".to_string(), "3.10".to_string());
        let a = fingerprint_with_params(dir.path(), &IgnoreRules::none(), &params).unwrap();
        params.insert("build_arg:PY".to_string(), "3.11".to_string());
        let b = fingerprint_with_params(dir.path(), &IgnoreRules::none(), &params).unwrap();
        assert_ne!(a.digest, b.digest);
    }

    #[test]
    fn test_missing_dir() {
        let result = fingerprint(Path::new("/nonexistent/context"), &IgnoreRules::none());
        assert!(matches!(result, Err(BuildError::ContextNotFound(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_file_is_fingerprint_io_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path(), &[("secret.bin", "x")]);
        let file = dir.path().join("secret.bin");
        fs::set_permissions(&file, fs::Permissions::from_mode(0o000)).unwrap();

        // root 権限では読めてしまうため、その場合は検証しない
        if fs::File::open(&file).is_ok() {
            return;
        }
        let result = fingerprint(dir.path(), &IgnoreRules::none());
        assert!(matches!(result, Err(BuildError::FingerprintIo { .. })));
    }
}
