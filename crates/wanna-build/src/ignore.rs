//! .dockerignore の読み込み
//!
//! フィンガープリントとビルドコンテキストの両方で同じ除外規則を使います。

use crate::error::{BuildError, Result};
use glob::Pattern;
use std::path::{Path, PathBuf};

pub const IGNORE_FILE_NAME: &str = ".dockerignore";

/// 除外パターン集合
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    patterns: Vec<Pattern>,
    /// `!` で始まる再包含パターン
    negations: Vec<Pattern>,
    sources: Vec<String>,
    /// 常に除外するディレクトリ（コンテキストからの相対パス）
    excluded: Vec<PathBuf>,
}

impl IgnoreRules {
    /// 除外なし
    pub fn none() -> Self {
        Self::default()
    }

    /// パターン文字列から作成
    pub fn from_patterns<S: AsRef<str>>(lines: &[S]) -> Result<Self> {
        let mut rules = Self::default();
        for line in lines {
            rules.add(line.as_ref())?;
        }
        Ok(rules)
    }

    /// コンテキストディレクトリ直下の .dockerignore を読み込む
    ///
    /// ファイルが無い場合は除外なし。
    pub fn load(context_dir: &Path) -> Result<Self> {
        let path = context_dir.join(IGNORE_FILE_NAME);
        if !path.is_file() {
            return Ok(Self::none());
        }
        let content = std::fs::read_to_string(&path).map_err(|e| BuildError::FingerprintIo {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let mut rules = Self::default();
        for line in content.lines() {
            rules.add(line)?;
        }
        tracing::debug!(path = %path.display(), patterns = rules.sources.len(), "Loaded ignore file");
        Ok(rules)
    }

    fn add(&mut self, line: &str) -> Result<()> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }
        let (negated, body) = match line.strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, line),
        };
        let body = body.trim_start_matches("./").trim_start_matches('/').trim_end_matches('/');
        let pattern = Pattern::new(body)
            .map_err(|e| BuildError::InvalidConfig(format!("無効な除外パターン '{}': {}", line, e)))?;
        if negated {
            self.negations.push(pattern);
        } else {
            self.patterns.push(pattern);
        }
        self.sources.push(line.to_string());
        Ok(())
    }

    /// コンテキスト内にある `dir` を丸ごと除外する
    ///
    /// 否定パターンでも再包含されない。`dir` がコンテキストの外か
    /// コンテキストそのものなら何もしない。
    pub fn exclude_dir(mut self, context_dir: &Path, dir: &Path) -> Self {
        if let Some(rel) = relative_to(dir, context_dir)
            && !rel.as_os_str().is_empty()
        {
            tracing::debug!(dir = %rel.display(), "Excluding directory from build context");
            self.excluded.push(rel);
        }
        self
    }

    /// 元のパターン文字列（フィンガープリントの入力に使う）
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// コンテキストからの相対パスが除外対象か
    ///
    /// パターンはパス全体、またはいずれかの親ディレクトリに一致すれば除外。
    pub fn is_ignored(&self, relative: &Path) -> bool {
        if self.is_excluded(relative) {
            return true;
        }
        let matches_any = |patterns: &[Pattern]| {
            let mut current = Some(relative);
            while let Some(path) = current {
                if path.as_os_str().is_empty() {
                    break;
                }
                if patterns.iter().any(|p| p.matches_path(path)) {
                    return true;
                }
                current = path.parent();
            }
            false
        };
        matches_any(&self.patterns) && !matches_any(&self.negations)
    }

    /// 走査時に配下ごと読み飛ばしてよいか
    ///
    /// 否定パターンがあると除外ディレクトリの中に再包含されるファイルが
    /// あり得るので、その場合は常に除外されるディレクトリだけを読み飛ばす。
    pub fn should_prune(&self, relative: &Path) -> bool {
        self.is_excluded(relative) || (self.negations.is_empty() && self.is_ignored(relative))
    }

    fn is_excluded(&self, relative: &Path) -> bool {
        self.excluded.iter().any(|dir| relative.starts_with(dir))
    }
}

fn relative_to(dir: &Path, base: &Path) -> Option<PathBuf> {
    if let Ok(rel) = dir.strip_prefix(base) {
        return Some(rel.to_path_buf());
    }
    let dir = dir.canonicalize().ok()?;
    let base = base.canonicalize().ok()?;
    dir.strip_prefix(&base).ok().map(Path::to_path_buf)
}
