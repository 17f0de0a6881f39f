//! Tera によるテンプレート展開
//!
//! wanna.yaml は読み込み時に一度だけ展開します。変数は
//! `PROJECT_ROOT`、プロジェクト直下の `.env`、プレフィックス付きの環境変数の順に
//! 上書きされます。生成 Dockerfile やトリガー関数のソースも同じ仕組みで描画します。

use crate::error::{CoreError, Result};
use serde::Serialize;
use std::path::Path;
use tera::{Context, Tera};
use tracing::debug;

/// テンプレートに取り込む環境変数のプレフィックス
pub const ENV_PREFIXES: [&str; 3] = ["WANNA_", "CI_", "GCP_"];

pub const ENV_FILE_NAME: &str = ".env";

#[derive(Default)]
pub struct TemplateProcessor {
    tera: Tera,
    context: Context,
}

impl TemplateProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// wanna.yaml 展開用（`PROJECT_ROOT` → `.env` → 環境変数）
    pub fn for_project(project_root: &Path) -> Result<Self> {
        let mut processor = Self::new();
        processor.set("PROJECT_ROOT", &project_root.to_string_lossy());

        let env_file = project_root.join(ENV_FILE_NAME);
        if env_file.is_file() {
            let content = std::fs::read_to_string(&env_file).map_err(|e| CoreError::IoError {
                path: env_file.clone(),
                message: e.to_string(),
            })?;
            let entries = parse_env_file(&content);
            debug!(env_file = %env_file.display(), count = entries.len(), "Loaded .env");
            for (key, value) in entries {
                processor.set(&key, &value);
            }
        }

        let exported = processor.import_env(std::env::vars());
        debug!(count = exported, "Imported prefixed environment variables");
        Ok(processor)
    }

    pub fn set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> &mut Self {
        self.context.insert(key, value);
        self
    }

    /// `ENV_PREFIXES` に一致する変数だけを取り込み、件数を返す
    pub fn import_env(&mut self, vars: impl IntoIterator<Item = (String, String)>) -> usize {
        let mut count = 0;
        for (key, value) in vars {
            if ENV_PREFIXES.iter().any(|prefix| key.starts_with(prefix)) {
                self.context.insert(key, &value);
                count += 1;
            }
        }
        count
    }

    pub fn render_str(&mut self, template: &str) -> Result<String> {
        self.tera
            .render_str(template, &self.context)
            .map_err(|e| CoreError::TemplateRenderError(describe(&e)))
    }

    /// エラーにはファイルパスを付ける
    pub fn render_file(&mut self, path: &Path) -> Result<String> {
        let template = std::fs::read_to_string(path).map_err(|e| CoreError::IoError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        self.tera
            .render_str(&template, &self.context)
            .map_err(|e| CoreError::TemplateError {
                file: path.to_path_buf(),
                message: describe(&e),
            })
    }
}

/// `.env` の `KEY=value` 行（`export` 接頭辞とクォートを許容、`#` 行は無視）
pub fn parse_env_file(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let key = key.trim();
            let key = key.strip_prefix("export ").unwrap_or(key).trim();
            (key.to_string(), unquote(value.trim()).to_string())
        })
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

/// Tera のエラーチェーンを平坦化し、未定義変数なら変数名を示す
fn describe(e: &tera::Error) -> String {
    let mut chain = vec![e.to_string()];
    let mut source = std::error::Error::source(e);
    while let Some(inner) = source {
        chain.push(inner.to_string());
        source = inner.source();
    }

    let undefined = chain.iter().find_map(|msg| {
        let rest = msg.split_once("Variable `")?.1;
        let (name, tail) = rest.split_once('`')?;
        tail.contains("not found").then_some(name)
    });
    match undefined {
        Some(name) => format!(
            "未定義の変数: `{}`\nヒント: {} で始まる環境変数か {} で定義してください",
            name,
            ENV_PREFIXES.join(" / "),
            ENV_FILE_NAME
        ),
        None => chain.join(" | "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_set_and_render() {
        let mut processor = TemplateProcessor::new();
        processor.set("image", "trainer").set("gpu", &true);
        assert_eq!(
            processor
                .render_str("{{ image }}{% if gpu %}-gpu{% endif %}")
                .unwrap(),
            "trainer-gpu"
        );
    }

    #[test]
    fn test_undefined_variable_names_it() {
        let mut processor = TemplateProcessor::new();
        match processor.render_str("bucket: {{ BUCKET }}").unwrap_err() {
            CoreError::TemplateRenderError(msg) => {
                assert!(msg.contains("`BUCKET`"), "{}", msg);
                assert!(msg.contains(".env"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_import_env_filters_prefixes() {
        let mut processor = TemplateProcessor::new();
        let vars = [
            ("WANNA_VERSION", "1.2.3"),
            ("GCP_PROJECT", "p-1"),
            ("HOME", "/root"),
        ]
        .map(|(k, v)| (k.to_string(), v.to_string()));
        assert_eq!(processor.import_env(vars), 2);
        assert_eq!(processor.render_str("{{ WANNA_VERSION }}").unwrap(), "1.2.3");
        assert!(processor.render_str("{{ HOME }}").is_err());
    }

    #[test]
    fn test_parse_env_file() {
        let entries = parse_env_file(
            "# bucket for dev\nBUCKET=dev-bucket\nexport REGION=\"europe-west1\"\nEMPTY=\nNAME='with space'\n=orphan\nnot a pair\n",
        );
        assert_eq!(
            entries,
            vec![
                ("BUCKET".to_string(), "dev-bucket".to_string()),
                ("REGION".to_string(), "europe-west1".to_string()),
                ("EMPTY".to_string(), String::new()),
                ("NAME".to_string(), "with space".to_string()),
            ]
        );
    }

    #[test]
    fn test_unquote_requires_matching_pair() {
        assert_eq!(unquote("\"v\""), "v");
        assert_eq!(unquote("'v'"), "v");
        assert_eq!(unquote("\"v"), "\"v");
        assert_eq!(unquote("\""), "\"");
    }

    #[test]
    #[serial]
    fn test_for_project_precedence() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(ENV_FILE_NAME),
            "WANNA_BUCKET=from-dotenv\nREGION=europe-west4\n",
        )
        .unwrap();

        temp_env::with_var("WANNA_BUCKET", Some("from-env"), || {
            let mut processor = TemplateProcessor::for_project(dir.path()).unwrap();
            assert_eq!(processor.render_str("{{ WANNA_BUCKET }}").unwrap(), "from-env");
            assert_eq!(processor.render_str("{{ REGION }}").unwrap(), "europe-west4");
            assert_eq!(
                processor.render_str("{{ PROJECT_ROOT }}").unwrap(),
                dir.path().to_string_lossy()
            );
        });
    }

    #[test]
    fn test_render_file_error_carries_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Dockerfile.tera");
        std::fs::write(&file, "FROM {{ base_image }}").unwrap();

        let mut processor = TemplateProcessor::new();
        match processor.render_file(&file) {
            Err(CoreError::TemplateError { file: f, .. }) => assert_eq!(f, file),
            other => panic!("unexpected result: {:?}", other),
        }
        processor.set("base_image", "python:3.11");
        assert_eq!(processor.render_file(&file).unwrap(), "FROM python:3.11");
    }
}
