//! gcloud CLI ラッパー
//!
//! すべてのコマンドに `--project` を付けて実行し、失敗時は標準エラー出力から
//! [`GcpError`] を分類します。

use crate::error::{GcpError, Result};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::process::Command;

/// gcloud CLI ラッパー
#[derive(Debug, Clone)]
pub struct Gcloud {
    project: String,
    program: String,
}

impl Gcloud {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            program: "gcloud".to_string(),
        }
    }

    /// 実行ファイルを差し替える
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// gcloud がインストールされているか確認
    pub async fn check_installed(&self) -> Result<()> {
        let which = Command::new("which").arg(&self.program).output().await?;
        if !which.status.success() {
            return Err(GcpError::GcloudNotFound);
        }
        Ok(())
    }

    /// 実際に渡す引数
    pub fn command_args(&self, args: &[&str]) -> Vec<String> {
        let mut full: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        full.push(format!("--project={}", self.project));
        full
    }

    /// コマンドを実行して標準出力を返す
    pub async fn run_raw(&self, args: &[&str]) -> Result<Vec<u8>> {
        let full = self.command_args(args);
        let mut cmd = Command::new(&self.program);
        cmd.args(&full);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: {} {}", self.program, full.join(" "));

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GcpError::GcloudNotFound
            } else {
                GcpError::Io(e)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GcpError::from_stderr(&command_label(args), &stderr));
        }

        Ok(output.stdout)
    }

    pub async fn run_command(&self, args: &[&str]) -> Result<String> {
        let stdout = self.run_raw(args).await?;
        Ok(String::from_utf8_lossy(&stdout).to_string())
    }

    /// `--format=json` を付けて実行し、結果をデシリアライズ
    pub async fn run_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T> {
        let mut with_format = args.to_vec();
        with_format.push("--format=json");
        let output = self.run_command(&with_format).await?;
        Ok(serde_json::from_str(&output)?)
    }

    /// 一覧系コマンド（空出力は空リスト）
    pub async fn run_list<T: DeserializeOwned>(&self, args: &[&str]) -> Result<Vec<T>> {
        let mut with_format = args.to_vec();
        with_format.push("--format=json");
        let output = self.run_command(&with_format).await?;

        if output.trim().is_empty() || output.trim() == "[]" {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&output)?)
    }

    /// 現在のアカウントのアクセストークン
    pub async fn access_token(&self) -> Result<String> {
        let token = self.run_command(&["auth", "print-access-token"]).await?;
        let token = token.trim();
        if token.is_empty() {
            return Err(GcpError::AuthenticationFailed(
                "gcloud returned an empty access token".to_string(),
            ));
        }
        Ok(token.to_string())
    }
}

/// エラー表示用のコマンド名（フラグを除く先頭3語）
fn command_label(args: &[&str]) -> String {
    args.iter()
        .filter(|a| !a.starts_with('-'))
        .take(3)
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

/// `k=v,k2=v2` 形式のラベル指定
pub fn join_labels(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// リソース名の末尾（`projects/p/locations/l/instances/nb` → `nb`）
pub fn short_name(resource_name: &str) -> &str {
    resource_name.rsplit('/').next().unwrap_or(resource_name)
}
