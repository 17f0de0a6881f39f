//! レジストリ認証
//!
//! Docker の `config.json`（`auths`、`credHelpers`、`credsStore`）を順に調べ、
//! 見つからなければ Artifact Registry / Container Registry 向けに gcloud の
//! アクセストークンを使います。どれもなければ匿名でアクセスします。

use crate::error::{BuildError, Result};
use base64::Engine;
use bollard::auth::DockerCredentials;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// gcloud トークンを使うときのユーザー名
pub const GCLOUD_TOKEN_USER: &str = "oauth2accesstoken";

const DOCKER_HUB: &str = "docker.io";

/// 認証情報の取得元
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    ConfigFile,
    Helper,
    Gcloud,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DockerConfigFile {
    #[serde(default)]
    auths: HashMap<String, InlineAuth>,
    #[serde(default)]
    cred_helpers: HashMap<String, String>,
    #[serde(default)]
    creds_store: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InlineAuth {
    /// base64("user:secret")
    auth: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HelperReply {
    username: String,
    secret: String,
}

/// イメージ参照のレジストリホスト
///
/// 先頭セグメントが `.` か `:` を含むか `localhost` のときだけホストとみなします。
pub fn registry_host(image: &str) -> &str {
    match image.split_once('/') {
        Some((first, _)) if first.contains(['.', ':']) || first == "localhost" => first,
        _ => DOCKER_HUB,
    }
}

/// Google 管理のレジストリか
pub fn is_google_registry(host: &str) -> bool {
    host.ends_with("-docker.pkg.dev") || host == "gcr.io" || host.ends_with(".gcr.io")
}

fn auth_error(registry: &str, message: impl Into<String>) -> BuildError {
    BuildError::AuthFailed {
        registry: registry.to_string(),
        message: message.into(),
    }
}

fn credentials(host: &str, username: String, secret: String) -> DockerCredentials {
    DockerCredentials {
        username: Some(username),
        password: Some(secret),
        serveraddress: Some(host.to_string()),
        ..Default::default()
    }
}

/// レジストリ認証情報の解決
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    config_path: PathBuf,
}

impl RegistryAuth {
    /// `$DOCKER_CONFIG/config.json`（未設定なら `~/.docker/config.json`）
    pub fn from_env() -> Self {
        let dir = std::env::var_os("DOCKER_CONFIG")
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|home| home.join(".docker")))
            .unwrap_or_else(|| PathBuf::from(".docker"));
        Self::with_config_path(dir.join("config.json"))
    }

    pub fn with_config_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// イメージのプッシュ・参照に使う認証情報
    pub async fn credentials_for(&self, image: &str) -> Result<Option<DockerCredentials>> {
        let host = registry_host(image);
        let mut resolved = self.from_config_file(host).await?;
        if resolved.is_none() && is_google_registry(host) {
            let token = gcloud_access_token().await?;
            resolved = Some((
                CredentialSource::Gcloud,
                credentials(host, GCLOUD_TOKEN_USER.to_string(), token),
            ));
        }

        match &resolved {
            Some((source, _)) => debug!(registry = %host, ?source, "Using registry credentials"),
            None => debug!(registry = %host, "No registry credentials, continuing anonymously"),
        }
        Ok(resolved.map(|(_, creds)| creds))
    }

    async fn load(&self) -> Result<Option<DockerConfigFile>> {
        let origin = self.config_path.display().to_string();
        let content = match tokio::fs::read_to_string(&self.config_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(auth_error(&origin, format!("cannot read: {}", e))),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| auth_error(&origin, format!("cannot parse: {}", e)))
    }

    async fn from_config_file(
        &self,
        host: &str,
    ) -> Result<Option<(CredentialSource, DockerCredentials)>> {
        let Some(config) = self.load().await? else {
            return Ok(None);
        };

        if let Some(encoded) = config.auths.get(host).and_then(|a| a.auth.as_deref())
            && let Some(creds) = decode_inline(host, encoded)?
        {
            return Ok(Some((CredentialSource::ConfigFile, creds)));
        }

        let helper = config.cred_helpers.get(host).or(config.creds_store.as_ref());
        if let Some(helper) = helper
            && let Some(creds) = ask_helper(helper, host).await
        {
            return Ok(Some((CredentialSource::Helper, creds)));
        }
        Ok(None)
    }
}

fn decode_inline(host: &str, encoded: &str) -> Result<Option<DockerCredentials>> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| auth_error(host, format!("invalid base64 in auths: {}", e)))?;
    let pair = String::from_utf8(bytes)
        .map_err(|e| auth_error(host, format!("invalid UTF-8 in auths: {}", e)))?;
    Ok(pair
        .split_once(':')
        .map(|(user, secret)| credentials(host, user.to_string(), secret.to_string())))
}

/// `docker-credential-<helper> get` に問い合わせる（失敗は「なし」扱い）
async fn ask_helper(helper: &str, host: &str) -> Option<DockerCredentials> {
    let program = format!("docker-credential-{}", helper);
    let mut child = match Command::new(&program)
        .arg("get")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            debug!(helper = %program, error = %e, "Credential helper unavailable");
            return None;
        }
    };

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(host.as_bytes()).await.ok()?;
    }
    let output = child.wait_with_output().await.ok()?;
    if !output.status.success() {
        debug!(
            helper = %program,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "Credential helper has no entry"
        );
        return None;
    }

    let reply: HelperReply = serde_json::from_slice(&output.stdout).ok()?;
    Some(credentials(host, reply.username, reply.secret))
}

/// `gcloud auth print-access-token`
async fn gcloud_access_token() -> Result<String> {
    let output = Command::new("gcloud")
        .args(["auth", "print-access-token"])
        .output()
        .await
        .map_err(|e| auth_error("gcloud", format!("cannot run gcloud: {}", e)))?;
    if !output.status.success() {
        return Err(auth_error(
            "gcloud",
            String::from_utf8_lossy(&output.stderr).trim(),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
