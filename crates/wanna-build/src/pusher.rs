//! レジストリへのイメージプッシュ

use crate::auth::RegistryAuth;
use crate::error::{BuildError, Result};
use crate::progress::Progress;
use crate::tagger::{split_image_tag, validate_tag};
use async_trait::async_trait;
use bollard::Docker;
use futures_util::StreamExt;
use std::sync::OnceLock;

/// 完全なタグ単位でイメージをプッシュする
#[async_trait]
pub trait ContainerPusher: Send + Sync {
    async fn push_tag(&self, full_tag: &str) -> Result<String>;
}

/// レイヤーの最終状態の集計
#[derive(Debug, Default, PartialEq, Eq)]
struct LayerTally {
    pushed: usize,
    existing: usize,
}

impl LayerTally {
    fn record(&mut self, status: &str) {
        match status {
            "Pushed" => self.pushed += 1,
            "Layer already exists" => self.existing += 1,
            _ => {}
        }
    }
}

/// ローカルの Docker デーモン経由でプッシュする
///
/// デーモンへの接続は最初のプッシュまで遅らせる。
pub struct ImagePusher {
    docker: OnceLock<Docker>,
    auth: RegistryAuth,
}

impl ImagePusher {
    pub fn new(docker: Docker, auth: RegistryAuth) -> Self {
        Self {
            docker: OnceLock::from(docker),
            auth,
        }
    }

    pub fn from_env() -> Self {
        Self {
            docker: OnceLock::new(),
            auth: RegistryAuth::from_env(),
        }
    }

    fn docker(&self) -> Result<&Docker> {
        if let Some(docker) = self.docker.get() {
            return Ok(docker);
        }
        let docker = Docker::connect_with_local_defaults()?;
        Ok(self.docker.get_or_init(|| docker))
    }
}

fn push_failed(full_tag: &str, message: impl std::fmt::Display) -> BuildError {
    BuildError::PushFailed {
        message: format!("{}: {}", full_tag, message),
    }
}

#[async_trait]
impl ContainerPusher for ImagePusher {
    async fn push_tag(&self, full_tag: &str) -> Result<String> {
        let (repository, tag) = split_image_tag(full_tag);
        validate_tag(&tag)?;
        let docker = self.docker()?;
        let credentials = self.auth.credentials_for(full_tag).await?;
        tracing::info!(image = %full_tag, "Pushing image");

        let progress = Progress::start(format!("Pushing {}...", full_tag));
        #[allow(deprecated)]
        let options = bollard::image::PushImageOptions::<String> { tag };
        #[allow(deprecated)]
        let mut stream = docker.push_image(&repository, Some(options), credentials);

        let mut tally = LayerTally::default();
        while let Some(item) = stream.next().await {
            let info = match item {
                Ok(info) => info,
                Err(e) => {
                    progress.fail(format!("Push failed: {}", full_tag));
                    return Err(push_failed(full_tag, e));
                }
            };
            if let Some(error) = info.error {
                progress.fail(format!("Push failed: {}", full_tag));
                return Err(push_failed(full_tag, error));
            }
            if let Some(status) = info.status.as_deref() {
                tally.record(status);
                let detail = info.progress.as_deref().unwrap_or_default();
                progress.set_message(format!("{} {} {}", full_tag, status, detail));
            }
        }

        progress.succeed(format!(
            "Pushed {} ({} layers uploaded, {} already present)",
            full_tag, tally.pushed, tally.existing
        ));
        Ok(full_tag.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_tally() {
        let mut tally = LayerTally::default();
        for status in ["Preparing", "Pushing", "Pushed", "Layer already exists", "Pushed", "Waiting"] {
            tally.record(status);
        }
        assert_eq!(tally, LayerTally { pushed: 2, existing: 1 });
    }

    #[test]
    fn test_from_env_does_not_connect() {
        let pusher = ImagePusher::from_env();
        assert!(pusher.docker.get().is_none());
    }

    #[tokio::test]
    #[ignore] // Docker とレジストリが必要
    async fn test_push_to_local_registry() {
        let pusher = ImagePusher::from_env();
        let pushed = pusher.push_tag("localhost:5000/wanna-test:v1").await.unwrap();
        assert_eq!(pushed, "localhost:5000/wanna-test:v1");
    }
}
