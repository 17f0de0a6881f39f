use crate::auth::RegistryAuth;
use crate::backend::{BuildBackend, BuildRequest};
use crate::context::ContextBuilder;
use crate::error::{BuildError, Result};
use crate::progress::Progress;
use async_trait::async_trait;
use bollard::Docker;
use colored::Colorize;
use futures_util::stream::StreamExt;
use std::collections::HashMap;

/// build args のキーに含まれていると警告する語
const SENSITIVE_ARG_MARKERS: [&str; 5] = ["TOKEN", "SECRET", "PASSWORD", "KEY", "CREDENTIAL"];

/// ローカルの Docker デーモンでビルドする
pub struct LocalBuilder {
    docker: Docker,
    auth: RegistryAuth,
}

impl LocalBuilder {
    pub fn new(docker: Docker) -> Self {
        Self {
            docker,
            auth: RegistryAuth::from_env(),
        }
    }

    /// ローカルのデフォルト設定で接続
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self::new(docker))
    }

    /// イメージをビルド
    async fn build_image(
        &self,
        image_ref: &str,
        context_data: Vec<u8>,
        tag: &str,
        build_args: &HashMap<String, String>,
    ) -> Result<()> {
        tracing::info!(image = %image_ref, tag = %tag, "Building image");

        let build_args_refs: HashMap<&str, &str> = build_args
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        #[allow(deprecated)]
        let options = bollard::image::BuildImageOptions {
            dockerfile: "Dockerfile",
            t: tag,
            buildargs: build_args_refs,
            rm: true,
            forcerm: true,
            pull: true,
            ..Default::default()
        };

        use bytes::Bytes;
        use http_body_util::{Either, Full};
        let body = Full::new(Bytes::from(context_data));
        let mut stream = self
            .docker
            .build_image(options, None, Some(Either::Left(body)));

        while let Some(msg) = stream.next().await {
            match msg {
                Ok(output) => self.handle_build_output(image_ref, output)?,
                Err(e) => return Err(BuildError::build_failed(image_ref, e.to_string())),
            }
        }

        tracing::info!(tag = %tag, "Successfully built");
        Ok(())
    }

    fn handle_build_output(&self, image_ref: &str, output: bollard::models::BuildInfo) -> Result<()> {
        if let Some(stream) = output.stream {
            tracing::debug!(target: "wanna_build::docker", "{}", stream.trim_end());
        }

        if let Some(error) = output.error {
            return Err(BuildError::build_failed(image_ref, error));
        }

        if let Some(error_detail) = output.error_detail {
            let error_msg = error_detail
                .message
                .unwrap_or_else(|| "Unknown build error".to_string());
            return Err(BuildError::build_failed(image_ref, error_msg));
        }

        if let Some(status) = output.status {
            tracing::debug!("{}", status.cyan());
        }

        Ok(())
    }

    /// 追加タグを付与
    async fn tag_image(&self, source: &str, target: &str) -> Result<()> {
        let (repo, tag) = crate::tagger::split_image_tag(target);
        #[allow(deprecated)]
        let options = bollard::image::TagImageOptions {
            repo: repo.as_str(),
            tag: tag.as_str(),
        };
        self.docker.tag_image(source, Some(options)).await?;
        Ok(())
    }
}

#[async_trait]
impl BuildBackend for LocalBuilder {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn build(&self, request: &BuildRequest) -> Result<()> {
        warn_sensitive_args(&request.image_ref, request.build_args.keys());

        let progress = Progress::start(format!("Packing context for {}...", request.image_ref));
        let result = async {
            let context_data = ContextBuilder::create_context(
                &request.context_dir,
                &request.dockerfile,
                &request.ignore,
            )?;
            progress.set_message(format!("Building {}...", request.tags.versioned));
            let build_args: HashMap<String, String> =
                request.build_args.clone().into_iter().collect();
            self.build_image(&request.image_ref, context_data, &request.tags.versioned, &build_args)
                .await?;
            self.tag_image(&request.tags.versioned, &request.tags.latest).await
        }
        .await;

        match &result {
            Ok(()) => progress.succeed(format!("Built {}", request.tags.versioned)),
            Err(e) => progress.fail(format!("Build failed for {}: {}", request.image_ref, e)),
        }
        result
    }

    async fn image_exists(&self, image_url: &str) -> Result<bool> {
        let credentials = self.auth.credentials_for(image_url).await?;
        match self
            .docker
            .inspect_registry_image(image_url, credentials)
            .await
        {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 401 | 403 | 404,
                ..
            }) => Ok(false),
            Err(e) => Err(BuildError::DockerConnection(e)),
        }
    }
}

/// 秘密情報らしき build arg を警告
pub fn warn_sensitive_args<'a>(image_ref: &str, keys: impl Iterator<Item = &'a String>) {
    for key in keys {
        let upper = key.to_uppercase();
        if SENSITIVE_ARG_MARKERS.iter().any(|m| upper.contains(m)) {
            tracing::warn!(
                image = %image_ref,
                arg = %key,
                "Build arg looks sensitive; it will be visible in the image history"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ignore::IgnoreRules;
    use crate::tagger::ImageTags;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    #[ignore] // Docker接続が必要なため、通常のテストではスキップ
    async fn test_build_simple_image() {
        let builder = LocalBuilder::connect().unwrap();

        let temp_dir = tempdir().unwrap();
        let dockerfile = temp_dir.path().join("Dockerfile");
        fs::write(&dockerfile, "FROM alpine:latest\nCMD echo 'test'").unwrap();

        let request = BuildRequest {
            image_ref: "test".into(),
            context_dir: temp_dir.path().to_path_buf(),
            dockerfile,
            build_args: BTreeMap::new(),
            tags: ImageTags {
                versioned: "wanna-test:v1".into(),
                latest: "wanna-test:latest".into(),
            },
            ignore: IgnoreRules::none(),
        };

        assert!(builder.build(&request).await.is_ok());

        for tag in ["wanna-test:v1", "wanna-test:latest"] {
            builder
                .docker
                .remove_image(tag, None::<bollard::query_parameters::RemoveImageOptions>, None)
                .await
                .ok();
        }
    }
}
