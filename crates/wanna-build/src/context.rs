use crate::error::{BuildError, Result};
use crate::ignore::IgnoreRules;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::path::Path;
use tar::Builder;
use walkdir::WalkDir;

pub struct ContextBuilder;

impl ContextBuilder {
    /// ビルドコンテキストをtar.gzアーカイブとして作成
    ///
    /// .dockerignore に一致するファイルは含めない。Dockerfile は常に
    /// アーカイブ直下の "Dockerfile" として追加する。
    pub fn create_context(
        context_path: &Path,
        dockerfile_path: &Path,
        ignore: &IgnoreRules,
    ) -> Result<Vec<u8>> {
        tracing::debug!("Creating build context from: {}", context_path.display());

        if !context_path.is_dir() {
            return Err(BuildError::ContextNotFound(context_path.to_path_buf()));
        }
        if !dockerfile_path.is_file() {
            return Err(BuildError::DockerfileNotFound(dockerfile_path.to_path_buf()));
        }

        let mut archive_data = Vec::new();
        {
            let encoder = GzEncoder::new(&mut archive_data, Compression::default());
            let mut tar = Builder::new(encoder);

            let walker = WalkDir::new(context_path)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| match e.path().strip_prefix(context_path) {
                    Ok(rel) if !rel.as_os_str().is_empty() => !ignore.should_prune(rel),
                    _ => true,
                });

            for entry in walker {
                let entry = entry.map_err(|e| BuildError::InvalidConfig(e.to_string()))?;
                let rel = match entry.path().strip_prefix(context_path) {
                    Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
                    _ => continue,
                };
                if rel == Path::new("Dockerfile") || ignore.is_ignored(&rel) {
                    continue;
                }
                if entry.file_type().is_file() {
                    tar.append_path_with_name(entry.path(), &rel)?;
                } else if entry.file_type().is_dir() {
                    tar.append_dir(&rel, entry.path())?;
                }
            }

            let dockerfile_content = std::fs::read(dockerfile_path)?;
            let mut header = tar::Header::new_gnu();
            header.set_path("Dockerfile").map_err(|e| {
                BuildError::InvalidConfig(format!("Failed to set Dockerfile path: {}", e))
            })?;
            header.set_size(dockerfile_content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            tar.append(&header, &dockerfile_content[..])?;

            tar.into_inner()?.finish()?;
        }

        tracing::debug!("Build context created: {} bytes", archive_data.len());
        Self::check_context_size(archive_data.len());

        Ok(archive_data)
    }

    fn check_context_size(size: usize) {
        const MAX_CONTEXT_SIZE: usize = 500 * 1024 * 1024; // 500MB

        if size > MAX_CONTEXT_SIZE {
            tracing::warn!(
                size_mb = size / 1024 / 1024,
                "Build context is very large; consider excluding files with .dockerignore"
            );
        }
    }
}
