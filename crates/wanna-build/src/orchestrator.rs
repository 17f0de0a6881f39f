//! ビルドオーケストレーター
//!
//! 論理名（`docker_image_ref`）ごとに宣言されたビルド方法を解決し、
//! キャッシュを確認したうえで必要なときだけバックエンドにビルドを依頼します。
//! 1回のプロセス実行の中で、同じ論理名のビルドは高々1回です。

use crate::backend::{BuildBackend, BuildRequest};
use crate::cache::{BuildCache, CacheKey};
use crate::error::{BuildError, Result};
use crate::fingerprint::{fingerprint_with_params, hash_file};
use crate::generated::generate_context;
use crate::ignore::IgnoreRules;
use crate::tagger::{ImageTagger, ImageTags};
use colored::Colorize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use wanna_core::{BuildSpec, ImageDeclaration, PushMode};

/// フィンガープリントに含める Dockerfile のハッシュのキー
const DOCKERFILE_PARAM: &str = "__dockerfile_sha256";

/// 解決済みイメージ
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedImage {
    pub image_ref: String,
    pub spec: BuildSpec,
    pub tags: ImageTags,
    /// この実行でビルドを行ったか
    pub built: bool,
}

impl ResolvedImage {
    /// ジョブやパイプラインから参照する URI
    pub fn image_uri(&self) -> &str {
        &self.tags.versioned
    }

    /// プッシュ対象か（Provided は対象外）
    pub fn is_pushable(&self) -> bool {
        self.spec.is_buildable()
    }
}

/// オーケストレーターの実行設定
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub version: String,
    pub mode: PushMode,
    pub project_root: PathBuf,
    pub build_dir: PathBuf,
}

pub struct BuildOrchestrator {
    images: Vec<ImageDeclaration>,
    tagger: ImageTagger,
    cache: BuildCache,
    /// quick モードでは不要なので `None` を許す
    backend: Option<Arc<dyn BuildBackend>>,
    options: OrchestratorOptions,
    memo: HashMap<String, ResolvedImage>,
}

impl BuildOrchestrator {
    pub fn new(
        images: Vec<ImageDeclaration>,
        tagger: ImageTagger,
        cache: BuildCache,
        backend: Option<Arc<dyn BuildBackend>>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            images,
            tagger,
            cache,
            backend,
            options,
            memo: HashMap::new(),
        }
    }

    pub fn mode(&self) -> PushMode {
        self.options.mode
    }

    pub fn version(&self) -> &str {
        &self.options.version
    }

    fn backend(&self) -> Result<&dyn BuildBackend> {
        self.backend.as_deref().ok_or(BuildError::NoBackend)
    }

    fn backend_name(&self) -> &'static str {
        self.backend.as_ref().map_or("none", |b| b.name())
    }

    /// これまでに解決したイメージ
    pub fn resolved(&self) -> impl Iterator<Item = &ResolvedImage> {
        self.memo.values()
    }

    /// 論理名を解決する
    ///
    /// 2回目以降は同じ結果を返し、フィンガープリント計算もビルドも行わない。
    #[instrument(skip(self), fields(backend = self.backend_name(), mode = %self.options.mode))]
    pub async fn resolve(&mut self, logical_ref: &str) -> Result<ResolvedImage> {
        if let Some(resolved) = self.memo.get(logical_ref) {
            debug!(image = %logical_ref, "Using memoized resolution");
            return Ok(resolved.clone());
        }

        let declaration = self
            .images
            .iter()
            .find(|i| i.name == logical_ref)
            .cloned()
            .ok_or_else(|| BuildError::UnknownImageRef(logical_ref.to_string()))?;

        let resolved = match &declaration.build {
            BuildSpec::Provided { image_url } => self.resolve_provided(&declaration, image_url).await?,
            BuildSpec::LocalBuild {
                context_dir,
                dockerfile,
                build_args,
            } => {
                let context_dir = self.resolve_path(context_dir);
                let dockerfile = match dockerfile {
                    Some(path) => self.resolve_path(path),
                    None => context_dir.join("Dockerfile"),
                };
                self.resolve_buildable(&declaration, context_dir, dockerfile, build_args.clone())
                    .await?
            }
            BuildSpec::Generated {
                template,
                base_image,
                requirements,
            } => {
                let tags = self.tagger.tag(&declaration.name, &self.options.version);
                if self.options.mode.is_quick() {
                    self.quick(&declaration, tags)
                } else {
                    let template = template.as_ref().map(|p| self.resolve_path(p));
                    let requirements = requirements.as_ref().map(|p| self.resolve_path(p));
                    let generated = generate_context(
                        &self.options.build_dir,
                        &declaration.name,
                        template.as_deref(),
                        base_image.as_deref(),
                        requirements.as_deref(),
                    )?;
                    self.resolve_buildable(
                        &declaration,
                        generated.context_dir,
                        generated.dockerfile,
                        BTreeMap::new(),
                    )
                    .await?
                }
            }
        };

        self.memo.insert(logical_ref.to_string(), resolved.clone());
        Ok(resolved)
    }

    /// 複数の論理名をまとめて解決（重複は1回だけ）
    pub async fn resolve_all<S: AsRef<str>>(&mut self, refs: &[S]) -> Result<Vec<ResolvedImage>> {
        let mut resolved = Vec::with_capacity(refs.len());
        for logical_ref in refs {
            resolved.push(self.resolve(logical_ref.as_ref()).await?);
        }
        Ok(resolved)
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.options.project_root.join(path)
        }
    }

    fn quick(&self, declaration: &ImageDeclaration, tags: ImageTags) -> ResolvedImage {
        debug!(image = %declaration.name, tag = %tags.versioned, "Quick mode: tags only");
        ResolvedImage {
            image_ref: declaration.name.clone(),
            spec: declaration.build.clone(),
            tags,
            built: false,
        }
    }

    async fn resolve_provided(
        &self,
        declaration: &ImageDeclaration,
        image_url: &str,
    ) -> Result<ResolvedImage> {
        if !self.options.mode.is_quick() {
            debug!(image = %declaration.name, url = %image_url, "Checking provided image");
            if !self.backend()?.image_exists(image_url).await? {
                return Err(BuildError::ImageNotFound(image_url.to_string()));
            }
        }

        Ok(ResolvedImage {
            image_ref: declaration.name.clone(),
            spec: declaration.build.clone(),
            tags: ImageTags {
                versioned: image_url.to_string(),
                latest: image_url.to_string(),
            },
            built: false,
        })
    }

    async fn resolve_buildable(
        &self,
        declaration: &ImageDeclaration,
        context_dir: PathBuf,
        dockerfile: PathBuf,
        build_args: BTreeMap<String, String>,
    ) -> Result<ResolvedImage> {
        let tags = self.tagger.tag(&declaration.name, &self.options.version);
        if self.options.mode.is_quick() {
            return Ok(self.quick(declaration, tags));
        }

        if !context_dir.is_dir() {
            return Err(BuildError::ContextNotFound(context_dir));
        }
        if !dockerfile.is_file() {
            return Err(BuildError::DockerfileNotFound(dockerfile));
        }

        // キャッシュやビルド出力がコンテキスト内にあっても入力には含めない
        let ignore = IgnoreRules::load(&context_dir)?
            .exclude_dir(&context_dir, self.cache.dir())
            .exclude_dir(&context_dir, &self.options.build_dir);
        let mut params = build_args.clone();
        params.insert(DOCKERFILE_PARAM.to_string(), hash_file(&dockerfile)?);
        let fingerprint = fingerprint_with_params(&context_dir, &ignore, &params)?;

        let key = CacheKey::new(
            &declaration.name,
            self.tagger.repository_path(),
            &self.options.version,
        );

        if !self.cache.should_build(&key, &fingerprint)? {
            println!(
                "  {} {} {}",
                "✓".green(),
                declaration.name.cyan(),
                "(unchanged, skipping build)".dimmed()
            );
            return Ok(ResolvedImage {
                image_ref: declaration.name.clone(),
                spec: declaration.build.clone(),
                tags,
                built: false,
            });
        }

        info!(
            image = %declaration.name,
            tag = %tags.versioned,
            fingerprint = %fingerprint,
            "Dispatching build"
        );

        let request = BuildRequest {
            image_ref: declaration.name.clone(),
            context_dir,
            dockerfile,
            build_args,
            tags: tags.clone(),
            ignore,
        };
        self.backend()?.build(&request).await?;

        // 成功したときだけ記録する（失敗時は次回再試行される）
        self.cache.record(&key, &fingerprint)?;

        Ok(ResolvedImage {
            image_ref: declaration.name.clone(),
            spec: declaration.build.clone(),
            tags,
            built: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint_with_params;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingBackend {
        builds: AtomicUsize,
        exists_checks: AtomicUsize,
        fail: bool,
        image_exists: bool,
    }

    #[async_trait]
    impl BuildBackend for CountingBackend {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn build(&self, request: &BuildRequest) -> Result<()> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(BuildError::build_failed(&request.image_ref, "boom"));
            }
            Ok(())
        }

        async fn image_exists(&self, _image_url: &str) -> Result<bool> {
            self.exists_checks.fetch_add(1, Ordering::SeqCst);
            Ok(self.image_exists)
        }
    }

    struct Fixture {
        root: TempDir,
        backend: Arc<CountingBackend>,
    }

    impl Fixture {
        fn new(backend: CountingBackend) -> Self {
            let root = tempfile::tempdir().unwrap();
            let context = root.path().join("trainer");
            fs::create_dir_all(&context).unwrap();
            fs::write(context.join("Dockerfile"), "FROM python:3.11\nCOPY . /app\n").unwrap();
            fs::write(context.join("train.py"), "print('hello')\n").unwrap();
            Self {
                root,
                backend: Arc::new(backend),
            }
        }

        fn images(&self) -> Vec<ImageDeclaration> {
            vec![
                ImageDeclaration {
                    name: "trainer".into(),
                    build: BuildSpec::LocalBuild {
                        context_dir: PathBuf::from("trainer"),
                        dockerfile: None,
                        build_args: BTreeMap::new(),
                    },
                },
                ImageDeclaration {
                    name: "serving".into(),
                    build: BuildSpec::Provided {
                        image_url: "europe-docker.pkg.dev/vertex-ai/serving:latest".into(),
                    },
                },
            ]
        }

        fn cache(&self) -> BuildCache {
            BuildCache::new(self.root.path().join(".wanna/cache"))
        }

        fn options(&self, mode: PushMode) -> OrchestratorOptions {
            OrchestratorOptions {
                version: "v1".into(),
                mode,
                project_root: self.root.path().to_path_buf(),
                build_dir: self.root.path().join("build"),
            }
        }

        fn orchestrator(&self, mode: PushMode) -> BuildOrchestrator {
            BuildOrchestrator::new(
                self.images(),
                ImageTagger::new("registry", "", "repo", ""),
                self.cache(),
                Some(self.backend.clone() as Arc<dyn BuildBackend>),
                self.options(mode),
            )
        }

        fn orchestrator_without_backend(&self, mode: PushMode) -> BuildOrchestrator {
            BuildOrchestrator::new(
                self.images(),
                ImageTagger::new("registry", "", "repo", ""),
                self.cache(),
                None,
                self.options(mode),
            )
        }

        fn builds(&self) -> usize {
            self.backend.builds.load(Ordering::SeqCst)
        }

        fn current_fingerprint(&self) -> crate::fingerprint::Fingerprint {
            let context = self.root.path().join("trainer");
            let mut params = BTreeMap::new();
            params.insert(
                DOCKERFILE_PARAM.to_string(),
                hash_file(&context.join("Dockerfile")).unwrap(),
            );
            fingerprint_with_params(&context, &IgnoreRules::none(), &params).unwrap()
        }
    }

    fn key() -> CacheKey {
        CacheKey::new("trainer", "registry/repo", "v1")
    }

    #[tokio::test]
    async fn test_build_at_most_once_per_run() {
        let fixture = Fixture::new(CountingBackend::default());
        let mut orchestrator = fixture.orchestrator(PushMode::All);

        let first = orchestrator.resolve("trainer").await.unwrap();
        let second = orchestrator.resolve("trainer").await.unwrap();

        assert!(first.built);
        assert_eq!(first, second);
        assert_eq!(fixture.builds(), 1);
        assert_eq!(first.image_uri(), "registry/repo/trainer:v1");
    }

    #[tokio::test]
    async fn test_unchanged_context_skips_on_fresh_run() {
        let fixture = Fixture::new(CountingBackend::default());
        fixture.orchestrator(PushMode::All).resolve("trainer").await.unwrap();

        // 新しいプロセス相当（メモなし）
        let resolved = fixture
            .orchestrator(PushMode::All)
            .resolve("trainer")
            .await
            .unwrap();

        assert!(!resolved.built);
        assert_eq!(fixture.builds(), 1);
    }

    #[tokio::test]
    async fn test_quick_then_changed_byte_rebuilds() {
        let fixture = Fixture::new(CountingBackend::default());
        let cache = fixture.cache();
        cache.record(&key(), &fixture.current_fingerprint()).unwrap();

        let resolved = fixture
            .orchestrator(PushMode::Quick)
            .resolve("trainer")
            .await
            .unwrap();
        assert_eq!(resolved.tags.versioned, "registry/repo/trainer:v1");
        assert_eq!(fixture.builds(), 0);

        fs::write(
            fixture.root.path().join("trainer/train.py"),
            "print('hellO')\n",
        )
        .unwrap();

        let resolved = fixture
            .orchestrator(PushMode::All)
            .resolve("trainer")
            .await
            .unwrap();
        assert!(resolved.built);
        assert_eq!(fixture.builds(), 1);
        assert_eq!(
            cache.stored_digest(&key()).unwrap(),
            Some(fixture.current_fingerprint().hex())
        );
    }

    #[tokio::test]
    async fn test_failed_build_leaves_cache_untouched() {
        let fixture = Fixture::new(CountingBackend {
            fail: true,
            ..Default::default()
        });
        let mut orchestrator = fixture.orchestrator(PushMode::All);

        let result = orchestrator.resolve("trainer").await;
        assert!(matches!(result, Err(BuildError::BuildFailed { .. })));
        assert_eq!(fixture.cache().stored_digest(&key()).unwrap(), None);

        // 失敗はメモされず、再試行でもう一度ビルドされる
        assert!(orchestrator.resolve("trainer").await.is_err());
        assert_eq!(fixture.builds(), 2);
    }

    #[tokio::test]
    async fn test_provided_image_checks_existence() {
        let fixture = Fixture::new(CountingBackend {
            image_exists: true,
            ..Default::default()
        });
        let mut orchestrator = fixture.orchestrator(PushMode::All);

        let resolved = orchestrator.resolve("serving").await.unwrap();
        assert_eq!(
            resolved.image_uri(),
            "europe-docker.pkg.dev/vertex-ai/serving:latest"
        );
        assert!(!resolved.is_pushable());
        assert_eq!(fixture.builds(), 0);
        assert_eq!(fixture.backend.exists_checks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_provided_image_missing() {
        let fixture = Fixture::new(CountingBackend::default());
        let result = fixture.orchestrator(PushMode::All).resolve("serving").await;
        assert!(matches!(result, Err(BuildError::ImageNotFound(_))));

        // quick では存在確認を省略
        let resolved = fixture
            .orchestrator(PushMode::Quick)
            .resolve("serving")
            .await
            .unwrap();
        assert!(!resolved.built);
        assert_eq!(fixture.backend.exists_checks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_project_root_context_ignores_cache_and_build_dir() {
        let fixture = Fixture::new(CountingBackend::default());
        let root = fixture.root.path();
        fs::write(root.join("Dockerfile"), "FROM python:3.11\nCOPY . /app\n").unwrap();
        let images = vec![ImageDeclaration {
            name: "app".into(),
            build: BuildSpec::LocalBuild {
                context_dir: PathBuf::from("."),
                dockerfile: None,
                build_args: BTreeMap::new(),
            },
        }];
        let orchestrator = || {
            BuildOrchestrator::new(
                images.clone(),
                ImageTagger::new("registry", "", "repo", ""),
                fixture.cache(),
                Some(fixture.backend.clone() as Arc<dyn BuildBackend>),
                fixture.options(PushMode::All),
            )
        };

        let first = orchestrator().resolve("app").await.unwrap();
        assert!(first.built);
        assert!(fixture.cache().dir().exists());

        // ビルド出力が増えても再ビルドしない
        fs::create_dir_all(root.join("build/manifests")).unwrap();
        fs::write(root.join("build/manifests/app.json"), "{}").unwrap();

        let second = orchestrator().resolve("app").await.unwrap();
        assert!(!second.built);
        assert_eq!(fixture.builds(), 1);
    }

    #[tokio::test]
    async fn test_quick_mode_needs_no_backend() {
        let fixture = Fixture::new(CountingBackend::default());
        let mut images = fixture.images();
        images.push(ImageDeclaration {
            name: "notebook".into(),
            build: BuildSpec::Generated {
                template: None,
                base_image: Some("python:3.11".into()),
                requirements: None,
            },
        });
        let mut orchestrator = BuildOrchestrator::new(
            images,
            ImageTagger::new("registry", "", "repo", ""),
            fixture.cache(),
            None,
            fixture.options(PushMode::Quick),
        );

        let resolved = orchestrator
            .resolve_all(&["trainer", "serving", "notebook"])
            .await
            .unwrap();
        assert_eq!(resolved[0].image_uri(), "registry/repo/trainer:v1");
        assert_eq!(
            resolved[1].image_uri(),
            "europe-docker.pkg.dev/vertex-ai/serving:latest"
        );
        assert_eq!(resolved[2].image_uri(), "registry/repo/notebook:v1");
        assert!(resolved.iter().all(|r| !r.built));
        assert!(!fixture.root.path().join("build").exists());
    }

    #[tokio::test]
    async fn test_build_without_backend_fails() {
        let fixture = Fixture::new(CountingBackend::default());
        let result = fixture
            .orchestrator_without_backend(PushMode::All)
            .resolve("trainer")
            .await;
        assert!(matches!(result, Err(BuildError::NoBackend)));
        assert_eq!(fixture.cache().stored_digest(&key()).unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_ref() {
        let fixture = Fixture::new(CountingBackend::default());
        let result = fixture.orchestrator(PushMode::All).resolve("missing").await;
        assert!(matches!(result, Err(BuildError::UnknownImageRef(_))));
    }

    #[tokio::test]
    async fn test_resolve_all_deduplicates() {
        let fixture = Fixture::new(CountingBackend {
            image_exists: true,
            ..Default::default()
        });
        let mut orchestrator = fixture.orchestrator(PushMode::All);

        let resolved = orchestrator
            .resolve_all(&["trainer", "serving", "trainer"])
            .await
            .unwrap();
        assert_eq!(resolved.len(), 3);
        assert_eq!(fixture.builds(), 1);
        assert_eq!(orchestrator.resolved().count(), 2);
    }
}
