//! WANNA のイメージビルドとプッシュ
//!
//! ビルドコンテキストのフィンガープリント、タグ付け、ビルドキャッシュ、
//! ローカル Docker / Cloud Build によるビルド、レジストリへのプッシュ、
//! パイプラインのコンパイルを提供します。

pub mod auth;
pub mod backend;
pub mod builder;
pub mod cache;
pub mod cloud_build;
pub mod compile;
pub mod context;
pub mod error;
pub mod fingerprint;
pub mod generated;
pub mod ignore;
pub mod orchestrator;
pub mod progress;
pub mod publish;
pub mod pusher;
pub mod tagger;

pub use auth::RegistryAuth;
pub use backend::{BuildBackend, BuildRequest};
pub use builder::LocalBuilder;
pub use cache::{BuildCache, CacheKey};
pub use cloud_build::CloudBuilder;
pub use compile::PipelineCompiler;
pub use context::ContextBuilder;
pub use error::{BuildError, Result};
pub use fingerprint::{Fingerprint, fingerprint};
pub use ignore::IgnoreRules;
pub use orchestrator::{BuildOrchestrator, OrchestratorOptions, ResolvedImage};
pub use progress::Progress;
pub use publish::{PushExecutor, PushReport};
pub use pusher::{ContainerPusher, ImagePusher};
pub use tagger::{ImageTagger, ImageTags, split_image_tag, validate_tag};
