//! WANNA コア
//!
//! wanna.yaml の設定モデル、マニフェスト、プッシュ計画を提供します。

pub mod blob;
pub mod error;
pub mod loader;
pub mod manifest;
pub mod model;
pub mod payload;
pub mod push;
pub mod template;
pub mod validate;

pub use blob::{BlobRouter, BlobStore, LocalBlobStore};
pub use error::{CoreError, Result};
pub use loader::{Project, load_project};
pub use manifest::{Manifest, ManifestKind, ManifestStore};
pub use model::*;
pub use push::{PushMode, PushTask};
