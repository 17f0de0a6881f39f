//! ビルドバックエンドの抽象
//!
//! ローカルの Docker デーモンか Cloud Build のどちらか一方が、設定により静的に選ばれます。

use crate::error::Result;
use crate::ignore::IgnoreRules;
use crate::tagger::ImageTags;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// 1イメージ分のビルド要求
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// イメージの論理名
    pub image_ref: String,
    pub context_dir: PathBuf,
    pub dockerfile: PathBuf,
    pub build_args: BTreeMap<String, String>,
    pub tags: ImageTags,
    pub ignore: IgnoreRules,
}

#[async_trait]
pub trait BuildBackend: Send + Sync {
    /// バックエンド名（ログ表示用）
    fn name(&self) -> &'static str;

    /// イメージをビルドして両方のタグを付与する
    async fn build(&self, request: &BuildRequest) -> Result<()>;

    /// レジストリ上にイメージが存在するか
    async fn image_exists(&self, image_url: &str) -> Result<bool>;
}
