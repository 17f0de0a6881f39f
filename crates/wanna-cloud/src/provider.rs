//! リモート操作の抽象
//!
//! 調停ロジックはこのトレイトだけに依存し、具体的な API 呼び出しは
//! プロバイダークレート（wanna-cloud-gcp）が実装します。

use crate::error::Result;
use crate::fleet::FleetMember;
use crate::resource::{GcpResource, RemoteResource};
use async_trait::async_trait;
use wanna_core::OwnershipLabel;

/// `get` の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Found(RemoteResource),
    NotFound,
    /// 権限不足で取得できない（存在しない場合と同様に扱う）
    Forbidden,
}

/// 単一リソースの取得・作成・更新
#[async_trait]
pub trait ResourceApi: Send + Sync {
    /// 安定名でリソースを取得
    async fn get(&self, desired: &GcpResource) -> Result<Probe>;

    /// 完全な仕様で作成
    async fn create(&self, desired: &GcpResource) -> Result<RemoteResource>;

    /// 既存リソースを完全な仕様で更新（部分更新はしない）
    async fn update(&self, current: &RemoteResource, desired: &GcpResource) -> Result<RemoteResource>;
}

/// 長期稼働インスタンス（ノートブックなど）の一覧・作成・削除
#[async_trait]
pub trait FleetApi: Send + Sync {
    type Spec: Clone + Send + Sync + 'static;

    /// 種別名（表示用）
    fn kind(&self) -> &'static str;

    /// 所有者ラベルで絞り込んだ稼働中メンバー
    async fn list(&self, scope: &OwnershipLabel) -> Result<Vec<FleetMember>>;

    async fn create(&self, spec: &Self::Spec) -> Result<()>;

    async fn delete(&self, member: &FleetMember) -> Result<()>;
}
