//! Upsert による調停
//!
//! `Unknown → Probed → {Created | Updated}` の状態遷移を全リソース種別に
//! 共通で適用します。同じ安定名で何度実行しても、リモートには1つだけ残ります。

use crate::error::{CloudError, Result};
use crate::provider::{Probe, ResourceApi};
use crate::resource::{GcpResource, RemoteResource};
use colored::Colorize;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// 調停の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertState {
    Unknown,
    Probed,
    Created,
    Updated,
}

impl std::fmt::Display for UpsertState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UpsertState::Unknown => "unknown",
            UpsertState::Probed => "probed",
            UpsertState::Created => "created",
            UpsertState::Updated => "updated",
        };
        write!(f, "{}", s)
    }
}

/// upsert の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// 終端状態（Created か Updated）
    pub state: UpsertState,
    pub remote: RemoteResource,
}

impl UpsertOutcome {
    pub fn was_created(&self) -> bool {
        self.state == UpsertState::Created
    }
}

pub struct UpsertReconciler {
    api: Arc<dyn ResourceApi>,
}

impl UpsertReconciler {
    pub fn new(api: Arc<dyn ResourceApi>) -> Self {
        Self { api }
    }

    /// 取得して、無ければ作成・あれば更新
    #[instrument(skip(self, desired), fields(resource = %desired.describe()))]
    pub async fn upsert(&self, desired: &GcpResource) -> Result<UpsertOutcome> {
        let mut state = UpsertState::Unknown;
        debug!(%state, "Probing resource");

        let probe = self.api.get(desired).await?;
        state = UpsertState::Probed;
        debug!(%state, probe = ?probe, "Probe finished");

        let remote = match probe {
            Probe::Found(current) => {
                if current.kind != desired.kind() {
                    return Err(CloudError::ResourceConflict {
                        name: desired.stable_name().to_string(),
                        expected: desired.kind().to_string(),
                        found: current.kind.to_string(),
                    });
                }
                info!("Updating {}", desired.describe());
                let remote = self.api.update(&current, desired).await?;
                state = UpsertState::Updated;
                remote
            }
            Probe::NotFound | Probe::Forbidden => {
                info!("Creating {}", desired.describe());
                let remote = self.api.create(desired).await?;
                state = UpsertState::Created;
                remote
            }
        };

        let marker = if state == UpsertState::Created {
            "created".green()
        } else {
            "updated".yellow()
        };
        println!("  {} {} ({})", "✓".green(), desired.describe().cyan(), marker);

        Ok(UpsertOutcome { state, remote })
    }
}
