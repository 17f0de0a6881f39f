pub mod fleet;
pub mod job;
pub mod notebook;
pub mod pipeline;
pub mod release;
pub mod tensorboard;
pub mod validate;

use wanna_core::PushMode;

/// job / pipeline サブコマンド共通のオプション
#[derive(Debug, Clone)]
pub struct ReleaseOptions {
    pub name: Option<String>,
    pub version: Option<String>,
    pub mode: PushMode,
}

/// notebook / tensorboard サブコマンド共通のオプション
#[derive(Debug, Clone)]
pub struct FleetOptions {
    pub name: Option<String>,
    pub yes: bool,
    pub dry_run: bool,
}
