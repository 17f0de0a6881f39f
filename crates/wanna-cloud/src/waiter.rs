//! 準備完了までのポーリング
//!
//! 固定間隔で状態を確認し、上限時間を超えたら `RemoteTimeout` を返します。
//! 指数バックオフやリトライは行いません。

use crate::error::{CloudError, Result};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::debug;

/// ノートブック作成時の既定値
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// 1回の確認結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Pending(String),
    Failed(String),
}

#[derive(Debug, Clone, Copy)]
pub struct Waiter {
    interval: Duration,
    timeout: Duration,
}

impl Default for Waiter {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT)
    }
}

impl Waiter {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// `check` が Ready を返すまで待つ
    pub async fn wait_until<F, Fut>(&self, resource: &str, mut check: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Readiness>>,
    {
        let started = Instant::now();
        let mut last_state = "UNKNOWN".to_string();

        loop {
            match check().await? {
                Readiness::Ready => {
                    debug!(resource = %resource, elapsed_ms = started.elapsed().as_millis() as u64, "Resource ready");
                    return Ok(());
                }
                Readiness::Failed(state) => {
                    return Err(CloudError::RemoteFailed {
                        resource: resource.to_string(),
                        state,
                    });
                }
                Readiness::Pending(state) => {
                    debug!(resource = %resource, state = %state, "Waiting for resource");
                    last_state = state;
                }
            }

            let elapsed = started.elapsed();
            if elapsed >= self.timeout {
                return Err(CloudError::RemoteTimeout {
                    resource: resource.to_string(),
                    elapsed,
                    last_state,
                });
            }
            tokio::time::sleep(self.interval.min(self.timeout - elapsed)).await;
        }
    }
}
