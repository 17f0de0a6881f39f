//! 上限付きの並列実行
//!
//! メンバーごとにタスクを起動し、全タスクの完了を待ってから
//! それぞれの結果を返します。1つが失敗しても他は止めません。

use crate::error::{CloudError, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

/// 既定の同時実行数
pub const DEFAULT_PARALLELISM: usize = 4;

/// 各アイテムに `f` を適用し、(名前, 結果) を入力順に返す
pub async fn run_bounded<T, F, Fut>(
    items: Vec<(String, T)>,
    parallelism: usize,
    f: F,
) -> Vec<(String, Result<()>)>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(parallelism.max(1)));
    let f = Arc::new(f);
    let mut join_set = JoinSet::new();
    let names: Vec<String> = items.iter().map(|(name, _)| name.clone()).collect();

    for (index, (name, item)) in items.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        let f = f.clone();
        join_set.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => {
                    debug!(member = %name, "Worker started");
                    f(item).await
                }
                Err(e) => Err(CloudError::WorkerAborted {
                    member: name,
                    message: e.to_string(),
                }),
            };
            (index, result)
        });
    }

    let mut slots: Vec<Option<Result<()>>> = names.iter().map(|_| None).collect();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, result)) => slots[index] = Some(result),
            Err(e) => error!("Worker panicked: {}", e),
        }
    }

    // パニックしたタスクは結果が無いので失敗として扱う
    names
        .into_iter()
        .zip(slots)
        .map(|(name, slot)| {
            let result = slot.unwrap_or_else(|| {
                Err(CloudError::WorkerAborted {
                    member: name.clone(),
                    message: "worker panicked".to_string(),
                })
            });
            (name, result)
        })
        .collect()
}

/// 失敗したメンバー名
pub fn failed_members(results: &[(String, Result<()>)]) -> Vec<&str> {
    results
        .iter()
        .filter(|(_, r)| r.is_err())
        .map(|(name, _)| name.as_str())
        .collect()
}
