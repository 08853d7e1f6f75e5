//! ShardWorkerGroup - シャードごとの処理ループ
//!
//! # フロー
//! 1. shard ごとに tokio task を 1 本だけ起動（同じ shard を二重に処理しない）
//! 2. `process_shard` で 1 バッチ処理
//! 3. poll_interval だけ待つ（shutdown が来たらすぐ抜ける）

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::app::Spool;
use crate::domain::ShardId;

/// Worker group handle.
/// - `request_shutdown` で全ワーカーが次のバッチを取らなくなる
/// - 実行中のバッチは最後まで処理される
/// - handle を drop した場合も、各ワーカーは今のバッチの後で止まる
pub struct ShardWorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl ShardWorkerGroup {
    /// Spawn one worker per configured shard.
    pub fn spawn(spool: Spool, poll_interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let joins = spool
            .shards()
            .map(|shard| {
                let spool = spool.clone();
                let mut rx = shutdown_rx.clone();
                tokio::spawn(async move {
                    shard_loop(shard, spool, poll_interval, &mut rx).await;
                })
            })
            .collect();

        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            let _ = j.await;
        }
    }
}

async fn shard_loop(
    shard: ShardId,
    spool: Spool,
    poll_interval: Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    debug!(%shard, "shard worker started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        if let Err(e) = spool.process_shard(shard).await {
            error!(%shard, error = %e, "batch aborted");
        }

        tokio::select! {
            // Err: the group handle was dropped
            res = shutdown_rx.changed() => if res.is_err() { break },
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
    debug!(%shard, "shard worker stopped");
}
