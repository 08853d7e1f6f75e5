//! PurgeLoop - 期限切れメッセージの定期削除
//!
//! # フロー
//! 1. 定期的に retain_till < now の COMPLETE/FAILED を検索
//! 2. 1 件ずつ別トランザクションで削除

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::error;

use crate::app::Spool;

pub struct PurgeLoop {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl PurgeLoop {
    /// Sweep immediately, then every `interval`. Dropping the handle stops the
    /// loop after the current sweep.
    pub fn spawn(spool: Spool, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            loop {
                if *shutdown_rx.borrow() {
                    break;
                }
                if let Err(e) = spool.purge().await {
                    error!(error = %e, "purge aborted");
                }
                tokio::select! {
                    res = shutdown_rx.changed() => if res.is_err() { break },
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });

        Self { shutdown_tx, join }
    }

    pub async fn shutdown_and_join(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.join.await;
    }
}
