use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::{Duration, sleep};
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber, util::SubscriberInitExt};

use spool_core::impls::DefaultDeadLetterSubscriber;
use spool_core::ports::{DEAD_LETTER, RecordStore};
use spool_core::typed::{Handler, Topic};
use spool_core::{
    DispatchError, MessageId, MessageStatus, Outcome, PublishOptions, PurgeLoop, Retention,
    ShardWorkerGroup, Spool, SpoolConfig,
};
use spool_sqlite::{SqliteConfig, SqliteRecordStore};

#[derive(Debug, Serialize, Deserialize)]
struct Greeting {
    name: String,
}

impl Topic for Greeting {
    const QUEUE: &'static str = "queue.test.queue";
}

struct GreetingHandler;

#[async_trait]
impl Handler<Greeting> for GreetingHandler {
    async fn handle(&self, message: Greeting) -> Result<Outcome, DispatchError> {
        info!(name = %message.name, "hello");
        Ok(Outcome::ok().with_detail("greeted", json!(message.name)))
    }
}

async fn open_store() -> anyhow::Result<Arc<dyn RecordStore>> {
    let config = SqliteConfig::load().context("reading SPOOL_SQLITE_* settings")?;
    let store = SqliteRecordStore::connect(&config)
        .await
        .context("opening sqlite record store")?;
    Ok(Arc::new(store))
}

async fn wait_for_terminal(spool: &Spool, ids: &[MessageId]) -> anyhow::Result<()> {
    loop {
        let mut pending = 0;
        for id in ids {
            let info = spool.get_status(id).await?;
            if !info.status.is_terminal() {
                pending += 1;
            }
        }
        if pending == 0 {
            return Ok(());
        }
        sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::builder()
                .with_env_var("SPOOL_LOG")
                .with_default_directive(LevelFilter::INFO.into())
                .from_env()?,
        )
        .finish()
        .try_init()?;

    let config = SpoolConfig::load().context("reading SPOOL_* settings")?;
    let spool = Spool::builder()
        .config(config)
        .store(open_store().await?)
        .register_typed::<Greeting, _>(GreetingHandler)?
        .register(DEAD_LETTER, Arc::new(DefaultDeadLetterSubscriber))?
        .expect_queues(&[Greeting::QUEUE, DEAD_LETTER])
        .build()?;

    let greeted = spool
        .publish_typed(
            &Greeting {
                name: "spool".to_string(),
            },
            PublishOptions::new().retention(Retention::Always).traced(),
        )
        .await?;
    // nobody subscribes to this one; it fails once and is dead-lettered
    let orphan = spool
        .publish(
            "queue.nobody",
            &json!({"lost": true}),
            PublishOptions::new()
                .retention(Retention::Always)
                .delivery_attempts(1),
        )
        .await?;
    info!(%greeted, %orphan, "published");

    let workers = ShardWorkerGroup::spawn(spool.clone(), spool.config().poll_interval());
    let purge = PurgeLoop::spawn(spool.clone(), spool.config().purge_interval());

    let watched = [greeted, orphan];
    tokio::select! {
        res = wait_for_terminal(&spool, &watched) => res?,
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    for id in [greeted, orphan] {
        let info = spool.get_status(&id).await?;
        let expected = if id == greeted {
            MessageStatus::Complete
        } else {
            MessageStatus::Failed
        };
        if info.status != expected {
            warn!(%id, status = %info.status, "unexpected final status");
        }
        println!("{}", serde_json::to_string_pretty(&info)?);
    }

    workers.shutdown_and_join().await;
    purge.shutdown_and_join().await;
    Ok(())
}
