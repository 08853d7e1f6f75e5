//! SpoolBuilder - エンジンの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 開発体験の改善（明確なエラーメッセージ）

use std::num::NonZeroU32;
use std::sync::Arc;

use serde::Serialize;

use crate::config::SpoolConfig;
use crate::domain::{MessageId, PublishOptions, ShardId, SpoolError};
use crate::impls::{HandlerRegistry, InMemoryRecordStore, RegistryError};
use crate::ports::{Clock, Dispatcher, RecordStore, SystemClock, UlidGenerator};
use crate::queue::{
    BatchMetrics, BatchRunner, MessageInfo, MessageProcessor, Publisher, PurgeSweeper,
    Sharder, StatusReader,
};
use crate::typed::{Handler, Topic};

/// SpoolBuilder はエンジンを構築
///
/// # 使用例
/// ```ignore
/// let spool = SpoolBuilder::new()
///     .store(Arc::new(SqliteRecordStore::connect(&config).await?))
///     .register_typed::<OrderPlaced, _>(OrderPlacedHandler)?
///     .register("deadletter", Arc::new(DeadLetterLogger))?
///     .expect_queues(&[OrderPlaced::QUEUE, "deadletter"])
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - expect_queues() で期待される dispatcher 名を登録
/// - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
/// - 不足があれば BuildError を返す
pub struct SpoolBuilder {
    config: SpoolConfig,
    store: Option<Arc<dyn RecordStore>>,
    clock: Option<Arc<dyn Clock>>,
    registry: HandlerRegistry,
    expected_queues: Option<Vec<String>>,
}

/// BuildError はエンジン構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("shard_count must be at least 1")]
    ZeroShards,

    #[error("Missing dispatchers: {0:?}. These queues were expected but not registered.")]
    MissingQueues(Vec<String>),
}

impl SpoolBuilder {
    pub fn new() -> Self {
        Self {
            config: SpoolConfig::default(),
            store: None,
            clock: None,
            registry: HandlerRegistry::new(),
            expected_queues: None,
        }
    }

    pub fn config(mut self, config: SpoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Record store to use. Defaults to a fresh `InMemoryRecordStore`.
    pub fn store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Defaults to `SystemClock`.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn register(
        mut self,
        name: impl Into<String>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Self, RegistryError> {
        self.registry.register(name, dispatcher)?;
        Ok(self)
    }

    pub fn register_typed<T: Topic, H: Handler<T> + 'static>(
        mut self,
        handler: H,
    ) -> Result<Self, RegistryError> {
        self.registry.register_typed::<T, H>(handler)?;
        Ok(self)
    }

    /// 期待される dispatcher 名のリストを設定
    pub fn expect_queues(mut self, names: &[&str]) -> Self {
        self.expected_queues = Some(names.iter().map(|name| name.to_string()).collect());
        self
    }

    /// # 検証
    /// - shard_count が 0 でないこと
    /// - expect_queues() で設定された名前が全て登録されていること
    pub fn build(self) -> Result<Spool, BuildError> {
        let shard_count = NonZeroU32::new(self.config.shard_count).ok_or(BuildError::ZeroShards)?;

        if let Some(expected) = &self.expected_queues {
            let registered = self.registry.names();
            let missing: Vec<String> = expected
                .iter()
                .filter(|name| !registered.contains(&name.as_str()))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingQueues(missing));
            }
        }

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryRecordStore::new()) as Arc<dyn RecordStore>);
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let sharder = Sharder::new(shard_count, self.config.shard_hash);
        let publisher = Publisher::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            Arc::new(UlidGenerator::new(Arc::clone(&clock))),
            sharder,
        );

        Ok(Spool {
            publisher: Arc::new(publisher),
            status: StatusReader::new(Arc::clone(&store)),
            registry: Arc::new(self.registry),
            store,
            clock,
            sharder,
            config: self.config,
        })
    }
}

impl Default for SpoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The assembled engine. Cheap to clone; clones share everything.
#[derive(Clone)]
pub struct Spool {
    publisher: Arc<Publisher>,
    status: StatusReader,
    registry: Arc<HandlerRegistry>,
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    sharder: Sharder,
    config: SpoolConfig,
}

impl Spool {
    pub fn builder() -> SpoolBuilder {
        SpoolBuilder::new()
    }

    pub async fn publish<P: Serialize + ?Sized>(
        &self,
        queue_name: &str,
        payload: &P,
        options: PublishOptions,
    ) -> Result<MessageId, SpoolError> {
        self.publisher.publish(queue_name, payload, options).await
    }

    pub async fn publish_typed<T: Topic>(
        &self,
        message: &T,
        options: PublishOptions,
    ) -> Result<MessageId, SpoolError> {
        self.publisher.publish_typed(message, options).await
    }

    pub async fn get_status(&self, id: &MessageId) -> Result<MessageInfo, SpoolError> {
        self.status.get_status(id).await
    }

    /// A processor for driving batches by hand.
    pub fn processor(&self) -> MessageProcessor {
        MessageProcessor::new(
            Arc::clone(&self.store),
            self.registry.clone(),
            Arc::clone(&self.clock),
            self.config.retry_policy(),
        )
    }

    pub fn sweeper(&self) -> PurgeSweeper {
        PurgeSweeper::new(Arc::clone(&self.store), Arc::clone(&self.clock))
    }

    /// Run one full batch over `shard`.
    pub async fn process_shard(&self, shard: ShardId) -> Result<BatchMetrics, SpoolError> {
        self.processor().run(shard).await
    }

    /// Run one purge sweep.
    pub async fn purge(&self) -> Result<BatchMetrics, SpoolError> {
        self.sweeper().run(()).await
    }

    pub fn shards(&self) -> impl Iterator<Item = ShardId> + use<> {
        self.sharder.shards()
    }

    pub fn config(&self) -> &SpoolConfig {
        &self.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }
}
