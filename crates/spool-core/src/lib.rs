//! spool-core
//!
//! Durable, at-least-once message queue engine on top of a transactional
//! record store.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, message, outcome, options, errors）
//! - **ports**: 抽象化レイヤー（RecordStore, Dispatcher, Clock, IdGenerator）
//! - **impls**: 実装（InMemoryRecordStore, HandlerRegistry）
//! - **queue**: エンジン本体（publisher, sharder, processor, sweeper, status）
//! - **typed**: 型付き Topic API（Topic trait, Handler trait）
//! - **app**: 構築と参考実装のスケジューラ（SpoolBuilder, ShardWorkerGroup, PurgeLoop）
//! - **config**: 環境変数からの設定

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod queue;
pub mod typed;

pub use app::{BuildError, PurgeLoop, ShardWorkerGroup, Spool, SpoolBuilder};
pub use config::SpoolConfig;
pub use domain::{
    DispatchError, LastResult, MessageId, MessageStatus, Outcome, Priority, PublishOptions,
    Reply, Retention, ShardId, SpoolError,
};
pub use queue::{BatchMetrics, BatchRunner, MessageInfo};
