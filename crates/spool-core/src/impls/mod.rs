//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryRecordStore**: 開発用の record store
//! - **HandlerRegistry**: 起動時に組み立てる dispatcher registry
//! - **DefaultDeadLetterSubscriber**: `deadletter` 用のログだけの subscriber
//!
//! # 永続化
//! 本番用の実装は別クレートに配置します：
//! - `spool-sqlite`: SqliteRecordStore

pub mod dead_letter;
pub mod dispatch;
pub mod inmem_store;

pub use self::dead_letter::DefaultDeadLetterSubscriber;
pub use self::dispatch::{HandlerRegistry, RegistryError};
pub use self::inmem_store::InMemoryRecordStore;
