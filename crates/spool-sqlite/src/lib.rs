//! spool-sqlite
//!
//! SQLite 上の `RecordStore` 実装（sqlx + マイグレーション）。

mod config;
mod store;

pub use config::SqliteConfig;
pub use store::SqliteRecordStore;
