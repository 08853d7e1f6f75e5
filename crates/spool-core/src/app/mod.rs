//! App - アプリケーション層
//!
//! ports と queue を組み合わせて、ホストに渡す形にまとめます。
//!
//! # 主要コンポーネント
//! - **SpoolBuilder / Spool**: 構築とワイヤリング、公開 API
//! - **ShardWorkerGroup**: shard ごとの処理ループ（参考実装のスケジューラ）
//! - **PurgeLoop**: 期限切れメッセージの定期削除

pub mod builder;
pub mod gc_loop;
pub mod worker_loop;

#[cfg(test)]
mod test_support;

pub use self::builder::{BuildError, Spool, SpoolBuilder};
pub use self::gc_loop::PurgeLoop;
pub use self::worker_loop::ShardWorkerGroup;
