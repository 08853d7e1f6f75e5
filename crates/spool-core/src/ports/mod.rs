//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（record store, subscriber, 時刻, ID 生成）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - record store が source of truth（正本）
//! - subscriber は名前で引く（起動時に登録、実行時は不変）

pub mod clock;
pub mod dispatch;
pub mod id_generator;
pub mod record_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::dispatch::{
    DEAD_LETTER, Dispatcher, DispatcherRegistry, dead_letter_name, invoke_isolated,
};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::record_store::{
    RecordCursor, RecordStore, Selection, SortKey, StoreTransaction, sort_records,
};
