//! Queue engine: publishing, sharding, the delivery state machine, retry,
//! dead-letter routing, retention cleanup and status reads.

mod classify;
mod dead_letter;
mod processor;
mod publisher;
mod retry;
mod sharder;
mod status;
mod sweeper;

pub use classify::{RAW_RESULT_KEY, Verdict, classify};
pub use dead_letter::{DeadLetterOutcome, DeadLetterRouter};
pub use processor::{BatchMetrics, BatchRunner, MessageProcessor, should_remove};
pub use publisher::Publisher;
pub use retry::RetryPolicy;
pub use sharder::{ShardHash, Sharder};
pub use status::{MessageInfo, StatusReader};
pub use sweeper::PurgeSweeper;
