//! Domain model (IDs, message records, outcomes, options, errors).
//!
//! ここには I/O を持たない純粋な型だけを置きます。
//! 永続化やディスパッチは ports を経由します。

pub mod errors;
pub mod ids;
pub mod message;
pub mod options;
pub mod outcome;

pub use errors::{DeliveryError, DispatchError, SpoolError, StoreError};
pub use ids::{IdMarker, MessageId};
pub use message::{MessageRecord, MessageStatus, Priority, Retention, ShardId};
pub use options::PublishOptions;
pub use outcome::{
    CODE_ERROR, CODE_EXCEPTION, CODE_NO_SUBSCRIBER, CODE_OK, CallSite, Details, LastResult,
    Outcome, OutcomeKind, Reply,
};
