//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: 単調増加の ULID（本番用）
//!
//! Ids double as the final tie-breaker when records share a priority and
//! creation time, so ids from one generator must sort in generation order.

use std::sync::{Mutex, PoisonError};

use crate::domain::MessageId;
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は分散システムで使える ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数スレッドから使える）
pub trait IdGenerator: Send + Sync {
    fn generate_message_id(&self) -> MessageId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Within one millisecond (or under a `FixedClock`) the previous id is
/// incremented instead of drawing new randomness.
pub struct UlidGenerator<C> {
    clock: C,
    last: Mutex<Option<Ulid>>,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            last: Mutex::new(None),
        }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_message_id(&self) -> MessageId {
        let timestamp_ms = u64::try_from(self.clock.now().timestamp_millis()).unwrap_or(0);
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);

        let next = (*last)
            .filter(|prev| prev.timestamp_ms() >= timestamp_ms)
            .and_then(|prev| prev.increment())
            .unwrap_or_else(|| Ulid::from_parts(timestamp_ms, rand::random()));
        *last = Some(next);
        MessageId::from(next)
    }
}
