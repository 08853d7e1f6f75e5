//! RecordStore port - メッセージの正本（source of truth）
//!
//! The engine never talks to storage directly; adapters implement this
//! contract:
//!
//! - atomic create / update / delete, scoped by an explicit transaction
//! - predicate + sort-ordered queries returning a point-in-time snapshot
//!
//! # 実装
//! - `impls::InMemoryRecordStore`（開発用・テスト用）
//! - `spool-sqlite::SqliteRecordStore`（永続化）

use std::cmp::Ordering;
use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{MessageId, MessageRecord, MessageStatus, ShardId, StoreError};

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Open a transaction. Dropping it without `commit` discards its writes.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    /// Read one record outside any transaction.
    async fn get(&self, id: &MessageId) -> Result<Option<MessageRecord>, StoreError>;

    /// Snapshot every record matching `selection`, ordered by `order`
    /// (ties broken by id).
    async fn query(
        &self,
        selection: &Selection,
        order: &[SortKey],
    ) -> Result<RecordCursor, StoreError>;
}

/// Writes staged inside one atomic unit.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Fails with `Conflict` if the id already exists (checked at the latest on commit).
    async fn create(&mut self, record: &MessageRecord) -> Result<(), StoreError>;

    /// Fails with `NotFound` if the id does not exist (checked at the latest on commit).
    async fn update(&mut self, record: &MessageRecord) -> Result<(), StoreError>;

    /// Deleting a missing record is not an error.
    async fn delete(&mut self, id: &MessageId) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Query predicate. Every `Some`/non-empty part must hold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    /// status ∈ statuses (empty = any)
    pub statuses: Vec<MessageStatus>,
    /// visibility_time <= t
    pub visible_at: Option<DateTime<Utc>>,
    /// retain_till < t
    pub retained_before: Option<DateTime<Utc>>,
    pub shard: Option<ShardId>,
}

impl Selection {
    /// Deliverable messages of `shard` whose visibility time has come.
    pub fn eligible(shard: ShardId, now: DateTime<Utc>) -> Self {
        Self {
            statuses: vec![MessageStatus::Pending, MessageStatus::Retry],
            visible_at: Some(now),
            retained_before: None,
            shard: Some(shard),
        }
    }

    /// Terminal messages past their retention deadline.
    pub fn expired(now: DateTime<Utc>) -> Self {
        Self {
            statuses: vec![MessageStatus::Complete, MessageStatus::Failed],
            visible_at: None,
            retained_before: Some(now),
            shard: None,
        }
    }

    pub fn matches(&self, record: &MessageRecord) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&record.status))
            && self.visible_at.is_none_or(|t| record.visibility_time <= t)
            && self.retained_before.is_none_or(|t| record.retain_till < t)
            && self.shard.is_none_or(|s| record.shard == s)
    }
}

/// Ascending sort keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Priority,
    CreationTime,
}

impl SortKey {
    /// Delivery order: priority first, then FIFO among equals.
    pub const DELIVERY: [SortKey; 2] = [SortKey::Priority, SortKey::CreationTime];

    fn compare(self, a: &MessageRecord, b: &MessageRecord) -> Ordering {
        match self {
            SortKey::Priority => a.priority.cmp(&b.priority),
            SortKey::CreationTime => a.creation_time.cmp(&b.creation_time),
        }
    }
}

/// Order records by `keys`, then by id so the order is total.
pub fn sort_records(records: &mut [MessageRecord], keys: &[SortKey]) {
    records.sort_by(|a, b| {
        keys.iter()
            .map(|key| key.compare(a, b))
            .find(|ord| ord.is_ne())
            .unwrap_or_else(|| a.id.cmp(&b.id))
    });
}

/// Forward-only cursor over a query snapshot.
///
/// Writes made after the query ran are not reflected.
#[derive(Debug, Default)]
pub struct RecordCursor {
    records: VecDeque<MessageRecord>,
}

impl RecordCursor {
    pub fn new(records: Vec<MessageRecord>) -> Self {
        Self {
            records: records.into(),
        }
    }

    /// Records not yet consumed.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Iterator for RecordCursor {
    type Item = MessageRecord;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.pop_front()
    }
}
