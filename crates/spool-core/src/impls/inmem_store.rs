//! InMemoryRecordStore - 開発用・テスト用の record store
//!
//! # 学習ポイント
//! - Mutex で排他制御（ロックを保持したまま await しない）
//! - トランザクションは書き込みを溜めておき、commit 時にまとめて適用
//! - drop すれば rollback と同じ（何も適用されない）

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::{MessageId, MessageRecord, StoreError};
use crate::ports::{RecordCursor, RecordStore, Selection, SortKey, StoreTransaction, sort_records};

type Records = HashMap<MessageId, MessageRecord>;

/// Clones share the same records.
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    records: Arc<Mutex<Records>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Records> {
        lock(&self.records)
    }
}

fn lock(records: &Mutex<Records>) -> MutexGuard<'_, Records> {
    // writes are applied in one step at commit, so a poisoned map is still consistent
    records.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        Ok(Box::new(InMemoryTransaction {
            records: Arc::clone(&self.records),
            staged: Vec::new(),
        }))
    }

    async fn get(&self, id: &MessageId) -> Result<Option<MessageRecord>, StoreError> {
        Ok(self.lock().get(id).cloned())
    }

    async fn query(
        &self,
        selection: &Selection,
        order: &[SortKey],
    ) -> Result<RecordCursor, StoreError> {
        let mut matched: Vec<MessageRecord> = self
            .lock()
            .values()
            .filter(|r| selection.matches(r))
            .cloned()
            .collect();
        sort_records(&mut matched, order);
        Ok(RecordCursor::new(matched))
    }
}

enum Staged {
    Create(MessageRecord),
    Update(MessageRecord),
    Delete(MessageId),
}

struct InMemoryTransaction {
    records: Arc<Mutex<Records>>,
    staged: Vec<Staged>,
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn create(&mut self, record: &MessageRecord) -> Result<(), StoreError> {
        self.staged.push(Staged::Create(record.clone()));
        Ok(())
    }

    async fn update(&mut self, record: &MessageRecord) -> Result<(), StoreError> {
        self.staged.push(Staged::Update(record.clone()));
        Ok(())
    }

    async fn delete(&mut self, id: &MessageId) -> Result<(), StoreError> {
        self.staged.push(Staged::Delete(*id));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryTransaction { records, staged } = *self;
        let mut records = lock(&records);

        // validate everything against an overlay first, then apply; all or nothing
        let mut overlay: HashMap<MessageId, Option<MessageRecord>> = HashMap::new();
        for op in staged {
            match op {
                Staged::Create(record) => {
                    if exists(&records, &overlay, &record.id) {
                        return Err(StoreError::Conflict(record.id));
                    }
                    overlay.insert(record.id, Some(record));
                }
                Staged::Update(record) => {
                    if !exists(&records, &overlay, &record.id) {
                        return Err(StoreError::NotFound(record.id));
                    }
                    overlay.insert(record.id, Some(record));
                }
                Staged::Delete(id) => {
                    overlay.insert(id, None);
                }
            }
        }

        for (id, record) in overlay {
            match record {
                Some(record) => {
                    records.insert(id, record);
                }
                None => {
                    records.remove(&id);
                }
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

fn exists(
    records: &Records,
    overlay: &HashMap<MessageId, Option<MessageRecord>>,
    id: &MessageId,
) -> bool {
    match overlay.get(id) {
        Some(staged) => staged.is_some(),
        None => records.contains_key(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MessageStatus, Priority, Retention, ShardId};
    use chrono::{TimeDelta, TimeZone, Utc};
    use ulid::Ulid;

    fn record(shard: u32, priority: Priority) -> MessageRecord {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        MessageRecord {
            id: MessageId::from_ulid(Ulid::new()),
            queue_name: "test.queue".to_string(),
            payload: r#"{"a":1}"#.to_string(),
            status: MessageStatus::Pending,
            priority,
            remaining_delivery_attempts: 3,
            error_count: 0,
            visibility_time: now,
            retention: Retention::OnFailure,
            retain_till: now + TimeDelta::days(7),
            shard: ShardId(shard),
            last_result: None,
            call_site: None,
            creation_time: now,
        }
    }

    #[tokio::test]
    async fn committed_writes_are_visible() {
        let store = InMemoryRecordStore::new();
        let r = record(0, Priority::Normal);

        let mut tx = store.begin().await.unwrap();
        tx.create(&r).await.unwrap();
        assert!(store.get(&r.id).await.unwrap().is_none());
        tx.commit().await.unwrap();

        assert_eq!(store.get(&r.id).await.unwrap(), Some(r));
    }

    #[tokio::test]
    async fn rollback_and_drop_discard_writes() {
        let store = InMemoryRecordStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.create(&record(0, Priority::Normal)).await.unwrap();
        tx.rollback().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.create(&record(0, Priority::Normal)).await.unwrap();
        drop(tx);

        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn failed_commit_applies_nothing() {
        let store = InMemoryRecordStore::new();
        let fresh = record(0, Priority::Normal);
        let missing = record(0, Priority::Normal);

        let mut tx = store.begin().await.unwrap();
        tx.create(&fresh).await.unwrap();
        tx.update(&missing).await.unwrap();
        let err = tx.commit().await.unwrap_err();

        assert!(matches!(err, StoreError::NotFound(id) if id == missing.id));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn duplicate_create_conflicts() {
        let store = InMemoryRecordStore::new();
        let r = record(0, Priority::Normal);

        let mut tx = store.begin().await.unwrap();
        tx.create(&r).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.create(&r).await.unwrap();
        assert!(matches!(tx.commit().await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn query_filters_and_orders() {
        let store = InMemoryRecordStore::new();
        let low = record(0, Priority::Low);
        let high = record(0, Priority::High);
        let other_shard = record(1, Priority::High);

        let mut tx = store.begin().await.unwrap();
        for r in [&low, &high, &other_shard] {
            tx.create(r).await.unwrap();
        }
        tx.commit().await.unwrap();

        let cursor = store
            .query(&Selection::eligible(ShardId(0), low.visibility_time), &SortKey::DELIVERY)
            .await
            .unwrap();
        let ids: Vec<_> = cursor.map(|r| r.id).collect();
        assert_eq!(ids, vec![high.id, low.id]);
    }

    #[tokio::test]
    async fn cursor_is_a_snapshot() {
        let store = InMemoryRecordStore::new();
        let r = record(0, Priority::Normal);
        let mut tx = store.begin().await.unwrap();
        tx.create(&r).await.unwrap();
        tx.commit().await.unwrap();

        let mut cursor = store
            .query(&Selection::eligible(ShardId(0), r.visibility_time), &SortKey::DELIVERY)
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.delete(&r.id).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(cursor.next().map(|x| x.id), Some(r.id));
        assert!(store.get(&r.id).await.unwrap().is_none());
    }
}
