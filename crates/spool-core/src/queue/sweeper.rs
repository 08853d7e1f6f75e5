//! PurgeSweeper: deletes terminal messages whose retention has run out.
//!
//! Only COMPLETE/FAILED records are ever selected, so it can run alongside
//! the processors.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::domain::{MessageRecord, SpoolError};
use crate::ports::{Clock, RecordCursor, RecordStore, Selection, SortKey};
use crate::queue::processor::{BatchMetrics, BatchRunner};

struct SweepContext {
    cursor: RecordCursor,
    removed: u32,
}

pub struct PurgeSweeper {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    batch: Option<SweepContext>,
}

impl PurgeSweeper {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            batch: None,
        }
    }
}

#[async_trait]
impl BatchRunner for PurgeSweeper {
    type Scope = ();

    async fn begin_batch(&mut self, _scope: ()) -> Result<usize, SpoolError> {
        let now = self.clock.now();
        let cursor = self
            .store
            .query(&Selection::expired(now), &[SortKey::CreationTime])
            .await?;
        let expired = cursor.len();
        debug!(expired, "purge started");
        self.batch = Some(SweepContext { cursor, removed: 0 });
        Ok(expired)
    }

    fn next(&mut self) -> Option<MessageRecord> {
        self.batch.as_mut()?.cursor.next()
    }

    async fn handle(&mut self, record: MessageRecord) -> Result<(), SpoolError> {
        if self.batch.is_none() {
            return Err(SpoolError::NoActiveBatch);
        }

        let mut tx = self.store.begin().await?;
        tx.delete(&record.id).await?;
        tx.commit().await?;

        debug!(message_id = %record.id, status = %record.status, "expired message purged");
        if let Some(ctx) = self.batch.as_mut() {
            ctx.removed += 1;
        }
        Ok(())
    }

    fn end_batch(&mut self) -> BatchMetrics {
        let Some(ctx) = self.batch.take() else {
            return BatchMetrics::default();
        };
        info!(removed = ctx.removed, "purge finished");
        BatchMetrics {
            removed: ctx.removed,
            ..BatchMetrics::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MessageId, MessageStatus, Priority, Retention, ShardId};
    use crate::impls::InMemoryRecordStore;
    use crate::ports::FixedClock;
    use chrono::{TimeDelta, TimeZone, Utc};
    use rstest::rstest;
    use ulid::Ulid;

    fn record(status: MessageStatus, retain_for: TimeDelta) -> MessageRecord {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        MessageRecord {
            id: MessageId::from_ulid(Ulid::new()),
            queue_name: "q".to_string(),
            payload: "{}".to_string(),
            status,
            priority: Priority::Normal,
            remaining_delivery_attempts: 0,
            error_count: 0,
            visibility_time: now,
            retention: Retention::Always,
            retain_till: now + retain_for,
            shard: ShardId(0),
            last_result: None,
            call_site: None,
            creation_time: now,
        }
    }

    #[rstest]
    #[case::complete(MessageStatus::Complete, true)]
    #[case::failed(MessageStatus::Failed, true)]
    #[case::pending(MessageStatus::Pending, false)]
    #[case::retry(MessageStatus::Retry, false)]
    #[tokio::test]
    async fn only_expired_terminal_records_are_purged(
        #[case] status: MessageStatus,
        #[case] purged: bool,
    ) {
        let store = InMemoryRecordStore::new();
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        ));
        let expired = record(status, TimeDelta::seconds(10));
        let fresh = record(MessageStatus::Complete, TimeDelta::days(1));

        let mut tx = store.begin().await.unwrap();
        tx.create(&expired).await.unwrap();
        tx.create(&fresh).await.unwrap();
        tx.commit().await.unwrap();

        clock.advance(TimeDelta::seconds(11));
        let mut sweeper = PurgeSweeper::new(Arc::new(store.clone()), clock);
        let m = sweeper.run(()).await.unwrap();

        assert_eq!(m.removed, u32::from(purged));
        assert_eq!(store.get(&expired.id).await.unwrap().is_none(), purged);
        assert!(store.get(&fresh.id).await.unwrap().is_some());
    }
}
