//! MessageProcessor: the per-shard delivery state machine.
//!
//! # Batch contract
//! An external scheduler drives one shard at a time:
//!
//! 1. `begin_batch(shard)` snapshots the eligible messages (PENDING/RETRY,
//!    visible, on this shard), ordered by priority then creation time
//! 2. `next()` / `handle(record)` until the cursor is exhausted
//! 3. `end_batch()` returns and logs the metrics
//!
//! `run(scope)` does all three and never lets one message abort the batch.
//!
//! # Per-message flow
//! decode -> dispatch -> classify -> record result -> COMPLETE / RETRY / FAILED
//! -> dead-letter (FAILED only) -> delete or update in one transaction.
//!
//! The subscriber runs on its own task with no store transaction open. Its
//! side effects stand on their own: if the bookkeeping commit afterwards
//! fails, the message stays eligible and will be delivered again.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::domain::{
    DeliveryError, LastResult, MessageId, MessageRecord, MessageStatus, Reply, Retention,
    ShardId, SpoolError,
};
use crate::ports::{
    Clock, DispatcherRegistry, RecordCursor, RecordStore, Selection, SortKey, invoke_isolated,
};
use crate::queue::classify::{Verdict, classify};
use crate::queue::dead_letter::{DeadLetterOutcome, DeadLetterRouter};
use crate::queue::retry::RetryPolicy;

/// Counters for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchMetrics {
    /// Delivered successfully.
    pub processed: u32,
    /// Selected while in RETRY.
    pub retried: u32,
    /// Failed delivery attempts.
    pub errored: u32,
    /// Records deleted.
    pub removed: u32,
}

/// Batch-runner boundary consumed by a scheduler.
#[async_trait]
pub trait BatchRunner: Send {
    /// What a batch is scoped to (a shard for the processor, nothing for the sweeper).
    type Scope: Copy + Send + std::fmt::Debug + 'static;

    /// Start a batch and return how many records it will visit.
    async fn begin_batch(&mut self, scope: Self::Scope) -> Result<usize, SpoolError>;

    /// Next record of the current batch; `None` when exhausted or no batch is open.
    fn next(&mut self) -> Option<MessageRecord>;

    async fn handle(&mut self, record: MessageRecord) -> Result<(), SpoolError>;

    /// Close the batch. Returns zeroed metrics when no batch was open.
    fn end_batch(&mut self) -> BatchMetrics;

    /// Run a whole batch. Per-record errors are logged and skipped.
    async fn run(&mut self, scope: Self::Scope) -> Result<BatchMetrics, SpoolError> {
        self.begin_batch(scope).await?;
        while let Some(record) = self.next() {
            let id = record.id;
            if let Err(e) = self.handle(record).await {
                error!(message_id = %id, ?scope, error = %e, "failed to handle record");
            }
        }
        Ok(self.end_batch())
    }
}

struct BatchContext {
    shard: ShardId,
    cursor: RecordCursor,
    metrics: BatchMetrics,
}

pub struct MessageProcessor {
    store: Arc<dyn RecordStore>,
    registry: Arc<dyn DispatcherRegistry>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    dead_letters: DeadLetterRouter,
    batch: Option<BatchContext>,
}

impl MessageProcessor {
    pub fn new(
        store: Arc<dyn RecordStore>,
        registry: Arc<dyn DispatcherRegistry>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            dead_letters: DeadLetterRouter::new(Arc::clone(&registry)),
            registry,
            clock,
            retry,
            batch: None,
        }
    }

    /// Decode the payload and hand it to the queue's subscriber.
    ///
    /// Returns the payload as the subscriber saw it (or the raw text when it
    /// could not be decoded) for dead-letter routing.
    async fn deliver(&self, record: &MessageRecord) -> (Value, Verdict) {
        let (payload, result) = match serde_json::from_str::<Value>(&record.payload) {
            Ok(payload) => {
                let result = self.dispatch(&record.queue_name, payload.clone()).await;
                (payload, result)
            }
            Err(e) => (
                Value::String(record.payload.clone()),
                Err(DeliveryError::Payload(e)),
            ),
        };
        (payload, classify(&record.queue_name, result))
    }

    async fn dispatch(&self, queue_name: &str, payload: Value) -> Result<Reply, DeliveryError> {
        let dispatcher =
            self.registry
                .get(queue_name)
                .ok_or_else(|| DeliveryError::NoSubscriber {
                    queue: queue_name.to_string(),
                })?;
        Ok(invoke_isolated(dispatcher, queue_name, payload).await?)
    }

    fn metrics_mut(&mut self) -> Option<&mut BatchMetrics> {
        self.batch.as_mut().map(|ctx| &mut ctx.metrics)
    }
}

/// Should a record that was just handled be deleted instead of updated?
pub fn should_remove(record: &MessageRecord, dead_letter: Option<DeadLetterOutcome>) -> bool {
    match record.status {
        MessageStatus::Failed => {
            record.retention == Retention::Never
                || dead_letter == Some(DeadLetterOutcome::Acknowledged)
        }
        MessageStatus::Complete => record.retention != Retention::Always,
        MessageStatus::Pending | MessageStatus::Retry => false,
    }
}

fn encode_last_result(id: &MessageId, result: &LastResult) -> String {
    serde_json::to_string(result).unwrap_or_else(|e| {
        warn!(message_id = %id, error = %e, "cannot serialize last result; storing an empty one");
        serde_json::to_string(&LastResult::empty()).unwrap_or_else(|_| "{}".to_string())
    })
}

#[async_trait]
impl BatchRunner for MessageProcessor {
    type Scope = ShardId;

    async fn begin_batch(&mut self, shard: ShardId) -> Result<usize, SpoolError> {
        if let Some(previous) = self.batch.take() {
            warn!(shard = %previous.shard, "previous batch was never ended; discarding it");
        }
        let now = self.clock.now();
        let cursor = self
            .store
            .query(&Selection::eligible(shard, now), &SortKey::DELIVERY)
            .await?;
        let eligible = cursor.len();
        info!(%shard, eligible, "batch started");

        self.batch = Some(BatchContext {
            shard,
            cursor,
            metrics: BatchMetrics::default(),
        });
        Ok(eligible)
    }

    fn next(&mut self) -> Option<MessageRecord> {
        self.batch.as_mut()?.cursor.next()
    }

    async fn handle(&mut self, mut record: MessageRecord) -> Result<(), SpoolError> {
        let metrics = self.metrics_mut().ok_or(SpoolError::NoActiveBatch)?;
        if record.status == MessageStatus::Retry {
            metrics.retried += 1;
        }
        debug!(message_id = %record.id, queue = %record.queue_name, status = %record.status, "processing");

        let (payload, verdict) = self.deliver(&record).await;
        let success = verdict.is_success();

        record.record_attempt(encode_last_result(&record.id, verdict.last_result()));

        let mut dead_letter = None;
        if success {
            record.mark_complete();
        } else if record.register_failure() {
            record.mark_failed();
            error!(
                message_id = %record.id,
                queue = %record.queue_name,
                errors = record.error_count,
                "delivery attempts exhausted"
            );
            dead_letter = Some(self.dead_letters.route(&record.queue_name, &payload).await);
        } else {
            let visible_at = self.retry.next_visibility(self.clock.now(), record.error_count);
            record.schedule_retry(visible_at);
            info!(
                message_id = %record.id,
                queue = %record.queue_name,
                errors = record.error_count,
                remaining = record.remaining_delivery_attempts,
                %visible_at,
                "delivery scheduled for retry"
            );
        }

        let remove = should_remove(&record, dead_letter);
        let mut tx = self.store.begin().await?;
        if remove {
            tx.delete(&record.id).await?;
        } else {
            tx.update(&record).await?;
        }
        tx.commit().await?;

        if remove {
            info!(message_id = %record.id, status = %record.status, "message removed");
        }
        // only transitions that reached the store are counted
        if let Some(metrics) = self.metrics_mut() {
            if success {
                metrics.processed += 1;
            } else {
                metrics.errored += 1;
            }
            if remove {
                metrics.removed += 1;
            }
        }
        Ok(())
    }

    fn end_batch(&mut self) -> BatchMetrics {
        let Some(ctx) = self.batch.take() else {
            return BatchMetrics::default();
        };
        let m = ctx.metrics;
        info!(
            shard = %ctx.shard,
            processed = m.processed,
            retried = m.retried,
            errored = m.errored,
            removed = m.removed,
            "batch finished"
        );
        m
    }
}
