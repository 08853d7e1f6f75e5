//! Publisher: validates and persists new messages.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::domain::{MessageId, MessageRecord, MessageStatus, PublishOptions, SpoolError};
use crate::ports::{Clock, IdGenerator, RecordStore};
use crate::queue::sharder::Sharder;
use crate::typed::Topic;

pub struct Publisher {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    sharder: Sharder,
}

impl Publisher {
    pub fn new(
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        sharder: Sharder,
    ) -> Self {
        Self {
            store,
            clock,
            ids,
            sharder,
        }
    }

    /// Persist a new PENDING message and return its id.
    ///
    /// Either the whole record is committed or nothing is. A payload that
    /// cannot be turned into JSON fails with `SpoolError::Serialization`.
    pub async fn publish<P: Serialize + ?Sized>(
        &self,
        queue_name: &str,
        payload: &P,
        options: PublishOptions,
    ) -> Result<MessageId, SpoolError> {
        validate(queue_name, &options)?;

        let now = self.clock.now();
        let visibility_time = offset(now, options.delay, "delay")?;
        let retain_till = offset(now, options.retention_duration, "retentionDuration")?;

        let mut tx = self.store.begin().await?;

        let payload = match serde_json::to_string(payload) {
            Ok(json) => json,
            Err(source) => {
                tx.rollback().await?;
                return Err(SpoolError::Serialization {
                    queue: queue_name.to_string(),
                    source,
                });
            }
        };
        // provenance is diagnostic only; never fail the publish over it
        let call_site = options
            .call_site
            .as_ref()
            .and_then(|site| serde_json::to_string(site).ok());

        let record = MessageRecord {
            id: self.ids.generate_message_id(),
            queue_name: queue_name.to_string(),
            payload,
            status: MessageStatus::Pending,
            priority: options.priority,
            remaining_delivery_attempts: options.delivery_attempts,
            error_count: 0,
            visibility_time,
            retention: options.retention,
            retain_till,
            shard: self.sharder.assign(queue_name, options.fifo),
            last_result: None,
            call_site,
            creation_time: now,
        };

        tx.create(&record).await?;
        tx.commit().await?;

        info!(
            message_id = %record.id,
            queue = %record.queue_name,
            shard = %record.shard,
            priority = record.priority.as_u8(),
            "message enqueued"
        );
        debug!(message_id = %record.id, visible_at = %record.visibility_time, "visibility");
        Ok(record.id)
    }

    /// Publish a typed message to its topic's queue.
    pub async fn publish_typed<T: Topic>(
        &self,
        message: &T,
        options: PublishOptions,
    ) -> Result<MessageId, SpoolError> {
        self.publish(T::QUEUE, message, options).await
    }
}

fn validate(queue_name: &str, options: &PublishOptions) -> Result<(), SpoolError> {
    if queue_name.is_empty() {
        return Err(SpoolError::InvalidOption("queue name must not be empty".to_string()));
    }
    if options.delivery_attempts == 0 {
        return Err(SpoolError::InvalidOption(
            "deliveryAttempts must be at least 1".to_string(),
        ));
    }
    Ok(())
}

fn offset(now: DateTime<Utc>, secs: u64, field: &str) -> Result<DateTime<Utc>, SpoolError> {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or_else(|| SpoolError::InvalidOption(format!("{field} of {secs}s is out of range")))
}
