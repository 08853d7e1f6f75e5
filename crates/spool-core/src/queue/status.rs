//! Read-only status view of a message.

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::domain::{LastResult, MessageId, MessageRecord, MessageStatus, SpoolError};
use crate::ports::RecordStore;

/// What `get_status` reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageInfo {
    pub id: MessageId,
    pub status: MessageStatus,
    /// Empty until the first attempt (or when the stored result is unreadable).
    pub last_result: LastResult,
    /// The raw stored record.
    #[serde(skip)]
    pub record: MessageRecord,
}

#[derive(Clone)]
pub struct StatusReader {
    store: Arc<dyn RecordStore>,
}

impl StatusReader {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn get_status(&self, id: &MessageId) -> Result<MessageInfo, SpoolError> {
        let record = self
            .store
            .get(id)
            .await?
            .ok_or(SpoolError::NotFound(*id))?;

        let last_result = match record.last_result.as_deref() {
            None => LastResult::empty(),
            Some(text) => serde_json::from_str(text).unwrap_or_else(|e| {
                warn!(message_id = %id, error = %e, "stored last result is unreadable");
                LastResult::empty()
            }),
        };

        Ok(MessageInfo {
            id: record.id,
            status: record.status,
            last_result,
            record,
        })
    }
}
