use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::domain::{MessageId, MessageRecord, StoreError};
use crate::impls::InMemoryRecordStore;
use crate::ports::{RecordCursor, RecordStore, Selection, SortKey, StoreTransaction};

/// In-memory store that counts `query` calls (one per batch).
#[derive(Clone, Default)]
pub(crate) struct CountingStore {
    inner: InMemoryRecordStore,
    queries: Arc<AtomicUsize>,
}

impl CountingStore {
    pub(crate) fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for CountingStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        self.inner.begin().await
    }

    async fn get(&self, id: &MessageId) -> Result<Option<MessageRecord>, StoreError> {
        self.inner.get(id).await
    }

    async fn query(
        &self,
        selection: &Selection,
        order: &[SortKey],
    ) -> Result<RecordCursor, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(selection, order).await
    }
}
