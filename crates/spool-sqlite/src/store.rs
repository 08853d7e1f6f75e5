//! SQLite-backed `RecordStore`.
//!
//! Timestamps are stored as Unix milliseconds; payload, last result and call
//! site as JSON text. Ids are the bare ULID string, so ordering by `id`
//! matches ULID order.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions,
};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};

use spool_core::domain::{MessageId, MessageRecord, Priority, ShardId, StoreError};
use spool_core::ports::{RecordCursor, RecordStore, Selection, SortKey, StoreTransaction};

use crate::config::SqliteConfig;

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Open (or create) the database and apply migrations.
    pub async fn connect(config: &SqliteConfig) -> Result<Self, StoreError> {
        let (opts, pool_opts) = match &config.db_path {
            Some(path) => (
                SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal),
                SqlitePoolOptions::new(),
            ),
            // every connection to :memory: is its own database; keep exactly one alive
            None => (
                SqliteConnectOptions::new().in_memory(true),
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .min_connections(1)
                    .idle_timeout(None::<Duration>)
                    .max_lifetime(None::<Duration>),
            ),
        };

        let pool = pool_opts
            .connect_with(opts)
            .await
            .map_err(StoreError::backend)?;
        info!(db_path = ?config.db_path, "sqlite record store opened");
        Self::from_pool(pool).await
    }

    /// Use an existing pool. Migrations are applied.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(StoreError::backend)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let tx = self.pool.begin().await.map_err(StoreError::backend)?;
        Ok(Box::new(SqliteTransaction { tx }))
    }

    async fn get(&self, id: &MessageId) -> Result<Option<MessageRecord>, StoreError> {
        let row = sqlx::query_as::<_, MessageRow>("SELECT * FROM messages WHERE id = ?")
            .bind(id.to_key())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        row.map(MessageRecord::try_from).transpose()
    }

    async fn query(
        &self,
        selection: &Selection,
        order: &[SortKey],
    ) -> Result<RecordCursor, StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM messages WHERE 1 = 1");

        if !selection.statuses.is_empty() {
            qb.push(" AND status IN (");
            let mut statuses = qb.separated(", ");
            for status in &selection.statuses {
                statuses.push_bind(status.as_str());
            }
            statuses.push_unseparated(")");
        }
        if let Some(t) = selection.visible_at {
            qb.push(" AND visibility_time <= ").push_bind(t.timestamp_millis());
        }
        if let Some(t) = selection.retained_before {
            qb.push(" AND retain_till < ").push_bind(t.timestamp_millis());
        }
        if let Some(shard) = selection.shard {
            qb.push(" AND shard = ").push_bind(i64::from(shard.0));
        }

        qb.push(" ORDER BY ");
        for key in order {
            qb.push(match key {
                SortKey::Priority => "priority ASC, ",
                SortKey::CreationTime => "creation_time ASC, ",
            });
        }
        qb.push("id ASC");

        let rows: Vec<MessageRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        debug!(matched = rows.len(), "sqlite query");

        let records = rows
            .into_iter()
            .map(MessageRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RecordCursor::new(records))
    }
}

struct SqliteTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl StoreTransaction for SqliteTransaction {
    async fn create(&mut self, record: &MessageRecord) -> Result<(), StoreError> {
        let row = MessageRow::from(record);
        let query = sqlx::query(
            "INSERT INTO messages (id, queue_name, payload, status, priority, \
             remaining_delivery_attempts, error_count, visibility_time, retention, \
             retain_till, shard, last_result, call_site, creation_time) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(row.id.clone());

        bind_fields(query, row)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    StoreError::Conflict(record.id)
                }
                other => StoreError::backend(other),
            })?;
        Ok(())
    }

    async fn update(&mut self, record: &MessageRecord) -> Result<(), StoreError> {
        let row = MessageRow::from(record);
        let id = row.id.clone();
        let query = sqlx::query(
            "UPDATE messages SET queue_name = ?, payload = ?, status = ?, priority = ?, \
             remaining_delivery_attempts = ?, error_count = ?, visibility_time = ?, \
             retention = ?, retain_till = ?, shard = ?, last_result = ?, call_site = ?, \
             creation_time = ? WHERE id = ?",
        );

        let done = bind_fields(query, row)
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(record.id));
        }
        Ok(())
    }

    async fn delete(&mut self, id: &MessageId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id.to_key())
            .execute(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let SqliteTransaction { tx } = *self;
        tx.commit().await.map_err(StoreError::backend)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let SqliteTransaction { tx } = *self;
        tx.rollback().await.map_err(StoreError::backend)
    }
}

/// Binds every column except `id`, in table order.
fn bind_fields(query: SqliteQuery<'_>, row: MessageRow) -> SqliteQuery<'_> {
    query
        .bind(row.queue_name)
        .bind(row.payload)
        .bind(row.status)
        .bind(row.priority)
        .bind(row.remaining_delivery_attempts)
        .bind(row.error_count)
        .bind(row.visibility_time)
        .bind(row.retention)
        .bind(row.retain_till)
        .bind(row.shard)
        .bind(row.last_result)
        .bind(row.call_site)
        .bind(row.creation_time)
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: String,
    queue_name: String,
    payload: String,
    status: String,
    priority: i64,
    remaining_delivery_attempts: i64,
    error_count: i64,
    visibility_time: i64,
    retention: String,
    retain_till: i64,
    shard: i64,
    last_result: Option<String>,
    call_site: Option<String>,
    creation_time: i64,
}

impl From<&MessageRecord> for MessageRow {
    fn from(r: &MessageRecord) -> Self {
        Self {
            id: r.id.to_key(),
            queue_name: r.queue_name.clone(),
            payload: r.payload.clone(),
            status: r.status.as_str().to_string(),
            priority: i64::from(r.priority.as_u8()),
            remaining_delivery_attempts: i64::from(r.remaining_delivery_attempts),
            error_count: i64::from(r.error_count),
            visibility_time: r.visibility_time.timestamp_millis(),
            retention: r.retention.as_str().to_string(),
            retain_till: r.retain_till.timestamp_millis(),
            shard: i64::from(r.shard.0),
            last_result: r.last_result.clone(),
            call_site: r.call_site.clone(),
            creation_time: r.creation_time.timestamp_millis(),
        }
    }
}

impl TryFrom<MessageRow> for MessageRecord {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt = |reason: String| StoreError::corrupt(id.clone(), reason);

        let priority = u8::try_from(row.priority)
            .map_err(|e| e.to_string())
            .and_then(Priority::try_from)
            .map_err(&corrupt)?;

        Ok(MessageRecord {
            id: id.parse::<MessageId>().map_err(|e| corrupt(e.to_string()))?,
            queue_name: row.queue_name,
            payload: row.payload,
            status: row.status.parse().map_err(&corrupt)?,
            priority,
            remaining_delivery_attempts: to_u32(row.remaining_delivery_attempts, "remaining_delivery_attempts")
                .map_err(&corrupt)?,
            error_count: to_u32(row.error_count, "error_count").map_err(&corrupt)?,
            visibility_time: from_millis(row.visibility_time, "visibility_time").map_err(&corrupt)?,
            retention: row.retention.parse().map_err(&corrupt)?,
            retain_till: from_millis(row.retain_till, "retain_till").map_err(&corrupt)?,
            shard: ShardId(to_u32(row.shard, "shard").map_err(&corrupt)?),
            last_result: row.last_result,
            call_site: row.call_site,
            creation_time: from_millis(row.creation_time, "creation_time").map_err(&corrupt)?,
        })
    }
}

fn to_u32(value: i64, column: &str) -> Result<u32, String> {
    u32::try_from(value).map_err(|_| format!("{column} out of range: {value}"))
}

fn from_millis(value: i64, column: &str) -> Result<DateTime<Utc>, String> {
    DateTime::from_timestamp_millis(value).ok_or_else(|| format!("{column} out of range: {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use spool_core::domain::{MessageStatus, Retention};
    use spool_core::ports::{IdGenerator, SystemClock, UlidGenerator};

    fn record(shard: u32, priority: Priority, created_offset_secs: i64) -> MessageRecord {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let created = t0 + TimeDelta::seconds(created_offset_secs);
        MessageRecord {
            id: UlidGenerator::new(SystemClock).generate_message_id(),
            queue_name: "test.queue".to_string(),
            payload: r#"{"a":1}"#.to_string(),
            status: MessageStatus::Pending,
            priority,
            remaining_delivery_attempts: 3,
            error_count: 0,
            visibility_time: created,
            retention: Retention::OnFailure,
            retain_till: created + TimeDelta::days(7),
            shard: ShardId(shard),
            last_result: None,
            call_site: Some(r#"{"file":"x.rs","line":1,"column":1}"#.to_string()),
            creation_time: created,
        }
    }

    async fn store() -> SqliteRecordStore {
        SqliteRecordStore::connect(&SqliteConfig::in_memory())
            .await
            .unwrap()
    }

    async fn insert(store: &SqliteRecordStore, records: &[&MessageRecord]) {
        let mut tx = store.begin().await.unwrap();
        for r in records {
            tx.create(r).await.unwrap();
        }
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn records_survive_a_round_trip_through_sqlite() {
        let store = store().await;
        let r = record(2, Priority::High, 0);
        insert(&store, &[&r]).await;

        assert_eq!(store.get(&r.id).await.unwrap(), Some(r));
    }

    #[tokio::test]
    async fn update_and_delete() {
        let store = store().await;
        let mut r = record(0, Priority::Normal, 0);
        insert(&store, &[&r]).await;

        r.record_attempt(r#"{"outcome":"OK","code":"OK"}"#.to_string());
        r.mark_complete();
        let mut tx = store.begin().await.unwrap();
        tx.update(&r).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.get(&r.id).await.unwrap(), Some(r.clone()));

        let mut tx = store.begin().await.unwrap();
        tx.delete(&r.id).await.unwrap();
        tx.commit().await.unwrap();
        assert!(store.get(&r.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rollback_discards_and_errors_are_typed() {
        let store = store().await;
        let r = record(0, Priority::Normal, 0);

        let mut tx = store.begin().await.unwrap();
        tx.create(&r).await.unwrap();
        tx.rollback().await.unwrap();
        assert!(store.get(&r.id).await.unwrap().is_none());

        let mut tx = store.begin().await.unwrap();
        assert!(matches!(tx.update(&r).await, Err(StoreError::NotFound(_))));
        drop(tx);

        insert(&store, &[&r]).await;
        let mut tx = store.begin().await.unwrap();
        assert!(matches!(tx.create(&r).await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn eligible_query_matches_in_memory_semantics() {
        let store = store().await;
        let low_old = record(0, Priority::Low, 0);
        let high_new = record(0, Priority::High, 10);
        let normal = record(0, Priority::Normal, 5);
        let other_shard = record(1, Priority::High, 0);
        let mut future = record(0, Priority::High, 0);
        future.visibility_time = future.visibility_time + TimeDelta::hours(1);
        let mut done = record(0, Priority::High, 0);
        done.mark_complete();
        insert(
            &store,
            &[&low_old, &high_new, &normal, &other_shard, &future, &done],
        )
        .await;

        let now = high_new.creation_time;
        let ids: Vec<_> = store
            .query(&Selection::eligible(ShardId(0), now), &SortKey::DELIVERY)
            .await
            .unwrap()
            .map(|r| r.id)
            .collect();

        assert_eq!(ids, vec![high_new.id, normal.id, low_old.id]);
    }

    #[tokio::test]
    async fn expired_query_selects_only_terminal_records() {
        let store = store().await;
        let mut failed = record(0, Priority::Normal, 0);
        failed.mark_failed();
        let pending = record(0, Priority::Normal, 0);
        insert(&store, &[&failed, &pending]).await;

        let later = failed.retain_till + TimeDelta::seconds(1);
        let ids: Vec<_> = store
            .query(&Selection::expired(later), &[SortKey::CreationTime])
            .await
            .unwrap()
            .map(|r| r.id)
            .collect();

        assert_eq!(ids, vec![failed.id]);
    }
}
