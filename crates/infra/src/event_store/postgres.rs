//! Postgres-backed event store.
//!
//! Tenant isolation is enforced by every query (`tenant_id` is always in the
//! `WHERE` clause). Optimistic concurrency is enforced twice: the stream
//! revision is checked inside the append transaction, and the unique
//! constraint on `(tenant_id, aggregate_id, sequence_number)` catches a writer
//! that commits in between.
//!
//! | Postgres error | EventStoreError |
//! |----------------|-----------------|
//! | `23505` unique violation | `Concurrency` |
//! | `23514` check violation | `InvalidAppend` |
//! | anything else | `Backend` |

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use tracing::instrument;

use stockledger_core::{AggregateId, ExpectedVersion, TenantId};

use super::query::{EventFilter, EventQuery, EventQueryResult, Pagination};
use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent, batch_stream};

const SCHEMA: &str = include_str!("../../migrations/0001_events.sql");

const SELECT_COLUMNS: &str = "event_id, tenant_id, aggregate_id, aggregate_type, sequence_number, \
     event_type, event_version, occurred_at, payload";

/// Postgres-backed append-only event store.
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: Arc<PgPool>,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect and make sure the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self, EventStoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Apply `migrations/0001_events.sql` (idempotent).
    pub async fn migrate(&self) -> Result<(), EventStoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, aggregate_id = %aggregate_id), err)]
    pub async fn load_stream_async(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM events \
             WHERE tenant_id = $1 AND aggregate_id = $2 ORDER BY sequence_number ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(aggregate_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_stream", e))?;

        rows.iter().map(stored_from_row).collect()
    }

    pub async fn load_all_async(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM events ORDER BY position ASC");
        let rows = sqlx::query(&sql)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_all", e))?;

        rows.iter().map(stored_from_row).collect()
    }

    #[instrument(
        skip(self, events),
        fields(event_count = events.len(), expected_version = ?expected_version),
        err
    )]
    pub async fn append_events(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some((tenant_id, aggregate_id, aggregate_type)) = batch_stream(&events)? else {
            return Ok(vec![]);
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let (current_version, existing_type) =
            check_stream_version(&mut tx, tenant_id, aggregate_id).await?;

        if let Some(existing_type) = existing_type {
            if existing_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{existing_type}', attempted append with '{aggregate_type}'"
                )));
            }
        }

        if !expected_version.matches(current_version) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current_version}"
            )));
        }

        let mut committed = Vec::with_capacity(events.len());
        let mut next = current_version + 1;

        for event in events {
            sqlx::query(
                r#"
                INSERT INTO events (
                    event_id, tenant_id, aggregate_id, aggregate_type, sequence_number,
                    event_type, event_version, occurred_at, payload
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(event.event_id)
            .bind(tenant_id.as_uuid())
            .bind(aggregate_id.as_uuid())
            .bind(&aggregate_type)
            .bind(next as i64)
            .bind(&event.event_type)
            .bind(event.event_version as i32)
            .bind(event.occurred_at)
            .bind(&event.payload)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_event", e))?;

            committed.push(StoredEvent {
                event_id: event.event_id,
                tenant_id: event.tenant_id,
                aggregate_id: event.aggregate_id,
                aggregate_type: event.aggregate_type,
                sequence_number: next,
                event_type: event.event_type,
                event_version: event.event_version,
                occurred_at: event.occurred_at,
                payload: event.payload,
            });
            next += 1;
        }

        // Dropping `tx` on an early return rolls back.
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(committed)
    }
}

/// Run a store future from the synchronous `EventStore` trait.
///
/// Needs a multi-threaded tokio runtime: the worker thread is handed over with
/// `block_in_place` while the query runs.
fn block_on<F, T>(fut: F) -> Result<T, EventStoreError>
where
    F: std::future::Future<Output = Result<T, EventStoreError>>,
{
    let handle = tokio::runtime::Handle::try_current().map_err(|_| {
        EventStoreError::Backend("PostgresEventStore must be called inside a tokio runtime".to_string())
    })?;
    tokio::task::block_in_place(|| handle.block_on(fut))
}

impl EventStore for PostgresEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        block_on(self.append_events(events, expected_version))
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        block_on(self.load_stream_async(tenant_id, aggregate_id))
    }

    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        block_on(self.load_all_async())
    }
}

#[async_trait::async_trait]
impl EventQuery for PostgresEventStore {
    async fn query_events(
        &self,
        tenant_id: TenantId,
        filter: EventFilter,
        pagination: Pagination,
    ) -> Result<EventQueryResult, EventStoreError> {
        const WHERE: &str = "WHERE tenant_id = $1 \
             AND ($2::uuid IS NULL OR aggregate_id = $2) \
             AND ($3::text IS NULL OR aggregate_type = $3) \
             AND ($4::text IS NULL OR event_type = $4) \
             AND ($5::timestamptz IS NULL OR occurred_at >= $5) \
             AND ($6::timestamptz IS NULL OR occurred_at <= $6)";

        let aggregate_id: Option<uuid::Uuid> = filter.aggregate_id.map(|id| *id.as_uuid());

        let count_sql = format!("SELECT COUNT(*) AS total FROM events {WHERE}");
        let total: i64 = sqlx::query(&count_sql)
            .bind(tenant_id.as_uuid())
            .bind(aggregate_id)
            .bind(filter.aggregate_type.as_deref())
            .bind(filter.event_type.as_deref())
            .bind(filter.occurred_after)
            .bind(filter.occurred_before)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_events", e))?
            .try_get("total")
            .map_err(|e| map_sqlx_error("count_events", e))?;

        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM events {WHERE} ORDER BY position DESC LIMIT $7 OFFSET $8"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(aggregate_id)
            .bind(filter.aggregate_type.as_deref())
            .bind(filter.event_type.as_deref())
            .bind(filter.occurred_after)
            .bind(filter.occurred_before)
            .bind(i64::from(pagination.limit))
            .bind(i64::from(pagination.offset))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("query_events", e))?;

        let events = rows.iter().map(stored_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(EventQueryResult::page(events, total.max(0) as u64, pagination))
    }

    async fn get_event_by_id(
        &self,
        tenant_id: TenantId,
        event_id: uuid::Uuid,
    ) -> Result<Option<StoredEvent>, EventStoreError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM events WHERE tenant_id = $1 AND event_id = $2");
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(event_id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_event_by_id", e))?;

        row.as_ref().map(stored_from_row).transpose()
    }
}

/// `(current_version, aggregate_type)`; `(0, None)` for a new stream.
async fn check_stream_version(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: TenantId,
    aggregate_id: AggregateId,
) -> Result<(u64, Option<String>), EventStoreError> {
    let row = sqlx::query(
        r#"
        SELECT COALESCE(MAX(sequence_number), 0) AS current_version, MAX(aggregate_type) AS aggregate_type
        FROM events
        WHERE tenant_id = $1 AND aggregate_id = $2
        "#,
    )
    .bind(tenant_id.as_uuid())
    .bind(aggregate_id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("check_stream_version", e))?;

    let current: i64 = row
        .try_get("current_version")
        .map_err(|e| map_sqlx_error("check_stream_version", e))?;
    let aggregate_type: Option<String> = row
        .try_get("aggregate_type")
        .map_err(|e| map_sqlx_error("check_stream_version", e))?;

    Ok((current.max(0) as u64, aggregate_type))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("{operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => EventStoreError::Concurrency(msg),
                Some("23514") => EventStoreError::InvalidAppend(msg),
                _ => EventStoreError::Backend(msg),
            }
        }
        _ => EventStoreError::Backend(format!("{operation}: {err}")),
    }
}

fn stored_from_row(row: &sqlx::postgres::PgRow) -> Result<StoredEvent, EventStoreError> {
    let read = |e: sqlx::Error| map_sqlx_error("decode_row", e);

    let tenant_id: uuid::Uuid = row.try_get("tenant_id").map_err(read)?;
    let aggregate_id: uuid::Uuid = row.try_get("aggregate_id").map_err(read)?;
    let sequence_number: i64 = row.try_get("sequence_number").map_err(read)?;
    let event_version: i32 = row.try_get("event_version").map_err(read)?;
    let occurred_at: DateTime<Utc> = row.try_get("occurred_at").map_err(read)?;

    Ok(StoredEvent {
        event_id: row.try_get("event_id").map_err(read)?,
        tenant_id: TenantId::from_uuid(tenant_id),
        aggregate_id: AggregateId::from_uuid(aggregate_id),
        aggregate_type: row.try_get("aggregate_type").map_err(read)?,
        sequence_number: sequence_number as u64,
        event_type: row.try_get("event_type").map_err(read)?,
        event_version: event_version as u32,
        occurred_at,
        payload: row.try_get("payload").map_err(read)?,
    })
}
