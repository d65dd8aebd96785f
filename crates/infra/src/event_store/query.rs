//! Read-only event queries for the audit trail.
//!
//! All queries are tenant-scoped and paginated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stockledger_core::{AggregateId, TenantId};

use crate::event_store::{EventStoreError, StoredEvent};

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    pub aggregate_id: Option<AggregateId>,
    /// e.g. `"sales.sale"`.
    pub aggregate_type: Option<String>,
    /// e.g. `"sales.sale.completed"`.
    pub event_type: Option<String>,
    pub occurred_after: Option<DateTime<Utc>>,
    pub occurred_before: Option<DateTime<Utc>>,
}

impl EventFilter {
    pub fn matches(&self, event: &StoredEvent) -> bool {
        self.aggregate_id.is_none_or(|id| event.aggregate_id == id)
            && self
                .aggregate_type
                .as_deref()
                .is_none_or(|t| event.aggregate_type == t)
            && self.event_type.as_deref().is_none_or(|t| event.event_type == t)
            && self.occurred_after.is_none_or(|at| event.occurred_at >= at)
            && self.occurred_before.is_none_or(|at| event.occurred_at <= at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventQueryResult {
    pub events: Vec<StoredEvent>,
    /// Matching events across all pages.
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

impl EventQueryResult {
    pub fn page(events: Vec<StoredEvent>, total: u64, pagination: Pagination) -> Self {
        let has_more = total > u64::from(pagination.offset) + u64::from(pagination.limit);
        Self {
            events,
            total,
            pagination,
            has_more,
        }
    }
}

/// Async query interface backing `GET /events`.
#[async_trait::async_trait]
pub trait EventQuery: Send + Sync {
    /// Matching events of one tenant, newest first.
    async fn query_events(
        &self,
        tenant_id: TenantId,
        filter: EventFilter,
        pagination: Pagination,
    ) -> Result<EventQueryResult, EventStoreError>;

    async fn get_event_by_id(
        &self,
        tenant_id: TenantId,
        event_id: uuid::Uuid,
    ) -> Result<Option<StoredEvent>, EventStoreError>;
}
