use std::collections::HashMap;
use std::sync::RwLock;

use stockledger_core::{AggregateId, ExpectedVersion, TenantId};

use super::query::{EventFilter, EventQuery, EventQueryResult, Pagination};
use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent, batch_stream};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<StreamKey, Vec<StoredEvent>>,
    /// Commit order across all streams.
    log: Vec<StoredEvent>,
}

/// In-memory append-only event store.
///
/// The default backend for development and tests. Not optimized for
/// performance; everything lives behind one `RwLock`.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }

    fn poisoned() -> EventStoreError {
        EventStoreError::Backend("event store lock poisoned".to_string())
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some((tenant_id, aggregate_id, aggregate_type)) = batch_stream(&events)? else {
            return Ok(vec![]);
        };

        let key = StreamKey {
            tenant_id,
            aggregate_id,
        };

        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;
        let Inner { streams, log } = &mut *inner;

        let stream = streams.entry(key).or_default();
        let current = Self::current_version(stream);

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        if let Some(existing) = stream.first() {
            if existing.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    existing.aggregate_type, aggregate_type
                )));
            }
        }

        let mut next = current + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            let stored = StoredEvent {
                event_id: e.event_id,
                tenant_id: e.tenant_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: next,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            };
            next += 1;
            stream.push(stored.clone());
            log.push(stored.clone());
            committed.push(stored);
        }

        Ok(committed)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let key = StreamKey {
            tenant_id,
            aggregate_id,
        };

        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(inner.streams.get(&key).cloned().unwrap_or_default())
    }

    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(inner.log.clone())
    }
}

#[async_trait::async_trait]
impl EventQuery for InMemoryEventStore {
    async fn query_events(
        &self,
        tenant_id: TenantId,
        filter: EventFilter,
        pagination: Pagination,
    ) -> Result<EventQueryResult, EventStoreError> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;

        // Newest first.
        let matching: Vec<&StoredEvent> = inner
            .log
            .iter()
            .rev()
            .filter(|e| e.tenant_id == tenant_id && filter.matches(e))
            .collect();

        let total = matching.len() as u64;
        let events = matching
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .cloned()
            .collect();

        Ok(EventQueryResult::page(events, total, pagination))
    }

    async fn get_event_by_id(
        &self,
        tenant_id: TenantId,
        event_id: uuid::Uuid,
    ) -> Result<Option<StoredEvent>, EventStoreError> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(inner
            .log
            .iter()
            .find(|e| e.tenant_id == tenant_id && e.event_id == event_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn event(tenant_id: TenantId, aggregate_id: AggregateId, aggregate_type: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            tenant_id,
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type: format!("{aggregate_type}.touched"),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: json!({}),
        }
    }

    #[test]
    fn sequence_numbers_are_per_stream_and_gapless() {
        let store = InMemoryEventStore::new();
        let t = TenantId::new();
        let a = AggregateId::new();
        let b = AggregateId::new();

        let first = store
            .append(vec![event(t, a, "sales.sale"), event(t, a, "sales.sale")], ExpectedVersion::Exact(0))
            .unwrap();
        let other = store.append(vec![event(t, b, "sales.sale")], ExpectedVersion::Exact(0)).unwrap();
        let second = store.append(vec![event(t, a, "sales.sale")], ExpectedVersion::Exact(2)).unwrap();

        assert_eq!(first.iter().map(|e| e.sequence_number).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(other[0].sequence_number, 1);
        assert_eq!(second[0].sequence_number, 3);
        assert_eq!(store.load_stream(t, a).unwrap().len(), 3);
        assert_eq!(store.load_all().unwrap().len(), 4);
    }

    #[test]
    fn stale_expected_version_is_a_concurrency_error() {
        let store = InMemoryEventStore::new();
        let t = TenantId::new();
        let a = AggregateId::new();
        store.append(vec![event(t, a, "debts.debt")], ExpectedVersion::Exact(0)).unwrap();

        let err = store
            .append(vec![event(t, a, "debts.debt")], ExpectedVersion::Exact(0))
            .unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
        assert_eq!(store.load_stream(t, a).unwrap().len(), 1);
    }

    #[test]
    fn streams_are_tenant_isolated() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let t1 = TenantId::new();
        let t2 = TenantId::new();
        store.append(vec![event(t1, a, "parties.party")], ExpectedVersion::Any).unwrap();

        assert!(store.load_stream(t2, a).unwrap().is_empty());

        let err = store
            .append(vec![event(t1, a, "parties.party"), event(t2, a, "parties.party")], ExpectedVersion::Any)
            .unwrap_err();
        assert!(matches!(err, EventStoreError::TenantIsolation(_)));
    }

    #[test]
    fn aggregate_type_is_fixed_per_stream() {
        let store = InMemoryEventStore::new();
        let t = TenantId::new();
        let a = AggregateId::new();
        store.append(vec![event(t, a, "storage.storage")], ExpectedVersion::Any).unwrap();

        let err = store.append(vec![event(t, a, "sales.sale")], ExpectedVersion::Any).unwrap_err();
        assert!(matches!(err, EventStoreError::AggregateTypeMismatch(_)));
    }

    #[tokio::test]
    async fn query_filters_by_tenant_and_type_newest_first() {
        let store = InMemoryEventStore::new();
        let t = TenantId::new();
        let sale = AggregateId::new();
        let debt = AggregateId::new();
        store.append(vec![event(t, sale, "sales.sale")], ExpectedVersion::Any).unwrap();
        store.append(vec![event(t, debt, "debts.debt")], ExpectedVersion::Any).unwrap();
        store.append(vec![event(t, sale, "sales.sale")], ExpectedVersion::Any).unwrap();
        store.append(vec![event(TenantId::new(), AggregateId::new(), "sales.sale")], ExpectedVersion::Any).unwrap();

        let filter = EventFilter {
            aggregate_type: Some("sales.sale".to_string()),
            ..Default::default()
        };
        let page = store.query_events(t, filter, Pagination::new(Some(1), None)).await.unwrap();

        assert_eq!(page.total, 2);
        assert!(page.has_more);
        assert_eq!(page.events[0].aggregate_id, sale);
        assert_eq!(page.events[0].sequence_number, 2);

        let id = page.events[0].event_id;
        assert!(store.get_event_by_id(t, id).await.unwrap().is_some());
        assert!(store.get_event_by_id(TenantId::new(), id).await.unwrap().is_none());
    }
}
