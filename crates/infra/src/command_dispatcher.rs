//! Command execution pipeline.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store (tenant-scoped)
//!   ↓
//! 2. Rehydrate aggregate (apply history)
//!   ↓
//! 3. Handle command (pure decision, produces events)
//!   ↓
//! 4. Append events (ExpectedVersion::Exact(current))
//!   ↓
//! 5. Publish committed events to the bus
//! ```
//!
//! Nothing is published unless the append succeeded. If publication fails
//! after the append, the events are durable and the error is still surfaced
//! (at-least-once delivery; projections are idempotent on sequence number).

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

use stockledger_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, TenantId};
use stockledger_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Stale aggregate version; another writer appended first.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// The aggregate is in a state that does not allow the command.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    /// A stored payload no longer decodes into the aggregate's event type.
    #[error("failed to decode stored event: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),

    /// Publication failed after a successful append.
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl DispatchError {
    /// Stable machine-readable code, used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::Concurrency(_) => "concurrency_conflict",
            DispatchError::Conflict(_) => "conflict",
            DispatchError::TenantIsolation(_) => "tenant_isolation",
            DispatchError::Validation(_) => "validation_error",
            DispatchError::InvariantViolation(_) => "invariant_violation",
            DispatchError::Unauthorized => "unauthorized",
            DispatchError::NotFound(_) => "not_found",
            DispatchError::Deserialize(_) => "corrupt_stream",
            DispatchError::Store(_) => "storage_error",
            DispatchError::Publish(_) => "publish_failed",
        }
    }
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg),
            EventStoreError::Publish(msg) => DispatchError::Publish(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound(what) => DispatchError::NotFound(what),
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Generic over the store and the bus so tests run on the in-memory pair and
/// production swaps in Postgres without touching domain code.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Rehydrate an aggregate without changing anything.
    ///
    /// Workflows use this to dry-run a command with `handle` before touching a
    /// second stream.
    pub fn load<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;
        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Run one command through load → handle → append → publish.
    ///
    /// Returns the committed events; an empty vector when the command decided
    /// nothing. A concurrent append between load and append surfaces as
    /// [`DispatchError::Concurrency`].
    #[instrument(
        skip(self, command, make_aggregate),
        fields(tenant_id = %tenant_id, aggregate_id = %aggregate_id, aggregate_type = tracing::field::Empty)
    )]
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: stockledger_events::Event + Serialize + DeserializeOwned,
    {
        let aggregate_type = aggregate_type.into();
        tracing::Span::current().record("aggregate_type", aggregate_type.as_str());

        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        let decided = aggregate.handle(&command)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    tenant_id,
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        for stored in &committed {
            debug!(event_type = %stored.event_type, sequence_number = stored.sequence_number, "event committed");
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

/// Re-check what the backend returned: right tenant, right aggregate,
/// strictly increasing sequence numbers.
fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong tenant_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::Backend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;

    use stockledger_core::Money;
    use stockledger_debts::{Debt, DebtCommand, DebtDirection, DebtId, DebtOrigin, OpenDebt, RecordRepayment};
    use stockledger_events::InMemoryEventBus;
    use stockledger_parties::PartyId;

    use crate::event_store::InMemoryEventStore;

    type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    fn dispatcher() -> Dispatcher {
        CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new()))
    }

    fn open(tenant_id: TenantId, debt_id: DebtId, principal: i64) -> DebtCommand {
        DebtCommand::OpenDebt(OpenDebt {
            tenant_id,
            debt_id,
            direction: DebtDirection::Receivable,
            party_id: PartyId::new(AggregateId::new()),
            origin: DebtOrigin::Manual,
            principal: Money::from_cents(principal),
            due_date: None,
            occurred_at: Utc::now(),
        })
    }

    fn repay(tenant_id: TenantId, debt_id: DebtId, amount: i64) -> DebtCommand {
        DebtCommand::RecordRepayment(RecordRepayment {
            tenant_id,
            debt_id,
            amount: Money::from_cents(amount),
            note: None,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn dispatch_appends_and_publishes_in_order() {
        let d = dispatcher();
        let sub = d.bus().subscribe();
        let tenant = TenantId::new();
        let id = DebtId::new(AggregateId::new());

        d.dispatch::<Debt>(tenant, id.0, "debts.debt", open(tenant, id, 1000), |_, a| Debt::empty(DebtId::new(a)))
            .unwrap();
        let committed = d
            .dispatch::<Debt>(tenant, id.0, "debts.debt", repay(tenant, id, 1000), |_, a| Debt::empty(DebtId::new(a)))
            .unwrap();

        // repayment + settled
        assert_eq!(committed.len(), 2);
        assert_eq!(committed[1].event_type, "debts.debt.settled");
        let seqs: Vec<u64> = std::iter::from_fn(|| sub.try_recv().ok()).map(|e| e.sequence_number()).collect();
        assert_eq!(seqs, vec![1, 2, 3]);

        let debt = d.load::<Debt>(tenant, id.0, |_, a| Debt::empty(DebtId::new(a))).unwrap();
        assert!(debt.outstanding().is_zero());
    }

    #[test]
    fn domain_errors_map_and_nothing_is_published() {
        let d = dispatcher();
        let sub = d.bus().subscribe();
        let tenant = TenantId::new();
        let id = DebtId::new(AggregateId::new());

        let err = d
            .dispatch::<Debt>(tenant, id.0, "debts.debt", repay(tenant, id, 10), |_, a| Debt::empty(DebtId::new(a)))
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotFound(_)));

        let err = d
            .dispatch::<Debt>(tenant, id.0, "debts.debt", open(tenant, id, 0), |_, a| Debt::empty(DebtId::new(a)))
            .unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
        assert!(sub.try_recv().is_err());
    }

    #[test]
    fn other_tenant_cannot_see_the_stream() {
        let d = dispatcher();
        let tenant = TenantId::new();
        let id = DebtId::new(AggregateId::new());
        d.dispatch::<Debt>(tenant, id.0, "debts.debt", open(tenant, id, 500), |_, a| Debt::empty(DebtId::new(a)))
            .unwrap();

        let intruder = TenantId::new();
        let err = d
            .dispatch::<Debt>(intruder, id.0, "debts.debt", repay(intruder, id, 100), |_, a| {
                Debt::empty(DebtId::new(a))
            })
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotFound(_)));
    }
}
