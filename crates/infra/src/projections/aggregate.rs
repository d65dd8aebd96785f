use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use stockledger_core::{Aggregate, AggregateId, TenantId};
use stockledger_events::EventEnvelope;

use super::ProjectionError;
use super::cursor::StreamCursors;
use crate::read_model::TenantStore;

/// Keeps the current state of every stream of one aggregate type.
///
/// Each event is folded with the aggregate's own `apply`, so the read side
/// can never disagree with what the write side decided. Views are derived
/// from the folded state on read.
pub struct AggregateProjection<A, S> {
    aggregate_type: &'static str,
    make: fn(AggregateId) -> A,
    store: S,
    cursors: StreamCursors,
    // Serializes check-fold-advance so concurrent deliveries cannot fold twice.
    apply_lock: Mutex<()>,
}

impl<A, S> AggregateProjection<A, S>
where
    A: Aggregate + Clone,
    A::Event: DeserializeOwned,
    S: TenantStore<AggregateId, A>,
{
    pub fn new(aggregate_type: &'static str, make: fn(AggregateId) -> A, store: S) -> Self {
        Self {
            aggregate_type,
            make,
            store,
            cursors: StreamCursors::new(),
            apply_lock: Mutex::new(()),
        }
    }

    pub fn aggregate_type(&self) -> &'static str {
        self.aggregate_type
    }

    /// Returns `Ok(true)` when the envelope changed the read model.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<bool, ProjectionError> {
        if envelope.aggregate_type() != self.aggregate_type {
            return Ok(false);
        }

        let _guard = self.apply_lock.lock().unwrap_or_else(|p| p.into_inner());
        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        if !self.cursors.should_apply(tenant_id, aggregate_id, seq)? {
            return Ok(false);
        }

        let event: A::Event = serde_json::from_value(envelope.payload().clone()).map_err(|e| {
            ProjectionError::Deserialize {
                aggregate_type: self.aggregate_type,
                message: e.to_string(),
            }
        })?;

        let mut state = self
            .store
            .get(tenant_id, &aggregate_id)
            .unwrap_or_else(|| (self.make)(aggregate_id));
        state.apply(&event);
        self.store.upsert(tenant_id, aggregate_id, state);
        self.cursors.advance(tenant_id, aggregate_id, seq);
        Ok(true)
    }

    pub fn get(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> Option<A> {
        self.store.get(tenant_id, &aggregate_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<A> {
        self.store.list(tenant_id)
    }

    pub fn reset(&self) {
        self.store.clear();
        self.cursors.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use uuid::Uuid;

    use stockledger_parties::{
        ContactInfo, CreateParty, Party, PartyCreated, PartyEvent, PartyId, PartyKind, PartySuspended,
        PartyStatus,
    };

    use crate::read_model::InMemoryTenantStore;

    fn envelope(tenant: TenantId, id: AggregateId, seq: u64, ev: &PartyEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(Uuid::now_v7(), tenant, id, "parties.party", seq, serde_json::to_value(ev).unwrap())
    }

    #[test]
    fn folds_events_and_ignores_redelivery() {
        let projection = AggregateProjection::new(
            "parties.party",
            |id| Party::empty(PartyId::new(id)),
            Arc::new(InMemoryTenantStore::new()),
        );
        let tenant = TenantId::new();
        let id = AggregateId::new();
        let create = CreateParty {
            tenant_id: tenant,
            party_id: PartyId::new(id),
            kind: PartyKind::Customer,
            name: "Ann".to_string(),
            contact: ContactInfo::default(),
            occurred_at: Utc::now(),
        };
        let created = PartyEvent::PartyCreated(PartyCreated {
            tenant_id: create.tenant_id,
            party_id: create.party_id,
            kind: create.kind,
            name: create.name.clone(),
            contact: create.contact.clone(),
            occurred_at: create.occurred_at,
        });
        let suspended = PartyEvent::PartySuspended(PartySuspended {
            tenant_id: tenant,
            party_id: PartyId::new(id),
            reason: None,
            occurred_at: Utc::now(),
        });

        assert!(projection.apply_envelope(&envelope(tenant, id, 1, &created)).unwrap());
        assert!(!projection.apply_envelope(&envelope(tenant, id, 1, &created)).unwrap());
        assert!(projection.apply_envelope(&envelope(tenant, id, 2, &suspended)).unwrap());

        let party = projection.get(tenant, id).unwrap();
        assert_eq!(party.name(), "Ann");
        assert_eq!(party.status(), PartyStatus::Suspended);
        assert!(projection.get(TenantId::new(), id).is_none());
    }

    #[test]
    fn other_aggregate_types_are_ignored() {
        let projection = AggregateProjection::new(
            "parties.party",
            |id| Party::empty(PartyId::new(id)),
            Arc::new(InMemoryTenantStore::new()),
        );
        let env = EventEnvelope::new(
            Uuid::now_v7(),
            TenantId::new(),
            AggregateId::new(),
            "sales.sale",
            1,
            serde_json::json!({"anything": true}),
        );
        assert!(!projection.apply_envelope(&env).unwrap());
    }
}
