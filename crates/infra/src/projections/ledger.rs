use std::sync::Mutex;

use serde_json::Value as JsonValue;
use uuid::Uuid;

use stockledger_accounting::{JournalEntryPosted, LedgerEvent};
use stockledger_core::TenantId;
use stockledger_events::EventEnvelope;

use super::ProjectionError;
use super::cursor::StreamCursors;
use crate::read_model::TenantStore;

pub const LEDGER_AGGREGATE_TYPE: &str = "accounting.ledger";

/// Posted journal entries per tenant, the input of every statement.
pub struct LedgerProjection<S> {
    store: S,
    cursors: StreamCursors,
    apply_lock: Mutex<()>,
}

impl<S> LedgerProjection<S>
where
    S: TenantStore<Uuid, JournalEntryPosted>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
            apply_lock: Mutex::new(()),
        }
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<bool, ProjectionError> {
        if envelope.aggregate_type() != LEDGER_AGGREGATE_TYPE {
            return Ok(false);
        }
        let _guard = self.apply_lock.lock().unwrap_or_else(|p| p.into_inner());
        let tenant_id = envelope.tenant_id();
        let seq = envelope.sequence_number();
        if !self.cursors.should_apply(tenant_id, envelope.aggregate_id(), seq)? {
            return Ok(false);
        }

        let LedgerEvent::JournalEntryPosted(entry) =
            serde_json::from_value(envelope.payload().clone()).map_err(|e| ProjectionError::Deserialize {
                aggregate_type: LEDGER_AGGREGATE_TYPE,
                message: e.to_string(),
            })?;
        if entry.tenant_id != tenant_id {
            return Err(ProjectionError::TenantIsolation(format!(
                "entry {} belongs to tenant {}",
                entry.entry_id, entry.tenant_id
            )));
        }

        self.store.upsert(tenant_id, entry.entry_id, entry);
        self.cursors.advance(tenant_id, envelope.aggregate_id(), seq);
        Ok(true)
    }

    /// Entries in posting order (date, then commit time).
    pub fn entries(&self, tenant_id: TenantId) -> Vec<JournalEntryPosted> {
        let mut entries = self.store.list(tenant_id);
        entries.sort_by(|a, b| {
            a.posted_on
                .cmp(&b.posted_on)
                .then_with(|| a.occurred_at.cmp(&b.occurred_at))
                .then_with(|| a.entry_id.cmp(&b.entry_id))
        });
        entries
    }

    pub fn reset(&self) {
        self.store.clear();
        self.cursors.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    use stockledger_accounting::{CashFlowCategory, EntrySource, JournalEntryLine, LedgerId, chart};
    use stockledger_core::Money;

    use crate::read_model::InMemoryTenantStore;

    fn posted(tenant: TenantId, day: u32, amount: i64) -> JournalEntryPosted {
        JournalEntryPosted {
            tenant_id: tenant,
            ledger_id: LedgerId::for_tenant(tenant),
            entry_id: Uuid::now_v7(),
            posted_on: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            description: "cash sale".to_string(),
            category: CashFlowCategory::Operating,
            source: EntrySource::Manual,
            lines: vec![
                JournalEntryLine::debit(chart::CASH.account(), Money::from_cents(amount)),
                JournalEntryLine::credit(chart::SALES_REVENUE.account(), Money::from_cents(amount)),
            ],
            occurred_at: Utc::now(),
        }
    }

    fn envelope(e: &JournalEntryPosted, seq: u64) -> EventEnvelope<JsonValue> {
        let payload = serde_json::to_value(LedgerEvent::JournalEntryPosted(e.clone())).unwrap();
        EventEnvelope::new(Uuid::now_v7(), e.tenant_id, e.ledger_id.0, LEDGER_AGGREGATE_TYPE, seq, payload)
    }

    #[test]
    fn entries_come_back_in_posting_order() {
        let projection = LedgerProjection::new(InMemoryTenantStore::new());
        let tenant = TenantId::new();
        let late = posted(tenant, 20, 500);
        let early = posted(tenant, 2, 300);

        assert!(projection.apply_envelope(&envelope(&late, 1)).unwrap());
        assert!(projection.apply_envelope(&envelope(&early, 2)).unwrap());
        assert!(!projection.apply_envelope(&envelope(&early, 2)).unwrap());

        let entries = projection.entries(tenant);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].entry_id, early.entry_id);
        assert!(projection.entries(TenantId::new()).is_empty());
    }

    #[test]
    fn a_gap_in_the_stream_is_rejected() {
        let projection = LedgerProjection::new(InMemoryTenantStore::new());
        let tenant = TenantId::new();
        projection.apply_envelope(&envelope(&posted(tenant, 1, 100), 1)).unwrap();
        let err = projection.apply_envelope(&envelope(&posted(tenant, 2, 100), 3)).unwrap_err();
        assert!(matches!(err, ProjectionError::NonMonotonicSequence { last: 1, found: 3 }));
    }
}
