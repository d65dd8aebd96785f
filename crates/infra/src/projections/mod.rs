//! Read side: projections fed by published envelopes.
//!
//! Every projection is tenant-isolated, idempotent under at-least-once
//! delivery and rebuildable from the event log.

pub mod aggregate;
pub mod catalog;
pub mod cursor;
pub mod debts;
pub mod ledger;
pub mod parties;
pub mod purchases;
pub mod sales;
pub mod storages;

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use stockledger_accounting::JournalEntryPosted;
use stockledger_catalog::{Product, ProductId};
use stockledger_core::AggregateId;
use stockledger_debts::{Debt, DebtId};
use stockledger_events::EventEnvelope;
use stockledger_parties::{Party, PartyId};
use stockledger_purchasing::{Purchase, PurchaseId};
use stockledger_sales::{Sale, SaleId};
use stockledger_storage::{Storage, StorageId};

use crate::event_store::{EventStore, EventStoreError, StoredEvent};
use crate::read_model::InMemoryTenantStore;
use crate::workflows::CommitSink;

pub use aggregate::AggregateProjection;
pub use catalog::ProductView;
pub use cursor::StreamCursors;
pub use debts::{DebtFilter, DebtView, PartyBalance};
pub use ledger::{LEDGER_AGGREGATE_TYPE, LedgerProjection};
pub use parties::PartyView;
pub use purchases::{AllocationLine, AllocationPlan, PurchaseView};
pub use sales::SaleView;
pub use storages::{StockLevel, StorageView};

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("failed to deserialize {aggregate_type} event: {message}")]
    Deserialize { aggregate_type: &'static str, message: String },

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
}

pub const PRODUCT: &str = "catalog.product";
pub const STORAGE: &str = "storage.storage";
pub const PARTY: &str = "parties.party";
pub const PURCHASE: &str = "purchasing.purchase";
pub const SALE: &str = "sales.sale";
pub const DEBT: &str = "debts.debt";

pub type MemoryProjection<A> = AggregateProjection<A, InMemoryTenantStore<AggregateId, A>>;

/// All read models of the application behind one `apply` entry point.
pub struct ReadModels {
    pub products: MemoryProjection<Product>,
    pub storages: MemoryProjection<Storage>,
    pub parties: MemoryProjection<Party>,
    pub purchases: MemoryProjection<Purchase>,
    pub sales: MemoryProjection<Sale>,
    pub debts: MemoryProjection<Debt>,
    pub ledger: LedgerProjection<InMemoryTenantStore<Uuid, JournalEntryPosted>>,
}

impl Default for ReadModels {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadModels {
    pub fn new() -> Self {
        Self {
            products: AggregateProjection::new(PRODUCT, |id| Product::empty(ProductId::new(id)), InMemoryTenantStore::new()),
            storages: AggregateProjection::new(STORAGE, |id| Storage::empty(StorageId::new(id)), InMemoryTenantStore::new()),
            parties: AggregateProjection::new(PARTY, |id| Party::empty(PartyId::new(id)), InMemoryTenantStore::new()),
            purchases: AggregateProjection::new(PURCHASE, |id| Purchase::empty(PurchaseId::new(id)), InMemoryTenantStore::new()),
            sales: AggregateProjection::new(SALE, |id| Sale::empty(SaleId::new(id)), InMemoryTenantStore::new()),
            debts: AggregateProjection::new(DEBT, |id| Debt::empty(DebtId::new(id)), InMemoryTenantStore::new()),
            ledger: LedgerProjection::new(InMemoryTenantStore::new()),
        }
    }

    /// Routes an envelope to the projection owning its aggregate type.
    pub fn apply(&self, envelope: &EventEnvelope<JsonValue>) -> Result<bool, ProjectionError> {
        match envelope.aggregate_type() {
            PRODUCT => self.products.apply_envelope(envelope),
            STORAGE => self.storages.apply_envelope(envelope),
            PARTY => self.parties.apply_envelope(envelope),
            PURCHASE => self.purchases.apply_envelope(envelope),
            SALE => self.sales.apply_envelope(envelope),
            DEBT => self.debts.apply_envelope(envelope),
            LEDGER_AGGREGATE_TYPE => self.ledger.apply_envelope(envelope),
            other => {
                debug!(aggregate_type = other, "no projection for aggregate type");
                Ok(false)
            }
        }
    }

    /// Like `apply`, but failures are logged instead of returned.
    pub fn apply_logged(&self, envelope: &EventEnvelope<JsonValue>) -> bool {
        match self.apply(envelope) {
            Ok(changed) => changed,
            Err(err) => {
                warn!(
                    tenant_id = %envelope.tenant_id(),
                    aggregate_id = %envelope.aggregate_id(),
                    aggregate_type = envelope.aggregate_type(),
                    sequence_number = envelope.sequence_number(),
                    error = %err,
                    "projection failed to apply event"
                );
                false
            }
        }
    }

    pub fn reset(&self) {
        self.products.reset();
        self.storages.reset();
        self.parties.reset();
        self.purchases.reset();
        self.sales.reset();
        self.debts.reset();
        self.ledger.reset();
    }

    /// Drops all state and replays the whole log in commit order.
    ///
    /// Returns the number of events that changed a read model.
    pub fn rebuild<S: EventStore>(&self, store: &S) -> Result<usize, EventStoreError> {
        self.reset();
        let events = store.load_all()?;
        let total = events.len();
        let applied = events
            .iter()
            .filter(|e| self.apply_logged(&e.to_envelope()))
            .count();
        debug!(total, applied, "read models rebuilt");
        Ok(applied)
    }
}

impl CommitSink for ReadModels {
    fn committed(&self, events: &[StoredEvent]) {
        for e in events {
            self.apply_logged(&e.to_envelope());
        }
    }
}
