//! Multi-aggregate workflows.
//!
//! Each workflow is a sequence of dispatches against different streams. There
//! is no cross-stream transaction: when a later step fails, the earlier ones
//! are compensated with explicit commands, and the original error is
//! returned. Every batch a workflow commits, compensations included, is
//! handed to its [`CommitSink`] as soon as the append succeeds, so a failed
//! workflow leaves the read models matching the log.

mod debts;
mod import;
mod purchasing;
mod sales;
mod stock;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::debug;

use stockledger_accounting::{EntryDraft, JournalCommand, Ledger, LedgerId, PostJournalEntry};
use stockledger_catalog::{Product, ProductId, Variation, VariantKey};
use stockledger_core::{Aggregate, DomainError, TenantId};
use stockledger_debts::{Debt, DebtId};
use stockledger_events::{EventBus, EventEnvelope};
use stockledger_parties::{Party, PartyId, PartyKind};
use stockledger_purchasing::{Purchase, PurchaseId};
use stockledger_sales::{Sale, SaleId};
use stockledger_storage::{Storage, StorageId};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, StoredEvent};
use crate::projections::{DEBT, LEDGER_AGGREGATE_TYPE, PARTY, PRODUCT, PURCHASE, SALE, STORAGE};

pub use debts::debt_id_for;
pub use import::{CatalogImportOutcome, ImportedProduct, PartyImportOutcome};
pub use purchasing::NewPurchaseLine;

/// Receives each batch a workflow commits, in commit order.
pub trait CommitSink: Sync {
    fn committed(&self, events: &[StoredEvent]);
}

/// Workflow entry points over one dispatcher.
pub struct Workflows<'a, S, B> {
    dispatcher: &'a CommandDispatcher<S, B>,
    sink: Option<&'a dyn CommitSink>,
}

impl<'a, S, B> Workflows<'a, S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: &'a CommandDispatcher<S, B>) -> Self {
        Self { dispatcher, sink: None }
    }

    pub fn with_sink(mut self, sink: &'a dyn CommitSink) -> Self {
        self.sink = Some(sink);
        self
    }

    fn record(&self, result: Result<Vec<StoredEvent>, DispatchError>) -> Result<Vec<StoredEvent>, DispatchError> {
        if let (Ok(events), Some(sink)) = (&result, self.sink) {
            sink.committed(events);
        }
        result
    }

    fn product(&self, tenant_id: TenantId, id: ProductId) -> Result<Product, DispatchError> {
        self.dispatcher.load(tenant_id, id.0, |_, a| Product::empty(ProductId::new(a)))
    }

    fn storage(&self, tenant_id: TenantId, id: StorageId) -> Result<Storage, DispatchError> {
        let storage = self.dispatcher.load(tenant_id, id.0, |_, a| Storage::empty(StorageId::new(a)))?;
        if !storage.is_created() {
            return Err(DispatchError::NotFound(format!("storage {id}")));
        }
        Ok(storage)
    }

    fn party(&self, tenant_id: TenantId, id: PartyId) -> Result<Party, DispatchError> {
        self.dispatcher.load(tenant_id, id.0, |_, a| Party::empty(PartyId::new(a)))
    }

    fn sale(&self, tenant_id: TenantId, id: SaleId) -> Result<Sale, DispatchError> {
        let sale = self.dispatcher.load(tenant_id, id.0, |_, a| Sale::empty(SaleId::new(a)))?;
        if !sale.is_created() {
            return Err(DispatchError::NotFound(format!("sale {id}")));
        }
        Ok(sale)
    }

    fn purchase(&self, tenant_id: TenantId, id: PurchaseId) -> Result<Purchase, DispatchError> {
        let purchase = self.dispatcher.load(tenant_id, id.0, |_, a| Purchase::empty(PurchaseId::new(a)))?;
        if !purchase.is_created() {
            return Err(DispatchError::NotFound(format!("purchase {id}")));
        }
        Ok(purchase)
    }

    fn debt(&self, tenant_id: TenantId, id: DebtId) -> Result<Debt, DispatchError> {
        self.dispatcher.load(tenant_id, id.0, |_, a| Debt::empty(DebtId::new(a)))
    }

    /// Active party of the expected kind.
    fn active_party(&self, tenant_id: TenantId, id: PartyId, kind: PartyKind) -> Result<Party, DispatchError> {
        let party = self.party(tenant_id, id)?;
        if party.tenant_id().is_none() {
            return Err(DispatchError::NotFound(format!("party {id}")));
        }
        if party.kind() != kind {
            let expected = match kind {
                PartyKind::Customer => "customer",
                PartyKind::Supplier => "supplier",
            };
            return Err(DomainError::validation(format!("party {id} is not a {expected}")).into());
        }
        if !party.can_transact() {
            return Err(DomainError::conflict(format!("party {id} is suspended")).into());
        }
        Ok(party)
    }

    /// The tradable variation behind a key.
    fn tradable(&self, tenant_id: TenantId, key: VariantKey) -> Result<Variation, DispatchError> {
        let product = self.product(tenant_id, key.product_id)?;
        if !product.is_created() {
            return Err(DispatchError::NotFound(format!("product {}", key.product_id)));
        }
        let variation = product
            .variation(key.variation_id)
            .ok_or_else(|| DispatchError::NotFound(format!("variation {}", key.variation_id)))?;
        if !product.can_trade(key.variation_id) {
            return Err(DomainError::conflict(format!("variation {} cannot be traded", variation.sku)).into());
        }
        Ok(variation.clone())
    }

    fn dispatch_product(
        &self,
        tenant_id: TenantId,
        id: ProductId,
        cmd: stockledger_catalog::ProductCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.record(
            self.dispatcher
                .dispatch::<Product>(tenant_id, id.0, PRODUCT, cmd, |_, a| Product::empty(ProductId::new(a))),
        )
    }

    fn dispatch_storage(
        &self,
        tenant_id: TenantId,
        id: StorageId,
        cmd: stockledger_storage::StorageCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.record(
            self.dispatcher
                .dispatch::<Storage>(tenant_id, id.0, STORAGE, cmd, |_, a| Storage::empty(StorageId::new(a))),
        )
    }

    fn dispatch_party(
        &self,
        tenant_id: TenantId,
        id: PartyId,
        cmd: stockledger_parties::PartyCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.record(
            self.dispatcher
                .dispatch::<Party>(tenant_id, id.0, PARTY, cmd, |_, a| Party::empty(PartyId::new(a))),
        )
    }

    fn dispatch_sale(
        &self,
        tenant_id: TenantId,
        id: SaleId,
        cmd: stockledger_sales::SaleCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.record(
            self.dispatcher
                .dispatch::<Sale>(tenant_id, id.0, SALE, cmd, |_, a| Sale::empty(SaleId::new(a))),
        )
    }

    fn dispatch_purchase(
        &self,
        tenant_id: TenantId,
        id: PurchaseId,
        cmd: stockledger_purchasing::PurchaseCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.record(
            self.dispatcher
                .dispatch::<Purchase>(tenant_id, id.0, PURCHASE, cmd, |_, a| Purchase::empty(PurchaseId::new(a))),
        )
    }

    fn dispatch_debt(
        &self,
        tenant_id: TenantId,
        id: DebtId,
        cmd: stockledger_debts::DebtCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.record(
            self.dispatcher
                .dispatch::<Debt>(tenant_id, id.0, DEBT, cmd, |_, a| Debt::empty(DebtId::new(a))),
        )
    }

    /// Post a manual (or otherwise pre-built) entry to the tenant ledger.
    pub fn post_entry(&self, cmd: PostJournalEntry) -> Result<Vec<StoredEvent>, DispatchError> {
        let tenant_id = cmd.tenant_id;
        let ledger_id = LedgerId::for_tenant(tenant_id);
        self.record(self.dispatcher.dispatch::<Ledger>(
            tenant_id,
            ledger_id.0,
            LEDGER_AGGREGATE_TYPE,
            JournalCommand::PostJournalEntry(cmd),
            |_, a| Ledger::empty(LedgerId::new(a)),
        ))
    }

    /// Post derived entries, skipping any the ledger already holds.
    fn post_drafts(
        &self,
        tenant_id: TenantId,
        drafts: impl IntoIterator<Item = EntryDraft>,
        out: &mut Vec<StoredEvent>,
    ) -> Result<(), DispatchError> {
        let ledger_id = LedgerId::for_tenant(tenant_id);
        let ledger = self
            .dispatcher
            .load(tenant_id, ledger_id.0, |_, a| Ledger::empty(LedgerId::new(a)))?;
        for draft in drafts {
            if ledger.has_entry(draft.entry_id) {
                debug!(%tenant_id, entry_id = %draft.entry_id, "entry already posted");
                continue;
            }
            out.extend(self.post_entry(draft.into_command(tenant_id, Utc::now()))?);
        }
        Ok(())
    }
}

/// Decode the committed events of one stream back into domain events.
fn decode<E: DeserializeOwned>(events: &[StoredEvent]) -> Result<Vec<E>, DispatchError> {
    events
        .iter()
        .map(|e| serde_json::from_value(e.payload.clone()).map_err(|err| DispatchError::Deserialize(err.to_string())))
        .collect()
}

/// Run a command against a local copy, applying what it decides.
fn dry_run<A: Aggregate<Error = DomainError>>(aggregate: &mut A, command: &A::Command) -> Result<(), DispatchError> {
    for event in aggregate.handle(command)? {
        aggregate.apply(&event);
    }
    Ok(())
}

#[cfg(test)]
mod tests;
