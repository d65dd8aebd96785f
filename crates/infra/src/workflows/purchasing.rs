use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{error, info, instrument};

use stockledger_accounting::postings;
use stockledger_catalog::VariantKey;
use stockledger_core::{Money, TenantId};
use stockledger_debts::{DebtCommand, DebtDirection, DebtOrigin, OpenDebt};
use stockledger_events::{EventBus, EventEnvelope};
use stockledger_parties::{PartyId, PartyKind};
use stockledger_purchasing::{
    AddLine, AllocateToStorage, CreatePurchase, Purchase, PurchaseCommand, PurchaseEvent, PurchaseId,
    ReceiveGoods, ReceivedQuantity, RecordPayment, RevertAllocation,
};
use stockledger_storage::{AllocateStock, StockSource, StorageCommand, StorageId};

use super::debts::purchase_debt_id;
use super::{Workflows, decode, dry_run};
use crate::command_dispatcher::DispatchError;
use crate::event_store::{EventStore, StoredEvent};

/// A line of a new purchase. Without a cost the variation's purchase cost is used.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewPurchaseLine {
    pub key: VariantKey,
    pub quantity: u64,
    #[serde(default)]
    pub unit_cost: Option<Money>,
}

impl<S, B> Workflows<'_, S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Create a draft purchase with its lines.
    ///
    /// The whole draft is validated against a local aggregate first, so a bad
    /// line leaves nothing behind.
    pub fn create_purchase(
        &self,
        tenant_id: TenantId,
        purchase_id: PurchaseId,
        supplier_id: PartyId,
        reference: Option<String>,
        lines: Vec<NewPurchaseLine>,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.active_party(tenant_id, supplier_id, PartyKind::Supplier)?;

        let mut commands = vec![PurchaseCommand::CreatePurchase(CreatePurchase {
            tenant_id,
            purchase_id,
            supplier_id,
            reference,
            occurred_at: Utc::now(),
        })];
        for line in lines {
            let variation = self.tradable(tenant_id, line.key)?;
            commands.push(PurchaseCommand::AddLine(AddLine {
                tenant_id,
                purchase_id,
                key: line.key,
                quantity: line.quantity,
                unit_cost: line.unit_cost.unwrap_or(variation.purchase_cost),
                occurred_at: Utc::now(),
            }));
        }

        let mut draft = Purchase::empty(purchase_id);
        for cmd in &commands {
            dry_run(&mut draft, cmd)?;
        }

        let mut out = Vec::new();
        for cmd in commands {
            out.extend(self.dispatch_purchase(tenant_id, purchase_id, cmd)?);
        }
        Ok(out)
    }

    /// Receive goods, post the inventory entry and open a payable for
    /// whatever was not paid on receipt.
    #[instrument(skip(self, quantities), fields(tenant_id = %tenant_id, purchase_id = %purchase_id))]
    pub fn receive_purchase(
        &self,
        tenant_id: TenantId,
        purchase_id: PurchaseId,
        quantities: Vec<ReceivedQuantity>,
        paid_on_receipt: Money,
        due_date: Option<NaiveDate>,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        let received = self.dispatch_purchase(
            tenant_id,
            purchase_id,
            PurchaseCommand::ReceiveGoods(ReceiveGoods {
                tenant_id,
                purchase_id,
                quantities,
                paid_on_receipt,
                occurred_at: Utc::now(),
            }),
        )?;
        let decoded: Vec<PurchaseEvent> = decode(&received)?;
        let mut out = received;

        for event in &decoded {
            let PurchaseEvent::GoodsReceived(goods) = event else {
                continue;
            };
            let unpaid = goods.received_total - goods.paid_on_receipt;
            if unpaid.is_positive() {
                let debt_id = purchase_debt_id(purchase_id);
                out.extend(self.dispatch_debt(
                    tenant_id,
                    debt_id,
                    DebtCommand::OpenDebt(OpenDebt {
                        tenant_id,
                        debt_id,
                        direction: DebtDirection::Payable,
                        party_id: goods.supplier_id,
                        origin: DebtOrigin::Purchase { purchase_id: purchase_id.0 },
                        principal: unpaid,
                        due_date,
                        occurred_at: Utc::now(),
                    }),
                )?);
            }
            self.post_drafts(tenant_id, postings::goods_received(goods), &mut out)?;
            info!(received_total = %goods.received_total, unpaid = %unpaid, "goods received");
        }
        Ok(out)
    }

    /// One step of the put-away wizard.
    ///
    /// The storage side is dry-run first so capacity and inactive-storage
    /// errors come back before the purchase changes. If the storage append
    /// still fails, the purchase step is reverted.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, purchase_id = %purchase_id, storage_id = %storage_id))]
    pub fn allocate_to_storage(
        &self,
        tenant_id: TenantId,
        purchase_id: PurchaseId,
        line_no: u32,
        storage_id: StorageId,
        quantity: u64,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        let purchase = self.purchase(tenant_id, purchase_id)?;
        let key = purchase
            .line(line_no)
            .map(|l| l.key)
            .ok_or_else(|| DispatchError::NotFound(format!("purchase line {line_no}")))?;

        let allocate = StorageCommand::AllocateStock(AllocateStock {
            tenant_id,
            storage_id,
            key,
            quantity,
            source: StockSource::Purchase { purchase_id: purchase_id.0 },
            occurred_at: Utc::now(),
        });
        let mut storage = self.storage(tenant_id, storage_id)?;
        dry_run(&mut storage, &allocate)?;

        let mut out = self.dispatch_purchase(
            tenant_id,
            purchase_id,
            PurchaseCommand::AllocateToStorage(AllocateToStorage {
                tenant_id,
                purchase_id,
                line_no,
                storage_id,
                quantity,
                occurred_at: Utc::now(),
            }),
        )?;

        match self.dispatch_storage(tenant_id, storage_id, allocate) {
            Ok(events) => {
                out.extend(events);
                Ok(out)
            }
            Err(err) => {
                let revert = PurchaseCommand::RevertAllocation(RevertAllocation {
                    tenant_id,
                    purchase_id,
                    line_no,
                    storage_id,
                    quantity,
                    occurred_at: Utc::now(),
                });
                match self.dispatch_purchase(tenant_id, purchase_id, revert) {
                    Ok(events) => out.extend(events),
                    Err(revert_err) => error!(error = %revert_err, "failed to revert purchase allocation"),
                }
                Err(err)
            }
        }
    }

    /// Pay a supplier and repay the purchase's payable.
    pub fn record_purchase_payment(
        &self,
        tenant_id: TenantId,
        purchase_id: PurchaseId,
        amount: Money,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        let debt = self.open_document_debt(tenant_id, purchase_debt_id(purchase_id))?;
        let mut out = self.dispatch_purchase(
            tenant_id,
            purchase_id,
            PurchaseCommand::RecordPayment(RecordPayment {
                tenant_id,
                purchase_id,
                amount,
                occurred_at: Utc::now(),
            }),
        )?;
        if let Some(debt) = &debt {
            self.repay_and_post(tenant_id, debt, amount, Some("purchase payment".to_string()), &mut out)?;
        }
        Ok(out)
    }
}
