use chrono::{NaiveDate, Utc};
use serde_json::Value as JsonValue;
use tracing::{instrument, warn};
use uuid::Uuid;

use stockledger_accounting::postings;
use stockledger_core::{AggregateId, DomainError, Money, TenantId};
use stockledger_debts::{
    Debt, DebtCommand, DebtDirection, DebtEvent, DebtId, DebtOrigin, DebtStatus, OpenDebt, RecordRepayment,
    WriteOff,
};
use stockledger_events::{EventBus, EventEnvelope};
use stockledger_parties::{PartyId, PartyKind};
use stockledger_purchasing::{PurchaseCommand, PurchaseId, RecordPayment as PurchasePayment};
use stockledger_sales::{RecordPayment as SalePayment, SaleCommand, SaleId};

use super::{Workflows, decode};
use crate::command_dispatcher::DispatchError;
use crate::event_store::{EventStore, StoredEvent};

const DEBT_NAMESPACE: Uuid = Uuid::from_u128(0x9d4f_2a61_c3b8_4e07_8f12_6b5a_e0d9_3c48);

/// The receivable opened by a sale.
pub(crate) fn sale_debt_id(sale_id: SaleId) -> DebtId {
    derived(&format!("sale:{sale_id}"))
}

/// The payable opened by a purchase receipt.
pub(crate) fn purchase_debt_id(purchase_id: PurchaseId) -> DebtId {
    derived(&format!("purchase:{purchase_id}"))
}

/// Document debts have a stable id derived from their origin; manual ones don't.
pub fn debt_id_for(origin: &DebtOrigin) -> Option<DebtId> {
    match origin {
        DebtOrigin::Sale { sale_id } => Some(sale_debt_id(SaleId::new(*sale_id))),
        DebtOrigin::Purchase { purchase_id } => Some(purchase_debt_id(PurchaseId::new(*purchase_id))),
        DebtOrigin::Manual => None,
    }
}

fn derived(name: &str) -> DebtId {
    DebtId::new(AggregateId::from_uuid(Uuid::new_v5(&DEBT_NAMESPACE, name.as_bytes())))
}

impl<S, B> Workflows<'_, S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Open a manual debt against an existing party.
    pub fn open_manual_debt(
        &self,
        tenant_id: TenantId,
        debt_id: DebtId,
        direction: DebtDirection,
        party_id: PartyId,
        principal: Money,
        due_date: Option<NaiveDate>,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        let kind = match direction {
            DebtDirection::Receivable => PartyKind::Customer,
            DebtDirection::Payable => PartyKind::Supplier,
        };
        self.active_party(tenant_id, party_id, kind)?;
        self.dispatch_debt(
            tenant_id,
            debt_id,
            DebtCommand::OpenDebt(OpenDebt {
                tenant_id,
                debt_id,
                direction,
                party_id,
                origin: DebtOrigin::Manual,
                principal,
                due_date,
                occurred_at: Utc::now(),
            }),
        )
    }

    /// Repay a debt, post the cash movement and mirror the payment on the
    /// sale or purchase the debt came from.
    #[instrument(skip(self, note), fields(tenant_id = %tenant_id, debt_id = %debt_id))]
    pub fn repay_debt(
        &self,
        tenant_id: TenantId,
        debt_id: DebtId,
        amount: Money,
        note: Option<String>,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        let debt = self.debt(tenant_id, debt_id)?;
        let mut out = Vec::new();
        self.repay_and_post(tenant_id, &debt, amount, note, &mut out)?;

        let mirrored = match debt.origin() {
            DebtOrigin::Sale { sale_id } => {
                let sale_id = SaleId::new(sale_id);
                self.dispatch_sale(
                    tenant_id,
                    sale_id,
                    SaleCommand::RecordPayment(SalePayment {
                        tenant_id,
                        sale_id,
                        amount,
                        occurred_at: Utc::now(),
                    }),
                )
            }
            DebtOrigin::Purchase { purchase_id } => {
                let purchase_id = PurchaseId::new(purchase_id);
                self.dispatch_purchase(
                    tenant_id,
                    purchase_id,
                    PurchaseCommand::RecordPayment(PurchasePayment {
                        tenant_id,
                        purchase_id,
                        amount,
                        occurred_at: Utc::now(),
                    }),
                )
            }
            DebtOrigin::Manual => Ok(Vec::new()),
        };
        match mirrored {
            Ok(events) => out.extend(events),
            // The debt is the record of what is owed; the document total is informational.
            Err(err) => warn!(error = %err, "repayment not mirrored on the origin document"),
        }
        Ok(out)
    }

    /// The debt a document payment settles, if the document opened one.
    ///
    /// A settled or written-off debt refuses the payment: the cash would
    /// otherwise be recorded on the document with no ledger movement.
    pub(super) fn open_document_debt(
        &self,
        tenant_id: TenantId,
        debt_id: DebtId,
    ) -> Result<Option<Debt>, DispatchError> {
        let debt = self.debt(tenant_id, debt_id)?;
        if !debt.is_created() {
            return Ok(None);
        }
        match debt.status() {
            DebtStatus::Open => Ok(Some(debt)),
            status => Err(DomainError::conflict(format!("debt {debt_id} is {status:?}; payment not accepted")).into()),
        }
    }

    pub(super) fn repay_and_post(
        &self,
        tenant_id: TenantId,
        debt: &Debt,
        amount: Money,
        note: Option<String>,
        out: &mut Vec<StoredEvent>,
    ) -> Result<(), DispatchError> {
        let debt_id = debt.id_typed();
        let committed = self.dispatch_debt(
            tenant_id,
            debt_id,
            DebtCommand::RecordRepayment(RecordRepayment {
                tenant_id,
                debt_id,
                amount,
                note,
                occurred_at: Utc::now(),
            }),
        )?;
        let decoded: Vec<DebtEvent> = decode(&committed)?;
        out.extend(committed);
        let drafts = decoded.iter().filter_map(|e| match e {
            DebtEvent::RepaymentRecorded(r) => postings::debt_repayment(debt_id, debt.direction(), r),
            _ => None,
        });
        self.post_drafts(tenant_id, drafts.collect::<Vec<_>>(), out)
    }

    /// Write off the outstanding amount and post the loss (or the gain, for a payable).
    pub fn write_off_debt(
        &self,
        tenant_id: TenantId,
        debt_id: DebtId,
        reason: String,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        let mut out = self.dispatch_debt(
            tenant_id,
            debt_id,
            DebtCommand::WriteOff(WriteOff {
                tenant_id,
                debt_id,
                reason,
                occurred_at: Utc::now(),
            }),
        )?;
        let decoded: Vec<DebtEvent> = decode(&out)?;
        let drafts: Vec<_> = decoded
            .iter()
            .filter_map(|e| match e {
                DebtEvent::DebtWrittenOff(w) => postings::debt_written_off(w),
                _ => None,
            })
            .collect();
        self.post_drafts(tenant_id, drafts, &mut out)?;
        Ok(out)
    }
}
