use chrono::{NaiveDate, Utc};
use serde_json::Value as JsonValue;
use tracing::{error, info, instrument};

use stockledger_accounting::postings;
use stockledger_catalog::VariantKey;
use stockledger_core::{Money, TenantId};
use stockledger_debts::{DebtCommand, DebtDirection, DebtOrigin, DebtStatus, OpenDebt, WriteOff};
use stockledger_events::{EventBus, EventEnvelope};
use stockledger_parties::{PartyId, PartyKind};
use stockledger_sales::{
    AddLine, CompleteSale, CreateSale, RecordPayment, ReturnSale, SaleCommand, SaleEvent, SaleId, SaleLine,
};
use stockledger_storage::{AllocateStock, ReleaseReason, ReleaseStock, StockSource, StorageCommand};

use super::debts::sale_debt_id;
use super::{Workflows, decode, dry_run};
use crate::command_dispatcher::DispatchError;
use crate::event_store::{EventStore, StoredEvent};

impl<S, B> Workflows<'_, S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Open a draft sale. A named customer must exist and be active.
    pub fn create_sale(
        &self,
        tenant_id: TenantId,
        sale_id: SaleId,
        customer_id: Option<PartyId>,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        if let Some(customer) = customer_id {
            self.active_party(tenant_id, customer, PartyKind::Customer)?;
        }
        self.dispatch_sale(
            tenant_id,
            sale_id,
            SaleCommand::CreateSale(CreateSale {
                tenant_id,
                sale_id,
                customer_id,
                occurred_at: Utc::now(),
            }),
        )
    }

    /// Add a line priced from the catalog unless a price is given.
    ///
    /// The variation's current purchase cost is captured on the line for COGS.
    #[allow(clippy::too_many_arguments)]
    pub fn add_sale_line(
        &self,
        tenant_id: TenantId,
        sale_id: SaleId,
        key: VariantKey,
        storage_id: stockledger_storage::StorageId,
        quantity: u64,
        unit_price: Option<Money>,
        discount: Money,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        let variation = self.tradable(tenant_id, key)?;
        self.storage(tenant_id, storage_id)?;
        self.dispatch_sale(
            tenant_id,
            sale_id,
            SaleCommand::AddLine(AddLine {
                tenant_id,
                sale_id,
                key,
                storage_id,
                quantity,
                unit_price: unit_price.unwrap_or(variation.sale_price),
                discount,
                unit_cost: variation.purchase_cost,
                occurred_at: Utc::now(),
            }),
        )
    }

    /// Release stock for every line, complete the sale, open a receivable
    /// for any unpaid remainder and post revenue and cost entries.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, sale_id = %sale_id))]
    pub fn complete_sale(
        &self,
        tenant_id: TenantId,
        sale_id: SaleId,
        paid_amount: Money,
        due_date: Option<NaiveDate>,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        let mut sale = self.sale(tenant_id, sale_id)?;
        let complete = SaleCommand::CompleteSale(CompleteSale {
            tenant_id,
            sale_id,
            paid_amount,
            occurred_at: Utc::now(),
        });
        // Surface sale-level errors before any stock moves.
        dry_run(&mut sale.clone(), &complete)?;

        let mut out = Vec::new();
        let lines = sale.lines().to_vec();
        let mut released: Vec<&SaleLine> = Vec::new();
        for line in &lines {
            let release = StorageCommand::ReleaseStock(ReleaseStock {
                tenant_id,
                storage_id: line.storage_id,
                key: line.key,
                quantity: line.quantity,
                reason: ReleaseReason::Sale { sale_id: sale_id.0 },
                occurred_at: Utc::now(),
            });
            match self.dispatch_storage(tenant_id, line.storage_id, release) {
                Ok(events) => {
                    out.extend(events);
                    released.push(line);
                }
                Err(err) => {
                    out.extend(self.restock(tenant_id, sale_id, &released));
                    return Err(err);
                }
            }
        }

        let completed = match self.dispatch_sale(tenant_id, sale_id, complete) {
            Ok(events) => events,
            Err(err) => {
                out.extend(self.restock(tenant_id, sale_id, &released));
                return Err(err);
            }
        };
        let decoded: Vec<SaleEvent> = decode(&completed)?;
        out.extend(completed);
        sale = self.sale(tenant_id, sale_id)?;

        for event in &decoded {
            let SaleEvent::SaleCompleted(done) = event else {
                continue;
            };
            let unpaid = done.total - done.paid_amount;
            if let (true, Some(customer)) = (unpaid.is_positive(), done.customer_id) {
                let debt_id = sale_debt_id(sale_id);
                out.extend(self.dispatch_debt(
                    tenant_id,
                    debt_id,
                    DebtCommand::OpenDebt(OpenDebt {
                        tenant_id,
                        debt_id,
                        direction: DebtDirection::Receivable,
                        party_id: customer,
                        origin: DebtOrigin::Sale { sale_id: sale_id.0 },
                        principal: unpaid,
                        due_date,
                        occurred_at: Utc::now(),
                    }),
                )?);
            }
            self.post_drafts(tenant_id, postings::sale_completed(done), &mut out)?;
            info!(total = %done.total, paid = %done.paid_amount, outstanding = %sale.outstanding(), "sale completed");
        }
        Ok(out)
    }

    /// Record a payment on a completed sale and repay its receivable.
    pub fn record_sale_payment(
        &self,
        tenant_id: TenantId,
        sale_id: SaleId,
        amount: Money,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        let debt = self.open_document_debt(tenant_id, sale_debt_id(sale_id))?;
        let mut out = self.dispatch_sale(
            tenant_id,
            sale_id,
            SaleCommand::RecordPayment(RecordPayment {
                tenant_id,
                sale_id,
                amount,
                occurred_at: Utc::now(),
            }),
        )?;
        if let Some(debt) = &debt {
            self.repay_and_post(tenant_id, debt, amount, Some("sale payment".to_string()), &mut out)?;
        }
        Ok(out)
    }

    /// Full return: stock goes back to the storages it left, the sale entries
    /// are reversed and an open receivable is closed without a bad-debt entry.
    #[instrument(skip(self, reason), fields(tenant_id = %tenant_id, sale_id = %sale_id))]
    pub fn return_sale(
        &self,
        tenant_id: TenantId,
        sale_id: SaleId,
        reason: Option<String>,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        let sale = self.sale(tenant_id, sale_id)?;
        let ret = SaleCommand::ReturnSale(ReturnSale {
            tenant_id,
            sale_id,
            reason,
            occurred_at: Utc::now(),
        });
        dry_run(&mut sale.clone(), &ret)?;

        let mut out = Vec::new();
        let mut restocked: Vec<&SaleLine> = Vec::new();
        for line in sale.lines() {
            match self.dispatch_storage(tenant_id, line.storage_id, allocate_return(tenant_id, sale_id, line)) {
                Ok(events) => {
                    out.extend(events);
                    restocked.push(line);
                }
                Err(err) => {
                    out.extend(self.unstock(tenant_id, sale_id, &restocked));
                    return Err(err);
                }
            }
        }

        let returned = match self.dispatch_sale(tenant_id, sale_id, ret) {
            Ok(events) => events,
            Err(err) => {
                out.extend(self.unstock(tenant_id, sale_id, &restocked));
                return Err(err);
            }
        };
        let decoded: Vec<SaleEvent> = decode(&returned)?;
        out.extend(returned);

        let debt_id = sale_debt_id(sale_id);
        let debt = self.debt(tenant_id, debt_id)?;
        if debt.is_created() && debt.status() == DebtStatus::Open && debt.outstanding().is_positive() {
            // The return reversal already clears the receivable.
            out.extend(self.dispatch_debt(
                tenant_id,
                debt_id,
                DebtCommand::WriteOff(WriteOff {
                    tenant_id,
                    debt_id,
                    reason: "sale returned".to_string(),
                    occurred_at: Utc::now(),
                }),
            )?);
        }

        for event in &decoded {
            if let SaleEvent::SaleReturned(e) = event {
                self.post_drafts(tenant_id, postings::sale_returned(e), &mut out)?;
            }
        }
        Ok(out)
    }

    /// Compensation for released lines. Failures are logged; the caller is
    /// already returning an error.
    fn restock(&self, tenant_id: TenantId, sale_id: SaleId, lines: &[&SaleLine]) -> Vec<StoredEvent> {
        let mut out = Vec::new();
        for line in lines {
            match self.dispatch_storage(tenant_id, line.storage_id, allocate_return(tenant_id, sale_id, line)) {
                Ok(events) => out.extend(events),
                Err(err) => error!(
                    %tenant_id,
                    %sale_id,
                    storage_id = %line.storage_id,
                    error = %err,
                    "failed to restock a released sale line"
                ),
            }
        }
        out
    }

    fn unstock(&self, tenant_id: TenantId, sale_id: SaleId, lines: &[&SaleLine]) -> Vec<StoredEvent> {
        let mut out = Vec::new();
        for line in lines {
            let release = StorageCommand::ReleaseStock(ReleaseStock {
                tenant_id,
                storage_id: line.storage_id,
                key: line.key,
                quantity: line.quantity,
                reason: ReleaseReason::Sale { sale_id: sale_id.0 },
                occurred_at: Utc::now(),
            });
            match self.dispatch_storage(tenant_id, line.storage_id, release) {
                Ok(events) => out.extend(events),
                Err(err) => error!(
                    %tenant_id,
                    %sale_id,
                    storage_id = %line.storage_id,
                    error = %err,
                    "failed to undo a restocked return line"
                ),
            }
        }
        out
    }
}

fn allocate_return(tenant_id: TenantId, sale_id: SaleId, line: &SaleLine) -> StorageCommand {
    StorageCommand::AllocateStock(AllocateStock {
        tenant_id,
        storage_id: line.storage_id,
        key: line.key,
        quantity: line.quantity,
        source: StockSource::Return { sale_id: sale_id.0 },
        occurred_at: Utc::now(),
    })
}
