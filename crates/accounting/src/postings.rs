//! Posting rules: pure functions from business events to balanced entries.
//!
//! Entry ids are derived (UUID v5) from the source document and the rule,
//! so posting the same fact twice is rejected by the ledger instead of
//! double counting.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockledger_core::{Money, TenantId};
use stockledger_debts::{DebtDirection, DebtId, DebtWrittenOff, RepaymentRecorded};
use stockledger_purchasing::GoodsReceived;
use stockledger_sales::{SaleCompleted, SaleReturned};

use crate::chart::{
    ACCOUNTS_PAYABLE, ACCOUNTS_RECEIVABLE, BAD_DEBT_EXPENSE, CASH, COST_OF_GOODS_SOLD, INVENTORY,
    SALES_REVENUE,
};
use crate::ledger::{CashFlowCategory, EntrySource, JournalEntryLine, LedgerId, PostJournalEntry};

const ENTRY_NAMESPACE: Uuid = Uuid::from_u128(0x5c1e_d6e2_7b0a_4f3e_9a51_0d2c_8e44_1b77);

/// A balanced entry ready to be posted to a tenant's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDraft {
    pub entry_id: Uuid,
    pub posted_on: NaiveDate,
    pub description: String,
    pub category: CashFlowCategory,
    pub source: EntrySource,
    pub lines: Vec<JournalEntryLine>,
}

impl EntryDraft {
    pub fn into_command(self, tenant_id: TenantId, occurred_at: DateTime<Utc>) -> PostJournalEntry {
        PostJournalEntry {
            tenant_id,
            ledger_id: LedgerId::for_tenant(tenant_id),
            entry_id: self.entry_id,
            posted_on: self.posted_on,
            description: self.description,
            category: self.category,
            source: self.source,
            lines: self.lines,
            occurred_at,
        }
    }

    pub fn debit_total(&self) -> Money {
        self.lines.iter().filter(|l| l.is_debit).map(|l| l.amount).sum()
    }

    pub fn credit_total(&self) -> Money {
        self.lines.iter().filter(|l| !l.is_debit).map(|l| l.amount).sum()
    }
}

fn entry_id(source: &EntrySource, rule: &str, discriminator: &str) -> Uuid {
    let name = match source {
        EntrySource::Sale { sale_id } => format!("sale:{sale_id}:{rule}:{discriminator}"),
        EntrySource::SaleReturn { sale_id } => format!("sale-return:{sale_id}:{rule}:{discriminator}"),
        EntrySource::Purchase { purchase_id } => format!("purchase:{purchase_id}:{rule}:{discriminator}"),
        EntrySource::Debt { debt_id } => format!("debt:{debt_id}:{rule}:{discriminator}"),
        EntrySource::Manual => format!("manual:{rule}:{discriminator}"),
    };
    Uuid::new_v5(&ENTRY_NAMESPACE, name.as_bytes())
}

/// Push a line unless its amount is zero.
fn push(lines: &mut Vec<JournalEntryLine>, line: JournalEntryLine) {
    if line.amount.is_positive() {
        lines.push(line);
    }
}

fn draft(
    source: EntrySource,
    rule: &str,
    discriminator: &str,
    posted_on: NaiveDate,
    description: String,
    lines: Vec<JournalEntryLine>,
) -> Option<EntryDraft> {
    if lines.is_empty() {
        return None;
    }
    Some(EntryDraft {
        entry_id: entry_id(&source, rule, discriminator),
        posted_on,
        description,
        category: CashFlowCategory::Operating,
        source,
        lines,
    })
}

/// Revenue (Dr Cash/AR, Cr Revenue) and cost (Dr COGS, Cr Inventory).
pub fn sale_completed(e: &SaleCompleted) -> Vec<EntryDraft> {
    let source = EntrySource::Sale { sale_id: e.sale_id.0 };
    let posted_on = e.occurred_at.date_naive();
    let unpaid = e.total - e.paid_amount;

    let mut revenue = Vec::new();
    push(&mut revenue, JournalEntryLine::debit(CASH.account(), e.paid_amount));
    push(&mut revenue, JournalEntryLine::debit(ACCOUNTS_RECEIVABLE.account(), unpaid));
    push(&mut revenue, JournalEntryLine::credit(SALES_REVENUE.account(), e.total));

    let mut cost = Vec::new();
    push(&mut cost, JournalEntryLine::debit(COST_OF_GOODS_SOLD.account(), e.cost_total));
    push(&mut cost, JournalEntryLine::credit(INVENTORY.account(), e.cost_total));

    [
        draft(source, "revenue", "", posted_on, format!("Sale {}", e.sale_id), revenue),
        draft(source, "cost", "", posted_on, format!("Cost of sale {}", e.sale_id), cost),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Reverses both sale entries. Cash goes back for what was paid; the unpaid
/// remainder clears the receivable.
pub fn sale_returned(e: &SaleReturned) -> Vec<EntryDraft> {
    let source = EntrySource::SaleReturn { sale_id: e.sale_id.0 };
    let posted_on = e.occurred_at.date_naive();
    let unpaid = e.total - e.refunded;

    let mut revenue = Vec::new();
    push(&mut revenue, JournalEntryLine::debit(SALES_REVENUE.account(), e.total));
    push(&mut revenue, JournalEntryLine::credit(CASH.account(), e.refunded));
    push(&mut revenue, JournalEntryLine::credit(ACCOUNTS_RECEIVABLE.account(), unpaid));

    let mut cost = Vec::new();
    push(&mut cost, JournalEntryLine::debit(INVENTORY.account(), e.cost_total));
    push(&mut cost, JournalEntryLine::credit(COST_OF_GOODS_SOLD.account(), e.cost_total));

    [
        draft(source, "revenue", "", posted_on, format!("Return of sale {}", e.sale_id), revenue),
        draft(source, "cost", "", posted_on, format!("Restock of sale {}", e.sale_id), cost),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Dr Inventory, Cr Cash (paid on receipt) and AP (remainder).
pub fn goods_received(e: &GoodsReceived) -> Option<EntryDraft> {
    let source = EntrySource::Purchase { purchase_id: e.purchase_id.0 };
    let unpaid = e.received_total - e.paid_on_receipt;

    let mut lines = Vec::new();
    push(&mut lines, JournalEntryLine::debit(INVENTORY.account(), e.received_total));
    push(&mut lines, JournalEntryLine::credit(CASH.account(), e.paid_on_receipt));
    push(&mut lines, JournalEntryLine::credit(ACCOUNTS_PAYABLE.account(), unpaid));

    draft(
        source,
        "receipt",
        "",
        e.occurred_at.date_naive(),
        format!("Goods received for purchase {}", e.purchase_id),
        lines,
    )
}

/// Receivable: Dr Cash, Cr AR. Payable: Dr AP, Cr Cash.
pub fn debt_repayment(
    debt_id: DebtId,
    direction: DebtDirection,
    e: &RepaymentRecorded,
) -> Option<EntryDraft> {
    let source = EntrySource::Debt { debt_id: debt_id.0 };
    let mut lines = Vec::new();
    let description = match direction {
        DebtDirection::Receivable => {
            push(&mut lines, JournalEntryLine::debit(CASH.account(), e.amount));
            push(&mut lines, JournalEntryLine::credit(ACCOUNTS_RECEIVABLE.account(), e.amount));
            format!("Repayment received on debt {debt_id}")
        }
        DebtDirection::Payable => {
            push(&mut lines, JournalEntryLine::debit(ACCOUNTS_PAYABLE.account(), e.amount));
            push(&mut lines, JournalEntryLine::credit(CASH.account(), e.amount));
            format!("Repayment made on debt {debt_id}")
        }
    };
    // Outstanding strictly decreases, so it identifies the repayment.
    let discriminator = e.outstanding_after.cents().to_string();
    draft(source, "repayment", &discriminator, e.occurred_at.date_naive(), description, lines)
}

/// Receivable: Dr Bad Debt, Cr AR. Payable: Dr AP, Cr Revenue (other income).
pub fn debt_written_off(e: &DebtWrittenOff) -> Option<EntryDraft> {
    let source = EntrySource::Debt { debt_id: e.debt_id.0 };
    let mut lines = Vec::new();
    match e.direction {
        DebtDirection::Receivable => {
            push(&mut lines, JournalEntryLine::debit(BAD_DEBT_EXPENSE.account(), e.amount));
            push(&mut lines, JournalEntryLine::credit(ACCOUNTS_RECEIVABLE.account(), e.amount));
        }
        DebtDirection::Payable => {
            push(&mut lines, JournalEntryLine::debit(ACCOUNTS_PAYABLE.account(), e.amount));
            push(&mut lines, JournalEntryLine::credit(SALES_REVENUE.account(), e.amount));
        }
    }
    draft(
        source,
        "write_off",
        "",
        e.occurred_at.date_naive(),
        format!("Write-off of debt {}: {}", e.debt_id, e.reason),
        lines,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockledger_core::AggregateId;
    use stockledger_sales::SaleId;

    fn completed(total: i64, cost: i64, paid: i64) -> SaleCompleted {
        SaleCompleted {
            tenant_id: TenantId::new(),
            sale_id: SaleId::new(AggregateId::new()),
            customer_id: None,
            lines: Vec::new(),
            total: Money::from_cents(total),
            cost_total: Money::from_cents(cost),
            paid_amount: Money::from_cents(paid),
            occurred_at: Utc::now(),
        }
    }

    fn assert_balanced(drafts: &[EntryDraft]) {
        for d in drafts {
            assert_eq!(d.debit_total(), d.credit_total(), "{}", d.description);
            assert!(d.lines.iter().all(|l| l.amount.is_positive()));
        }
    }

    #[test]
    fn partly_paid_sale_splits_cash_and_receivable() {
        let drafts = sale_completed(&completed(1000, 600, 300));
        assert_eq!(drafts.len(), 2);
        assert_balanced(&drafts);

        let revenue = &drafts[0];
        assert_eq!(revenue.lines.len(), 3);
        assert_eq!(revenue.lines[0].account.code, "1000");
        assert_eq!(revenue.lines[0].amount, Money::from_cents(300));
        assert_eq!(revenue.lines[1].account.code, "1100");
        assert_eq!(revenue.lines[1].amount, Money::from_cents(700));
    }

    #[test]
    fn zero_lines_are_omitted() {
        let drafts = sale_completed(&completed(1000, 0, 1000));
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].lines.len(), 2);
    }

    #[test]
    fn entry_ids_are_stable_per_fact() {
        let sale = completed(1000, 600, 1000);
        let a = sale_completed(&sale);
        let b = sale_completed(&sale);
        assert_eq!(a[0].entry_id, b[0].entry_id);
        assert_ne!(a[0].entry_id, a[1].entry_id);
    }

    #[test]
    fn return_reverses_completion() {
        let sale = completed(1000, 600, 400);
        let returned = SaleReturned {
            tenant_id: sale.tenant_id,
            sale_id: sale.sale_id,
            customer_id: None,
            lines: Vec::new(),
            total: sale.total,
            cost_total: sale.cost_total,
            refunded: sale.paid_amount,
            reason: None,
            occurred_at: sale.occurred_at,
        };

        let mut net: std::collections::BTreeMap<String, i64> = Default::default();
        for d in sale_completed(&sale).iter().chain(sale_returned(&returned).iter()) {
            for l in &d.lines {
                let signed = if l.is_debit { l.amount.cents() } else { -l.amount.cents() };
                *net.entry(l.account.code.clone()).or_default() += signed;
            }
        }
        assert!(net.values().all(|v| *v == 0), "{net:?}");
    }

    #[test]
    fn repayments_of_the_same_debt_get_distinct_ids() {
        let debt_id = DebtId::new(AggregateId::new());
        let mk = |amount: i64, after: i64| RepaymentRecorded {
            tenant_id: TenantId::new(),
            debt_id,
            amount: Money::from_cents(amount),
            note: None,
            outstanding_after: Money::from_cents(after),
            occurred_at: Utc::now(),
        };
        let first = debt_repayment(debt_id, DebtDirection::Payable, &mk(100, 900)).unwrap();
        let second = debt_repayment(debt_id, DebtDirection::Payable, &mk(100, 800)).unwrap();
        assert_ne!(first.entry_id, second.entry_id);
        assert_eq!(first.lines[0].account.code, "2000");
        assert_balanced(&[first, second]);
    }
}
