use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use stockledger_core::Money;
use stockledger_debts::{Debt, DebtDirection, DebtId, DebtOrigin, DebtStatus, Repayment};
use stockledger_parties::PartyId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebtView {
    pub debt_id: DebtId,
    pub direction: DebtDirection,
    pub party_id: Option<PartyId>,
    pub origin: DebtOrigin,
    pub principal: Money,
    pub due_date: Option<NaiveDate>,
    pub status: DebtStatus,
    pub repaid: Money,
    pub outstanding: Money,
    pub repayments: Vec<Repayment>,
}

impl From<&Debt> for DebtView {
    fn from(d: &Debt) -> Self {
        Self {
            debt_id: d.id_typed(),
            direction: d.direction(),
            party_id: d.party_id(),
            origin: d.origin(),
            principal: d.principal(),
            due_date: d.due_date(),
            status: d.status(),
            repaid: d.repaid(),
            outstanding: d.outstanding(),
            repayments: d.repayments().to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct DebtFilter {
    pub direction: Option<DebtDirection>,
    pub status: Option<DebtStatus>,
    pub party_id: Option<PartyId>,
}

impl DebtFilter {
    pub fn matches(&self, debt: &Debt) -> bool {
        self.direction.is_none_or(|d| debt.direction() == d)
            && self.status.is_none_or(|s| debt.status() == s)
            && self.party_id.is_none_or(|p| debt.party_id() == Some(p))
    }
}

/// Open receivable and payable totals for one party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartyBalance {
    pub party_id: PartyId,
    pub receivable: Money,
    pub payable: Money,
    /// Receivable minus payable.
    pub net: Money,
}

pub fn debt_list(debts: &[Debt], filter: &DebtFilter) -> Vec<DebtView> {
    let mut out: Vec<DebtView> = debts
        .iter()
        .filter(|d| d.is_created() && filter.matches(d))
        .map(DebtView::from)
        .collect();
    out.sort_by_key(|d| d.debt_id);
    out
}

/// Open debts past their due date, oldest due date first.
pub fn overdue(debts: &[Debt], today: NaiveDate) -> Vec<DebtView> {
    let mut out: Vec<DebtView> = debts
        .iter()
        .filter(|d| d.is_created() && d.is_overdue(today))
        .map(DebtView::from)
        .collect();
    out.sort_by_key(|d| (d.due_date, d.debt_id));
    out
}

pub fn party_balances(debts: &[Debt]) -> Vec<PartyBalance> {
    let mut totals: BTreeMap<PartyId, (Money, Money)> = BTreeMap::new();
    for debt in debts.iter().filter(|d| d.is_created() && d.status() == DebtStatus::Open) {
        let Some(party) = debt.party_id() else {
            continue;
        };
        let entry = totals.entry(party).or_default();
        match debt.direction() {
            DebtDirection::Receivable => entry.0 = entry.0.saturating_add(debt.outstanding()),
            DebtDirection::Payable => entry.1 = entry.1.saturating_add(debt.outstanding()),
        }
    }
    totals
        .into_iter()
        .map(|(party_id, (receivable, payable))| PartyBalance {
            party_id,
            receivable,
            payable,
            net: receivable - payable,
        })
        .collect()
}
