//! Financial statements: pure aggregation over posted journal entries.
//!
//! Sums saturate at the `Money` range instead of wrapping.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use stockledger_core::Money;

use crate::chart::{self, Account, AccountKind};
use crate::ledger::{CashFlowCategory, JournalEntryPosted};

/// Running balance of one account (positive = normal side).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub account: Account,
    pub debits: Money,
    pub credits: Money,
    pub balance: Money,
}

/// Per-account balances over the entries accepted by `include`.
pub fn balances<'a, I, F>(entries: I, include: F) -> BTreeMap<String, AccountBalance>
where
    I: IntoIterator<Item = &'a JournalEntryPosted>,
    F: Fn(&JournalEntryPosted) -> bool,
{
    let mut out: BTreeMap<String, AccountBalance> = BTreeMap::new();
    for entry in entries.into_iter().filter(|e| include(e)) {
        for line in &entry.lines {
            let slot = out.entry(line.account.code.clone()).or_insert_with(|| AccountBalance {
                account: line.account.clone(),
                debits: Money::ZERO,
                credits: Money::ZERO,
                balance: Money::ZERO,
            });
            if line.is_debit {
                slot.debits = slot.debits.saturating_add(line.amount);
            } else {
                slot.credits = slot.credits.saturating_add(line.amount);
            }
            let signed = Money::from_cents(slot.account.kind.signed(line.amount.cents(), line.is_debit));
            slot.balance = slot.balance.saturating_add(signed);
        }
    }
    out
}

/// Chart accounts (with zero balances) merged with everything posted.
pub fn chart_with_balances<'a, I>(entries: I) -> Vec<AccountBalance>
where
    I: IntoIterator<Item = &'a JournalEntryPosted>,
{
    let mut all = balances(entries, |_| true);
    for def in chart::standard() {
        all.entry(def.code.to_string()).or_insert_with(|| AccountBalance {
            account: def.account(),
            debits: Money::ZERO,
            credits: Money::ZERO,
            balance: Money::ZERO,
        });
    }
    all.into_values().collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementLine {
    pub code: String,
    pub name: String,
    pub amount: Money,
}

fn lines_of(balances: &BTreeMap<String, AccountBalance>, kind: AccountKind) -> Vec<StatementLine> {
    balances
        .values()
        .filter(|b| b.account.kind == kind && !b.balance.is_zero())
        .map(|b| StatementLine {
            code: b.account.code.clone(),
            name: b.account.name.clone(),
            amount: b.balance,
        })
        .collect()
}

fn total(lines: &[StatementLine]) -> Money {
    lines.iter().fold(Money::ZERO, |acc, l| acc.saturating_add(l.amount))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSheet {
    pub as_of: NaiveDate,
    pub assets: Vec<StatementLine>,
    pub liabilities: Vec<StatementLine>,
    pub equity: Vec<StatementLine>,
    /// Revenue minus expenses to date, folded into equity.
    pub current_earnings: Money,
    pub total_assets: Money,
    pub total_liabilities: Money,
    pub total_equity: Money,
    pub balanced: bool,
}

pub fn balance_sheet(entries: &[JournalEntryPosted], as_of: NaiveDate) -> BalanceSheet {
    let b = balances(entries, |e| e.posted_on <= as_of);

    let assets = lines_of(&b, AccountKind::Asset);
    let liabilities = lines_of(&b, AccountKind::Liability);
    let equity = lines_of(&b, AccountKind::Equity);
    let current_earnings =
        total(&lines_of(&b, AccountKind::Revenue)).saturating_sub(total(&lines_of(&b, AccountKind::Expense)));

    let total_assets = total(&assets);
    let total_liabilities = total(&liabilities);
    let total_equity = total(&equity).saturating_add(current_earnings);

    BalanceSheet {
        as_of,
        assets,
        liabilities,
        equity,
        current_earnings,
        total_assets,
        total_liabilities,
        total_equity,
        balanced: total_assets == total_liabilities.saturating_add(total_equity),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfitAndLoss {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub revenue: Vec<StatementLine>,
    pub expenses: Vec<StatementLine>,
    pub total_revenue: Money,
    pub cost_of_goods_sold: Money,
    pub gross_profit: Money,
    pub total_expenses: Money,
    pub net_income: Money,
}

pub fn profit_and_loss(entries: &[JournalEntryPosted], from: NaiveDate, to: NaiveDate) -> ProfitAndLoss {
    let b = balances(entries, |e| e.posted_on >= from && e.posted_on <= to);

    let revenue = lines_of(&b, AccountKind::Revenue);
    let expenses = lines_of(&b, AccountKind::Expense);
    let total_revenue = total(&revenue);
    let total_expenses = total(&expenses);
    let cost_of_goods_sold = b
        .get(chart::COST_OF_GOODS_SOLD.code)
        .map(|a| a.balance)
        .unwrap_or(Money::ZERO);

    ProfitAndLoss {
        from,
        to,
        revenue,
        expenses,
        total_revenue,
        cost_of_goods_sold,
        gross_profit: total_revenue.saturating_sub(cost_of_goods_sold),
        total_expenses,
        net_income: total_revenue.saturating_sub(total_expenses),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashFlowSection {
    pub inflows: Money,
    pub outflows: Money,
    pub net: Money,
}

impl CashFlowSection {
    fn record(&mut self, delta: Money) {
        if delta.is_negative() {
            self.outflows = self.outflows.saturating_sub(delta);
        } else {
            self.inflows = self.inflows.saturating_add(delta);
        }
        self.net = self.net.saturating_add(delta);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashFlowStatement {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub opening_cash: Money,
    pub operating: CashFlowSection,
    pub investing: CashFlowSection,
    pub financing: CashFlowSection,
    pub net_change: Money,
    pub closing_cash: Money,
}

fn cash_delta(entry: &JournalEntryPosted) -> Money {
    entry
        .lines
        .iter()
        .filter(|l| l.account.code == chart::CASH.code)
        .fold(Money::ZERO, |acc, l| {
            if l.is_debit {
                acc.saturating_add(l.amount)
            } else {
                acc.saturating_sub(l.amount)
            }
        })
}

/// Direct method: every movement on Cash, classified by entry category.
pub fn cash_flow(entries: &[JournalEntryPosted], from: NaiveDate, to: NaiveDate) -> CashFlowStatement {
    let mut opening_cash = Money::ZERO;
    let mut operating = CashFlowSection::default();
    let mut investing = CashFlowSection::default();
    let mut financing = CashFlowSection::default();

    for entry in entries {
        if entry.posted_on > to {
            continue;
        }
        let delta = cash_delta(entry);
        if delta.is_zero() {
            continue;
        }
        if entry.posted_on < from {
            opening_cash = opening_cash.saturating_add(delta);
            continue;
        }
        match entry.category {
            CashFlowCategory::Operating => operating.record(delta),
            CashFlowCategory::Investing => investing.record(delta),
            CashFlowCategory::Financing => financing.record(delta),
        }
    }

    let net_change = operating.net.saturating_add(investing.net).saturating_add(financing.net);
    CashFlowStatement {
        from,
        to,
        opening_cash,
        operating,
        investing,
        financing,
        net_change,
        closing_cash: opening_cash.saturating_add(net_change),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySales {
    pub date: NaiveDate,
    pub revenue: Money,
    pub cost: Money,
    pub margin: Money,
}

/// Revenue, cost and margin per day from sale (and sale return) entries.
pub fn sales_summary(entries: &[JournalEntryPosted], from: NaiveDate, to: NaiveDate) -> Vec<DailySales> {
    let mut days: BTreeMap<NaiveDate, (Money, Money)> = BTreeMap::new();

    for entry in entries
        .iter()
        .filter(|e| e.source.is_sale() && e.posted_on >= from && e.posted_on <= to)
    {
        let slot = days.entry(entry.posted_on).or_insert((Money::ZERO, Money::ZERO));
        for line in &entry.lines {
            let signed = Money::from_cents(line.account.kind.signed(line.amount.cents(), line.is_debit));
            if line.account.code == chart::SALES_REVENUE.code {
                slot.0 = slot.0.saturating_add(signed);
            } else if line.account.code == chart::COST_OF_GOODS_SOLD.code {
                slot.1 = slot.1.saturating_add(signed);
            }
        }
    }

    days.into_iter()
        .map(|(date, (revenue, cost))| DailySales {
            date,
            revenue,
            cost,
            margin: revenue.saturating_sub(cost),
        })
        .collect()
}
