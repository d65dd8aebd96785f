//! Standard small-business chart of accounts.

use serde::{Deserialize, Serialize};

use stockledger_core::DomainError;

/// High-level account kind (determines normal balance side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountKind {
    /// Assets and expenses grow on the debit side.
    pub fn is_debit_normal(self) -> bool {
        matches!(self, AccountKind::Asset | AccountKind::Expense)
    }

    /// Signed effect of a line on this kind's balance (positive = increase).
    pub fn signed(self, amount: i64, is_debit: bool) -> i64 {
        if is_debit == self.is_debit_normal() {
            amount
        } else {
            -amount
        }
    }
}

/// Account identifier + metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    pub code: String, // e.g. "1000"
    pub name: String, // e.g. "Cash"
    pub kind: AccountKind,
}

impl Account {
    /// Validate a (possibly custom) account against the standard chart.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.code.trim().is_empty() {
            return Err(DomainError::validation("account code is required"));
        }
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("account name is required"));
        }
        if let Some(def) = find(&self.code) {
            if def.kind != self.kind {
                return Err(DomainError::validation(format!(
                    "account {} is {:?}, not {:?}",
                    self.code, def.kind, self.kind
                )));
            }
        }
        Ok(())
    }
}

/// A statically known account of the standard chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountDef {
    pub code: &'static str,
    pub name: &'static str,
    pub kind: AccountKind,
}

impl AccountDef {
    pub fn account(&self) -> Account {
        Account {
            code: self.code.to_string(),
            name: self.name.to_string(),
            kind: self.kind,
        }
    }
}

const fn def(code: &'static str, name: &'static str, kind: AccountKind) -> AccountDef {
    AccountDef { code, name, kind }
}

pub const CASH: AccountDef = def("1000", "Cash", AccountKind::Asset);
pub const ACCOUNTS_RECEIVABLE: AccountDef = def("1100", "Accounts Receivable", AccountKind::Asset);
pub const INVENTORY: AccountDef = def("1200", "Inventory", AccountKind::Asset);
pub const EQUIPMENT: AccountDef = def("1500", "Equipment", AccountKind::Asset);
pub const ACCOUNTS_PAYABLE: AccountDef = def("2000", "Accounts Payable", AccountKind::Liability);
pub const LOANS_PAYABLE: AccountDef = def("2500", "Loans Payable", AccountKind::Liability);
pub const OWNER_EQUITY: AccountDef = def("3000", "Owner's Equity", AccountKind::Equity);
pub const OWNER_DRAWINGS: AccountDef = def("3100", "Owner Drawings", AccountKind::Equity);
pub const SALES_REVENUE: AccountDef = def("4000", "Sales Revenue", AccountKind::Revenue);
pub const COST_OF_GOODS_SOLD: AccountDef = def("5000", "Cost of Goods Sold", AccountKind::Expense);
pub const OPERATING_EXPENSES: AccountDef = def("6000", "Operating Expenses", AccountKind::Expense);
pub const BAD_DEBT_EXPENSE: AccountDef = def("6100", "Bad Debt Expense", AccountKind::Expense);

const STANDARD: [AccountDef; 12] = [
    CASH,
    ACCOUNTS_RECEIVABLE,
    INVENTORY,
    EQUIPMENT,
    ACCOUNTS_PAYABLE,
    LOANS_PAYABLE,
    OWNER_EQUITY,
    OWNER_DRAWINGS,
    SALES_REVENUE,
    COST_OF_GOODS_SOLD,
    OPERATING_EXPENSES,
    BAD_DEBT_EXPENSE,
];

/// All standard accounts, ordered by code.
pub fn standard() -> &'static [AccountDef] {
    &STANDARD
}

pub fn find(code: &str) -> Option<&'static AccountDef> {
    let code = code.trim();
    STANDARD.iter().find(|a| a.code == code)
}
