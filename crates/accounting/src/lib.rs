//! Accounting module (double-entry ledger, event-sourced).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.
//!
//! - [`ledger`]: the per-tenant `Ledger` aggregate accepting balanced entries
//! - [`chart`]: the standard chart of accounts
//! - [`postings`]: rules turning sales/purchasing/debt events into entries
//! - [`statements`]: balance sheet, P&L, cash flow and sales summary

pub mod chart;
pub mod ledger;
pub mod postings;
pub mod statements;

pub use chart::{Account, AccountDef, AccountKind};
pub use ledger::{
    CashFlowCategory, EntrySource, JournalCommand, JournalEntryLine, JournalEntryPosted, Ledger,
    LedgerEvent, LedgerId, PostJournalEntry,
};
pub use postings::EntryDraft;
pub use statements::{
    AccountBalance, BalanceSheet, CashFlowSection, CashFlowStatement, DailySales,
    ProfitAndLoss, StatementLine,
};
