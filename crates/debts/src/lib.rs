//! Receivables and payables.
//!
//! A `Debt` is opened for every sale or purchase that is not settled at the
//! point of sale/receipt, and can also be opened manually (e.g. a loan to a
//! customer). Repayments reduce the outstanding balance; write-offs close it.

pub mod debt;

pub use debt::{
    Debt, DebtCommand, DebtDirection, DebtEvent, DebtId, DebtOpened, DebtOrigin, DebtSettled,
    DebtStatus, DebtWrittenOff, OpenDebt, RecordRepayment, Repayment, RepaymentRecorded, WriteOff,
};
