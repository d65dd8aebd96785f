//! Sales domain module (event-sourced).
//!
//! A sale collects lines while in `Draft`, each line naming the storage the
//! units are taken from. Completing the sale fixes the totals and the amount
//! paid up front; anything unpaid becomes a receivable for the customer.

pub mod sale;

pub use sale::{
    AddLine, Cancel, CompleteSale, CreateSale, RecordPayment, RemoveLine, ReturnSale, Sale,
    SaleCancelled, SaleCommand, SaleCompleted, SaleCreated, SaleEvent, SaleId, SaleLine,
    SaleLineAdded, SaleLineRemoved, SalePaymentRecorded, SaleReturned, SaleStatus,
};
