//! Purchasing domain module (event-sourced).
//!
//! A purchase moves through `Draft → Ordered → Received → Allocated`. After
//! goods arrive, each received line is allocated, step by step, to one or more
//! storages; the purchase keeps the running allocated count so a line can never
//! be put away twice.

pub mod purchase;

pub use purchase::{
    AddLine, AllocateToStorage, AllocationReverted, Cancel, CreatePurchase, GoodsReceived,
    LineAdded, PaymentRecorded, PlaceOrder, Purchase, PurchaseCancelled, PurchaseCommand,
    PurchaseCreated, PurchaseEvent, PurchaseFullyAllocated, PurchaseId, PurchaseLine,
    PurchaseOrdered, PurchaseStatus, ReceiveGoods, ReceivedLine, ReceivedQuantity, RecordPayment,
    RevertAllocation, StorageAllocation, StockAllocatedToStorage,
};
