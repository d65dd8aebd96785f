//! Storage locations and the stock they hold (event-sourced).
//!
//! A storage is a physical place (warehouse, back room, shop floor). It tracks
//! on-hand units per product variation and enforces that stock never goes
//! negative and never exceeds the configured capacity.

pub mod storage;

pub use storage::{
    AdjustStock, AllocateStock, CapacityChanged, CreateStorage, Deactivate, ReleaseReason,
    ReleaseStock, RenameStorage, SetCapacity, StockAdjusted, StockAllocated, StockReleased,
    StockSource, Storage, StorageCommand, StorageCreated, StorageDeactivated, StorageEvent,
    StorageId, StorageRenamed,
};
