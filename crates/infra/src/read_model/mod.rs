//! Tenant-isolated read model storage.
//!
//! Read models are disposable: they are rebuilt from the event store at
//! startup, so the in-memory store is the only backend.

pub mod tenant_store;

pub use tenant_store::{InMemoryTenantStore, TenantStore};
