//! Customers and suppliers (event-sourced).

pub mod party;

pub use party::{
    ContactInfo, ContactInfoUpdated, CreateParty, Party, PartyCommand, PartyCreated, PartyEvent,
    PartyId, PartyKind, PartyReactivated, PartyStatus, PartySuspended, Reactivate, Suspend,
    UpdateContactInfo,
};
