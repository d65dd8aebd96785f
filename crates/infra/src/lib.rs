//! Infrastructure layer: event stores, command dispatch, projections,
//! multi-aggregate workflows and configuration.

pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod workers;
pub mod workflows;
