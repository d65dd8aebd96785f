//! HTTP API: router, auth middleware and handlers over the infra workflows.

pub mod app;
pub mod authz;
pub mod context;
pub mod middleware;
