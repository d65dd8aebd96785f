use axum::{Router, routing::get};

pub mod catalog;
pub mod debts;
pub mod import;
pub mod ledger;
pub mod parties;
pub mod purchases;
pub mod reports;
pub mod sales;
pub mod storages;
pub mod system;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/stream", get(system::stream))
        .route("/events", get(system::list_events))
        .nest("/catalog", catalog::router())
        .merge(storages::router())
        .nest("/parties", parties::router())
        .nest("/purchases", purchases::router())
        .nest("/sales", sales::router())
        .nest("/debts", debts::router())
        .nest("/ledger", ledger::router())
        .nest("/reports", reports::router())
        .nest("/import", import::router())
}
