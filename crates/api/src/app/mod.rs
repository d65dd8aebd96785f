//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: event store, dispatcher, read models and the realtime feed
//! - `routes/`: handlers, one file per area
//! - `dto.rs`: request/response bodies and small parsing helpers
//! - `errors.rs`: the JSON error type every handler returns

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Full router over the given services.
pub fn router(services: Arc<AppServices>, jwt_secret: impl AsRef<[u8]>) -> Router {
    let jwt = Arc::new(stockledger_auth::Hs256JwtValidator::new(jwt_secret));
    let auth_state = middleware::AuthState { jwt };

    // Protected routes: require auth + tenant context.
    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(auth_state, middleware::auth_middleware));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}

/// Router over a fresh in-memory store (tests and local runs).
pub fn build_app(jwt_secret: impl AsRef<[u8]>) -> std::io::Result<Router> {
    let services = Arc::new(AppServices::in_memory()?);
    Ok(router(services, jwt_secret))
}
