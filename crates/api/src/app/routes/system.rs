use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Response, sse::Event as SseEvent},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use stockledger_auth::permissions;
use stockledger_core::AggregateId;
use stockledger_infra::event_store::{EventFilter, Pagination};

use crate::app::errors::ApiError;
use crate::app::services::{self, AppServices};
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> impl IntoResponse {
    let permissions: Vec<&str> = principal.principal().permissions().iter().map(|p| p.as_str()).collect();
    Json(serde_json::json!({
        "tenant_id": tenant.tenant_id().to_string(),
        "principal_id": principal.principal_id().to_string(),
        "roles": principal.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        "permissions": permissions,
    }))
}

pub async fn stream(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<axum::response::Sse<impl tokio_stream::Stream<Item = Result<SseEvent, std::convert::Infallible>>>, ApiError>
{
    require(&tenant, &principal, &permissions::REPORTS_READ)?;
    Ok(services::tenant_sse_stream(services, tenant.tenant_id()))
}

#[derive(Debug, Deserialize)]
pub struct EventListQuery {
    pub aggregate_id: Option<AggregateId>,
    pub aggregate_type: Option<String>,
    pub event_type: Option<String>,
    pub occurred_after: Option<DateTime<Utc>>,
    pub occurred_before: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// GET /events: the tenant's audit trail, newest first.
pub async fn list_events(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<EventListQuery>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::EVENTS_READ)?;
    let filter = EventFilter {
        aggregate_id: query.aggregate_id,
        aggregate_type: query.aggregate_type,
        event_type: query.event_type,
        occurred_after: query.occurred_after,
        occurred_before: query.occurred_before,
    };
    let page = services
        .query_events(tenant.tenant_id(), filter, Pagination::new(query.limit, query.offset))
        .await?;
    Ok(Json(page).into_response())
}
