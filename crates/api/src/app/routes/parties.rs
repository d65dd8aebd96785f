use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;

use stockledger_auth::permissions;
use stockledger_core::{AggregateId, TenantId};
use stockledger_infra::event_store::StoredEvent;
use stockledger_infra::projections::{PARTY, PartyView, parties::directory};
use stockledger_parties::{CreateParty, Party, PartyCommand, PartyId, Reactivate, Suspend, UpdateContactInfo};

use crate::app::errors::ApiError;
use crate::app::{dto, services::AppServices};
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_party).get(list_parties))
        .route("/:id", get(get_party).patch(update_party))
        .route("/:id/suspend", post(suspend_party))
        .route("/:id/reactivate", post(reactivate_party))
}

fn dispatch(
    services: &AppServices,
    tenant_id: TenantId,
    id: AggregateId,
    cmd: PartyCommand,
) -> Result<Vec<StoredEvent>, ApiError> {
    Ok(services.dispatch::<Party>(tenant_id, id, PARTY, cmd, |_t, a| Party::empty(PartyId::new(a)))?)
}

pub async fn create_party(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreatePartyRequest>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::PARTIES_WRITE)?;
    let tenant_id = tenant.tenant_id();
    let agg = AggregateId::new();
    let committed = dispatch(
        &services,
        tenant_id,
        agg,
        PartyCommand::CreateParty(CreateParty {
            tenant_id,
            party_id: PartyId::new(agg),
            kind: body.kind,
            name: body.name,
            contact: body.contact,
            occurred_at: Utc::now(),
        }),
    )?;
    Ok(dto::created(agg, &committed))
}

/// Customers and suppliers, optionally filtered with `?kind=`.
pub async fn list_parties(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::PartyListQuery>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::PARTIES_READ)?;
    let parties = services.read_models().parties.list(tenant.tenant_id());
    Ok(Json(directory(&parties, query.kind)).into_response())
}

pub async fn get_party(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::PARTIES_READ)?;
    let agg = dto::parse_id(&id)?;
    let party = services
        .read_models()
        .parties
        .get(tenant.tenant_id(), agg)
        .filter(|p| p.tenant_id().is_some())
        .ok_or_else(|| ApiError::not_found("party"))?;
    Ok(Json(PartyView::from(&party)).into_response())
}

pub async fn update_party(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdatePartyRequest>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::PARTIES_WRITE)?;
    let tenant_id = tenant.tenant_id();
    let agg = dto::parse_id(&id)?;
    let committed = dispatch(
        &services,
        tenant_id,
        agg,
        PartyCommand::UpdateContactInfo(UpdateContactInfo {
            tenant_id,
            party_id: PartyId::new(agg),
            name: body.name,
            contact: body.contact,
            occurred_at: Utc::now(),
        }),
    )?;
    Ok(dto::accepted(agg, &committed))
}

pub async fn suspend_party(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ReasonRequest>>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::PARTIES_WRITE)?;
    let tenant_id = tenant.tenant_id();
    let agg = dto::parse_id(&id)?;
    let committed = dispatch(
        &services,
        tenant_id,
        agg,
        PartyCommand::Suspend(Suspend {
            tenant_id,
            party_id: PartyId::new(agg),
            reason: body.and_then(|Json(b)| b.reason),
            occurred_at: Utc::now(),
        }),
    )?;
    Ok(dto::accepted(agg, &committed))
}

pub async fn reactivate_party(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::PARTIES_WRITE)?;
    let tenant_id = tenant.tenant_id();
    let agg = dto::parse_id(&id)?;
    let committed = dispatch(
        &services,
        tenant_id,
        agg,
        PartyCommand::Reactivate(Reactivate {
            tenant_id,
            party_id: PartyId::new(agg),
            occurred_at: Utc::now(),
        }),
    )?;
    Ok(dto::accepted(agg, &committed))
}
