use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;

use stockledger_auth::permissions;
use stockledger_core::{AggregateId, TenantId};
use stockledger_infra::event_store::StoredEvent;
use stockledger_infra::projections::{
    STORAGE, StorageView,
    storages::{stock_levels, storage_list},
};
use stockledger_storage::{
    AdjustStock, CreateStorage, Deactivate, RenameStorage, SetCapacity, Storage, StorageCommand, StorageId,
};

use crate::app::errors::ApiError;
use crate::app::{dto, services::AppServices};
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/storages", post(create_storage).get(list_storages))
        .route("/storages/transfer", post(transfer))
        .route("/storages/:id", get(get_storage).patch(update_storage))
        .route("/storages/:id/adjust", post(adjust_stock))
        .route("/storages/:id/deactivate", post(deactivate))
        .route("/stock", get(stock))
}

fn dispatch(
    services: &AppServices,
    tenant_id: TenantId,
    id: AggregateId,
    cmd: StorageCommand,
) -> Result<Vec<StoredEvent>, ApiError> {
    Ok(services.dispatch::<Storage>(tenant_id, id, STORAGE, cmd, |_t, a| Storage::empty(StorageId::new(a)))?)
}

pub async fn create_storage(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateStorageRequest>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::STORAGE_WRITE)?;
    let tenant_id = tenant.tenant_id();
    let agg = AggregateId::new();
    let committed = dispatch(
        &services,
        tenant_id,
        agg,
        StorageCommand::CreateStorage(CreateStorage {
            tenant_id,
            storage_id: StorageId::new(agg),
            name: body.name,
            location: body.location,
            capacity: body.capacity,
            occurred_at: Utc::now(),
        }),
    )?;
    Ok(dto::created(agg, &committed))
}

pub async fn list_storages(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::STORAGE_READ)?;
    let storages = services.read_models().storages.list(tenant.tenant_id());
    Ok(Json(storage_list(&storages)).into_response())
}

pub async fn get_storage(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::STORAGE_READ)?;
    let agg = dto::parse_id(&id)?;
    let storage = services
        .read_models()
        .storages
        .get(tenant.tenant_id(), agg)
        .filter(Storage::is_created)
        .ok_or_else(|| ApiError::not_found("storage"))?;
    Ok(Json(StorageView::from(&storage)).into_response())
}

/// Renames and/or changes capacity; each part is its own command.
pub async fn update_storage(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateStorageRequest>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::STORAGE_WRITE)?;
    let tenant_id = tenant.tenant_id();
    let agg = dto::parse_id(&id)?;
    let storage_id = StorageId::new(agg);

    if body.capacity.is_some() && body.unlimited {
        return Err(ApiError::bad_request("`capacity` and `unlimited` are mutually exclusive"));
    }

    let mut committed = Vec::new();
    if let Some(name) = body.name {
        committed.extend(dispatch(
            &services,
            tenant_id,
            agg,
            StorageCommand::RenameStorage(RenameStorage {
                tenant_id,
                storage_id,
                name,
                location: body.location,
                occurred_at: Utc::now(),
            }),
        )?);
    }
    if body.capacity.is_some() || body.unlimited {
        committed.extend(dispatch(
            &services,
            tenant_id,
            agg,
            StorageCommand::SetCapacity(SetCapacity {
                tenant_id,
                storage_id,
                capacity: body.capacity,
                occurred_at: Utc::now(),
            }),
        )?);
    }
    Ok(dto::accepted(agg, &committed))
}

pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AdjustStockRequest>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::STORAGE_WRITE)?;
    let tenant_id = tenant.tenant_id();
    let agg = dto::parse_id(&id)?;
    let committed = dispatch(
        &services,
        tenant_id,
        agg,
        StorageCommand::AdjustStock(AdjustStock {
            tenant_id,
            storage_id: StorageId::new(agg),
            key: body.key,
            delta: body.delta,
            note: body.note,
            occurred_at: Utc::now(),
        }),
    )?;
    Ok(dto::accepted(agg, &committed))
}

pub async fn deactivate(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::STORAGE_WRITE)?;
    let tenant_id = tenant.tenant_id();
    let agg = dto::parse_id(&id)?;
    let committed = dispatch(
        &services,
        tenant_id,
        agg,
        StorageCommand::Deactivate(Deactivate {
            tenant_id,
            storage_id: StorageId::new(agg),
            occurred_at: Utc::now(),
        }),
    )?;
    Ok(dto::accepted(agg, &committed))
}

pub async fn transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::TransferRequest>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::STORAGE_WRITE)?;
    let committed = services.workflows().transfer_stock(
        tenant.tenant_id(),
        body.from,
        body.to,
        body.key,
        body.quantity,
    )?;
    Ok(dto::accepted(body.from, &committed))
}

/// On-hand quantity per variation across all storages.
pub async fn stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::STORAGE_READ)?;
    let storages = services.read_models().storages.list(tenant.tenant_id());
    Ok(Json(stock_levels(&storages)).into_response())
}
