use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use tracing::info;

use stockledger_auth::permissions;
use stockledger_core::AggregateId;
use stockledger_infra::projections::{
    PURCHASE, PurchaseView,
    purchases::{allocation_plan, purchase_list},
};
use stockledger_purchasing::{Cancel, PlaceOrder, Purchase, PurchaseCommand, PurchaseId};

use crate::app::errors::ApiError;
use crate::app::{dto, services::AppServices};
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_purchase).get(list_purchases))
        .route("/:id", get(get_purchase))
        .route("/:id/order", post(place_order))
        .route("/:id/receive", post(receive))
        .route("/:id/allocation", get(allocation))
        .route("/:id/allocations", post(allocate))
        .route("/:id/payments", post(record_payment))
        .route("/:id/cancel", post(cancel))
}

fn load(services: &AppServices, tenant: &TenantContext, id: &str) -> Result<Purchase, ApiError> {
    let agg = dto::parse_id(id)?;
    services
        .read_models()
        .purchases
        .get(tenant.tenant_id(), agg)
        .filter(Purchase::is_created)
        .ok_or_else(|| ApiError::not_found("purchase"))
}

/// Creates a draft purchase with its lines.
pub async fn create_purchase(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreatePurchaseRequest>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::PURCHASING_WRITE)?;
    let purchase_id = PurchaseId::new(AggregateId::new());
    let committed = services.workflows().create_purchase(
        tenant.tenant_id(),
        purchase_id,
        body.supplier_id,
        body.reference,
        body.lines,
    )?;
    info!(tenant_id = %tenant.tenant_id(), %purchase_id, "purchase drafted");
    Ok(dto::created(purchase_id, &committed))
}

pub async fn list_purchases(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::PURCHASING_READ)?;
    let purchases = services.read_models().purchases.list(tenant.tenant_id());
    Ok(Json(purchase_list(&purchases)).into_response())
}

pub async fn get_purchase(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::PURCHASING_READ)?;
    let purchase = load(&services, &tenant, &id)?;
    Ok(Json(PurchaseView::from(&purchase)).into_response())
}

pub async fn place_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::PURCHASING_WRITE)?;
    let tenant_id = tenant.tenant_id();
    let agg = dto::parse_id(&id)?;
    let committed = services.dispatch::<Purchase>(
        tenant_id,
        agg,
        PURCHASE,
        PurchaseCommand::PlaceOrder(PlaceOrder {
            tenant_id,
            purchase_id: PurchaseId::new(agg),
            occurred_at: Utc::now(),
        }),
        |_t, a| Purchase::empty(PurchaseId::new(a)),
    )?;
    Ok(dto::accepted(agg, &committed))
}

/// Records received quantities; opens the payable and posts the receipt.
pub async fn receive(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReceivePurchaseRequest>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::PURCHASING_WRITE)?;
    let purchase_id = PurchaseId::new(dto::parse_id(&id)?);
    let committed = services.workflows().receive_purchase(
        tenant.tenant_id(),
        purchase_id,
        body.lines,
        body.paid_on_receipt,
        body.due_date,
    )?;
    Ok(dto::accepted(purchase_id, &committed))
}

/// Put-away wizard state: remaining quantities and the active storages.
pub async fn allocation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::PURCHASING_READ)?;
    let purchase = load(&services, &tenant, &id)?;
    let storages = services.read_models().storages.list(tenant.tenant_id());
    Ok(Json(allocation_plan(&purchase, &storages)).into_response())
}

pub async fn allocate(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AllocateRequest>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::PURCHASING_WRITE)?;
    let purchase_id = PurchaseId::new(dto::parse_id(&id)?);
    let committed = services.workflows().allocate_to_storage(
        tenant.tenant_id(),
        purchase_id,
        body.line_no,
        body.storage_id,
        body.quantity,
    )?;
    Ok(dto::accepted(purchase_id, &committed))
}

pub async fn record_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::PaymentRequest>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::PURCHASING_WRITE)?;
    let purchase_id = PurchaseId::new(dto::parse_id(&id)?);
    let committed = services
        .workflows()
        .record_purchase_payment(tenant.tenant_id(), purchase_id, body.amount)?;
    Ok(dto::accepted(purchase_id, &committed))
}

pub async fn cancel(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ReasonRequest>>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::PURCHASING_WRITE)?;
    let tenant_id = tenant.tenant_id();
    let agg = dto::parse_id(&id)?;
    let committed = services.dispatch::<Purchase>(
        tenant_id,
        agg,
        PURCHASE,
        PurchaseCommand::Cancel(Cancel {
            tenant_id,
            purchase_id: PurchaseId::new(agg),
            reason: body.and_then(|Json(b)| b.reason),
            occurred_at: Utc::now(),
        }),
        |_t, a| Purchase::empty(PurchaseId::new(a)),
    )?;
    Ok(dto::accepted(agg, &committed))
}
