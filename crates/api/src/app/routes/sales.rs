use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::Utc;
use tracing::info;

use stockledger_auth::permissions;
use stockledger_core::AggregateId;
use stockledger_infra::projections::{SALE, SaleView, sales::sale_list};
use stockledger_sales::{Cancel, RemoveLine, Sale, SaleCommand, SaleId};

use crate::app::errors::ApiError;
use crate::app::{dto, services::AppServices};
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_sale).get(list_sales))
        .route("/:id", get(get_sale))
        .route("/:id/lines", post(add_line))
        .route("/:id/lines/:line_no", delete(remove_line))
        .route("/:id/complete", post(complete))
        .route("/:id/payments", post(record_payment))
        .route("/:id/cancel", post(cancel))
        .route("/:id/return", post(return_sale))
}

fn sale_id(raw: &str) -> Result<SaleId, ApiError> {
    Ok(SaleId::new(dto::parse_id(raw)?))
}

/// Opens a draft sale; without a customer it is a walk-in sale.
pub async fn create_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    body: Option<Json<dto::CreateSaleRequest>>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::SALES_WRITE)?;
    let sale_id = SaleId::new(AggregateId::new());
    let customer_id = body.and_then(|Json(b)| b.customer_id);
    let committed = services
        .workflows()
        .create_sale(tenant.tenant_id(), sale_id, customer_id)?;
    Ok(dto::created(sale_id, &committed))
}

pub async fn list_sales(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::SALES_READ)?;
    let sales = services.read_models().sales.list(tenant.tenant_id());
    Ok(Json(sale_list(&sales)).into_response())
}

pub async fn get_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::SALES_READ)?;
    let agg = dto::parse_id(&id)?;
    let sale = services
        .read_models()
        .sales
        .get(tenant.tenant_id(), agg)
        .filter(Sale::is_created)
        .ok_or_else(|| ApiError::not_found("sale"))?;
    Ok(Json(SaleView::from(&sale)).into_response())
}

pub async fn add_line(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AddSaleLineRequest>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::SALES_WRITE)?;
    let sale_id = sale_id(&id)?;
    let committed = services.workflows().add_sale_line(
        tenant.tenant_id(),
        sale_id,
        body.key,
        body.storage_id,
        body.quantity,
        body.unit_price,
        body.discount,
    )?;
    Ok(dto::accepted(sale_id, &committed))
}

pub async fn remove_line(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, line_no)): Path<(String, u32)>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::SALES_WRITE)?;
    let tenant_id = tenant.tenant_id();
    let sale_id = sale_id(&id)?;
    let committed = services.dispatch::<Sale>(
        tenant_id,
        sale_id.0,
        SALE,
        SaleCommand::RemoveLine(RemoveLine {
            tenant_id,
            sale_id,
            line_no,
            occurred_at: Utc::now(),
        }),
        |_t, a| Sale::empty(SaleId::new(a)),
    )?;
    Ok(dto::accepted(sale_id, &committed))
}

/// Completes the sale: releases stock, opens any receivable and posts
/// revenue and cost of goods sold.
pub async fn complete(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::CompleteSaleRequest>>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::SALES_WRITE)?;
    let sale_id = sale_id(&id)?;
    let Json(body) = body.unwrap_or(Json(dto::CompleteSaleRequest::default()));
    let committed = services
        .workflows()
        .complete_sale(tenant.tenant_id(), sale_id, body.paid_amount, body.due_date)?;
    info!(tenant_id = %tenant.tenant_id(), %sale_id, events = committed.len(), "sale completed");
    Ok(dto::accepted(sale_id, &committed))
}

pub async fn record_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::PaymentRequest>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::SALES_WRITE)?;
    let sale_id = sale_id(&id)?;
    let committed = services
        .workflows()
        .record_sale_payment(tenant.tenant_id(), sale_id, body.amount)?;
    Ok(dto::accepted(sale_id, &committed))
}

pub async fn cancel(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ReasonRequest>>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::SALES_WRITE)?;
    let tenant_id = tenant.tenant_id();
    let sale_id = sale_id(&id)?;
    let committed = services.dispatch::<Sale>(
        tenant_id,
        sale_id.0,
        SALE,
        SaleCommand::Cancel(Cancel {
            tenant_id,
            sale_id,
            reason: body.and_then(|Json(b)| b.reason),
            occurred_at: Utc::now(),
        }),
        |_t, a| Sale::empty(SaleId::new(a)),
    )?;
    Ok(dto::accepted(sale_id, &committed))
}

/// Full return of a completed sale.
pub async fn return_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ReasonRequest>>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::SALES_WRITE)?;
    let sale_id = sale_id(&id)?;
    let committed = services.workflows().return_sale(
        tenant.tenant_id(),
        sale_id,
        body.and_then(|Json(b)| b.reason),
    )?;
    Ok(dto::accepted(sale_id, &committed))
}
