//! Financial statements computed on demand from the tenant's ledger.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    response::{IntoResponse, Response},
    routing::get,
};

use stockledger_accounting::statements::{balance_sheet, cash_flow, profit_and_loss, sales_summary};
use stockledger_auth::permissions;

use crate::app::errors::ApiError;
use crate::app::{dto, services::AppServices};
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/balance-sheet", get(get_balance_sheet))
        .route("/profit-and-loss", get(get_profit_and_loss))
        .route("/cash-flow", get(get_cash_flow))
        .route("/sales-summary", get(get_sales_summary))
}

pub async fn get_balance_sheet(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::AsOfQuery>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::REPORTS_READ)?;
    let entries = services.read_models().ledger.entries(tenant.tenant_id());
    Ok(Json(balance_sheet(&entries, query.date())).into_response())
}

pub async fn get_profit_and_loss(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::PeriodQuery>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::REPORTS_READ)?;
    let (from, to) = query.resolve()?;
    let entries = services.read_models().ledger.entries(tenant.tenant_id());
    Ok(Json(profit_and_loss(&entries, from, to)).into_response())
}

pub async fn get_cash_flow(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::PeriodQuery>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::REPORTS_READ)?;
    let (from, to) = query.resolve()?;
    let entries = services.read_models().ledger.entries(tenant.tenant_id());
    Ok(Json(cash_flow(&entries, from, to)).into_response())
}

pub async fn get_sales_summary(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::PeriodQuery>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::REPORTS_READ)?;
    let (from, to) = query.resolve()?;
    let entries = services.read_models().ledger.entries(tenant.tenant_id());
    Ok(Json(sales_summary(&entries, from, to)).into_response())
}
