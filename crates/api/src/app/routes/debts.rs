use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    response::{IntoResponse, Response},
    routing::{get, post},
};

use stockledger_auth::permissions;
use stockledger_core::AggregateId;
use stockledger_debts::{Debt, DebtId};
use stockledger_infra::projections::{
    DebtFilter, DebtView,
    debts::{debt_list, overdue, party_balances},
};

use crate::app::errors::ApiError;
use crate::app::{dto, services::AppServices};
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(open_debt).get(list_debts))
        .route("/overdue", get(list_overdue))
        .route("/balances", get(balances))
        .route("/:id", get(get_debt))
        .route("/:id/repayments", post(repay))
        .route("/:id/write-off", post(write_off))
}

fn debt_id(raw: &str) -> Result<DebtId, ApiError> {
    Ok(DebtId::new(dto::parse_id(raw)?))
}

/// Opens a manual debt. Sale and purchase debts are opened by their workflows.
pub async fn open_debt(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::OpenDebtRequest>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::DEBTS_WRITE)?;
    let debt_id = DebtId::new(AggregateId::new());
    let committed = services.workflows().open_manual_debt(
        tenant.tenant_id(),
        debt_id,
        body.direction,
        body.party_id,
        body.principal,
        body.due_date,
    )?;
    Ok(dto::created(debt_id, &committed))
}

/// `?direction=receivable|payable&status=open|settled|written_off&party_id=`
pub async fn list_debts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(filter): Query<DebtFilter>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::DEBTS_READ)?;
    let debts = services.read_models().debts.list(tenant.tenant_id());
    Ok(Json(debt_list(&debts, &filter)).into_response())
}

/// Open debts past due as of `?as_of=` (default: today, UTC).
pub async fn list_overdue(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::AsOfQuery>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::DEBTS_READ)?;
    let debts = services.read_models().debts.list(tenant.tenant_id());
    Ok(Json(overdue(&debts, query.date())).into_response())
}

pub async fn balances(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::DEBTS_READ)?;
    let debts = services.read_models().debts.list(tenant.tenant_id());
    Ok(Json(party_balances(&debts)).into_response())
}

pub async fn get_debt(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::DEBTS_READ)?;
    let debt_id = debt_id(&id)?;
    let debt = services
        .read_models()
        .debts
        .get(tenant.tenant_id(), debt_id.0)
        .filter(Debt::is_created)
        .ok_or_else(|| ApiError::not_found("debt"))?;
    Ok(Json(DebtView::from(&debt)).into_response())
}

pub async fn repay(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RepaymentRequest>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::DEBTS_WRITE)?;
    let debt_id = debt_id(&id)?;
    let committed = services
        .workflows()
        .repay_debt(tenant.tenant_id(), debt_id, body.amount, body.note)?;
    Ok(dto::accepted(debt_id, &committed))
}

pub async fn write_off(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::WriteOffRequest>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::DEBTS_WRITE)?;
    let debt_id = debt_id(&id)?;
    let committed = services
        .workflows()
        .write_off_debt(tenant.tenant_id(), debt_id, body.reason)?;
    Ok(dto::accepted(debt_id, &committed))
}
