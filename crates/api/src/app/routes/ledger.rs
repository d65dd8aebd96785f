use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use uuid::Uuid;

use stockledger_accounting::{
    EntrySource, JournalEntryLine, LedgerId, PostJournalEntry, chart, statements::chart_with_balances,
};
use stockledger_auth::permissions;

use crate::app::errors::ApiError;
use crate::app::{dto, services::AppServices};
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/entries", get(list_entries).post(post_entry))
        .route("/accounts", get(accounts))
}

/// Manual journal entry. Accounts are referenced by chart code.
pub async fn post_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::PostEntryRequest>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::LEDGER_WRITE)?;
    let tenant_id = tenant.tenant_id();

    let lines = body
        .lines
        .into_iter()
        .map(|l| {
            let def = chart::find(&l.account)
                .ok_or_else(|| ApiError::bad_request(format!("unknown account code '{}'", l.account)))?;
            Ok(JournalEntryLine {
                account: def.account(),
                amount: l.amount,
                is_debit: l.is_debit,
            })
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    let entry_id = Uuid::now_v7();
    let now = Utc::now();
    let committed = services.workflows().post_entry(PostJournalEntry {
        tenant_id,
        ledger_id: LedgerId::for_tenant(tenant_id),
        entry_id,
        posted_on: body.posted_on.unwrap_or_else(|| now.date_naive()),
        description: body.description,
        category: body.category,
        source: EntrySource::Manual,
        lines,
        occurred_at: now,
    })?;
    Ok(dto::created(entry_id, &committed))
}

pub async fn list_entries(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::LEDGER_READ)?;
    Ok(Json(services.read_models().ledger.entries(tenant.tenant_id())).into_response())
}

/// The standard chart with every account's running balance.
pub async fn accounts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::LEDGER_READ)?;
    let entries = services.read_models().ledger.entries(tenant.tenant_id());
    Ok(Json(chart_with_balances(&entries)).into_response())
}
