//! Spreadsheet import. The body is the CSV file itself; the query string maps
//! target fields to columns, e.g. `?price=Sale%20price&sku=%232`. A value
//! starting with `#` is a zero-based column index. Unmapped fields fall back
//! to a column named like the field.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Extension, Query},
    response::{IntoResponse, Response},
    routing::post,
};
use tracing::info;

use stockledger_auth::permissions;
use stockledger_import::{CatalogRow, ColumnMapping, CsvSheetReader, PartyRow, SheetReader, import};

use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/catalog", post(import_catalog))
        .route("/parties", post(import_parties))
}

fn mapping_from_query(query: BTreeMap<String, String>) -> ColumnMapping {
    query.into_iter().fold(ColumnMapping::new(), |mapping, (field, column)| {
        match column.strip_prefix('#').and_then(|i| i.parse::<usize>().ok()) {
            Some(index) => mapping.index(field, index),
            None => mapping.header(field, column),
        }
    })
}

/// Creates products, variations, missing storages and opening stock.
pub async fn import_catalog(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<BTreeMap<String, String>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::CATALOG_WRITE)?;
    require(&tenant, &principal, &permissions::STORAGE_WRITE)?;
    let tenant_id = tenant.tenant_id();

    let sheet = CsvSheetReader::new().read(&body)?;
    let report = import::<CatalogRow>(&sheet, &mapping_from_query(query))?;

    let products = services.read_models().products.list(tenant_id);
    let storages = services.read_models().storages.list(tenant_id);
    let outcome = services
        .workflows()
        .import_catalog(tenant_id, report, &products, &storages);

    info!(
        %tenant_id,
        products = outcome.products.len(),
        errors = outcome.errors.len(),
        "catalog import finished"
    );
    Ok(Json(outcome).into_response())
}

pub async fn import_parties(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<BTreeMap<String, String>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::PARTIES_WRITE)?;
    let tenant_id = tenant.tenant_id();

    let sheet = CsvSheetReader::new().read(&body)?;
    let report = import::<PartyRow>(&sheet, &mapping_from_query(query))?;

    let outcome = services.workflows().import_parties(tenant_id, report);

    info!(
        %tenant_id,
        created = outcome.created.len(),
        errors = outcome.errors.len(),
        "party import finished"
    );
    Ok(Json(outcome).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_prefixed_values_are_column_indexes() {
        let query = BTreeMap::from([
            ("name".to_string(), "Customer name".to_string()),
            ("email".to_string(), "#3".to_string()),
        ]);
        let expected = ColumnMapping::new().header("name", "Customer name").index("email", 3);
        assert_eq!(mapping_from_query(query), expected);
    }
}
