use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use chrono::Utc;
use tracing::info;

use stockledger_auth::permissions;
use stockledger_catalog::{
    AddVariation, ArchiveProduct, CreateProduct, DiscontinueVariation, Product, ProductCommand, ProductEvent, ProductId,
    UpdateGeneric, UpdateVariation, VariationId,
};
use stockledger_core::{AggregateId, TenantId};
use stockledger_infra::projections::{PRODUCT, ProductView, catalog::catalog_view};

use crate::app::errors::ApiError;
use crate::app::{dto, services::AppServices};
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/products", post(create_product).get(list_products))
        .route("/products/:id", get(get_product).patch(update_product))
        .route("/products/:id/variations", post(add_variation))
        .route(
            "/products/:id/variations/:vid",
            patch(update_variation).delete(discontinue_variation),
        )
        .route("/products/:id/archive", post(archive_product))
}

fn dispatch(
    services: &AppServices,
    tenant_id: TenantId,
    id: AggregateId,
    cmd: ProductCommand,
) -> Result<Vec<stockledger_infra::event_store::StoredEvent>, ApiError> {
    Ok(services.dispatch::<Product>(tenant_id, id, PRODUCT, cmd, |_t, a| Product::empty(ProductId::new(a)))?)
}

/// Creates a product, then adds any variations sent along with it.
pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateProductRequest>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::CATALOG_WRITE)?;
    let tenant_id = tenant.tenant_id();
    let agg = AggregateId::new();
    let product_id = ProductId::new(agg);

    let mut committed = dispatch(
        &services,
        tenant_id,
        agg,
        ProductCommand::CreateProduct(CreateProduct {
            tenant_id,
            product_id,
            sku: body.sku,
            name: body.name,
            category: body.category,
            unit: body.unit,
            description: body.description,
            occurred_at: Utc::now(),
        }),
    )?;
    for variation in body.variations {
        committed.extend(dispatch(
            &services,
            tenant_id,
            agg,
            ProductCommand::AddVariation(AddVariation {
                tenant_id,
                product_id,
                variation,
                occurred_at: Utc::now(),
            }),
        )?);
    }

    info!(%tenant_id, product_id = %agg, "product created");
    Ok(dto::created(agg, &committed))
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::CATALOG_READ)?;
    let products = services.read_models().products.list(tenant.tenant_id());
    Ok(Json(catalog_view(&products)).into_response())
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::CATALOG_READ)?;
    let agg = dto::parse_id(&id)?;
    let product = services
        .read_models()
        .products
        .get(tenant.tenant_id(), agg)
        .filter(Product::is_created)
        .ok_or_else(|| ApiError::not_found("product"))?;
    Ok(Json(ProductView::from(&product)).into_response())
}

pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateProductRequest>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::CATALOG_WRITE)?;
    let tenant_id = tenant.tenant_id();
    let agg = dto::parse_id(&id)?;
    let committed = dispatch(
        &services,
        tenant_id,
        agg,
        ProductCommand::UpdateGeneric(UpdateGeneric {
            tenant_id,
            product_id: ProductId::new(agg),
            name: body.name,
            category: body.category,
            unit: body.unit,
            description: body.description,
            occurred_at: Utc::now(),
        }),
    )?;
    Ok(dto::accepted(agg, &committed))
}

pub async fn add_variation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<stockledger_catalog::NewVariation>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::CATALOG_WRITE)?;
    let tenant_id = tenant.tenant_id();
    let agg = dto::parse_id(&id)?;
    let committed = dispatch(
        &services,
        tenant_id,
        agg,
        ProductCommand::AddVariation(AddVariation {
            tenant_id,
            product_id: ProductId::new(agg),
            variation: body,
            occurred_at: Utc::now(),
        }),
    )?;

    let variation_id = committed.iter().find_map(|e| {
        match serde_json::from_value::<ProductEvent>(e.payload.clone()) {
            Ok(ProductEvent::VariationAdded(added)) => Some(added.variation.variation_id),
            _ => None,
        }
    });
    Ok((
        axum::http::StatusCode::CREATED,
        Json(serde_json::json!({
            "id": agg.to_string(),
            "variation_id": variation_id,
            "events_committed": committed.len(),
        })),
    )
        .into_response())
}

pub async fn update_variation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, vid)): Path<(String, u32)>,
    Json(body): Json<dto::UpdateVariationRequest>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::CATALOG_WRITE)?;
    let tenant_id = tenant.tenant_id();
    let agg = dto::parse_id(&id)?;
    let committed = dispatch(
        &services,
        tenant_id,
        agg,
        ProductCommand::UpdateVariation(UpdateVariation {
            tenant_id,
            product_id: ProductId::new(agg),
            variation_id: VariationId(vid),
            attributes: body.attributes,
            sale_price: body.sale_price,
            purchase_cost: body.purchase_cost,
            occurred_at: Utc::now(),
        }),
    )?;
    Ok(dto::accepted(agg, &committed))
}

pub async fn discontinue_variation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, vid)): Path<(String, u32)>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::CATALOG_WRITE)?;
    let tenant_id = tenant.tenant_id();
    let agg = dto::parse_id(&id)?;
    let committed = dispatch(
        &services,
        tenant_id,
        agg,
        ProductCommand::DiscontinueVariation(DiscontinueVariation {
            tenant_id,
            product_id: ProductId::new(agg),
            variation_id: VariationId(vid),
            occurred_at: Utc::now(),
        }),
    )?;
    Ok(dto::accepted(agg, &committed))
}

pub async fn archive_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&tenant, &principal, &permissions::CATALOG_WRITE)?;
    let tenant_id = tenant.tenant_id();
    let agg = dto::parse_id(&id)?;
    let committed = dispatch(
        &services,
        tenant_id,
        agg,
        ProductCommand::ArchiveProduct(ArchiveProduct {
            tenant_id,
            product_id: ProductId::new(agg),
            occurred_at: Utc::now(),
        }),
    )?;
    Ok(dto::accepted(agg, &committed))
}
