use serde::Serialize;

use stockledger_catalog::{Product, ProductId, ProductStatus, Variation};

/// Catalog entry as served by `GET /catalog/products`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductView {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub category: Option<String>,
    pub unit: String,
    pub description: Option<String>,
    pub status: ProductStatus,
    pub variations: Vec<Variation>,
}

impl From<&Product> for ProductView {
    fn from(p: &Product) -> Self {
        Self {
            product_id: p.id_typed(),
            sku: p.sku().to_string(),
            name: p.name().to_string(),
            category: p.category().map(str::to_string),
            unit: p.unit().to_string(),
            description: p.description().map(str::to_string),
            status: p.status(),
            variations: p.variations().to_vec(),
        }
    }
}

/// Products sorted by name, then sku.
pub fn catalog_view(products: &[Product]) -> Vec<ProductView> {
    let mut out: Vec<ProductView> = products.iter().filter(|p| p.is_created()).map(ProductView::from).collect();
    out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.sku.cmp(&b.sku)));
    out
}
