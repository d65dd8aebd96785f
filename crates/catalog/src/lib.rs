//! Catalog domain module (event-sourced).
//!
//! A product carries the generic information shared by every variant (name,
//! base SKU, category, unit) and one or more sellable variations, each with its
//! own SKU, attribute set and prices. Everything here is deterministic domain
//! logic: no IO, no HTTP, no storage.

pub mod product;
pub mod variation;

pub use product::{
    AddVariation, ArchiveProduct, CreateProduct, DiscontinueVariation, GenericUpdated, Product,
    ProductArchived, ProductCommand, ProductCreated, ProductEvent, ProductId, ProductStatus,
    UpdateGeneric, UpdateVariation, VariationAdded, VariationDiscontinued, VariationUpdated,
};
pub use variation::{Attributes, NewVariation, Variation, VariationId, VariantKey};
