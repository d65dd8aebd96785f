use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use stockledger_catalog::{
    AddVariation, CreateProduct, NewVariation, Product, ProductCommand, ProductEvent, ProductId, VariantKey,
    VariationId,
};
use stockledger_core::{AggregateId, TenantId};
use stockledger_events::{EventBus, EventEnvelope};
use stockledger_import::{CatalogRow, ImportReport, PartyRow, RowError};
use stockledger_parties::{CreateParty, PartyCommand, PartyId};
use stockledger_storage::{AllocateStock, CreateStorage, StockSource, Storage, StorageCommand, StorageId};

use super::{Workflows, decode};
use crate::command_dispatcher::DispatchError;
use crate::event_store::{EventStore, StoredEvent};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportedProduct {
    pub product_id: ProductId,
    pub sku: String,
    pub created: bool,
    pub variations: Vec<(String, VariationId)>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CatalogImportOutcome {
    pub products: Vec<ImportedProduct>,
    pub storages_created: Vec<StorageId>,
    /// Parse errors plus rows whose dispatch failed.
    pub errors: Vec<RowError>,
    #[serde(skip)]
    pub events: Vec<StoredEvent>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PartyImportOutcome {
    pub created: Vec<(usize, PartyId)>,
    pub errors: Vec<RowError>,
    #[serde(skip)]
    pub events: Vec<StoredEvent>,
}

fn row_error(row: usize, err: &DispatchError) -> RowError {
    RowError {
        row,
        column: None,
        message: err.to_string(),
    }
}

impl<S, B> Workflows<'_, S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Turn parsed catalog rows into products, variations and opening stock.
    ///
    /// Rows are grouped by product sku. Products and storages that already
    /// exist (matched by sku / name, case-insensitively) are reused. A row
    /// that fails is reported and the import moves on.
    pub fn import_catalog(
        &self,
        tenant_id: TenantId,
        report: ImportReport<CatalogRow>,
        existing_products: &[Product],
        existing_storages: &[Storage],
    ) -> CatalogImportOutcome {
        let mut outcome = CatalogImportOutcome {
            errors: report.errors,
            ..Default::default()
        };

        let mut storages: HashMap<String, StorageId> = existing_storages
            .iter()
            .filter(|s| s.is_created())
            .map(|s| (s.name().to_lowercase(), s.id_typed()))
            .collect();

        // Group rows by product sku, keeping first-seen order.
        let mut groups: Vec<(String, Vec<(usize, CatalogRow)>)> = Vec::new();
        for (row_no, row) in report.rows {
            let sku = row.product_sku.to_lowercase();
            match groups.iter_mut().find(|(k, _)| *k == sku) {
                Some((_, rows)) => rows.push((row_no, row)),
                None => groups.push((sku, vec![(row_no, row)])),
            }
        }

        for (sku, rows) in groups {
            let Some((first_row, first)) = rows.first() else {
                continue;
            };
            let found = existing_products
                .iter()
                .find(|p| p.is_created() && p.sku().to_lowercase() == sku)
                .map(|p| p.id_typed());
            let (product_id, created) = match found {
                Some(id) => (id, false),
                None => {
                    let product_id = ProductId::new(AggregateId::new());
                    let cmd = ProductCommand::CreateProduct(CreateProduct {
                        tenant_id,
                        product_id,
                        sku: first.product_sku.clone(),
                        name: first.product_name.clone(),
                        category: first.category.clone(),
                        unit: None,
                        description: None,
                        occurred_at: Utc::now(),
                    });
                    match self.dispatch_product(tenant_id, product_id, cmd) {
                        Ok(events) => outcome.events.extend(events),
                        Err(err) => {
                            outcome
                                .errors
                                .extend(rows.iter().map(|(row_no, _)| row_error(*row_no, &err)));
                            warn!(%tenant_id, row = *first_row, error = %err, "product import failed");
                            continue;
                        }
                    }
                    (product_id, true)
                }
            };

            let mut imported = ImportedProduct {
                product_id,
                sku: first.product_sku.clone(),
                created,
                variations: Vec::new(),
            };
            for (row_no, row) in &rows {
                match self.import_variation(tenant_id, product_id, row, &mut storages, &mut outcome) {
                    Ok(variation_id) => imported.variations.push((row.variation_sku.clone(), variation_id)),
                    Err(err) => outcome.errors.push(row_error(*row_no, &err)),
                }
            }
            outcome.products.push(imported);
        }

        outcome.errors.sort_by_key(|e| e.row);
        info!(
            %tenant_id,
            products = outcome.products.len(),
            errors = outcome.errors.len(),
            "catalog import finished"
        );
        outcome
    }

    fn import_variation(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        row: &CatalogRow,
        storages: &mut HashMap<String, StorageId>,
        outcome: &mut CatalogImportOutcome,
    ) -> Result<VariationId, DispatchError> {
        let storage_name = match (row.opening_quantity, row.storage.as_deref().map(str::trim)) {
            (0, _) => None,
            (_, Some(name)) if !name.is_empty() => Some(name),
            _ => return Err(DispatchError::Validation("opening quantity needs a storage".into())),
        };
        let product = self.product(tenant_id, product_id)?;
        let existing = product
            .variations()
            .iter()
            .find(|v| v.sku.eq_ignore_ascii_case(&row.variation_sku))
            .map(|v| v.variation_id);

        let variation_id = match existing {
            Some(id) => id,
            None => {
                let committed = self.dispatch_product(
                    tenant_id,
                    product_id,
                    ProductCommand::AddVariation(AddVariation {
                        tenant_id,
                        product_id,
                        variation: NewVariation {
                            sku: row.variation_sku.clone(),
                            attributes: row.attributes.clone(),
                            sale_price: row.price,
                            purchase_cost: row.cost,
                        },
                        occurred_at: Utc::now(),
                    }),
                )?;
                let decoded: Vec<ProductEvent> = decode(&committed)?;
                outcome.events.extend(committed);
                decoded
                    .iter()
                    .find_map(|e| match e {
                        ProductEvent::VariationAdded(added) => Some(added.variation.variation_id),
                        _ => None,
                    })
                    .ok_or_else(|| DispatchError::InvariantViolation("variation was not added".into()))?
            }
        };

        if let Some(name) = storage_name {
            let storage_id = match storages.get(&name.to_lowercase()) {
                Some(id) => *id,
                None => {
                    let storage_id = StorageId::new(AggregateId::new());
                    outcome.events.extend(self.dispatch_storage(
                        tenant_id,
                        storage_id,
                        StorageCommand::CreateStorage(CreateStorage {
                            tenant_id,
                            storage_id,
                            name: name.to_string(),
                            location: None,
                            capacity: None,
                            occurred_at: Utc::now(),
                        }),
                    )?);
                    storages.insert(name.to_lowercase(), storage_id);
                    outcome.storages_created.push(storage_id);
                    storage_id
                }
            };
            outcome.events.extend(self.dispatch_storage(
                tenant_id,
                storage_id,
                StorageCommand::AllocateStock(AllocateStock {
                    tenant_id,
                    storage_id,
                    key: VariantKey::new(product_id, variation_id),
                    quantity: row.opening_quantity,
                    source: StockSource::Opening,
                    occurred_at: Utc::now(),
                }),
            )?);
        }
        Ok(variation_id)
    }

    /// Create one party per accepted row.
    pub fn import_parties(&self, tenant_id: TenantId, report: ImportReport<PartyRow>) -> PartyImportOutcome {
        let mut outcome = PartyImportOutcome {
            errors: report.errors,
            ..Default::default()
        };
        for (row_no, row) in report.rows {
            let party_id = PartyId::new(AggregateId::new());
            let cmd = PartyCommand::CreateParty(CreateParty {
                tenant_id,
                party_id,
                kind: row.kind,
                name: row.name,
                contact: row.contact,
                occurred_at: Utc::now(),
            });
            match self.dispatch_party(tenant_id, party_id, cmd) {
                Ok(events) => {
                    outcome.events.extend(events);
                    outcome.created.push((row_no, party_id));
                }
                Err(err) => outcome.errors.push(row_error(row_no, &err)),
            }
        }
        outcome.errors.sort_by_key(|e| e.row);
        outcome
    }
}
