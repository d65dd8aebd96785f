use std::collections::BTreeMap;

use serde::Serialize;

use stockledger_catalog::VariantKey;
use stockledger_storage::{Storage, StorageId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockLine {
    pub key: VariantKey,
    pub quantity: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageView {
    pub storage_id: StorageId,
    pub name: String,
    pub location: Option<String>,
    pub capacity: Option<u64>,
    pub active: bool,
    pub total_units: u64,
    pub stock: Vec<StockLine>,
}

impl From<&Storage> for StorageView {
    fn from(s: &Storage) -> Self {
        let mut stock: Vec<StockLine> = s
            .stock()
            .filter(|(_, q)| **q > 0)
            .map(|(k, q)| StockLine { key: *k, quantity: *q })
            .collect();
        stock.sort_by_key(|l| l.key);
        Self {
            storage_id: s.id_typed(),
            name: s.name().to_string(),
            location: s.location().map(str::to_string),
            capacity: s.capacity(),
            active: s.is_active(),
            total_units: s.total_units(),
            stock,
        }
    }
}

/// On-hand quantity of one variation in one storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageQuantity {
    pub storage_id: StorageId,
    pub quantity: u64,
}

/// One row of `GET /stock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockLevel {
    pub key: VariantKey,
    pub on_hand: u64,
    pub storages: Vec<StorageQuantity>,
}

pub fn storage_list(storages: &[Storage]) -> Vec<StorageView> {
    let mut out: Vec<StorageView> = storages.iter().filter(|s| s.is_created()).map(StorageView::from).collect();
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out
}

/// Sums stock per variation across every storage of a tenant.
pub fn stock_levels(storages: &[Storage]) -> Vec<StockLevel> {
    let mut levels: BTreeMap<VariantKey, StockLevel> = BTreeMap::new();
    for storage in storages {
        for (key, qty) in storage.stock() {
            if *qty == 0 {
                continue;
            }
            let level = levels.entry(*key).or_insert_with(|| StockLevel {
                key: *key,
                on_hand: 0,
                storages: Vec::new(),
            });
            level.on_hand = level.on_hand.saturating_add(*qty);
            level.storages.push(StorageQuantity {
                storage_id: storage.id_typed(),
                quantity: *qty,
            });
        }
    }
    levels.into_values().collect()
}
