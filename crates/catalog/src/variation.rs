use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, Money};

use crate::product::ProductId;

/// Per-product variation number. Allocated sequentially from 1 and never reused.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariationId(pub u32);

impl core::fmt::Display for VariationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// The unit every stock movement, purchase line and sale line refers to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VariantKey {
    pub product_id: ProductId,
    pub variation_id: VariationId,
}

impl VariantKey {
    pub fn new(product_id: ProductId, variation_id: VariationId) -> Self {
        Self {
            product_id,
            variation_id,
        }
    }
}

/// Distinguishing attributes of a variation, e.g. `size=L`, `color=red`.
///
/// Keys are normalised to trimmed lowercase so `Color` and `color ` are the same
/// attribute. Ordering is stable so two sets compare by content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, String>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V, I>(pairs: I) -> DomainResult<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut map = BTreeMap::new();
        for (k, v) in pairs {
            let key = k.as_ref().trim().to_lowercase();
            let value = v.as_ref().trim().to_string();
            if key.is_empty() {
                return Err(DomainError::validation("attribute name cannot be empty"));
            }
            if value.is_empty() {
                return Err(DomainError::validation(format!(
                    "attribute '{key}' has an empty value"
                )));
            }
            if map.insert(key.clone(), value).is_some() {
                return Err(DomainError::validation(format!(
                    "attribute '{key}' given twice"
                )));
            }
        }
        Ok(Self(map))
    }

    /// Parse the compact `key=value;key=value` notation used in spreadsheets.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let mut pairs = Vec::new();
        for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (k, v) = part.split_once('=').ok_or_else(|| {
                DomainError::validation(format!("attribute '{part}' is not in key=value form"))
            })?;
            pairs.push((k, v));
        }
        Self::from_pairs(pairs)
    }

    /// Re-validate a set that arrived through deserialization.
    pub fn normalized(&self) -> DomainResult<Self> {
        Self::from_pairs(self.0.iter())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(&key.to_lowercase()).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

impl core::fmt::Display for Attributes {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut first = true;
        for (k, v) in &self.0 {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v}")?;
            first = false;
        }
        Ok(())
    }
}

/// Input for a new variation (the id is allocated by the product).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVariation {
    pub sku: String,
    #[serde(default)]
    pub attributes: Attributes,
    pub sale_price: Money,
    pub purchase_cost: Money,
}

/// A sellable variant of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variation {
    pub variation_id: VariationId,
    pub sku: String,
    pub attributes: Attributes,
    pub sale_price: Money,
    pub purchase_cost: Money,
    pub active: bool,
}

impl Variation {
    /// Unit margin at current prices (may be negative).
    pub fn unit_margin(&self) -> Money {
        self.sale_price - self.purchase_cost
    }
}

pub(crate) fn validate_sku(sku: &str, what: &str) -> DomainResult<()> {
    if sku.trim().is_empty() {
        return Err(DomainError::validation(format!("{what} cannot be empty")));
    }
    if sku.chars().any(char::is_whitespace) {
        return Err(DomainError::validation(format!(
            "{what} cannot contain whitespace"
        )));
    }
    Ok(())
}
