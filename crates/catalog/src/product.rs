use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money, TenantId};
use stockledger_events::Event;

use crate::variation::{Attributes, NewVariation, Variation, VariationId, validate_sku};

/// Product identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Archived,
}

pub const DEFAULT_UNIT: &str = "pcs";

/// Aggregate root: Product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    tenant_id: Option<TenantId>,
    sku: String,
    name: String,
    category: Option<String>,
    unit: String,
    description: Option<String>,
    status: ProductStatus,
    variations: Vec<Variation>,
    next_variation: u32,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            tenant_id: None,
            sku: String::new(),
            name: String::new(),
            category: None,
            unit: DEFAULT_UNIT.to_string(),
            description: None,
            status: ProductStatus::Active,
            variations: Vec::new(),
            next_variation: 1,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn status(&self) -> ProductStatus {
        self.status
    }

    pub fn variations(&self) -> &[Variation] {
        &self.variations
    }

    pub fn variation(&self, id: VariationId) -> Option<&Variation> {
        self.variations.iter().find(|v| v.variation_id == id)
    }

    pub fn active_variations(&self) -> impl Iterator<Item = &Variation> {
        self.variations.iter().filter(|v| v.active)
    }

    /// A variation can be bought or sold only while both it and the product are live.
    pub fn can_trade(&self, id: VariationId) -> bool {
        self.status == ProductStatus::Active && self.variation(id).is_some_and(|v| v.active)
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateGeneric.
///
/// `None` leaves a field unchanged. For the optional fields (category,
/// description) an empty string clears the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateGeneric {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub name: Option<String>,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddVariation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddVariation {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub variation: NewVariation,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateVariation. `None` leaves a field unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateVariation {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub variation_id: VariationId,
    pub attributes: Option<Attributes>,
    pub sale_price: Option<Money>,
    pub purchase_cost: Option<Money>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DiscontinueVariation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscontinueVariation {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub variation_id: VariationId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ArchiveProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    UpdateGeneric(UpdateGeneric),
    AddVariation(AddVariation),
    UpdateVariation(UpdateVariation),
    DiscontinueVariation(DiscontinueVariation),
    ArchiveProduct(ArchiveProduct),
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub category: Option<String>,
    pub unit: String,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GenericUpdated (carries the full resulting generic info).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericUpdated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub name: String,
    pub category: Option<String>,
    pub unit: String,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: VariationAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariationAdded {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub variation: Variation,
    pub occurred_at: DateTime<Utc>,
}

/// Event: VariationUpdated (carries the full resulting values).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariationUpdated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub variation_id: VariationId,
    pub attributes: Attributes,
    pub sale_price: Money,
    pub purchase_cost: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: VariationDiscontinued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariationDiscontinued {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub variation_id: VariationId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductArchived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductArchived {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    GenericUpdated(GenericUpdated),
    VariationAdded(VariationAdded),
    VariationUpdated(VariationUpdated),
    VariationDiscontinued(VariationDiscontinued),
    ProductArchived(ProductArchived),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "catalog.product.created",
            ProductEvent::GenericUpdated(_) => "catalog.product.generic_updated",
            ProductEvent::VariationAdded(_) => "catalog.product.variation_added",
            ProductEvent::VariationUpdated(_) => "catalog.product.variation_updated",
            ProductEvent::VariationDiscontinued(_) => "catalog.product.variation_discontinued",
            ProductEvent::ProductArchived(_) => "catalog.product.archived",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::GenericUpdated(e) => e.occurred_at,
            ProductEvent::VariationAdded(e) => e.occurred_at,
            ProductEvent::VariationUpdated(e) => e.occurred_at,
            ProductEvent::VariationDiscontinued(e) => e.occurred_at,
            ProductEvent::ProductArchived(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.tenant_id = Some(e.tenant_id);
                self.sku = e.sku.clone();
                self.name = e.name.clone();
                self.category = e.category.clone();
                self.unit = e.unit.clone();
                self.description = e.description.clone();
                self.status = ProductStatus::Active;
                self.created = true;
            }
            ProductEvent::GenericUpdated(e) => {
                self.name = e.name.clone();
                self.category = e.category.clone();
                self.unit = e.unit.clone();
                self.description = e.description.clone();
            }
            ProductEvent::VariationAdded(e) => {
                self.next_variation = self.next_variation.max(e.variation.variation_id.0 + 1);
                self.variations.push(e.variation.clone());
            }
            ProductEvent::VariationUpdated(e) => {
                if let Some(v) = self
                    .variations
                    .iter_mut()
                    .find(|v| v.variation_id == e.variation_id)
                {
                    v.attributes = e.attributes.clone();
                    v.sale_price = e.sale_price;
                    v.purchase_cost = e.purchase_cost;
                }
            }
            ProductEvent::VariationDiscontinued(e) => {
                if let Some(v) = self
                    .variations
                    .iter_mut()
                    .find(|v| v.variation_id == e.variation_id)
                {
                    v.active = false;
                }
            }
            ProductEvent::ProductArchived(_) => {
                self.status = ProductStatus::Archived;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::UpdateGeneric(cmd) => self.handle_update_generic(cmd),
            ProductCommand::AddVariation(cmd) => self.handle_add_variation(cmd),
            ProductCommand::UpdateVariation(cmd) => self.handle_update_variation(cmd),
            ProductCommand::DiscontinueVariation(cmd) => self.handle_discontinue(cmd),
            ProductCommand::ArchiveProduct(cmd) => self.handle_archive(cmd),
        }
    }
}

fn clean_optional(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl Product {
    fn ensure_editable(&self, tenant_id: TenantId, product_id: ProductId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("product"));
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        if self.status == ProductStatus::Archived {
            return Err(DomainError::conflict("product is archived"));
        }
        Ok(())
    }

    fn active_variation(&self, id: VariationId) -> Result<&Variation, DomainError> {
        let v = self
            .variation(id)
            .ok_or_else(|| DomainError::not_found(format!("variation {id}")))?;
        if !v.active {
            return Err(DomainError::conflict(format!("variation {id} is discontinued")));
        }
        Ok(v)
    }

    fn ensure_attributes_free(
        &self,
        attributes: &Attributes,
        except: Option<VariationId>,
    ) -> Result<(), DomainError> {
        let clash = self
            .active_variations()
            .filter(|v| Some(v.variation_id) != except)
            .find(|v| &v.attributes == attributes);
        if let Some(v) = clash {
            return Err(DomainError::invariant(format!(
                "variation {} already has attributes [{}]",
                v.variation_id, attributes
            )));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        validate_sku(&cmd.sku, "SKU")?;

        let unit = clean_optional(cmd.unit.as_ref()).unwrap_or_else(|| DEFAULT_UNIT.to_string());

        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            sku: cmd.sku.trim().to_string(),
            name: cmd.name.trim().to_string(),
            category: clean_optional(cmd.category.as_ref()),
            unit,
            description: clean_optional(cmd.description.as_ref()),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_generic(&self, cmd: &UpdateGeneric) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_editable(cmd.tenant_id, cmd.product_id)?;

        let name = match &cmd.name {
            Some(n) if n.trim().is_empty() => {
                return Err(DomainError::validation("name cannot be empty"));
            }
            Some(n) => n.trim().to_string(),
            None => self.name.clone(),
        };
        let unit = match &cmd.unit {
            Some(u) if u.trim().is_empty() => {
                return Err(DomainError::validation("unit cannot be empty"));
            }
            Some(u) => u.trim().to_string(),
            None => self.unit.clone(),
        };
        let category = match &cmd.category {
            Some(c) => clean_optional(Some(c)),
            None => self.category.clone(),
        };
        let description = match &cmd.description {
            Some(d) => clean_optional(Some(d)),
            None => self.description.clone(),
        };

        if name == self.name
            && unit == self.unit
            && category == self.category
            && description == self.description
        {
            return Err(DomainError::validation("update changes nothing"));
        }

        Ok(vec![ProductEvent::GenericUpdated(GenericUpdated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            name,
            category,
            unit,
            description,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_variation(&self, cmd: &AddVariation) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_editable(cmd.tenant_id, cmd.product_id)?;

        let new = &cmd.variation;
        validate_sku(&new.sku, "variation SKU")?;
        let sku = new.sku.trim().to_string();
        if self.variations.iter().any(|v| v.sku.eq_ignore_ascii_case(&sku)) {
            return Err(DomainError::invariant(format!(
                "variation SKU '{sku}' already used by this product"
            )));
        }
        new.sale_price.ensure_non_negative("sale price")?;
        new.purchase_cost.ensure_non_negative("purchase cost")?;
        let attributes = new.attributes.normalized()?;
        self.ensure_attributes_free(&attributes, None)?;

        Ok(vec![ProductEvent::VariationAdded(VariationAdded {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            variation: Variation {
                variation_id: VariationId(self.next_variation),
                sku,
                attributes,
                sale_price: new.sale_price,
                purchase_cost: new.purchase_cost,
                active: true,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_variation(
        &self,
        cmd: &UpdateVariation,
    ) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_editable(cmd.tenant_id, cmd.product_id)?;
        let current = self.active_variation(cmd.variation_id)?;

        let attributes = match &cmd.attributes {
            Some(a) => {
                let a = a.normalized()?;
                self.ensure_attributes_free(&a, Some(cmd.variation_id))?;
                a
            }
            None => current.attributes.clone(),
        };
        let sale_price = cmd
            .sale_price
            .map(|p| p.ensure_non_negative("sale price"))
            .transpose()?
            .unwrap_or(current.sale_price);
        let purchase_cost = cmd
            .purchase_cost
            .map(|c| c.ensure_non_negative("purchase cost"))
            .transpose()?
            .unwrap_or(current.purchase_cost);

        if attributes == current.attributes
            && sale_price == current.sale_price
            && purchase_cost == current.purchase_cost
        {
            return Err(DomainError::validation("update changes nothing"));
        }

        Ok(vec![ProductEvent::VariationUpdated(VariationUpdated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            variation_id: cmd.variation_id,
            attributes,
            sale_price,
            purchase_cost,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_discontinue(
        &self,
        cmd: &DiscontinueVariation,
    ) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_editable(cmd.tenant_id, cmd.product_id)?;
        self.active_variation(cmd.variation_id)?;

        if self.active_variations().count() == 1 {
            return Err(DomainError::invariant(
                "cannot discontinue the last active variation; archive the product instead",
            ));
        }

        Ok(vec![ProductEvent::VariationDiscontinued(VariationDiscontinued {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            variation_id: cmd.variation_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_archive(&self, cmd: &ArchiveProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_editable(cmd.tenant_id, cmd.product_id)?;

        Ok(vec![ProductEvent::ProductArchived(ProductArchived {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use stockledger_events::execute;

    fn tenant() -> TenantId {
        TenantId::new()
    }

    fn created(tenant_id: TenantId) -> Product {
        let product_id = ProductId::new(AggregateId::new());
        let mut product = Product::empty(product_id);
        execute(
            &mut product,
            &ProductCommand::CreateProduct(CreateProduct {
                tenant_id,
                product_id,
                sku: "TSHIRT".to_string(),
                name: "T-Shirt".to_string(),
                category: Some("Apparel".to_string()),
                unit: None,
                description: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        product
    }

    fn add(product: &mut Product, tenant_id: TenantId, sku: &str, attrs: &str) -> Result<VariationId, DomainError> {
        let product_id = product.id_typed();
        let events = execute(
            product,
            &ProductCommand::AddVariation(AddVariation {
                tenant_id,
                product_id,
                variation: NewVariation {
                    sku: sku.to_string(),
                    attributes: Attributes::parse(attrs).unwrap(),
                    sale_price: Money::from_cents(1999),
                    purchase_cost: Money::from_cents(800),
                },
                occurred_at: Utc::now(),
            }),
        )?;
        match &events[0] {
            ProductEvent::VariationAdded(e) => Ok(e.variation.variation_id),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn create_defaults_unit_and_trims_fields() {
        let product = created(tenant());
        assert_eq!(product.unit(), DEFAULT_UNIT);
        assert_eq!(product.category(), Some("Apparel"));
        assert_eq!(product.status(), ProductStatus::Active);
        assert_eq!(product.version(), 1);
    }

    #[test]
    fn create_rejects_whitespace_in_sku() {
        let product_id = ProductId::new(AggregateId::new());
        let err = Product::empty(product_id)
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                tenant_id: tenant(),
                product_id,
                sku: "T SHIRT".to_string(),
                name: "T-Shirt".to_string(),
                category: None,
                unit: None,
                description: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn variation_ids_are_sequential_and_never_reused() {
        let t = tenant();
        let mut product = created(t);
        let pid = product.id_typed();
        let a = add(&mut product, t, "TS-S", "size=S").unwrap();
        let b = add(&mut product, t, "TS-M", "size=M").unwrap();
        assert_eq!((a, b), (VariationId(1), VariationId(2)));

        execute(
            &mut product,
            &ProductCommand::DiscontinueVariation(DiscontinueVariation {
                tenant_id: t,
                product_id: pid,
                variation_id: b,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        let c = add(&mut product, t, "TS-L", "size=L").unwrap();
        assert_eq!(c, VariationId(3));
    }

    #[test]
    fn duplicate_sku_or_attributes_rejected() {
        let t = tenant();
        let mut product = created(t);
        add(&mut product, t, "TS-S", "size=S").unwrap();

        let err = add(&mut product, t, "ts-s", "size=M").unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        let err = add(&mut product, t, "TS-S2", "Size=S").unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn last_active_variation_cannot_be_discontinued() {
        let t = tenant();
        let mut product = created(t);
        let pid = product.id_typed();
        let only = add(&mut product, t, "TS-S", "size=S").unwrap();

        let err = product
            .handle(&ProductCommand::DiscontinueVariation(DiscontinueVariation {
                tenant_id: t,
                product_id: pid,
                variation_id: only,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn update_variation_keeps_unspecified_fields() {
        let t = tenant();
        let mut product = created(t);
        let pid = product.id_typed();
        let v = add(&mut product, t, "TS-S", "size=S").unwrap();

        execute(
            &mut product,
            &ProductCommand::UpdateVariation(UpdateVariation {
                tenant_id: t,
                product_id: pid,
                variation_id: v,
                attributes: None,
                sale_price: Some(Money::from_cents(2499)),
                purchase_cost: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        let var = product.variation(v).unwrap();
        assert_eq!(var.sale_price, Money::from_cents(2499));
        assert_eq!(var.purchase_cost, Money::from_cents(800));
        assert_eq!(var.unit_margin(), Money::from_cents(1699));
    }

    #[test]
    fn generic_update_rejects_noop_and_clears_with_empty_string() {
        let t = tenant();
        let mut product = created(t);
        let pid = product.id_typed();
        let noop = UpdateGeneric {
            tenant_id: t,
            product_id: pid,
            name: Some("T-Shirt".to_string()),
            category: None,
            unit: None,
            description: None,
            occurred_at: Utc::now(),
        };
        assert!(matches!(
            product.handle(&ProductCommand::UpdateGeneric(noop.clone())),
            Err(DomainError::Validation(_))
        ));

        let clear = UpdateGeneric {
            category: Some(String::new()),
            ..noop
        };
        execute(&mut product, &ProductCommand::UpdateGeneric(clear)).unwrap();
        assert_eq!(product.category(), None);
    }

    #[test]
    fn archived_product_rejects_edits() {
        let t = tenant();
        let mut product = created(t);
        let pid = product.id_typed();
        let v = add(&mut product, t, "TS-S", "size=S").unwrap();
        execute(
            &mut product,
            &ProductCommand::ArchiveProduct(ArchiveProduct {
                tenant_id: t,
                product_id: pid,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        assert!(!product.can_trade(v));
        let err = add(&mut product, t, "TS-M", "size=M").unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn other_tenant_cannot_edit() {
        let t = tenant();
        let mut product = created(t);
        let err = add(&mut product, tenant(), "TS-S", "size=S").unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    proptest! {
        #[test]
        fn rehydration_is_deterministic(count in 1usize..8) {
            let t = tenant();
            let mut product = created(t);
            let pid = product.id_typed();
            let mut history = Vec::new();
            for i in 0..count {
                let events = execute(
                    &mut product,
                    &ProductCommand::AddVariation(AddVariation {
                        tenant_id: t,
                        product_id: pid,
                        variation: NewVariation {
                            sku: format!("V{i}"),
                            attributes: Attributes::from_pairs([("n", i.to_string())]).unwrap(),
                            sale_price: Money::from_cents(100),
                            purchase_cost: Money::from_cents(50),
                        },
                        occurred_at: Utc::now(),
                    }),
                ).unwrap();
                history.extend(events);
            }

            let mut replayed = created(t);
            replayed.id = product.id_typed();
            for e in &history {
                replayed.apply(e);
            }
            prop_assert_eq!(replayed.variations(), product.variations());
            prop_assert_eq!(replayed.version(), product.version());
        }
    }
}
