use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_catalog::VariantKey;
use stockledger_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use stockledger_events::Event;

/// Storage identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageId(pub AggregateId);

impl StorageId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for StorageId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Where allocated stock came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StockSource {
    Purchase { purchase_id: AggregateId },
    Transfer { from: StorageId },
    Opening,
    Return { sale_id: AggregateId },
}

/// Why stock left the storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReleaseReason {
    Sale { sale_id: AggregateId },
    Transfer { to: StorageId },
    WriteOff,
}

/// Aggregate root: Storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Storage {
    id: StorageId,
    tenant_id: Option<TenantId>,
    name: String,
    location: Option<String>,
    capacity: Option<u64>,
    active: bool,
    stock: BTreeMap<VariantKey, u64>,
    version: u64,
    created: bool,
}

impl Storage {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: StorageId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            location: None,
            capacity: None,
            active: true,
            stock: BTreeMap::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> StorageId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn capacity(&self) -> Option<u64> {
        self.capacity
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn on_hand(&self, key: &VariantKey) -> u64 {
        self.stock.get(key).copied().unwrap_or(0)
    }

    /// Units across all variations. Allocation keeps this within `u64`.
    pub fn total_units(&self) -> u64 {
        self.stock.values().fold(0, |acc, q| acc.saturating_add(*q))
    }

    pub fn stock(&self) -> impl Iterator<Item = (&VariantKey, &u64)> {
        self.stock.iter().filter(|(_, q)| **q > 0)
    }

    /// Units that can still be put in before hitting capacity.
    pub fn free_capacity(&self) -> Option<u64> {
        self.capacity
            .map(|cap| cap.saturating_sub(self.total_units()))
    }
}

impl AggregateRoot for Storage {
    type Id = StorageId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateStorage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateStorage {
    pub tenant_id: TenantId,
    pub storage_id: StorageId,
    pub name: String,
    pub location: Option<String>,
    pub capacity: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RenameStorage (name and/or location).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameStorage {
    pub tenant_id: TenantId,
    pub storage_id: StorageId,
    pub name: String,
    pub location: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetCapacity (`None` removes the limit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetCapacity {
    pub tenant_id: TenantId,
    pub storage_id: StorageId,
    pub capacity: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AllocateStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocateStock {
    pub tenant_id: TenantId,
    pub storage_id: StorageId,
    pub key: VariantKey,
    pub quantity: u64,
    pub source: StockSource,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleaseStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseStock {
    pub tenant_id: TenantId,
    pub storage_id: StorageId,
    pub key: VariantKey,
    pub quantity: u64,
    pub reason: ReleaseReason,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustStock (stock count correction).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub tenant_id: TenantId,
    pub storage_id: StorageId,
    pub key: VariantKey,
    pub delta: i64,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Deactivate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deactivate {
    pub tenant_id: TenantId,
    pub storage_id: StorageId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageCommand {
    CreateStorage(CreateStorage),
    RenameStorage(RenameStorage),
    SetCapacity(SetCapacity),
    AllocateStock(AllocateStock),
    ReleaseStock(ReleaseStock),
    AdjustStock(AdjustStock),
    Deactivate(Deactivate),
}

/// Event: StorageCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageCreated {
    pub tenant_id: TenantId,
    pub storage_id: StorageId,
    pub name: String,
    pub location: Option<String>,
    pub capacity: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StorageRenamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRenamed {
    pub tenant_id: TenantId,
    pub storage_id: StorageId,
    pub name: String,
    pub location: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CapacityChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityChanged {
    pub tenant_id: TenantId,
    pub storage_id: StorageId,
    pub capacity: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAllocated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAllocated {
    pub tenant_id: TenantId,
    pub storage_id: StorageId,
    pub key: VariantKey,
    pub quantity: u64,
    pub source: StockSource,
    pub on_hand_after: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReleased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReleased {
    pub tenant_id: TenantId,
    pub storage_id: StorageId,
    pub key: VariantKey,
    pub quantity: u64,
    pub reason: ReleaseReason,
    pub on_hand_after: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAdjusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub tenant_id: TenantId,
    pub storage_id: StorageId,
    pub key: VariantKey,
    pub delta: i64,
    pub note: Option<String>,
    pub on_hand_after: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StorageDeactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDeactivated {
    pub tenant_id: TenantId,
    pub storage_id: StorageId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageEvent {
    StorageCreated(StorageCreated),
    StorageRenamed(StorageRenamed),
    CapacityChanged(CapacityChanged),
    StockAllocated(StockAllocated),
    StockReleased(StockReleased),
    StockAdjusted(StockAdjusted),
    StorageDeactivated(StorageDeactivated),
}

impl Event for StorageEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StorageEvent::StorageCreated(_) => "storage.storage.created",
            StorageEvent::StorageRenamed(_) => "storage.storage.renamed",
            StorageEvent::CapacityChanged(_) => "storage.storage.capacity_changed",
            StorageEvent::StockAllocated(_) => "storage.storage.stock_allocated",
            StorageEvent::StockReleased(_) => "storage.storage.stock_released",
            StorageEvent::StockAdjusted(_) => "storage.storage.stock_adjusted",
            StorageEvent::StorageDeactivated(_) => "storage.storage.deactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StorageEvent::StorageCreated(e) => e.occurred_at,
            StorageEvent::StorageRenamed(e) => e.occurred_at,
            StorageEvent::CapacityChanged(e) => e.occurred_at,
            StorageEvent::StockAllocated(e) => e.occurred_at,
            StorageEvent::StockReleased(e) => e.occurred_at,
            StorageEvent::StockAdjusted(e) => e.occurred_at,
            StorageEvent::StorageDeactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Storage {
    type Command = StorageCommand;
    type Event = StorageEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StorageEvent::StorageCreated(e) => {
                self.id = e.storage_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.location = e.location.clone();
                self.capacity = e.capacity;
                self.active = true;
                self.created = true;
            }
            StorageEvent::StorageRenamed(e) => {
                self.name = e.name.clone();
                self.location = e.location.clone();
            }
            StorageEvent::CapacityChanged(e) => {
                self.capacity = e.capacity;
            }
            StorageEvent::StockAllocated(e) => {
                self.stock.insert(e.key, e.on_hand_after);
            }
            StorageEvent::StockReleased(e) => {
                self.stock.insert(e.key, e.on_hand_after);
            }
            StorageEvent::StockAdjusted(e) => {
                self.stock.insert(e.key, e.on_hand_after);
            }
            StorageEvent::StorageDeactivated(_) => {
                self.active = false;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StorageCommand::CreateStorage(cmd) => self.handle_create(cmd),
            StorageCommand::RenameStorage(cmd) => self.handle_rename(cmd),
            StorageCommand::SetCapacity(cmd) => self.handle_set_capacity(cmd),
            StorageCommand::AllocateStock(cmd) => self.handle_allocate(cmd),
            StorageCommand::ReleaseStock(cmd) => self.handle_release(cmd),
            StorageCommand::AdjustStock(cmd) => self.handle_adjust(cmd),
            StorageCommand::Deactivate(cmd) => self.handle_deactivate(cmd),
        }
    }
}

impl Storage {
    fn ensure_target(&self, tenant_id: TenantId, storage_id: StorageId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("storage"));
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != storage_id {
            return Err(DomainError::invariant("storage_id mismatch"));
        }
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), DomainError> {
        if !self.active {
            return Err(DomainError::conflict(format!(
                "storage '{}' is deactivated",
                self.name
            )));
        }
        Ok(())
    }

    fn ensure_fits(&self, incoming: u64) -> Result<(), DomainError> {
        if self.total_units().checked_add(incoming).is_none() {
            return Err(DomainError::invariant(format!(
                "storage '{}' cannot count {incoming} more units",
                self.name
            )));
        }
        if let Some(free) = self.free_capacity() {
            if incoming > free {
                return Err(DomainError::invariant(format!(
                    "storage '{}' has room for {free} more units, {incoming} requested",
                    self.name
                )));
            }
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateStorage) -> Result<Vec<StorageEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("storage already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.capacity == Some(0) {
            return Err(DomainError::validation("capacity must be positive"));
        }
        Ok(vec![StorageEvent::StorageCreated(StorageCreated {
            tenant_id: cmd.tenant_id,
            storage_id: cmd.storage_id,
            name: cmd.name.trim().to_string(),
            location: cmd
                .location
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
            capacity: cmd.capacity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_rename(&self, cmd: &RenameStorage) -> Result<Vec<StorageEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.storage_id)?;
        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        let location = cmd
            .location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string);
        if name == self.name && location == self.location {
            return Err(DomainError::validation("update changes nothing"));
        }
        Ok(vec![StorageEvent::StorageRenamed(StorageRenamed {
            tenant_id: cmd.tenant_id,
            storage_id: cmd.storage_id,
            name: name.to_string(),
            location,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_capacity(&self, cmd: &SetCapacity) -> Result<Vec<StorageEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.storage_id)?;
        if let Some(cap) = cmd.capacity {
            if cap == 0 {
                return Err(DomainError::validation("capacity must be positive"));
            }
            let held = self.total_units();
            if cap < held {
                return Err(DomainError::invariant(format!(
                    "capacity {cap} is below the {held} units currently stored"
                )));
            }
        }
        if cmd.capacity == self.capacity {
            return Err(DomainError::validation("update changes nothing"));
        }
        Ok(vec![StorageEvent::CapacityChanged(CapacityChanged {
            tenant_id: cmd.tenant_id,
            storage_id: cmd.storage_id,
            capacity: cmd.capacity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_allocate(&self, cmd: &AllocateStock) -> Result<Vec<StorageEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.storage_id)?;
        self.ensure_active()?;
        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if let StockSource::Transfer { from } = cmd.source {
            if from == self.id {
                return Err(DomainError::validation("cannot transfer into the same storage"));
            }
        }
        self.ensure_fits(cmd.quantity)?;

        let on_hand_after = self
            .on_hand(&cmd.key)
            .checked_add(cmd.quantity)
            .ok_or_else(|| DomainError::validation("quantity overflow"))?;

        Ok(vec![StorageEvent::StockAllocated(StockAllocated {
            tenant_id: cmd.tenant_id,
            storage_id: cmd.storage_id,
            key: cmd.key,
            quantity: cmd.quantity,
            source: cmd.source,
            on_hand_after,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release(&self, cmd: &ReleaseStock) -> Result<Vec<StorageEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.storage_id)?;
        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        let on_hand = self.on_hand(&cmd.key);
        let on_hand_after = on_hand.checked_sub(cmd.quantity).ok_or_else(|| {
            DomainError::invariant(format!(
                "insufficient stock in '{}': {on_hand} on hand, {} requested",
                self.name, cmd.quantity
            ))
        })?;

        Ok(vec![StorageEvent::StockReleased(StockReleased {
            tenant_id: cmd.tenant_id,
            storage_id: cmd.storage_id,
            key: cmd.key,
            quantity: cmd.quantity,
            reason: cmd.reason,
            on_hand_after,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust(&self, cmd: &AdjustStock) -> Result<Vec<StorageEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.storage_id)?;
        if cmd.delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }

        let on_hand = self.on_hand(&cmd.key);
        let on_hand_after = if cmd.delta > 0 {
            self.ensure_active()?;
            self.ensure_fits(cmd.delta.unsigned_abs())?;
            on_hand
                .checked_add(cmd.delta.unsigned_abs())
                .ok_or_else(|| DomainError::validation("quantity overflow"))?
        } else {
            on_hand
                .checked_sub(cmd.delta.unsigned_abs())
                .ok_or_else(|| DomainError::invariant("stock cannot go negative"))?
        };

        Ok(vec![StorageEvent::StockAdjusted(StockAdjusted {
            tenant_id: cmd.tenant_id,
            storage_id: cmd.storage_id,
            key: cmd.key,
            delta: cmd.delta,
            note: cmd.note.clone(),
            on_hand_after,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(&self, cmd: &Deactivate) -> Result<Vec<StorageEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.storage_id)?;
        self.ensure_active()?;
        let held = self.total_units();
        if held > 0 {
            return Err(DomainError::invariant(format!(
                "storage still holds {held} units; move them before deactivating"
            )));
        }
        Ok(vec![StorageEvent::StorageDeactivated(StorageDeactivated {
            tenant_id: cmd.tenant_id,
            storage_id: cmd.storage_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use stockledger_catalog::{ProductId, VariationId};
    use stockledger_events::execute;

    fn key(n: u32) -> VariantKey {
        VariantKey::new(ProductId::new(AggregateId::new()), VariationId(n))
    }

    fn storage(tenant_id: TenantId, capacity: Option<u64>) -> Storage {
        let storage_id = StorageId::new(AggregateId::new());
        let mut s = Storage::empty(storage_id);
        execute(
            &mut s,
            &StorageCommand::CreateStorage(CreateStorage {
                tenant_id,
                storage_id,
                name: "Back room".to_string(),
                location: None,
                capacity,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        s
    }

    fn allocate(s: &mut Storage, tenant_id: TenantId, key: VariantKey, quantity: u64) -> Result<Vec<StorageEvent>, DomainError> {
        let storage_id = s.id_typed();
        execute(
            s,
            &StorageCommand::AllocateStock(AllocateStock {
                tenant_id,
                storage_id,
                key,
                quantity,
                source: StockSource::Opening,
                occurred_at: Utc::now(),
            }),
        )
    }

    fn release(s: &mut Storage, tenant_id: TenantId, key: VariantKey, quantity: u64) -> Result<Vec<StorageEvent>, DomainError> {
        let storage_id = s.id_typed();
        execute(
            s,
            &StorageCommand::ReleaseStock(ReleaseStock {
                tenant_id,
                storage_id,
                key,
                quantity,
                reason: ReleaseReason::WriteOff,
                occurred_at: Utc::now(),
            }),
        )
    }

    #[test]
    fn allocate_then_release_tracks_on_hand() {
        let t = TenantId::new();
        let mut s = storage(t, None);
        let k = key(1);

        allocate(&mut s, t, k, 10).unwrap();
        let events = release(&mut s, t, k, 4).unwrap();

        match &events[0] {
            StorageEvent::StockReleased(e) => assert_eq!(e.on_hand_after, 6),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(s.on_hand(&k), 6);
        assert_eq!(s.version(), 3);
    }

    #[test]
    fn release_more_than_on_hand_is_rejected() {
        let t = TenantId::new();
        let mut s = storage(t, None);
        let k = key(1);
        allocate(&mut s, t, k, 2).unwrap();

        let err = release(&mut s, t, k, 3).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(s.on_hand(&k), 2);
    }

    #[test]
    fn capacity_limits_allocation_across_variants() {
        let t = TenantId::new();
        let mut s = storage(t, Some(10));
        allocate(&mut s, t, key(1), 6).unwrap();

        let err = allocate(&mut s, t, key(2), 5).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(s.free_capacity(), Some(4));
    }

    #[test]
    fn unit_count_cannot_pass_the_counter_range() {
        let t = TenantId::new();
        let mut s = storage(t, None);
        allocate(&mut s, t, key(1), u64::MAX).unwrap();

        let err = allocate(&mut s, t, key(2), 1).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(s.total_units(), u64::MAX);
        assert_eq!(s.on_hand(&key(2)), 0);

        let storage_id = s.id_typed();
        let err = s
            .handle(&StorageCommand::SetCapacity(SetCapacity {
                tenant_id: t,
                storage_id,
                capacity: Some(5),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn capacity_cannot_drop_below_stored_units() {
        let t = TenantId::new();
        let mut s = storage(t, None);
        allocate(&mut s, t, key(1), 8).unwrap();

        let err = s
            .handle(&StorageCommand::SetCapacity(SetCapacity {
                tenant_id: t,
                storage_id: s.id_typed(),
                capacity: Some(5),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn negative_adjustment_cannot_go_below_zero() {
        let t = TenantId::new();
        let mut s = storage(t, None);
        let k = key(1);
        allocate(&mut s, t, k, 3).unwrap();

        let cmd = |delta| {
            StorageCommand::AdjustStock(AdjustStock {
                tenant_id: t,
                storage_id: s.id_typed(),
                key: k,
                delta,
                note: Some("count".to_string()),
                occurred_at: Utc::now(),
            })
        };
        assert!(matches!(s.handle(&cmd(0)), Err(DomainError::Validation(_))));
        assert!(matches!(s.handle(&cmd(-4)), Err(DomainError::InvariantViolation(_))));
        assert!(s.handle(&cmd(-3)).is_ok());
    }

    #[test]
    fn deactivate_requires_empty_storage_and_blocks_stock_in() {
        let t = TenantId::new();
        let mut s = storage(t, None);
        let k = key(1);
        allocate(&mut s, t, k, 1).unwrap();

        let storage_id = s.id_typed();
        let deactivate = StorageCommand::Deactivate(Deactivate {
            tenant_id: t,
            storage_id,
            occurred_at: Utc::now(),
        });
        assert!(matches!(s.handle(&deactivate), Err(DomainError::InvariantViolation(_))));

        release(&mut s, t, k, 1).unwrap();
        execute(&mut s, &deactivate).unwrap();

        assert!(!s.is_active());
        assert!(matches!(allocate(&mut s, t, k, 1), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn transfer_into_self_is_rejected() {
        let t = TenantId::new();
        let s = storage(t, None);
        let err = s
            .handle(&StorageCommand::AllocateStock(AllocateStock {
                tenant_id: t,
                storage_id: s.id_typed(),
                key: key(1),
                quantity: 1,
                source: StockSource::Transfer { from: s.id_typed() },
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn other_tenant_is_rejected() {
        let mut s = storage(TenantId::new(), None);
        let err = allocate(&mut s, TenantId::new(), key(1), 1).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    proptest! {
        #[test]
        fn stock_never_negative(ops in prop::collection::vec((any::<bool>(), 1u64..20), 1..40)) {
            let t = TenantId::new();
            let mut s = storage(t, Some(200));
            let k = key(1);
            let mut model: u64 = 0;

            for (is_in, qty) in ops {
                if is_in {
                    if allocate(&mut s, t, k, qty).is_ok() {
                        model += qty;
                    }
                } else if release(&mut s, t, k, qty).is_ok() {
                    model -= qty;
                }
                prop_assert_eq!(s.on_hand(&k), model);
                prop_assert!(s.total_units() <= 200);
            }
        }
    }
}
