use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_catalog::VariantKey;
use stockledger_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money, TenantId};
use stockledger_events::Event;
use stockledger_parties::PartyId;
use stockledger_storage::StorageId;

/// Purchase identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseId(pub AggregateId);

impl PurchaseId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PurchaseId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    Draft,
    Ordered,
    Received,
    Allocated,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseLine {
    pub line_no: u32,
    pub key: VariantKey,
    pub quantity: u64,
    pub unit_cost: Money,
    pub received: u64,
    pub allocated: u64,
}

impl PurchaseLine {
    pub fn ordered_total(&self) -> Money {
        // Checked when the line was added.
        Money::from_cents(self.unit_cost.cents().saturating_mul(self.quantity as i64))
    }

    pub fn received_total(&self) -> Money {
        Money::from_cents(self.unit_cost.cents().saturating_mul(self.received as i64))
    }

    /// Received units not yet put away.
    pub fn remaining(&self) -> u64 {
        self.received.saturating_sub(self.allocated)
    }
}

/// How many units of a line went to one storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageAllocation {
    pub line_no: u32,
    pub storage_id: StorageId,
    pub quantity: u64,
}

/// Aggregate root: Purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Purchase {
    id: PurchaseId,
    tenant_id: Option<TenantId>,
    supplier_id: Option<PartyId>,
    reference: Option<String>,
    status: PurchaseStatus,
    lines: Vec<PurchaseLine>,
    allocations: Vec<StorageAllocation>,
    paid: Money,
    version: u64,
    created: bool,
}

impl Purchase {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PurchaseId) -> Self {
        Self {
            id,
            tenant_id: None,
            supplier_id: None,
            reference: None,
            status: PurchaseStatus::Draft,
            lines: Vec::new(),
            allocations: Vec::new(),
            paid: Money::ZERO,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PurchaseId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn supplier_id(&self) -> Option<PartyId> {
        self.supplier_id
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn status(&self) -> PurchaseStatus {
        self.status
    }

    pub fn lines(&self) -> &[PurchaseLine] {
        &self.lines
    }

    pub fn line(&self, line_no: u32) -> Option<&PurchaseLine> {
        self.lines.iter().find(|l| l.line_no == line_no)
    }

    pub fn allocations(&self) -> &[StorageAllocation] {
        &self.allocations
    }

    pub fn ordered_total(&self) -> Money {
        self.lines.iter().map(PurchaseLine::ordered_total).sum()
    }

    pub fn received_total(&self) -> Money {
        self.lines.iter().map(PurchaseLine::received_total).sum()
    }

    pub fn paid(&self) -> Money {
        self.paid
    }

    pub fn outstanding(&self) -> Money {
        self.received_total() - self.paid
    }

    fn allocated_to(&self, line_no: u32, storage_id: StorageId) -> u64 {
        self.allocations
            .iter()
            .filter(|a| a.line_no == line_no && a.storage_id == storage_id)
            .map(|a| a.quantity)
            .sum()
    }
}

impl AggregateRoot for Purchase {
    type Id = PurchaseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePurchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchase {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub supplier_id: PartyId,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLine (Draft only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub key: VariantKey,
    pub quantity: u64,
    pub unit_cost: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PlaceOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedQuantity {
    pub line_no: u32,
    pub quantity: u64,
}

/// Command: ReceiveGoods.
///
/// Lines not listed in `quantities` are received in full.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveGoods {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub quantities: Vec<ReceivedQuantity>,
    /// Cash handed over on delivery.
    pub paid_on_receipt: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AllocateToStorage (one step of the put-away wizard).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocateToStorage {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub line_no: u32,
    pub storage_id: StorageId,
    pub quantity: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RevertAllocation (compensates an allocation whose storage side failed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevertAllocation {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub line_no: u32,
    pub storage_id: StorageId,
    pub quantity: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Cancel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancel {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseCommand {
    CreatePurchase(CreatePurchase),
    AddLine(AddLine),
    PlaceOrder(PlaceOrder),
    ReceiveGoods(ReceiveGoods),
    AllocateToStorage(AllocateToStorage),
    RevertAllocation(RevertAllocation),
    RecordPayment(RecordPayment),
    Cancel(Cancel),
}

/// Event: PurchaseCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseCreated {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub supplier_id: PartyId,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAdded {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub line_no: u32,
    pub key: VariantKey,
    pub quantity: u64,
    pub unit_cost: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrdered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrdered {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub ordered_total: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedLine {
    pub line_no: u32,
    pub key: VariantKey,
    pub quantity: u64,
    pub unit_cost: Money,
}

/// Event: GoodsReceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsReceived {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub supplier_id: PartyId,
    pub lines: Vec<ReceivedLine>,
    pub received_total: Money,
    pub paid_on_receipt: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAllocatedToStorage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAllocatedToStorage {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub line_no: u32,
    pub key: VariantKey,
    pub storage_id: StorageId,
    pub quantity: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AllocationReverted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationReverted {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub line_no: u32,
    pub storage_id: StorageId,
    pub quantity: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseFullyAllocated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseFullyAllocated {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub amount: Money,
    pub paid_total: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseCancelled {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseEvent {
    PurchaseCreated(PurchaseCreated),
    LineAdded(LineAdded),
    PurchaseOrdered(PurchaseOrdered),
    GoodsReceived(GoodsReceived),
    StockAllocatedToStorage(StockAllocatedToStorage),
    AllocationReverted(AllocationReverted),
    PurchaseFullyAllocated(PurchaseFullyAllocated),
    PaymentRecorded(PaymentRecorded),
    PurchaseCancelled(PurchaseCancelled),
}

impl Event for PurchaseEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseEvent::PurchaseCreated(_) => "purchasing.purchase.created",
            PurchaseEvent::LineAdded(_) => "purchasing.purchase.line_added",
            PurchaseEvent::PurchaseOrdered(_) => "purchasing.purchase.ordered",
            PurchaseEvent::GoodsReceived(_) => "purchasing.purchase.goods_received",
            PurchaseEvent::StockAllocatedToStorage(_) => "purchasing.purchase.stock_allocated",
            PurchaseEvent::AllocationReverted(_) => "purchasing.purchase.allocation_reverted",
            PurchaseEvent::PurchaseFullyAllocated(_) => "purchasing.purchase.fully_allocated",
            PurchaseEvent::PaymentRecorded(_) => "purchasing.purchase.payment_recorded",
            PurchaseEvent::PurchaseCancelled(_) => "purchasing.purchase.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseEvent::PurchaseCreated(e) => e.occurred_at,
            PurchaseEvent::LineAdded(e) => e.occurred_at,
            PurchaseEvent::PurchaseOrdered(e) => e.occurred_at,
            PurchaseEvent::GoodsReceived(e) => e.occurred_at,
            PurchaseEvent::StockAllocatedToStorage(e) => e.occurred_at,
            PurchaseEvent::AllocationReverted(e) => e.occurred_at,
            PurchaseEvent::PurchaseFullyAllocated(e) => e.occurred_at,
            PurchaseEvent::PaymentRecorded(e) => e.occurred_at,
            PurchaseEvent::PurchaseCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Purchase {
    type Command = PurchaseCommand;
    type Event = PurchaseEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseEvent::PurchaseCreated(e) => {
                self.id = e.purchase_id;
                self.tenant_id = Some(e.tenant_id);
                self.supplier_id = Some(e.supplier_id);
                self.reference = e.reference.clone();
                self.status = PurchaseStatus::Draft;
                self.created = true;
            }
            PurchaseEvent::LineAdded(e) => {
                self.lines.push(PurchaseLine {
                    line_no: e.line_no,
                    key: e.key,
                    quantity: e.quantity,
                    unit_cost: e.unit_cost,
                    received: 0,
                    allocated: 0,
                });
            }
            PurchaseEvent::PurchaseOrdered(_) => {
                self.status = PurchaseStatus::Ordered;
            }
            PurchaseEvent::GoodsReceived(e) => {
                for received in &e.lines {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == received.line_no) {
                        line.received = received.quantity;
                    }
                }
                self.paid += e.paid_on_receipt;
                self.status = PurchaseStatus::Received;
            }
            PurchaseEvent::StockAllocatedToStorage(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == e.line_no) {
                    line.allocated += e.quantity;
                }
                self.allocations.push(StorageAllocation {
                    line_no: e.line_no,
                    storage_id: e.storage_id,
                    quantity: e.quantity,
                });
            }
            PurchaseEvent::AllocationReverted(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == e.line_no) {
                    line.allocated = line.allocated.saturating_sub(e.quantity);
                }
                // Drain the reverted quantity from the newest matching records.
                let mut left = e.quantity;
                for alloc in self
                    .allocations
                    .iter_mut()
                    .rev()
                    .filter(|a| a.line_no == e.line_no && a.storage_id == e.storage_id)
                {
                    let take = left.min(alloc.quantity);
                    alloc.quantity -= take;
                    left -= take;
                    if left == 0 {
                        break;
                    }
                }
                self.allocations.retain(|a| a.quantity > 0);
                self.status = PurchaseStatus::Received;
            }
            PurchaseEvent::PurchaseFullyAllocated(_) => {
                self.status = PurchaseStatus::Allocated;
            }
            PurchaseEvent::PaymentRecorded(e) => {
                self.paid = e.paid_total;
            }
            PurchaseEvent::PurchaseCancelled(_) => {
                self.status = PurchaseStatus::Cancelled;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseCommand::CreatePurchase(cmd) => self.handle_create(cmd),
            PurchaseCommand::AddLine(cmd) => self.handle_add_line(cmd),
            PurchaseCommand::PlaceOrder(cmd) => self.handle_place_order(cmd),
            PurchaseCommand::ReceiveGoods(cmd) => self.handle_receive(cmd),
            PurchaseCommand::AllocateToStorage(cmd) => self.handle_allocate(cmd),
            PurchaseCommand::RevertAllocation(cmd) => self.handle_revert(cmd),
            PurchaseCommand::RecordPayment(cmd) => self.handle_payment(cmd),
            PurchaseCommand::Cancel(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Purchase {
    fn ensure_target(&self, tenant_id: TenantId, purchase_id: PurchaseId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("purchase"));
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != purchase_id {
            return Err(DomainError::invariant("purchase_id mismatch"));
        }
        Ok(())
    }

    fn ensure_status(&self, allowed: &[PurchaseStatus], action: &str) -> Result<(), DomainError> {
        if !allowed.contains(&self.status) {
            return Err(DomainError::conflict(format!(
                "cannot {action} a purchase in status {:?}",
                self.status
            )));
        }
        Ok(())
    }

    fn existing_line(&self, line_no: u32) -> Result<&PurchaseLine, DomainError> {
        self.line(line_no)
            .ok_or_else(|| DomainError::not_found(format!("purchase line {line_no}")))
    }

    fn handle_create(&self, cmd: &CreatePurchase) -> Result<Vec<PurchaseEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("purchase already exists"));
        }
        Ok(vec![PurchaseEvent::PurchaseCreated(PurchaseCreated {
            tenant_id: cmd.tenant_id,
            purchase_id: cmd.purchase_id,
            supplier_id: cmd.supplier_id,
            reference: cmd
                .reference
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<PurchaseEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.purchase_id)?;
        self.ensure_status(&[PurchaseStatus::Draft], "add lines to")?;
        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        cmd.unit_cost.ensure_non_negative("unit cost")?;
        let line_total = cmd.unit_cost.times(cmd.quantity)?;
        self.ordered_total()
            .checked_add(line_total)
            .ok_or_else(|| DomainError::validation("purchase total overflow"))?;

        let line_no = self.lines.iter().map(|l| l.line_no).max().unwrap_or(0) + 1;
        Ok(vec![PurchaseEvent::LineAdded(LineAdded {
            tenant_id: cmd.tenant_id,
            purchase_id: cmd.purchase_id,
            line_no,
            key: cmd.key,
            quantity: cmd.quantity,
            unit_cost: cmd.unit_cost,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_place_order(&self, cmd: &PlaceOrder) -> Result<Vec<PurchaseEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.purchase_id)?;
        self.ensure_status(&[PurchaseStatus::Draft], "order")?;
        if self.lines.is_empty() {
            return Err(DomainError::invariant("purchase has no lines"));
        }
        Ok(vec![PurchaseEvent::PurchaseOrdered(PurchaseOrdered {
            tenant_id: cmd.tenant_id,
            purchase_id: cmd.purchase_id,
            ordered_total: self.ordered_total(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_receive(&self, cmd: &ReceiveGoods) -> Result<Vec<PurchaseEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.purchase_id)?;
        self.ensure_status(&[PurchaseStatus::Ordered], "receive")?;

        for q in &cmd.quantities {
            let line = self.existing_line(q.line_no)?;
            if q.quantity > line.quantity {
                return Err(DomainError::invariant(format!(
                    "line {} ordered {} units, cannot receive {}",
                    q.line_no, line.quantity, q.quantity
                )));
            }
        }
        let mut listed: Vec<u32> = cmd.quantities.iter().map(|q| q.line_no).collect();
        listed.sort_unstable();
        listed.dedup();
        if listed.len() != cmd.quantities.len() {
            return Err(DomainError::validation("a line is listed more than once"));
        }

        let lines: Vec<ReceivedLine> = self
            .lines
            .iter()
            .map(|line| {
                let quantity = cmd
                    .quantities
                    .iter()
                    .find(|q| q.line_no == line.line_no)
                    .map(|q| q.quantity)
                    .unwrap_or(line.quantity);
                ReceivedLine {
                    line_no: line.line_no,
                    key: line.key,
                    quantity,
                    unit_cost: line.unit_cost,
                }
            })
            .collect();

        if lines.iter().all(|l| l.quantity == 0) {
            return Err(DomainError::validation("nothing received"));
        }

        let mut received_total = Money::ZERO;
        for l in &lines {
            received_total += l.unit_cost.times(l.quantity)?;
        }

        cmd.paid_on_receipt.ensure_non_negative("payment")?;
        if cmd.paid_on_receipt > received_total {
            return Err(DomainError::invariant(format!(
                "payment {} exceeds received total {}",
                cmd.paid_on_receipt, received_total
            )));
        }

        let supplier_id = self
            .supplier_id
            .ok_or_else(|| DomainError::invariant("purchase has no supplier"))?;

        Ok(vec![PurchaseEvent::GoodsReceived(GoodsReceived {
            tenant_id: cmd.tenant_id,
            purchase_id: cmd.purchase_id,
            supplier_id,
            lines,
            received_total,
            paid_on_receipt: cmd.paid_on_receipt,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_allocate(&self, cmd: &AllocateToStorage) -> Result<Vec<PurchaseEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.purchase_id)?;
        self.ensure_status(&[PurchaseStatus::Received], "allocate")?;
        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        let line = self.existing_line(cmd.line_no)?;
        if cmd.quantity > line.remaining() {
            return Err(DomainError::invariant(format!(
                "line {} has {} units left to allocate, {} requested",
                cmd.line_no,
                line.remaining(),
                cmd.quantity
            )));
        }

        let mut events = vec![PurchaseEvent::StockAllocatedToStorage(StockAllocatedToStorage {
            tenant_id: cmd.tenant_id,
            purchase_id: cmd.purchase_id,
            line_no: cmd.line_no,
            key: line.key,
            storage_id: cmd.storage_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })];

        let complete = self.lines.iter().all(|l| {
            if l.line_no == cmd.line_no {
                l.remaining() == cmd.quantity
            } else {
                l.remaining() == 0
            }
        });
        if complete {
            events.push(PurchaseEvent::PurchaseFullyAllocated(PurchaseFullyAllocated {
                tenant_id: cmd.tenant_id,
                purchase_id: cmd.purchase_id,
                occurred_at: cmd.occurred_at,
            }));
        }
        Ok(events)
    }

    fn handle_revert(&self, cmd: &RevertAllocation) -> Result<Vec<PurchaseEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.purchase_id)?;
        self.ensure_status(
            &[PurchaseStatus::Received, PurchaseStatus::Allocated],
            "revert allocations on",
        )?;
        self.existing_line(cmd.line_no)?;
        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        let held = self.allocated_to(cmd.line_no, cmd.storage_id);
        if cmd.quantity > held {
            return Err(DomainError::invariant(format!(
                "only {held} units of line {} were allocated to that storage",
                cmd.line_no
            )));
        }
        Ok(vec![PurchaseEvent::AllocationReverted(AllocationReverted {
            tenant_id: cmd.tenant_id,
            purchase_id: cmd.purchase_id,
            line_no: cmd.line_no,
            storage_id: cmd.storage_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_payment(&self, cmd: &RecordPayment) -> Result<Vec<PurchaseEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.purchase_id)?;
        self.ensure_status(
            &[PurchaseStatus::Received, PurchaseStatus::Allocated],
            "pay",
        )?;
        cmd.amount.ensure_positive("payment")?;
        let outstanding = self.outstanding();
        if cmd.amount > outstanding {
            return Err(DomainError::invariant(format!(
                "payment {} exceeds outstanding {}",
                cmd.amount, outstanding
            )));
        }
        Ok(vec![PurchaseEvent::PaymentRecorded(PaymentRecorded {
            tenant_id: cmd.tenant_id,
            purchase_id: cmd.purchase_id,
            amount: cmd.amount,
            paid_total: self.paid + cmd.amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &Cancel) -> Result<Vec<PurchaseEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.purchase_id)?;
        self.ensure_status(
            &[PurchaseStatus::Draft, PurchaseStatus::Ordered],
            "cancel",
        )?;
        Ok(vec![PurchaseEvent::PurchaseCancelled(PurchaseCancelled {
            tenant_id: cmd.tenant_id,
            purchase_id: cmd.purchase_id,
            reason: cmd.reason.clone(),
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

    struct Fixture {
        tenant_id: TenantId,
        purchase: Purchase,
    }

    impl Fixture {
        fn pid(&self) -> PurchaseId {
            self.purchase.id_typed()
        }

        fn run(&mut self, cmd: PurchaseCommand) -> Result<Vec<PurchaseEvent>, DomainError> {
            execute(&mut self.purchase, &cmd)
        }

        fn add_line(&mut self, quantity: u64, unit_cost: i64) {
            let cmd = PurchaseCommand::AddLine(AddLine {
                tenant_id: self.tenant_id,
                purchase_id: self.pid(),
                key: VariantKey::new(ProductId::new(AggregateId::new()), VariationId(1)),
                quantity,
                unit_cost: Money::from_cents(unit_cost),
                occurred_at: Utc::now(),
            });
            self.run(cmd).unwrap();
        }

        fn order(&mut self) {
            let cmd = PurchaseCommand::PlaceOrder(PlaceOrder {
                tenant_id: self.tenant_id,
                purchase_id: self.pid(),
                occurred_at: Utc::now(),
            });
            self.run(cmd).unwrap();
        }

        fn receive(&mut self, quantities: Vec<ReceivedQuantity>, paid: i64) -> Result<Vec<PurchaseEvent>, DomainError> {
            let cmd = PurchaseCommand::ReceiveGoods(ReceiveGoods {
                tenant_id: self.tenant_id,
                purchase_id: self.pid(),
                quantities,
                paid_on_receipt: Money::from_cents(paid),
                occurred_at: Utc::now(),
            });
            self.run(cmd)
        }

        fn allocate(&mut self, line_no: u32, storage_id: StorageId, quantity: u64) -> Result<Vec<PurchaseEvent>, DomainError> {
            let cmd = PurchaseCommand::AllocateToStorage(AllocateToStorage {
                tenant_id: self.tenant_id,
                purchase_id: self.pid(),
                line_no,
                storage_id,
                quantity,
                occurred_at: Utc::now(),
            });
            self.run(cmd)
        }
    }

    fn draft() -> Fixture {
        let tenant_id = TenantId::new();
        let purchase_id = PurchaseId::new(AggregateId::new());
        let mut purchase = Purchase::empty(purchase_id);
        execute(
            &mut purchase,
            &PurchaseCommand::CreatePurchase(CreatePurchase {
                tenant_id,
                purchase_id,
                supplier_id: PartyId::new(AggregateId::new()),
                reference: Some("INV-2291".to_string()),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        Fixture { tenant_id, purchase }
    }

    fn storage() -> StorageId {
        StorageId::new(AggregateId::new())
    }

    #[test]
    fn order_requires_lines() {
        let mut f = draft();
        let cmd = PurchaseCommand::PlaceOrder(PlaceOrder {
            tenant_id: f.tenant_id,
            purchase_id: f.pid(),
            occurred_at: Utc::now(),
        });
        assert!(matches!(f.run(cmd), Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn receive_defaults_to_ordered_quantities_and_allows_short_delivery() {
        let mut f = draft();
        f.add_line(10, 500);
        f.add_line(4, 250);
        f.order();

        let events = f
            .receive(vec![ReceivedQuantity { line_no: 2, quantity: 3 }], 2000)
            .unwrap();
        match &events[0] {
            PurchaseEvent::GoodsReceived(e) => {
                assert_eq!(e.lines[0].quantity, 10);
                assert_eq!(e.lines[1].quantity, 3);
                assert_eq!(e.received_total, Money::from_cents(5750));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(f.purchase.status(), PurchaseStatus::Received);
        assert_eq!(f.purchase.outstanding(), Money::from_cents(3750));
    }

    #[test]
    fn over_receipt_and_overpayment_are_rejected() {
        let mut f = draft();
        f.add_line(2, 100);
        f.order();

        let err = f
            .receive(vec![ReceivedQuantity { line_no: 1, quantity: 3 }], 0)
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        let err = f.receive(vec![], 201).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn allocation_wizard_completes_when_every_line_is_put_away() {
        let mut f = draft();
        f.add_line(5, 100);
        f.add_line(2, 100);
        f.order();
        f.receive(vec![], 0).unwrap();

        let (a, b) = (storage(), storage());
        assert_eq!(f.allocate(1, a, 3).unwrap().len(), 1);
        assert_eq!(f.allocate(1, b, 2).unwrap().len(), 1);
        let last = f.allocate(2, a, 2).unwrap();

        assert!(matches!(last.last(), Some(PurchaseEvent::PurchaseFullyAllocated(_))));
        assert_eq!(f.purchase.status(), PurchaseStatus::Allocated);
        assert_eq!(f.purchase.allocations().len(), 3);
    }

    #[test]
    fn cannot_allocate_more_than_received() {
        let mut f = draft();
        f.add_line(5, 100);
        f.order();
        f.receive(vec![ReceivedQuantity { line_no: 1, quantity: 4 }], 0).unwrap();

        let err = f.allocate(1, storage(), 5).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn revert_reopens_a_fully_allocated_purchase() {
        let mut f = draft();
        f.add_line(3, 100);
        f.order();
        f.receive(vec![], 0).unwrap();
        let s = storage();
        f.allocate(1, s, 3).unwrap();
        assert_eq!(f.purchase.status(), PurchaseStatus::Allocated);

        let cmd = PurchaseCommand::RevertAllocation(RevertAllocation {
            tenant_id: f.tenant_id,
            purchase_id: f.pid(),
            line_no: 1,
            storage_id: s,
            quantity: 3,
            occurred_at: Utc::now(),
        });
        f.run(cmd).unwrap();

        assert_eq!(f.purchase.status(), PurchaseStatus::Received);
        assert_eq!(f.purchase.line(1).unwrap().remaining(), 3);
        assert!(f.purchase.allocations().is_empty());
    }

    #[test]
    fn payments_cannot_exceed_outstanding() {
        let mut f = draft();
        f.add_line(2, 1000);
        f.order();
        f.receive(vec![], 500).unwrap();

        let pay = |amount| {
            PurchaseCommand::RecordPayment(RecordPayment {
                tenant_id: f.tenant_id,
                purchase_id: f.pid(),
                amount: Money::from_cents(amount),
                occurred_at: Utc::now(),
            })
        };
        let too_much = pay(1501);
        let exact = pay(1500);
        assert!(matches!(f.run(too_much), Err(DomainError::InvariantViolation(_))));
        f.run(exact).unwrap();
        assert_eq!(f.purchase.outstanding(), Money::ZERO);
    }

    #[test]
    fn received_purchase_cannot_be_cancelled() {
        let mut f = draft();
        f.add_line(1, 100);
        f.order();
        f.receive(vec![], 0).unwrap();
        let cmd = PurchaseCommand::Cancel(Cancel {
            tenant_id: f.tenant_id,
            purchase_id: f.pid(),
            reason: None,
            occurred_at: Utc::now(),
        });
        assert!(matches!(f.run(cmd), Err(DomainError::Conflict(_))));
    }

    proptest! {
        #[test]
        fn allocated_never_exceeds_received(
            received in 1u64..30,
            steps in prop::collection::vec(1u64..10, 1..12),
        ) {
            let mut f = draft();
            f.add_line(30, 100);
            f.order();
            f.receive(vec![ReceivedQuantity { line_no: 1, quantity: received }], 0).unwrap();

            let s = storage();
            for qty in steps {
                let _ = f.allocate(1, s, qty);
                let line = f.purchase.line(1).unwrap();
                prop_assert!(line.allocated <= line.received);
            }
            let line = f.purchase.line(1).unwrap();
            prop_assert_eq!(
                f.purchase.status() == PurchaseStatus::Allocated,
                line.allocated == line.received
            );
        }
    }
}
