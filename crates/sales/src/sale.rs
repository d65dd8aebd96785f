use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_catalog::VariantKey;
use stockledger_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money, TenantId};
use stockledger_events::Event;
use stockledger_parties::PartyId;
use stockledger_storage::StorageId;

/// Sale identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SaleId(pub AggregateId);

impl SaleId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SaleId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleStatus {
    Draft,
    Completed,
    Returned,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLine {
    pub line_no: u32,
    pub key: VariantKey,
    pub storage_id: StorageId,
    pub quantity: u64,
    pub unit_price: Money,
    pub discount: Money,
    /// Purchase cost per unit at the time the line was added (for COGS).
    pub unit_cost: Money,
}

impl SaleLine {
    pub fn gross(&self) -> Money {
        Money::from_cents(self.unit_price.cents().saturating_mul(self.quantity as i64))
    }

    pub fn line_total(&self) -> Money {
        self.gross() - self.discount
    }

    pub fn cost_total(&self) -> Money {
        Money::from_cents(self.unit_cost.cents().saturating_mul(self.quantity as i64))
    }
}

/// Aggregate root: Sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sale {
    id: SaleId,
    tenant_id: Option<TenantId>,
    customer_id: Option<PartyId>,
    status: SaleStatus,
    lines: Vec<SaleLine>,
    next_line: u32,
    paid: Money,
    version: u64,
    created: bool,
}

impl Sale {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: SaleId) -> Self {
        Self {
            id,
            tenant_id: None,
            customer_id: None,
            status: SaleStatus::Draft,
            lines: Vec::new(),
            next_line: 1,
            paid: Money::ZERO,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SaleId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn customer_id(&self) -> Option<PartyId> {
        self.customer_id
    }

    pub fn status(&self) -> SaleStatus {
        self.status
    }

    pub fn lines(&self) -> &[SaleLine] {
        &self.lines
    }

    pub fn total(&self) -> Money {
        self.lines.iter().map(SaleLine::line_total).sum()
    }

    pub fn cost_total(&self) -> Money {
        self.lines.iter().map(SaleLine::cost_total).sum()
    }

    pub fn paid(&self) -> Money {
        self.paid
    }

    pub fn outstanding(&self) -> Money {
        self.total() - self.paid
    }
}

impl AggregateRoot for Sale {
    type Id = SaleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateSale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSale {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub customer_id: Option<PartyId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLine (Draft only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub key: VariantKey,
    pub storage_id: StorageId,
    pub quantity: u64,
    pub unit_price: Money,
    pub discount: Money,
    pub unit_cost: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveLine (Draft only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLine {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteSale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteSale {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub paid_amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPayment (after completion).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Cancel (Draft only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancel {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReturnSale (full return of a completed sale).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnSale {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleCommand {
    CreateSale(CreateSale),
    AddLine(AddLine),
    RemoveLine(RemoveLine),
    CompleteSale(CompleteSale),
    RecordPayment(RecordPayment),
    Cancel(Cancel),
    ReturnSale(ReturnSale),
}

/// Event: SaleCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleCreated {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub customer_id: Option<PartyId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SaleLineAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLineAdded {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub line: SaleLine,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SaleLineRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLineRemoved {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SaleCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleCompleted {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub customer_id: Option<PartyId>,
    pub lines: Vec<SaleLine>,
    pub total: Money,
    pub cost_total: Money,
    pub paid_amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SalePaymentRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalePaymentRecorded {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub amount: Money,
    pub paid_total: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SaleCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleCancelled {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SaleReturned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleReturned {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub customer_id: Option<PartyId>,
    pub lines: Vec<SaleLine>,
    pub total: Money,
    pub cost_total: Money,
    /// Cash given back (everything paid so far).
    pub refunded: Money,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleEvent {
    SaleCreated(SaleCreated),
    SaleLineAdded(SaleLineAdded),
    SaleLineRemoved(SaleLineRemoved),
    SaleCompleted(SaleCompleted),
    SalePaymentRecorded(SalePaymentRecorded),
    SaleCancelled(SaleCancelled),
    SaleReturned(SaleReturned),
}

impl Event for SaleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SaleEvent::SaleCreated(_) => "sales.sale.created",
            SaleEvent::SaleLineAdded(_) => "sales.sale.line_added",
            SaleEvent::SaleLineRemoved(_) => "sales.sale.line_removed",
            SaleEvent::SaleCompleted(_) => "sales.sale.completed",
            SaleEvent::SalePaymentRecorded(_) => "sales.sale.payment_recorded",
            SaleEvent::SaleCancelled(_) => "sales.sale.cancelled",
            SaleEvent::SaleReturned(_) => "sales.sale.returned",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SaleEvent::SaleCreated(e) => e.occurred_at,
            SaleEvent::SaleLineAdded(e) => e.occurred_at,
            SaleEvent::SaleLineRemoved(e) => e.occurred_at,
            SaleEvent::SaleCompleted(e) => e.occurred_at,
            SaleEvent::SalePaymentRecorded(e) => e.occurred_at,
            SaleEvent::SaleCancelled(e) => e.occurred_at,
            SaleEvent::SaleReturned(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Sale {
    type Command = SaleCommand;
    type Event = SaleEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SaleEvent::SaleCreated(e) => {
                self.id = e.sale_id;
                self.tenant_id = Some(e.tenant_id);
                self.customer_id = e.customer_id;
                self.status = SaleStatus::Draft;
                self.created = true;
            }
            SaleEvent::SaleLineAdded(e) => {
                self.next_line = self.next_line.max(e.line.line_no + 1);
                self.lines.push(e.line.clone());
            }
            SaleEvent::SaleLineRemoved(e) => {
                self.lines.retain(|l| l.line_no != e.line_no);
            }
            SaleEvent::SaleCompleted(e) => {
                self.paid = e.paid_amount;
                self.status = SaleStatus::Completed;
            }
            SaleEvent::SalePaymentRecorded(e) => {
                self.paid = e.paid_total;
            }
            SaleEvent::SaleCancelled(_) => {
                self.status = SaleStatus::Cancelled;
            }
            SaleEvent::SaleReturned(_) => {
                self.status = SaleStatus::Returned;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SaleCommand::CreateSale(cmd) => self.handle_create(cmd),
            SaleCommand::AddLine(cmd) => self.handle_add_line(cmd),
            SaleCommand::RemoveLine(cmd) => self.handle_remove_line(cmd),
            SaleCommand::CompleteSale(cmd) => self.handle_complete(cmd),
            SaleCommand::RecordPayment(cmd) => self.handle_payment(cmd),
            SaleCommand::Cancel(cmd) => self.handle_cancel(cmd),
            SaleCommand::ReturnSale(cmd) => self.handle_return(cmd),
        }
    }
}

impl Sale {
    fn ensure_target(&self, tenant_id: TenantId, sale_id: SaleId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("sale"));
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != sale_id {
            return Err(DomainError::invariant("sale_id mismatch"));
        }
        Ok(())
    }

    fn ensure_status(&self, expected: SaleStatus, action: &str) -> Result<(), DomainError> {
        if self.status != expected {
            return Err(DomainError::conflict(format!(
                "cannot {action} a sale in status {:?}",
                self.status
            )));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateSale) -> Result<Vec<SaleEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("sale already exists"));
        }
        Ok(vec![SaleEvent::SaleCreated(SaleCreated {
            tenant_id: cmd.tenant_id,
            sale_id: cmd.sale_id,
            customer_id: cmd.customer_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.sale_id)?;
        self.ensure_status(SaleStatus::Draft, "add lines to")?;
        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        cmd.unit_price.ensure_non_negative("unit price")?;
        cmd.unit_cost.ensure_non_negative("unit cost")?;
        cmd.discount.ensure_non_negative("discount")?;
        let gross = cmd.unit_price.times(cmd.quantity)?;
        cmd.unit_cost.times(cmd.quantity)?;
        if cmd.discount > gross {
            return Err(DomainError::validation(format!(
                "discount {} exceeds line amount {}",
                cmd.discount, gross
            )));
        }
        self.total()
            .checked_add(gross - cmd.discount)
            .ok_or_else(|| DomainError::validation("sale total overflow"))?;

        Ok(vec![SaleEvent::SaleLineAdded(SaleLineAdded {
            tenant_id: cmd.tenant_id,
            sale_id: cmd.sale_id,
            line: SaleLine {
                line_no: self.next_line,
                key: cmd.key,
                storage_id: cmd.storage_id,
                quantity: cmd.quantity,
                unit_price: cmd.unit_price,
                discount: cmd.discount,
                unit_cost: cmd.unit_cost,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_line(&self, cmd: &RemoveLine) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.sale_id)?;
        self.ensure_status(SaleStatus::Draft, "remove lines from")?;
        if !self.lines.iter().any(|l| l.line_no == cmd.line_no) {
            return Err(DomainError::not_found(format!("sale line {}", cmd.line_no)));
        }
        Ok(vec![SaleEvent::SaleLineRemoved(SaleLineRemoved {
            tenant_id: cmd.tenant_id,
            sale_id: cmd.sale_id,
            line_no: cmd.line_no,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteSale) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.sale_id)?;
        self.ensure_status(SaleStatus::Draft, "complete")?;
        if self.lines.is_empty() {
            return Err(DomainError::invariant("sale has no lines"));
        }
        cmd.paid_amount.ensure_non_negative("paid amount")?;
        let total = self.total();
        if cmd.paid_amount > total {
            return Err(DomainError::invariant(format!(
                "paid amount {} exceeds total {}",
                cmd.paid_amount, total
            )));
        }
        if cmd.paid_amount < total && self.customer_id.is_none() {
            return Err(DomainError::invariant(
                "a customer is required when the sale is not paid in full",
            ));
        }
        Ok(vec![SaleEvent::SaleCompleted(SaleCompleted {
            tenant_id: cmd.tenant_id,
            sale_id: cmd.sale_id,
            customer_id: self.customer_id,
            lines: self.lines.clone(),
            total,
            cost_total: self.cost_total(),
            paid_amount: cmd.paid_amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_payment(&self, cmd: &RecordPayment) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.sale_id)?;
        self.ensure_status(SaleStatus::Completed, "record a payment on")?;
        cmd.amount.ensure_positive("payment")?;
        let outstanding = self.outstanding();
        if cmd.amount > outstanding {
            return Err(DomainError::invariant(format!(
                "payment {} exceeds outstanding {}",
                cmd.amount, outstanding
            )));
        }
        Ok(vec![SaleEvent::SalePaymentRecorded(SalePaymentRecorded {
            tenant_id: cmd.tenant_id,
            sale_id: cmd.sale_id,
            amount: cmd.amount,
            paid_total: self.paid + cmd.amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &Cancel) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.sale_id)?;
        self.ensure_status(SaleStatus::Draft, "cancel")?;
        Ok(vec![SaleEvent::SaleCancelled(SaleCancelled {
            tenant_id: cmd.tenant_id,
            sale_id: cmd.sale_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_return(&self, cmd: &ReturnSale) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.sale_id)?;
        self.ensure_status(SaleStatus::Completed, "return")?;
        Ok(vec![SaleEvent::SaleReturned(SaleReturned {
            tenant_id: cmd.tenant_id,
            sale_id: cmd.sale_id,
            customer_id: self.customer_id,
            lines: self.lines.clone(),
            total: self.total(),
            cost_total: self.cost_total(),
            refunded: self.paid,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
