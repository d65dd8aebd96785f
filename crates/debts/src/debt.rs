use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money, TenantId};
use stockledger_events::Event;
use stockledger_parties::PartyId;

/// Debt identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DebtId(pub AggregateId);

impl DebtId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for DebtId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Who owes whom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebtDirection {
    /// The party owes us.
    Receivable,
    /// We owe the party.
    Payable,
}

impl core::str::FromStr for DebtDirection {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "receivable" => Ok(Self::Receivable),
            "payable" => Ok(Self::Payable),
            other => Err(DomainError::validation(format!("unknown debt direction '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DebtOrigin {
    Sale { sale_id: AggregateId },
    Purchase { purchase_id: AggregateId },
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebtStatus {
    Open,
    Settled,
    WrittenOff,
}

impl core::str::FromStr for DebtStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "settled" => Ok(Self::Settled),
            "written_off" | "writtenoff" => Ok(Self::WrittenOff),
            other => Err(DomainError::validation(format!("unknown debt status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repayment {
    pub amount: Money,
    pub note: Option<String>,
    pub paid_at: DateTime<Utc>,
}

/// Aggregate root: Debt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Debt {
    id: DebtId,
    tenant_id: Option<TenantId>,
    direction: DebtDirection,
    party_id: Option<PartyId>,
    origin: DebtOrigin,
    principal: Money,
    due_date: Option<NaiveDate>,
    repayments: Vec<Repayment>,
    status: DebtStatus,
    version: u64,
    created: bool,
}

impl Debt {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: DebtId) -> Self {
        Self {
            id,
            tenant_id: None,
            direction: DebtDirection::Receivable,
            party_id: None,
            origin: DebtOrigin::Manual,
            principal: Money::ZERO,
            due_date: None,
            repayments: Vec::new(),
            status: DebtStatus::Open,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> DebtId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn direction(&self) -> DebtDirection {
        self.direction
    }

    pub fn party_id(&self) -> Option<PartyId> {
        self.party_id
    }

    pub fn origin(&self) -> DebtOrigin {
        self.origin
    }

    pub fn principal(&self) -> Money {
        self.principal
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn repayments(&self) -> &[Repayment] {
        &self.repayments
    }

    pub fn status(&self) -> DebtStatus {
        self.status
    }

    pub fn repaid(&self) -> Money {
        self.repayments.iter().map(|r| r.amount).sum()
    }

    pub fn outstanding(&self) -> Money {
        self.principal - self.repaid()
    }

    /// Open and past its due date as of `today`.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status == DebtStatus::Open && self.due_date.is_some_and(|d| d < today)
    }
}

impl AggregateRoot for Debt {
    type Id = DebtId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenDebt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenDebt {
    pub tenant_id: TenantId,
    pub debt_id: DebtId,
    pub direction: DebtDirection,
    pub party_id: PartyId,
    pub origin: DebtOrigin,
    pub principal: Money,
    pub due_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordRepayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRepayment {
    pub tenant_id: TenantId,
    pub debt_id: DebtId,
    pub amount: Money,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: WriteOff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOff {
    pub tenant_id: TenantId,
    pub debt_id: DebtId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DebtCommand {
    OpenDebt(OpenDebt),
    RecordRepayment(RecordRepayment),
    WriteOff(WriteOff),
}

/// Event: DebtOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtOpened {
    pub tenant_id: TenantId,
    pub debt_id: DebtId,
    pub direction: DebtDirection,
    pub party_id: PartyId,
    pub origin: DebtOrigin,
    pub principal: Money,
    pub due_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RepaymentRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepaymentRecorded {
    pub tenant_id: TenantId,
    pub debt_id: DebtId,
    pub amount: Money,
    pub note: Option<String>,
    pub outstanding_after: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DebtSettled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtSettled {
    pub tenant_id: TenantId,
    pub debt_id: DebtId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DebtWrittenOff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtWrittenOff {
    pub tenant_id: TenantId,
    pub debt_id: DebtId,
    pub direction: DebtDirection,
    pub amount: Money,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DebtEvent {
    DebtOpened(DebtOpened),
    RepaymentRecorded(RepaymentRecorded),
    DebtSettled(DebtSettled),
    DebtWrittenOff(DebtWrittenOff),
}

impl Event for DebtEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DebtEvent::DebtOpened(_) => "debts.debt.opened",
            DebtEvent::RepaymentRecorded(_) => "debts.debt.repayment_recorded",
            DebtEvent::DebtSettled(_) => "debts.debt.settled",
            DebtEvent::DebtWrittenOff(_) => "debts.debt.written_off",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DebtEvent::DebtOpened(e) => e.occurred_at,
            DebtEvent::RepaymentRecorded(e) => e.occurred_at,
            DebtEvent::DebtSettled(e) => e.occurred_at,
            DebtEvent::DebtWrittenOff(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Debt {
    type Command = DebtCommand;
    type Event = DebtEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DebtEvent::DebtOpened(e) => {
                self.id = e.debt_id;
                self.tenant_id = Some(e.tenant_id);
                self.direction = e.direction;
                self.party_id = Some(e.party_id);
                self.origin = e.origin;
                self.principal = e.principal;
                self.due_date = e.due_date;
                self.status = DebtStatus::Open;
                self.created = true;
            }
            DebtEvent::RepaymentRecorded(e) => {
                self.repayments.push(Repayment {
                    amount: e.amount,
                    note: e.note.clone(),
                    paid_at: e.occurred_at,
                });
            }
            DebtEvent::DebtSettled(_) => {
                self.status = DebtStatus::Settled;
            }
            DebtEvent::DebtWrittenOff(_) => {
                self.status = DebtStatus::WrittenOff;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            DebtCommand::OpenDebt(cmd) => self.handle_open(cmd),
            DebtCommand::RecordRepayment(cmd) => self.handle_repayment(cmd),
            DebtCommand::WriteOff(cmd) => self.handle_write_off(cmd),
        }
    }
}

impl Debt {
    fn ensure_target(&self, tenant_id: TenantId, debt_id: DebtId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("debt"));
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != debt_id {
            return Err(DomainError::invariant("debt_id mismatch"));
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), DomainError> {
        match self.status {
            DebtStatus::Open => Ok(()),
            DebtStatus::Settled => Err(DomainError::conflict("debt is already settled")),
            DebtStatus::WrittenOff => Err(DomainError::conflict("debt was written off")),
        }
    }

    fn handle_open(&self, cmd: &OpenDebt) -> Result<Vec<DebtEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("debt already exists"));
        }
        cmd.principal.ensure_positive("principal")?;

        Ok(vec![DebtEvent::DebtOpened(DebtOpened {
            tenant_id: cmd.tenant_id,
            debt_id: cmd.debt_id,
            direction: cmd.direction,
            party_id: cmd.party_id,
            origin: cmd.origin,
            principal: cmd.principal,
            due_date: cmd.due_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_repayment(&self, cmd: &RecordRepayment) -> Result<Vec<DebtEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.debt_id)?;
        self.ensure_open()?;
        cmd.amount.ensure_positive("repayment")?;

        let outstanding = self.outstanding();
        if cmd.amount > outstanding {
            return Err(DomainError::invariant(format!(
                "repayment {} exceeds outstanding {}",
                cmd.amount, outstanding
            )));
        }

        let outstanding_after = outstanding - cmd.amount;
        let note = cmd
            .note
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        let mut events = vec![DebtEvent::RepaymentRecorded(RepaymentRecorded {
            tenant_id: cmd.tenant_id,
            debt_id: cmd.debt_id,
            amount: cmd.amount,
            note,
            outstanding_after,
            occurred_at: cmd.occurred_at,
        })];
        if outstanding_after.is_zero() {
            events.push(DebtEvent::DebtSettled(DebtSettled {
                tenant_id: cmd.tenant_id,
                debt_id: cmd.debt_id,
                occurred_at: cmd.occurred_at,
            }));
        }
        Ok(events)
    }

    fn handle_write_off(&self, cmd: &WriteOff) -> Result<Vec<DebtEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.debt_id)?;
        self.ensure_open()?;
        let reason = cmd.reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("write-off reason is required"));
        }
        let outstanding = self.outstanding();
        if !outstanding.is_positive() {
            return Err(DomainError::invariant("nothing left to write off"));
        }

        Ok(vec![DebtEvent::DebtWrittenOff(DebtWrittenOff {
            tenant_id: cmd.tenant_id,
            debt_id: cmd.debt_id,
            direction: self.direction,
            amount: outstanding,
            reason: reason.to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use stockledger_events::execute;

    fn open(principal: i64, due: Option<NaiveDate>) -> (TenantId, Debt) {
        let tenant_id = TenantId::new();
        let debt_id = DebtId::new(AggregateId::new());
        let mut debt = Debt::empty(debt_id);
        execute(
            &mut debt,
            &DebtCommand::OpenDebt(OpenDebt {
                tenant_id,
                debt_id,
                direction: DebtDirection::Receivable,
                party_id: PartyId::new(AggregateId::new()),
                origin: DebtOrigin::Manual,
                principal: Money::from_cents(principal),
                due_date: due,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        (tenant_id, debt)
    }

    fn repay(tenant_id: TenantId, debt: &mut Debt, amount: i64) -> Result<Vec<DebtEvent>, DomainError> {
        let cmd = DebtCommand::RecordRepayment(RecordRepayment {
            tenant_id,
            debt_id: debt.id_typed(),
            amount: Money::from_cents(amount),
            note: None,
            occurred_at: Utc::now(),
        });
        execute(debt, &cmd)
    }

    fn write_off(tenant_id: TenantId, debt: &mut Debt, reason: &str) -> Result<Vec<DebtEvent>, DomainError> {
        let cmd = DebtCommand::WriteOff(WriteOff {
            tenant_id,
            debt_id: debt.id_typed(),
            reason: reason.to_string(),
            occurred_at: Utc::now(),
        });
        execute(debt, &cmd)
    }

    #[test]
    fn zero_principal_is_rejected() {
        let debt_id = DebtId::new(AggregateId::new());
        let debt = Debt::empty(debt_id);
        let err = debt
            .handle(&DebtCommand::OpenDebt(OpenDebt {
                tenant_id: TenantId::new(),
                debt_id,
                direction: DebtDirection::Payable,
                party_id: PartyId::new(AggregateId::new()),
                origin: DebtOrigin::Manual,
                principal: Money::ZERO,
                due_date: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn final_repayment_settles() {
        let (tenant_id, mut debt) = open(1000, None);
        let events = repay(tenant_id, &mut debt, 400).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(debt.outstanding(), Money::from_cents(600));

        let events = repay(tenant_id, &mut debt, 600).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], DebtEvent::DebtSettled(_)));
        assert_eq!(debt.status(), DebtStatus::Settled);

        assert!(matches!(repay(tenant_id, &mut debt, 1), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn overpayment_is_rejected() {
        let (tenant_id, mut debt) = open(1000, None);
        let err = repay(tenant_id, &mut debt, 1001).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(debt.version(), 1);
    }

    #[test]
    fn write_off_covers_the_remaining_balance() {
        let (tenant_id, mut debt) = open(1000, None);
        repay(tenant_id, &mut debt, 250).unwrap();
        assert!(matches!(write_off(tenant_id, &mut debt, "  "), Err(DomainError::Validation(_))));

        let events = write_off(tenant_id, &mut debt, "customer closed").unwrap();
        match &events[0] {
            DebtEvent::DebtWrittenOff(e) => assert_eq!(e.amount, Money::from_cents(750)),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(debt.status(), DebtStatus::WrittenOff);
        assert!(matches!(
            write_off(tenant_id, &mut debt, "again"),
            Err(DomainError::Conflict(_))
        ));
    }

    #[test]
    fn overdue_only_when_open_and_past_due() {
        let due = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let (tenant_id, mut debt) = open(500, Some(due));
        assert!(!debt.is_overdue(due));
        assert!(debt.is_overdue(due.succ_opt().unwrap()));

        repay(tenant_id, &mut debt, 500).unwrap();
        assert!(!debt.is_overdue(due.succ_opt().unwrap()));
    }

    #[test]
    fn other_tenant_cannot_repay() {
        let (_, mut debt) = open(500, None);
        let err = repay(TenantId::new(), &mut debt, 100).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    proptest! {
        #[test]
        fn outstanding_never_negative(amounts in prop::collection::vec(1i64..400, 1..20)) {
            let (tenant_id, mut debt) = open(1000, None);
            for amount in amounts {
                let _ = repay(tenant_id, &mut debt, amount);
                prop_assert!(!debt.outstanding().is_negative());
                prop_assert_eq!(debt.status() == DebtStatus::Settled, debt.outstanding().is_zero());
            }
        }
    }
}
