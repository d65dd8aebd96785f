use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money, TenantId};
use stockledger_events::Event;

use crate::chart::Account;

/// One side of a journal entry (immutable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryLine {
    pub account: Account,
    /// Positive amount.
    pub amount: Money,
    /// true = debit, false = credit.
    pub is_debit: bool,
}

impl JournalEntryLine {
    pub fn debit(account: Account, amount: Money) -> Self {
        Self { account, amount, is_debit: true }
    }

    pub fn credit(account: Account, amount: Money) -> Self {
        Self { account, amount, is_debit: false }
    }
}

/// Cash flow classification of an entry (direct method).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CashFlowCategory {
    #[default]
    Operating,
    Investing,
    Financing,
}

/// What produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntrySource {
    Sale { sale_id: AggregateId },
    SaleReturn { sale_id: AggregateId },
    Purchase { purchase_id: AggregateId },
    Debt { debt_id: AggregateId },
    Manual,
}

impl EntrySource {
    pub fn is_sale(&self) -> bool {
        matches!(self, EntrySource::Sale { .. } | EntrySource::SaleReturn { .. })
    }
}

/// Ledger identifier (aggregate id).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerId(pub AggregateId);

impl LedgerId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    /// The single ledger stream of a tenant.
    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self(AggregateId::singleton_for(tenant_id))
    }
}

impl core::fmt::Display for LedgerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Ledger (double-entry journal).
///
/// Note: Ledger does NOT hold balances; it only tracks identity, tenant and
/// the ids of entries already posted. Balances are derived from projections
/// over `JournalEntryPosted` events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    id: LedgerId,
    tenant_id: Option<TenantId>,
    posted: BTreeSet<uuid::Uuid>,
    /// Sum of every debit posted so far, in cents. Entries balance, so this
    /// also bounds every account and statement total.
    debit_volume: i64,
    version: u64,
    created: bool,
}

impl Ledger {
    /// Empty aggregate for rehydration.
    pub fn empty(id: LedgerId) -> Self {
        Self {
            id,
            tenant_id: None,
            posted: BTreeSet::new(),
            debit_volume: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> LedgerId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn has_entry(&self, entry_id: uuid::Uuid) -> bool {
        self.posted.contains(&entry_id)
    }

    pub fn entry_count(&self) -> usize {
        self.posted.len()
    }
}

impl AggregateRoot for Ledger {
    type Id = LedgerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PostJournalEntry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostJournalEntry {
    pub tenant_id: TenantId,
    pub ledger_id: LedgerId,
    pub entry_id: uuid::Uuid,
    pub posted_on: NaiveDate,
    pub description: String,
    pub category: CashFlowCategory,
    pub source: EntrySource,
    pub lines: Vec<JournalEntryLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalCommand {
    PostJournalEntry(PostJournalEntry),
}

/// Event: JournalEntryPosted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryPosted {
    pub tenant_id: TenantId,
    pub ledger_id: LedgerId,
    pub entry_id: uuid::Uuid,
    pub posted_on: NaiveDate,
    pub description: String,
    pub category: CashFlowCategory,
    pub source: EntrySource,
    pub lines: Vec<JournalEntryLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    JournalEntryPosted(JournalEntryPosted),
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::JournalEntryPosted(_) => "accounting.ledger.journal_entry_posted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::JournalEntryPosted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Ledger {
    type Command = JournalCommand;
    type Event = LedgerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LedgerEvent::JournalEntryPosted(e) => {
                self.id = e.ledger_id;
                if self.tenant_id.is_none() {
                    self.tenant_id = Some(e.tenant_id);
                    self.created = true;
                }
                self.posted.insert(e.entry_id);
                let debits: i64 = e
                    .lines
                    .iter()
                    .filter(|l| l.is_debit)
                    .fold(0, |acc, l| acc.saturating_add(l.amount.cents()));
                self.debit_volume = self.debit_volume.saturating_add(debits);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            JournalCommand::PostJournalEntry(cmd) => self.handle_post(cmd),
        }
    }
}

impl Ledger {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn handle_post(&self, cmd: &PostJournalEntry) -> Result<Vec<LedgerEvent>, DomainError> {
        self.ensure_tenant(cmd.tenant_id)?;

        if self.posted.contains(&cmd.entry_id) {
            return Err(DomainError::conflict(format!(
                "journal entry {} already posted",
                cmd.entry_id
            )));
        }
        let description = cmd.description.trim();
        if description.is_empty() {
            return Err(DomainError::validation("journal entry needs a description"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("journal entry must have lines"));
        }

        let mut debit_total: i128 = 0;
        let mut credit_total: i128 = 0;

        for line in &cmd.lines {
            line.account.validate()?;
            if !line.amount.is_positive() {
                return Err(DomainError::validation("amount must be positive"));
            }
            if line.is_debit {
                debit_total += line.amount.cents() as i128;
            } else {
                credit_total += line.amount.cents() as i128;
            }
        }

        if debit_total != credit_total {
            return Err(DomainError::invariant("debits must equal credits"));
        }
        if i128::from(self.debit_volume) + debit_total > i128::from(i64::MAX) {
            return Err(DomainError::invariant("posting would overflow the ledger totals"));
        }

        Ok(vec![LedgerEvent::JournalEntryPosted(JournalEntryPosted {
            tenant_id: cmd.tenant_id,
            ledger_id: cmd.ledger_id,
            entry_id: cmd.entry_id,
            posted_on: cmd.posted_on,
            description: description.to_string(),
            category: cmd.category,
            source: cmd.source,
            lines: cmd.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{ACCOUNTS_RECEIVABLE, CASH, COST_OF_GOODS_SOLD, INVENTORY, SALES_REVENUE};
    use proptest::prelude::*;
    use stockledger_events::execute;

    fn post(tenant_id: TenantId, lines: Vec<JournalEntryLine>) -> JournalCommand {
        let now = Utc::now();
        JournalCommand::PostJournalEntry(PostJournalEntry {
            tenant_id,
            ledger_id: LedgerId::for_tenant(tenant_id),
            entry_id: uuid::Uuid::now_v7(),
            posted_on: now.date_naive(),
            description: "Counter sale".to_string(),
            category: CashFlowCategory::Operating,
            source: EntrySource::Manual,
            lines,
            occurred_at: now,
        })
    }

    fn cash_sale(cents: i64) -> Vec<JournalEntryLine> {
        vec![
            JournalEntryLine::debit(CASH.account(), Money::from_cents(cents)),
            JournalEntryLine::credit(SALES_REVENUE.account(), Money::from_cents(cents)),
        ]
    }

    #[test]
    fn multi_leg_sale_entry_is_posted_as_given() {
        let tenant_id = TenantId::new();
        let mut ledger = Ledger::empty(LedgerId::for_tenant(tenant_id));
        // 40.00 sale, 10.00 paid, 16.00 of stock leaves the shelf.
        let lines = vec![
            JournalEntryLine::debit(CASH.account(), Money::from_cents(1000)),
            JournalEntryLine::debit(ACCOUNTS_RECEIVABLE.account(), Money::from_cents(3000)),
            JournalEntryLine::credit(SALES_REVENUE.account(), Money::from_cents(4000)),
            JournalEntryLine::debit(COST_OF_GOODS_SOLD.account(), Money::from_cents(1600)),
            JournalEntryLine::credit(INVENTORY.account(), Money::from_cents(1600)),
        ];

        let events = execute(&mut ledger, &post(tenant_id, lines.clone())).unwrap();
        let [LedgerEvent::JournalEntryPosted(posted)] = events.as_slice() else {
            panic!("expected a single posting, got {events:?}");
        };
        assert_eq!(posted.lines, lines);
        assert_eq!(posted.description, "Counter sale");
        assert_eq!(ledger.tenant_id(), Some(tenant_id));
        assert_eq!(ledger.entry_count(), 1);
    }

    #[test]
    fn entry_that_does_not_balance_is_refused() {
        let tenant_id = TenantId::new();
        let ledger = Ledger::empty(LedgerId::for_tenant(tenant_id));
        let lines = vec![
            JournalEntryLine::debit(CASH.account(), Money::from_cents(4000)),
            JournalEntryLine::credit(SALES_REVENUE.account(), Money::from_cents(3999)),
        ];

        assert!(matches!(
            ledger.handle(&post(tenant_id, lines)),
            Err(DomainError::InvariantViolation(msg)) if msg.contains("debits must equal credits")
        ));
    }

    #[test]
    fn blank_description_no_lines_and_zero_amounts_are_validation_errors() {
        let tenant_id = TenantId::new();
        let ledger = Ledger::empty(LedgerId::for_tenant(tenant_id));

        let mut blank = post(tenant_id, cash_sale(100));
        let JournalCommand::PostJournalEntry(cmd) = &mut blank;
        cmd.description = "   ".to_string();

        for cmd in [blank, post(tenant_id, Vec::new()), post(tenant_id, cash_sale(0))] {
            assert!(matches!(ledger.handle(&cmd), Err(DomainError::Validation(_))));
        }
    }

    #[test]
    fn reposting_an_entry_id_conflicts() {
        let tenant_id = TenantId::new();
        let mut ledger = Ledger::empty(LedgerId::for_tenant(tenant_id));
        let cmd = post(tenant_id, cash_sale(500));

        execute(&mut ledger, &cmd).unwrap();
        assert!(matches!(execute(&mut ledger, &cmd), Err(DomainError::Conflict(_))));
        assert_eq!(ledger.entry_count(), 1);
        assert_eq!(ledger.version(), 1);
    }

    #[test]
    fn ledger_belongs_to_the_tenant_that_first_posted() {
        let owner = TenantId::new();
        let mut ledger = Ledger::empty(LedgerId::for_tenant(owner));
        execute(&mut ledger, &post(owner, cash_sale(1))).unwrap();

        let mut foreign = post(TenantId::new(), cash_sale(1));
        let JournalCommand::PostJournalEntry(cmd) = &mut foreign;
        cmd.ledger_id = LedgerId::for_tenant(owner);
        assert!(matches!(ledger.handle(&foreign), Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn posting_past_the_representable_volume_is_refused() {
        let tenant_id = TenantId::new();
        let mut ledger = Ledger::empty(LedgerId::for_tenant(tenant_id));
        execute(&mut ledger, &post(tenant_id, cash_sale(i64::MAX))).unwrap();

        assert!(matches!(
            ledger.handle(&post(tenant_id, cash_sale(1))),
            Err(DomainError::InvariantViolation(msg)) if msg.contains("overflow")
        ));
        assert_eq!(ledger.entry_count(), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 128, ..ProptestConfig::default() })]

        /// Revenue split over any number of credit legs posts, and skewing a
        /// single leg by one cent is always refused.
        #[test]
        fn split_credits_must_sum_to_the_debit(
            parts in prop::collection::vec(1i64..100_000, 1..8),
            skew in any::<bool>(),
        ) {
            let tenant_id = TenantId::new();
            let ledger = Ledger::empty(LedgerId::for_tenant(tenant_id));
            let total: i64 = parts.iter().sum();

            let mut lines = vec![JournalEntryLine::debit(CASH.account(), Money::from_cents(total))];
            for (i, cents) in parts.iter().enumerate() {
                let cents = if skew && i == 0 { cents + 1 } else { *cents };
                lines.push(JournalEntryLine::credit(SALES_REVENUE.account(), Money::from_cents(cents)));
            }

            let outcome = ledger.handle(&post(tenant_id, lines));
            prop_assert_eq!(outcome.is_ok(), !skew);
        }
    }
}
