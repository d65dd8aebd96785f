use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use stockledger_events::Event;

/// Party identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(pub AggregateId);

impl PartyId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PartyId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyKind {
    Customer,
    Supplier,
}

impl core::str::FromStr for PartyKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(PartyKind::Customer),
            "supplier" => Ok(PartyKind::Supplier),
            other => Err(DomainError::validation(format!(
                "unknown party kind '{other}' (expected customer or supplier)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyStatus {
    Active,
    Suspended,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl ContactInfo {
    /// Trim fields, drop blanks, and check the email shape.
    pub fn normalized(&self) -> Result<ContactInfo, DomainError> {
        fn clean(v: &Option<String>) -> Option<String> {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        }
        let email = clean(&self.email);
        if let Some(e) = &email {
            let valid = e
                .split_once('@')
                .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty());
            if !valid {
                return Err(DomainError::validation(format!("'{e}' is not an email address")));
            }
        }
        Ok(ContactInfo {
            email,
            phone: clean(&self.phone),
            address: clean(&self.address),
        })
    }
}

/// Aggregate root: Party (customer or supplier).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
    id: PartyId,
    tenant_id: Option<TenantId>,
    kind: PartyKind,
    name: String,
    contact: ContactInfo,
    status: PartyStatus,
    version: u64,
    created: bool,
}

impl Party {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PartyId) -> Self {
        Self {
            id,
            tenant_id: None,
            kind: PartyKind::Customer,
            name: String::new(),
            contact: ContactInfo::default(),
            status: PartyStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PartyId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn kind(&self) -> PartyKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn status(&self) -> PartyStatus {
        self.status
    }

    /// Suspended parties cannot be used on new purchases or sales.
    pub fn can_transact(&self) -> bool {
        self.created && self.status == PartyStatus::Active
    }
}

impl AggregateRoot for Party {
    type Id = PartyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateParty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateParty {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub kind: PartyKind,
    pub name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateContactInfo. `name: None` keeps the current name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateContactInfo {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub name: Option<String>,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Suspend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suspend {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Reactivate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reactivate {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyCommand {
    CreateParty(CreateParty),
    UpdateContactInfo(UpdateContactInfo),
    Suspend(Suspend),
    Reactivate(Reactivate),
}

/// Event: PartyCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyCreated {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub kind: PartyKind,
    pub name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ContactInfoUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfoUpdated {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PartySuspended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartySuspended {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PartyReactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyReactivated {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyEvent {
    PartyCreated(PartyCreated),
    ContactInfoUpdated(ContactInfoUpdated),
    PartySuspended(PartySuspended),
    PartyReactivated(PartyReactivated),
}

impl Event for PartyEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PartyEvent::PartyCreated(_) => "parties.party.created",
            PartyEvent::ContactInfoUpdated(_) => "parties.party.contact_info_updated",
            PartyEvent::PartySuspended(_) => "parties.party.suspended",
            PartyEvent::PartyReactivated(_) => "parties.party.reactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PartyEvent::PartyCreated(e) => e.occurred_at,
            PartyEvent::ContactInfoUpdated(e) => e.occurred_at,
            PartyEvent::PartySuspended(e) => e.occurred_at,
            PartyEvent::PartyReactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Party {
    type Command = PartyCommand;
    type Event = PartyEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PartyEvent::PartyCreated(e) => {
                self.id = e.party_id;
                self.tenant_id = Some(e.tenant_id);
                self.kind = e.kind;
                self.name = e.name.clone();
                self.contact = e.contact.clone();
                self.status = PartyStatus::Active;
                self.created = true;
            }
            PartyEvent::ContactInfoUpdated(e) => {
                self.name = e.name.clone();
                self.contact = e.contact.clone();
            }
            PartyEvent::PartySuspended(_) => {
                self.status = PartyStatus::Suspended;
            }
            PartyEvent::PartyReactivated(_) => {
                self.status = PartyStatus::Active;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PartyCommand::CreateParty(cmd) => self.handle_create(cmd),
            PartyCommand::UpdateContactInfo(cmd) => self.handle_update(cmd),
            PartyCommand::Suspend(cmd) => self.handle_suspend(cmd),
            PartyCommand::Reactivate(cmd) => self.handle_reactivate(cmd),
        }
    }
}

impl Party {
    fn ensure_target(&self, tenant_id: TenantId, party_id: PartyId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("party"));
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != party_id {
            return Err(DomainError::invariant("party_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateParty) -> Result<Vec<PartyEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("party already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        Ok(vec![PartyEvent::PartyCreated(PartyCreated {
            tenant_id: cmd.tenant_id,
            party_id: cmd.party_id,
            kind: cmd.kind,
            name: cmd.name.trim().to_string(),
            contact: cmd.contact.normalized()?,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateContactInfo) -> Result<Vec<PartyEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.party_id)?;
        let name = match &cmd.name {
            Some(n) if n.trim().is_empty() => {
                return Err(DomainError::validation("name cannot be empty"));
            }
            Some(n) => n.trim().to_string(),
            None => self.name.clone(),
        };
        let contact = cmd.contact.normalized()?;
        if name == self.name && contact == self.contact {
            return Err(DomainError::validation("update changes nothing"));
        }
        Ok(vec![PartyEvent::ContactInfoUpdated(ContactInfoUpdated {
            tenant_id: cmd.tenant_id,
            party_id: cmd.party_id,
            name,
            contact,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_suspend(&self, cmd: &Suspend) -> Result<Vec<PartyEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.party_id)?;
        if self.status == PartyStatus::Suspended {
            return Err(DomainError::conflict("party is already suspended"));
        }
        Ok(vec![PartyEvent::PartySuspended(PartySuspended {
            tenant_id: cmd.tenant_id,
            party_id: cmd.party_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reactivate(&self, cmd: &Reactivate) -> Result<Vec<PartyEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.party_id)?;
        if self.status == PartyStatus::Active {
            return Err(DomainError::conflict("party is already active"));
        }
        Ok(vec![PartyEvent::PartyReactivated(PartyReactivated {
            tenant_id: cmd.tenant_id,
            party_id: cmd.party_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockledger_events::execute;

    fn supplier(tenant_id: TenantId) -> Party {
        let party_id = PartyId::new(AggregateId::new());
        let mut party = Party::empty(party_id);
        execute(
            &mut party,
            &PartyCommand::CreateParty(CreateParty {
                tenant_id,
                party_id,
                kind: PartyKind::Supplier,
                name: "  Acme Wholesale ".to_string(),
                contact: ContactInfo {
                    email: Some("orders@acme.test".to_string()),
                    phone: Some(" ".to_string()),
                    address: None,
                },
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        party
    }

    #[test]
    fn create_normalises_name_and_contact() {
        let party = supplier(TenantId::new());
        assert_eq!(party.name(), "Acme Wholesale");
        assert_eq!(party.contact().phone, None);
        assert!(party.can_transact());
    }

    #[test]
    fn malformed_email_is_rejected() {
        let bad = ContactInfo {
            email: Some("acme.test".to_string()),
            ..ContactInfo::default()
        };
        assert!(matches!(bad.normalized(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn suspend_then_reactivate() {
        let t = TenantId::new();
        let mut party = supplier(t);
        let party_id = party.id_typed();

        execute(
            &mut party,
            &PartyCommand::Suspend(Suspend {
                tenant_id: t,
                party_id,
                reason: Some("late deliveries".to_string()),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert!(!party.can_transact());

        let again = PartyCommand::Suspend(Suspend {
            tenant_id: t,
            party_id,
            reason: None,
            occurred_at: Utc::now(),
        });
        assert!(matches!(party.handle(&again), Err(DomainError::Conflict(_))));

        execute(
            &mut party,
            &PartyCommand::Reactivate(Reactivate {
                tenant_id: t,
                party_id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert!(party.can_transact());
        assert_eq!(party.version(), 3);
    }

    #[test]
    fn update_without_changes_is_rejected() {
        let t = TenantId::new();
        let party = supplier(t);
        let cmd = PartyCommand::UpdateContactInfo(UpdateContactInfo {
            tenant_id: t,
            party_id: party.id_typed(),
            name: None,
            contact: party.contact().clone(),
            occurred_at: Utc::now(),
        });
        assert!(matches!(party.handle(&cmd), Err(DomainError::Validation(_))));
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("Customer".parse::<PartyKind>().unwrap(), PartyKind::Customer);
        assert!("vendor".parse::<PartyKind>().is_err());
    }

    #[test]
    fn commands_on_missing_party_are_not_found() {
        let party_id = PartyId::new(AggregateId::new());
        let err = Party::empty(party_id)
            .handle(&PartyCommand::Reactivate(Reactivate {
                tenant_id: TenantId::new(),
                party_id,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }
}
