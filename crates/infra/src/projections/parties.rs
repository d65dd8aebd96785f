use serde::Serialize;

use stockledger_parties::{ContactInfo, Party, PartyId, PartyKind, PartyStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartyView {
    pub party_id: PartyId,
    pub kind: PartyKind,
    pub name: String,
    pub contact: ContactInfo,
    pub status: PartyStatus,
}

impl From<&Party> for PartyView {
    fn from(p: &Party) -> Self {
        Self {
            party_id: p.id_typed(),
            kind: p.kind(),
            name: p.name().to_string(),
            contact: p.contact().clone(),
            status: p.status(),
        }
    }
}

/// Parties of one kind (or all), sorted by name.
pub fn directory(parties: &[Party], kind: Option<PartyKind>) -> Vec<PartyView> {
    let mut out: Vec<PartyView> = parties
        .iter()
        .filter(|p| kind.is_none_or(|k| p.kind() == k))
        .map(PartyView::from)
        .collect();
    out.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    out
}
