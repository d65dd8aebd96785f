use serde::Serialize;

use stockledger_core::Money;
use stockledger_parties::PartyId;
use stockledger_purchasing::{Purchase, PurchaseId, PurchaseLine, PurchaseStatus, StorageAllocation};
use stockledger_storage::Storage;

use super::storages::StorageView;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseView {
    pub purchase_id: PurchaseId,
    pub supplier_id: Option<PartyId>,
    pub reference: Option<String>,
    pub status: PurchaseStatus,
    pub lines: Vec<PurchaseLine>,
    pub allocations: Vec<StorageAllocation>,
    pub ordered_total: Money,
    pub received_total: Money,
    pub paid: Money,
    pub outstanding: Money,
}

impl From<&Purchase> for PurchaseView {
    fn from(p: &Purchase) -> Self {
        Self {
            purchase_id: p.id_typed(),
            supplier_id: p.supplier_id(),
            reference: p.reference().map(str::to_string),
            status: p.status(),
            lines: p.lines().to_vec(),
            allocations: p.allocations().to_vec(),
            ordered_total: p.ordered_total(),
            received_total: p.received_total(),
            paid: p.paid(),
            outstanding: p.outstanding(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocationLine {
    pub line_no: u32,
    pub received: u64,
    pub allocated: u64,
    pub remaining: u64,
}

/// State of the put-away wizard for one purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocationPlan {
    pub purchase_id: PurchaseId,
    pub status: PurchaseStatus,
    pub lines: Vec<AllocationLine>,
    pub storages: Vec<StorageView>,
}

impl AllocationPlan {
    pub fn is_complete(&self) -> bool {
        self.lines.iter().all(|l| l.remaining == 0)
    }
}

pub fn allocation_plan(purchase: &Purchase, storages: &[Storage]) -> AllocationPlan {
    let lines = purchase
        .lines()
        .iter()
        .map(|l| AllocationLine {
            line_no: l.line_no,
            received: l.received,
            allocated: l.allocated,
            remaining: l.remaining(),
        })
        .collect();
    let mut active: Vec<StorageView> = storages
        .iter()
        .filter(|s| s.is_created() && s.is_active())
        .map(StorageView::from)
        .collect();
    active.sort_by(|a, b| a.name.cmp(&b.name));
    AllocationPlan {
        purchase_id: purchase.id_typed(),
        status: purchase.status(),
        lines,
        storages: active,
    }
}

pub fn purchase_list(purchases: &[Purchase]) -> Vec<PurchaseView> {
    let mut out: Vec<PurchaseView> = purchases.iter().filter(|p| p.is_created()).map(PurchaseView::from).collect();
    // v7 ids sort by creation time.
    out.sort_by_key(|p| p.purchase_id);
    out
}
