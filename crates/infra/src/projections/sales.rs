use serde::Serialize;

use stockledger_core::Money;
use stockledger_parties::PartyId;
use stockledger_sales::{Sale, SaleId, SaleLine, SaleStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaleView {
    pub sale_id: SaleId,
    pub customer_id: Option<PartyId>,
    pub status: SaleStatus,
    pub lines: Vec<SaleLine>,
    pub total: Money,
    pub paid: Money,
    pub outstanding: Money,
}

impl From<&Sale> for SaleView {
    fn from(s: &Sale) -> Self {
        Self {
            sale_id: s.id_typed(),
            customer_id: s.customer_id(),
            status: s.status(),
            lines: s.lines().to_vec(),
            total: s.total(),
            paid: s.paid(),
            outstanding: s.outstanding(),
        }
    }
}

pub fn sale_list(sales: &[Sale]) -> Vec<SaleView> {
    let mut out: Vec<SaleView> = sales.iter().filter(|s| s.is_created()).map(SaleView::from).collect();
    out.sort_by_key(|s| s.sale_id);
    out
}
