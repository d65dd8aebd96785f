//! Row shapes understood by the import endpoints.

use serde::Serialize;

use stockledger_catalog::Attributes;
use stockledger_core::Money;
use stockledger_parties::{ContactInfo, PartyKind};

use crate::cell::CellKind;
use crate::target::{FieldSpec, ImportTarget, RowValues};

/// One variation of a product, optionally with opening stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogRow {
    pub product_name: String,
    pub product_sku: String,
    pub category: Option<String>,
    pub variation_sku: String,
    pub attributes: Attributes,
    pub price: Money,
    pub cost: Money,
    pub opening_quantity: u64,
    pub storage: Option<String>,
}

const CATALOG_FIELDS: [FieldSpec; 9] = [
    FieldSpec::required("product_name", CellKind::Text),
    FieldSpec::required("product_sku", CellKind::Text),
    FieldSpec::optional("category", CellKind::Text),
    FieldSpec::required("variation_sku", CellKind::Text),
    FieldSpec::optional("attributes", CellKind::Text),
    FieldSpec::required("price", CellKind::Money),
    FieldSpec::required("cost", CellKind::Money),
    FieldSpec::optional("opening_quantity", CellKind::Integer),
    FieldSpec::optional("storage", CellKind::Text),
];

fn required_text(row: &RowValues, field: &'static str) -> Result<String, (Option<&'static str>, String)> {
    row.text(field)
        .map(str::to_string)
        .ok_or((Some(field), "value is required".to_string()))
}

impl ImportTarget for CatalogRow {
    fn fields() -> &'static [FieldSpec] {
        &CATALOG_FIELDS
    }

    fn from_row(row: &RowValues) -> Result<Self, (Option<&'static str>, String)> {
        let attributes = match row.text("attributes") {
            Some(raw) => Attributes::parse(raw).map_err(|e| (Some("attributes"), e.to_string()))?,
            None => Attributes::default(),
        };

        let price = row.money("price").unwrap_or(Money::ZERO);
        let cost = row.money("cost").unwrap_or(Money::ZERO);
        if price.is_negative() {
            return Err((Some("price"), "price cannot be negative".to_string()));
        }
        if cost.is_negative() {
            return Err((Some("cost"), "cost cannot be negative".to_string()));
        }

        let opening_quantity = match row.integer("opening_quantity") {
            Some(q) => u64::try_from(q)
                .map_err(|_| (Some("opening_quantity"), "quantity cannot be negative".to_string()))?,
            None => 0,
        };
        let storage = row.text("storage").map(str::to_string);
        if opening_quantity > 0 && storage.is_none() {
            return Err((Some("storage"), "opening stock needs a storage".to_string()));
        }

        Ok(CatalogRow {
            product_name: required_text(row, "product_name")?,
            product_sku: required_text(row, "product_sku")?,
            category: row.text("category").map(str::to_string),
            variation_sku: required_text(row, "variation_sku")?,
            attributes,
            price,
            cost,
            opening_quantity,
            storage,
        })
    }
}

/// A customer or supplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartyRow {
    pub kind: PartyKind,
    pub name: String,
    pub contact: ContactInfo,
}

const PARTY_FIELDS: [FieldSpec; 5] = [
    FieldSpec::required("kind", CellKind::Text),
    FieldSpec::required("name", CellKind::Text),
    FieldSpec::optional("email", CellKind::Text),
    FieldSpec::optional("phone", CellKind::Text),
    FieldSpec::optional("address", CellKind::Text),
];

impl ImportTarget for PartyRow {
    fn fields() -> &'static [FieldSpec] {
        &PARTY_FIELDS
    }

    fn from_row(row: &RowValues) -> Result<Self, (Option<&'static str>, String)> {
        let kind: PartyKind = required_text(row, "kind")?
            .parse()
            .map_err(|e: stockledger_core::DomainError| (Some("kind"), e.to_string()))?;
        let contact = ContactInfo {
            email: row.text("email").map(str::to_string),
            phone: row.text("phone").map(str::to_string),
            address: row.text("address").map(str::to_string),
        }
        .normalized()
        .map_err(|e| (Some("email"), e.to_string()))?;

        Ok(PartyRow {
            kind,
            name: required_text(row, "name")?,
            contact,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::ColumnMapping;
    use crate::sheet::{CsvSheetReader, SheetReader};
    use crate::target::import;

    const CATALOG_CSV: &str = "\
product_name,product_sku,variation_sku,attributes,price,cost,opening_quantity,storage
T-Shirt,TS,TS-R-L,color=Red;size=L,$19.99,8.50,10,Main
T-Shirt,TS,TS-B-L,color=Blue;size=L,19.99,8.5,,
Mug,MUG,MUG-1,,4,1.999,,
Cap,CAP,CAP-1,,5,2,3,
";

    #[test]
    fn catalog_rows_are_accepted_or_reported() {
        let sheet = CsvSheetReader::new().read(CATALOG_CSV.as_bytes()).unwrap();
        let report = import::<CatalogRow>(&sheet, &ColumnMapping::new()).unwrap();

        assert_eq!(report.accepted(), 2);
        let (row, first) = &report.rows[0];
        assert_eq!(*row, 2);
        assert_eq!(first.price, Money::from_cents(1999));
        assert_eq!(first.cost, Money::from_cents(850));
        assert_eq!(first.opening_quantity, 10);
        assert_eq!(first.attributes.get("size"), Some("L"));

        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0].row, 4);
        assert_eq!(report.errors[0].column.as_deref(), Some("cost"));
        assert_eq!(report.errors[1].row, 5);
        assert_eq!(report.errors[1].column.as_deref(), Some("storage"));
    }

    #[test]
    fn party_rows_with_custom_headers() {
        let csv = "Type;Company;Mail\nsupplier;Acme;orders@acme.test\nvendor;Nope;\ncustomer;Jane;not-an-email\n";
        let sheet = CsvSheetReader::new().read(csv.as_bytes()).unwrap();
        let mapping = ColumnMapping::new()
            .header("kind", "type")
            .header("name", "company")
            .header("email", "mail");
        let report = import::<PartyRow>(&sheet, &mapping).unwrap();

        assert_eq!(report.accepted(), 1);
        assert_eq!(report.rows[0].1.kind, PartyKind::Supplier);
        assert_eq!(report.rows[0].1.contact.email.as_deref(), Some("orders@acme.test"));
        assert_eq!(report.rejected_rows(), 2);
        assert_eq!(report.errors[0].column.as_deref(), Some("kind"));
        assert_eq!(report.errors[1].column.as_deref(), Some("email"));
    }

    #[test]
    fn blank_lines_are_skipped() {
        let csv = "kind,name\ncustomer,Ann\n,\ncustomer,Bob\n";
        let sheet = CsvSheetReader::new().read(csv.as_bytes()).unwrap();
        let report = import::<PartyRow>(&sheet, &ColumnMapping::new()).unwrap();
        let rows: Vec<usize> = report.rows.iter().map(|(r, _)| *r).collect();
        assert_eq!(rows, vec![2, 4]);
        assert!(report.is_clean());
    }
}
