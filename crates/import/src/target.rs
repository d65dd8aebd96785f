use std::collections::BTreeMap;

use chrono::NaiveDate;

use stockledger_core::Money;

use crate::cell::{CellKind, CellValue};
use crate::error::ImportError;
use crate::mapping::ColumnMapping;
use crate::report::ImportReport;
use crate::sheet::Sheet;

/// A field an import target reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: CellKind,
    pub required: bool,
}

impl FieldSpec {
    pub const fn required(name: &'static str, kind: CellKind) -> Self {
        Self { name, kind, required: true }
    }

    pub const fn optional(name: &'static str, kind: CellKind) -> Self {
        Self { name, kind, required: false }
    }
}

/// Coerced values of one row, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowValues {
    values: BTreeMap<&'static str, CellValue>,
}

impl RowValues {
    pub fn get(&self, field: &str) -> Option<&CellValue> {
        self.values.get(field)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        match self.values.get(field) {
            Some(CellValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn integer(&self, field: &str) -> Option<i64> {
        match self.values.get(field) {
            Some(CellValue::Integer(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn money(&self, field: &str) -> Option<Money> {
        match self.values.get(field) {
            Some(CellValue::Money(m)) => Some(*m),
            _ => None,
        }
    }

    pub fn boolean(&self, field: &str) -> Option<bool> {
        match self.values.get(field) {
            Some(CellValue::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn date(&self, field: &str) -> Option<NaiveDate> {
        match self.values.get(field) {
            Some(CellValue::Date(d)) => Some(*d),
            _ => None,
        }
    }
}

/// A typed record built from one spreadsheet row.
pub trait ImportTarget: Sized {
    fn fields() -> &'static [FieldSpec];

    /// Build the record; errors name the offending field.
    fn from_row(row: &RowValues) -> Result<Self, (Option<&'static str>, String)>;
}

/// Read every data row of `sheet` into `T`.
///
/// Fails only when the mapping cannot be resolved; row problems are
/// collected in the report and the row is skipped.
pub fn import<T: ImportTarget>(
    sheet: &Sheet,
    mapping: &ColumnMapping,
) -> Result<ImportReport<T>, ImportError> {
    let specs = T::fields();
    let columns = mapping.resolve(sheet, specs)?;
    let mut report = ImportReport::default();

    for (index, raw) in sheet.rows.iter().enumerate() {
        if raw.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        let row_number = Sheet::row_number(index);
        let mut values = RowValues::default();
        let mut failed = false;

        for spec in specs {
            let Some(&col) = columns.get(spec.name) else {
                continue;
            };
            match CellValue::coerce(sheet.cell(index, col), spec.kind) {
                Ok(Some(value)) => {
                    values.values.insert(spec.name, value);
                }
                Ok(None) if spec.required => {
                    report.reject(row_number, Some(spec.name), "value is required");
                    failed = true;
                }
                Ok(None) => {}
                Err(message) => {
                    report.reject(row_number, Some(spec.name), message);
                    failed = true;
                }
            }
        }

        if failed {
            continue;
        }
        match T::from_row(&values) {
            Ok(record) => report.rows.push((row_number, record)),
            Err((column, message)) => report.reject(row_number, column, message),
        }
    }

    Ok(report)
}
