//! Spreadsheet import.
//!
//! A [`Sheet`] is read once, columns are mapped to the fields an
//! [`ImportTarget`] declares, every cell is coerced to the declared kind and
//! each row becomes either a typed record or a list of row errors in the
//! [`ImportReport`]. A bad row never aborts the rest of the file.

pub mod cell;
pub mod error;
pub mod mapping;
pub mod report;
pub mod sheet;
pub mod target;
pub mod targets;

pub use cell::{CellKind, CellValue};
pub use error::ImportError;
pub use mapping::{ColumnMapping, ColumnRef};
pub use report::{ImportReport, RowError};
pub use sheet::{CsvSheetReader, Sheet, SheetReader};
pub use target::{FieldSpec, ImportTarget, RowValues, import};
pub use targets::{CatalogRow, PartyRow};
