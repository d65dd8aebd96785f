use thiserror::Error;

/// File-level import failure. Row-level problems go into the report instead.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("CSV processing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("the sheet has no header row")]
    EmptySheet,

    #[error("column '{column}' mapped to field '{field}' does not exist")]
    MissingColumn { field: String, column: String },

    #[error("required field '{0}' is not mapped to any column")]
    UnmappedField(String),

    #[error("field '{0}' is not known to this import")]
    UnknownField(String),
}
