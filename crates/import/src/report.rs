use serde::Serialize;

/// One problem in one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    /// Spreadsheet row number (the header is row 1).
    pub row: usize,
    pub column: Option<String>,
    pub message: String,
}

/// Outcome of importing one sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport<T> {
    /// Accepted rows with their spreadsheet row numbers.
    pub rows: Vec<(usize, T)>,
    pub errors: Vec<RowError>,
}

impl<T> Default for ImportReport<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl<T> ImportReport<T> {
    pub fn accepted(&self) -> usize {
        self.rows.len()
    }

    pub fn rejected_rows(&self) -> usize {
        let mut rows: Vec<usize> = self.errors.iter().map(|e| e.row).collect();
        rows.dedup();
        rows.len()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn reject(&mut self, row: usize, column: Option<&str>, message: impl Into<String>) {
        self.errors.push(RowError {
            row,
            column: column.map(str::to_string),
            message: message.into(),
        });
    }
}
