use crate::error::ImportError;

/// Header row plus raw string cells, exactly as read from the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    /// Zero-based index of a header (case-insensitive, trimmed).
    pub fn column_index(&self, header: &str) -> Option<usize> {
        let wanted = header.trim();
        self.headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(wanted))
    }

    /// Cell at `(row, col)`; short rows read as empty.
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Spreadsheet row number of a data row (header is row 1).
    pub fn row_number(index: usize) -> usize {
        index + 2
    }
}

/// Source of sheets.
pub trait SheetReader {
    fn read(&self, input: &[u8]) -> Result<Sheet, ImportError>;
}

/// CSV reader; the delimiter (`,` or `;`) is picked from the header line.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvSheetReader {
    delimiter: Option<u8>,
}

impl CsvSheetReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(delimiter: u8) -> Self {
        Self {
            delimiter: Some(delimiter),
        }
    }

    fn detect_delimiter(input: &[u8]) -> u8 {
        let header = input.split(|b| *b == b'\n').next().unwrap_or_default();
        let commas = header.iter().filter(|b| **b == b',').count();
        let semicolons = header.iter().filter(|b| **b == b';').count();
        if semicolons > commas { b';' } else { b',' }
    }
}

impl SheetReader for CsvSheetReader {
    fn read(&self, input: &[u8]) -> Result<Sheet, ImportError> {
        let input = input.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(input);
        let delimiter = self.delimiter.unwrap_or_else(|| Self::detect_delimiter(input));

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(input);

        let mut records = reader.records();
        let headers: Vec<String> = match records.next() {
            Some(record) => record?.iter().map(|h| h.trim().to_string()).collect(),
            None => return Err(ImportError::EmptySheet),
        };
        if headers.iter().all(String::is_empty) {
            return Err(ImportError::EmptySheet);
        }

        let mut rows = Vec::new();
        for record in records {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Sheet { headers, rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_semicolons() {
        let sheet = CsvSheetReader::new()
            .read(b"name;price\nShirt;12.50\n")
            .unwrap();
        assert_eq!(sheet.headers, vec!["name", "price"]);
        assert_eq!(sheet.rows, vec![vec!["Shirt".to_string(), "12.50".to_string()]]);
    }

    #[test]
    fn quoted_commas_stay_in_cell() {
        let sheet = CsvSheetReader::new()
            .read(b"name,price\n\"Shirt, blue\",\"1,200.00\"\n")
            .unwrap();
        assert_eq!(sheet.cell(0, 0), "Shirt, blue");
        assert_eq!(sheet.cell(0, 1), "1,200.00");
    }

    #[test]
    fn short_rows_read_as_empty_cells() {
        let sheet = CsvSheetReader::new().read(b"a,b,c\n1\n").unwrap();
        assert_eq!(sheet.cell(0, 0), "1");
        assert_eq!(sheet.cell(0, 2), "");
        assert_eq!(sheet.cell(5, 0), "");
    }

    #[test]
    fn header_lookup_ignores_case_and_spaces() {
        let sheet = CsvSheetReader::new().read(b" Product Name ,SKU\n").unwrap();
        assert_eq!(sheet.column_index("product name"), Some(0));
        assert_eq!(sheet.column_index("sku "), Some(1));
        assert_eq!(sheet.column_index("price"), None);
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(CsvSheetReader::new().read(b""), Err(ImportError::EmptySheet)));
    }
}
