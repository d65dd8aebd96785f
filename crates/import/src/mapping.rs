use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ImportError;
use crate::sheet::Sheet;
use crate::target::FieldSpec;

/// A source column, by header name or zero-based index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnRef {
    Index(usize),
    Header(String),
}

impl ColumnRef {
    fn resolve(&self, sheet: &Sheet) -> Option<usize> {
        match self {
            ColumnRef::Index(i) => (*i < sheet.headers.len()).then_some(*i),
            ColumnRef::Header(h) => sheet.column_index(h),
        }
    }

    fn describe(&self) -> String {
        match self {
            ColumnRef::Index(i) => format!("#{i}"),
            ColumnRef::Header(h) => h.clone(),
        }
    }
}

/// Target field name -> source column. Fields left out fall back to a column
/// whose header equals the field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnMapping {
    fields: BTreeMap<String, ColumnRef>,
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(mut self, field: impl Into<String>, column: ColumnRef) -> Self {
        self.fields.insert(field.into(), column);
        self
    }

    pub fn header(self, field: impl Into<String>, header: impl Into<String>) -> Self {
        self.map(field, ColumnRef::Header(header.into()))
    }

    pub fn index(self, field: impl Into<String>, index: usize) -> Self {
        self.map(field, ColumnRef::Index(index))
    }

    /// Resolve every declared field to a column index, before any row is read.
    pub(crate) fn resolve(
        &self,
        sheet: &Sheet,
        specs: &[FieldSpec],
    ) -> Result<BTreeMap<&'static str, usize>, ImportError> {
        if let Some(unknown) = self.fields.keys().find(|k| !specs.iter().any(|s| s.name == k.as_str())) {
            return Err(ImportError::UnknownField(unknown.clone()));
        }

        let mut resolved = BTreeMap::new();
        for spec in specs {
            match self.fields.get(spec.name) {
                Some(column) => {
                    let idx = column.resolve(sheet).ok_or_else(|| ImportError::MissingColumn {
                        field: spec.name.to_string(),
                        column: column.describe(),
                    })?;
                    resolved.insert(spec.name, idx);
                }
                None => match sheet.column_index(spec.name) {
                    Some(idx) => {
                        resolved.insert(spec.name, idx);
                    }
                    None if spec.required => {
                        return Err(ImportError::UnmappedField(spec.name.to_string()));
                    }
                    None => {}
                },
            }
        }
        Ok(resolved)
    }
}
