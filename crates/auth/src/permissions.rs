use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier, e.g. `"sales.write"`.
///
/// The wildcard `"*"` grants everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }

    /// Read permissions end in `.read`.
    pub fn is_read(&self) -> bool {
        self.as_str().ends_with(".read")
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

pub const ALL: Permission = Permission::from_static("*");

pub const CATALOG_READ: Permission = Permission::from_static("catalog.read");
pub const CATALOG_WRITE: Permission = Permission::from_static("catalog.write");
pub const STORAGE_READ: Permission = Permission::from_static("storage.read");
pub const STORAGE_WRITE: Permission = Permission::from_static("storage.write");
pub const PARTIES_READ: Permission = Permission::from_static("parties.read");
pub const PARTIES_WRITE: Permission = Permission::from_static("parties.write");
pub const PURCHASING_READ: Permission = Permission::from_static("purchasing.read");
pub const PURCHASING_WRITE: Permission = Permission::from_static("purchasing.write");
pub const SALES_READ: Permission = Permission::from_static("sales.read");
pub const SALES_WRITE: Permission = Permission::from_static("sales.write");
pub const DEBTS_READ: Permission = Permission::from_static("debts.read");
pub const DEBTS_WRITE: Permission = Permission::from_static("debts.write");
pub const LEDGER_READ: Permission = Permission::from_static("ledger.read");
pub const LEDGER_WRITE: Permission = Permission::from_static("ledger.write");
pub const REPORTS_READ: Permission = Permission::from_static("reports.read");
/// Raw event audit trail. Only the wildcard grants it.
pub const EVENTS_READ: Permission = Permission::from_static("events.audit");

/// Every domain read permission.
pub const READS: [Permission; 8] = [
    CATALOG_READ,
    STORAGE_READ,
    PARTIES_READ,
    PURCHASING_READ,
    SALES_READ,
    DEBTS_READ,
    LEDGER_READ,
    REPORTS_READ,
];
