use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::permissions::{self, Permission};

/// Role identifier carried in tokens.
///
/// Unknown roles are accepted and grant nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: Role = Role(Cow::Borrowed("admin"));
    pub const CLERK: Role = Role(Cow::Borrowed("clerk"));
    pub const ACCOUNTANT: Role = Role(Cow::Borrowed("accountant"));
    pub const VIEWER: Role = Role(Cow::Borrowed("viewer"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Permissions granted by this role.
    pub fn permissions(&self) -> Vec<Permission> {
        let writes = match self.as_str() {
            "admin" => return vec![permissions::ALL],
            "clerk" => vec![
                permissions::CATALOG_WRITE,
                permissions::STORAGE_WRITE,
                permissions::PARTIES_WRITE,
                permissions::SALES_WRITE,
                permissions::PURCHASING_WRITE,
            ],
            "accountant" => vec![permissions::LEDGER_WRITE, permissions::DEBTS_WRITE],
            "viewer" => Vec::new(),
            _ => return Vec::new(),
        };
        permissions::READS.into_iter().chain(writes).collect()
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Union of the permissions of every role, without duplicates.
pub fn permissions_for(roles: &[Role]) -> Vec<Permission> {
    let mut out: Vec<Permission> = Vec::new();
    for perm in roles.iter().flat_map(Role::permissions) {
        if !out.contains(&perm) {
            out.push(perm);
        }
    }
    out
}
