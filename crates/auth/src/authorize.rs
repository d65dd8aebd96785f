use thiserror::Error;

use stockledger_core::TenantId;

use crate::{JwtClaims, Permission, PrincipalId, TenantMembership};

/// A caller resolved from verified claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub active_tenant_id: TenantId,
    pub membership: TenantMembership,
}

impl Principal {
    pub fn from_claims(claims: &JwtClaims) -> Self {
        Self {
            principal_id: claims.sub,
            active_tenant_id: claims.tenant_id,
            membership: TenantMembership::from_roles(claims.tenant_id, claims.roles.clone()),
        }
    }

    pub fn permissions(&self) -> &[Permission] {
        &self.membership.permissions
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Pure policy check. No IO.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.active_tenant_id != principal.membership.tenant_id {
        return Err(AuthzError::TenantMismatch);
    }

    let granted = principal
        .permissions()
        .iter()
        .any(|p| p.is_wildcard() || p == required);
    if granted {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}
