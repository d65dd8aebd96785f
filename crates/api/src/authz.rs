//! Authorization guard for handlers.
//!
//! Checked before any command is dispatched or read model is served, so
//! domain aggregates and infra stay auth-agnostic.

use stockledger_auth::{AuthzError, Permission, authorize};

use crate::context::{PrincipalContext, TenantContext};

/// Fails unless the caller holds `permission` in the request's tenant.
pub fn require(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    permission: &Permission,
) -> Result<(), AuthzError> {
    if principal.principal().active_tenant_id != tenant.tenant_id() {
        return Err(AuthzError::TenantMismatch);
    }
    authorize(principal.principal(), permission)
}
