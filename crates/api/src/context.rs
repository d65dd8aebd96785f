use stockledger_auth::{Principal, PrincipalId, Role};
use stockledger_core::TenantId;

/// Tenant context for a request.
///
/// Taken from the verified token; immutable for the lifetime of the request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Authenticated caller with its roles and resolved permissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
    roles: Vec<Role>,
}

impl PrincipalContext {
    pub fn new(principal: Principal, roles: Vec<Role>) -> Self {
        Self { principal, roles }
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal.principal_id
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }
}
