use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockledger_core::TenantId;

use crate::{PrincipalId, Role};

/// Claims carried by an access token.
///
/// `iat` and `exp` are Unix timestamps in seconds, as registered JWT claims are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: PrincipalId,
    pub tenant_id: TenantId,
    pub roles: Vec<Role>,
    pub iat: i64,
    pub exp: i64,
}

impl JwtClaims {
    pub fn new(sub: PrincipalId, tenant_id: TenantId, roles: Vec<Role>, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            sub,
            tenant_id,
            roles,
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,
}

/// Check the time window of already-decoded claims.
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    let now = now.timestamp();
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn claims(issued_at: DateTime<Utc>, ttl_secs: i64) -> JwtClaims {
        JwtClaims::new(PrincipalId::new(), TenantId::new(), vec![Role::VIEWER], issued_at, Duration::seconds(ttl_secs))
    }

    #[test]
    fn rejects_future_and_expired_tokens() {
        let now = Utc::now();
        assert_eq!(
            validate_claims(&claims(now + Duration::minutes(5), 600), now),
            Err(TokenValidationError::NotYetValid)
        );
        assert_eq!(
            validate_claims(&claims(now - Duration::minutes(20), 600), now),
            Err(TokenValidationError::Expired)
        );
        assert_eq!(validate_claims(&claims(now, 0), now), Err(TokenValidationError::InvalidTimeWindow));
    }

    proptest! {
        #[test]
        fn valid_anywhere_inside_the_window(ttl in 1i64..86_400, offset in 0i64..86_400) {
            let issued_at = Utc::now() - Duration::seconds(offset.min(ttl - 1));
            let c = claims(issued_at, ttl);
            let now = DateTime::<Utc>::from_timestamp(c.iat + offset.min(ttl - 1), 0).unwrap();
            prop_assert!(validate_claims(&c, now).is_ok());
        }
    }
}
