use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use stockledger_auth::AuthzError;
use stockledger_core::DomainError;
use stockledger_import::ImportError;
use stockledger_infra::command_dispatcher::DispatchError;
use stockledger_infra::event_store::EventStoreError;

/// Error returned by every handler, rendered as
/// `{"error": {"code": ..., "message": ...}}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", format!("{} not found", what.into()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({
                "error": {
                    "code": self.code,
                    "message": self.message,
                }
            })),
        )
            .into_response()
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        let status = match &err {
            DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
            DispatchError::Unauthorized | DispatchError::TenantIsolation(_) => StatusCode::FORBIDDEN,
            DispatchError::NotFound(_) => StatusCode::NOT_FOUND,
            DispatchError::Concurrency(_) | DispatchError::Conflict(_) => StatusCode::CONFLICT,
            DispatchError::InvariantViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DispatchError::Deserialize(_) | DispatchError::Store(_) | DispatchError::Publish(_) => {
                tracing::error!(error = %err, "command failed in the storage layer");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.code(), err.to_string())
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        DispatchError::from(err).into()
    }
}

impl From<EventStoreError> for ApiError {
    fn from(err: EventStoreError) -> Self {
        DispatchError::from(err).into()
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", err.to_string())
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "import_error", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_errors_map_to_documented_statuses() {
        let cases = [
            (DispatchError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (DispatchError::NotFound("sale".into()), StatusCode::NOT_FOUND),
            (DispatchError::Concurrency("x".into()), StatusCode::CONFLICT),
            (DispatchError::Conflict("x".into()), StatusCode::CONFLICT),
            (DispatchError::InvariantViolation("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (
                DispatchError::Store(EventStoreError::Backend("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn forbidden_keeps_the_missing_permission_in_the_message() {
        let err = ApiError::from(AuthzError::Forbidden("sales.write".into()));
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert!(err.message.contains("sales.write"));
    }
}
