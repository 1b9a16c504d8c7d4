//! API error responses.
//!
//! Every failure leaves the gateway as `{ "error": <message>, ...fields }`
//! with a matching HTTP status. Provider payloads and store internals are
//! logged, never returned.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{Map, Value};
use ss_safeprotocol::SafeProtocolError;
use std::fmt;
use tracing::error;

/// Seconds a rate-limited client is told to wait.
pub const RATE_LIMIT_RETRY_AFTER_SECS: u64 = 60;

/// One offending request field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// HTTP error with a JSON body.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    /// Extra top-level body fields
    pub fields: Map<String, Value>,
    pub details: Vec<FieldError>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            fields: Map::new(),
            details: Vec::new(),
        }
    }

    /// Add a top-level body field.
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Request failed schema or field validation.
    pub fn invalid_request(details: Vec<FieldError>) -> Self {
        Self {
            details,
            ..Self::new(StatusCode::BAD_REQUEST, "Invalid request")
        }
    }

    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        Self::invalid_request(vec![FieldError::new(field, message)])
    }

    pub fn signer_not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Signer not found")
    }

    pub fn rate_limited() -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "För många förfrågningar. Försök igen senare.",
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Replace the message of a 500 with an endpoint-specific one.
    pub fn or_internal(mut self, message: &str) -> Self {
        if self.status == StatusCode::INTERNAL_SERVER_ERROR {
            self.message = message.to_string();
        }
        self
    }

    fn body(&self) -> Value {
        let mut body = Map::new();
        body.insert("error".to_string(), Value::String(self.message.clone()));
        for (key, value) in &self.fields {
            body.insert(key.clone(), value.clone());
        }
        if !self.details.is_empty() {
            body.insert(
                "details".to_string(),
                serde_json::to_value(&self.details).unwrap_or(Value::Null),
            );
        }
        Value::Object(body)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.status.as_u16(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let retry_after = self.status == StatusCode::TOO_MANY_REQUESTS
            && !self.fields.contains_key("orderRef");
        let mut response = (self.status, Json(self.body())).into_response();
        if retry_after {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(RATE_LIMIT_RETRY_AFTER_SECS),
            );
        }
        response
    }
}

impl From<SafeProtocolError> for ApiError {
    fn from(e: SafeProtocolError) -> Self {
        match e {
            SafeProtocolError::Validation(message) => Self::new(StatusCode::BAD_REQUEST, message),
            SafeProtocolError::NotFound { .. } => Self::signer_not_found(),
            SafeProtocolError::AlreadyVerified { .. } => {
                Self::new(StatusCode::BAD_REQUEST, "Signer identity already verified")
                    .with_field("alreadyVerified", true)
            }
            SafeProtocolError::AttemptInProgress { order_ref } => Self::new(
                StatusCode::TOO_MANY_REQUESTS,
                "Authentication already in progress",
            )
            .with_field("orderRef", order_ref),
            SafeProtocolError::UnknownOrder { .. } => {
                Self::new(StatusCode::NOT_FOUND, "Verification order not found")
            }
            SafeProtocolError::RequiresIdentityVerification => Self::new(
                StatusCode::FORBIDDEN,
                "Identity verification required before accepting consent",
            )
            .with_field("requiresIdentityVerification", true),
            SafeProtocolError::SafeProtocolIncomplete {
                identity_verified,
                consent_given,
            } => Self::new(
                StatusCode::FORBIDDEN,
                "Identity verification and consent are required before signing",
            )
            .with_field("identityVerified", identity_verified)
            .with_field("consentGiven", consent_given),
            SafeProtocolError::RateLimited => Self::rate_limited(),
            SafeProtocolError::Provider { message, source } => {
                Self::new(StatusCode::BAD_REQUEST, message)
                    .with_field("errorCode", source.code.as_str())
            }
            e @ SafeProtocolError::InvalidIdentity(_) => {
                Self::new(StatusCode::BAD_REQUEST, e.to_string())
            }
            SafeProtocolError::Persistence(source) => {
                error!(error = %source, "Compliance store failure");
                Self::internal("Internal server error")
            }
        }
    }
}

/// Result type for handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Gateway-level errors (not HTTP responses)
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),

    /// Server socket bind error
    #[error("server bind error: {0}")]
    Bind(#[source] std::io::Error),

    /// Server stopped with an I/O error
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use ss_safeprotocol::{ProviderError, ProviderErrorCode, StoreError};
    use uuid::Uuid;

    #[test]
    fn test_attempt_in_progress_carries_order_ref() {
        let err: ApiError = SafeProtocolError::AttemptInProgress {
            order_ref: "order-7".into(),
        }
        .into();
        assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.body()["orderRef"], "order-7");
        assert_eq!(err.body()["error"], "Authentication already in progress");
    }

    #[test]
    fn test_consent_precondition_is_forbidden() {
        let err: ApiError = SafeProtocolError::RequiresIdentityVerification.into();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert_eq!(err.body()["requiresIdentityVerification"], true);
    }

    #[test]
    fn test_unknown_order_is_not_found() {
        let err: ApiError = SafeProtocolError::UnknownOrder {
            order_ref: "order-9".into(),
        }
        .into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.body()["error"], "Verification order not found");
        assert!(err.body().get("orderRef").is_none());
    }

    #[test]
    fn test_already_verified_flag() {
        let err: ApiError = SafeProtocolError::AlreadyVerified {
            signer_id: Uuid::new_v4(),
        }
        .into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.body()["alreadyVerified"], true);
    }

    #[test]
    fn test_provider_error_uses_display_message() {
        let err: ApiError = SafeProtocolError::provider(ProviderError::new(
            ProviderErrorCode::RequestBlocked,
            "raw provider details",
        ))
        .into();
        let body = err.body();
        assert_eq!(body["error"], "Authentication request was blocked by your device");
        assert_eq!(body["errorCode"], "REQUEST_BLOCKED");
        assert!(!body.to_string().contains("raw provider details"));
    }

    #[test]
    fn test_persistence_is_sanitized() {
        let err: ApiError = SafeProtocolError::Persistence(StoreError::Database {
            message: "disk on fire".into(),
        })
        .into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.body().to_string().contains("disk on fire"));

        let err = err.or_internal("Failed to record consent");
        assert_eq!(err.body()["error"], "Failed to record consent");
    }

    #[test]
    fn test_validation_details() {
        let err = ApiError::invalid_field("signerId", "Invalid signer ID");
        let body = err.body();
        assert_eq!(body["error"], "Invalid request");
        assert_eq!(body["details"][0]["field"], "signerId");
        assert_eq!(body["details"][0]["message"], "Invalid signer ID");
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = ApiError::rate_limited().into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "60");
    }
}
