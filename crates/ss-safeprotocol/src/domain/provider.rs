//! # Identity Provider Types
//!
//! Request, response and error shapes of the external identity challenge
//! (BankID relying-party API v6.0), independent of the HTTP client.

use super::personal_number::PersonalNumber;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;

/// Start a new identity challenge.
#[derive(Clone, Debug)]
pub struct InitiateRequest {
    pub ip_address: IpAddr,
    /// Restricts the challenge to one person when present.
    pub personal_number: Option<PersonalNumber>,
    pub end_user_message: String,
}

/// Tokens issued by the provider for a new order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTokens {
    pub order_ref: String,
    pub auto_start_token: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectStatus {
    Pending,
    Failed,
    Complete,
}

/// Current state of an order.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectResponse {
    pub order_ref: String,
    pub status: CollectStatus,
    #[serde(default)]
    pub hint_code: Option<String>,
    #[serde(default)]
    pub completion_data: Option<CompletionData>,
}

impl CollectResponse {
    pub fn pending(order_ref: impl Into<String>, hint_code: Option<&str>) -> Self {
        Self {
            order_ref: order_ref.into(),
            status: CollectStatus::Pending,
            hint_code: hint_code.map(str::to_string),
            completion_data: None,
        }
    }

    pub fn failed(order_ref: impl Into<String>, hint_code: Option<&str>) -> Self {
        Self {
            order_ref: order_ref.into(),
            status: CollectStatus::Failed,
            hint_code: hint_code.map(str::to_string),
            completion_data: None,
        }
    }

    pub fn complete(order_ref: impl Into<String>, data: CompletionData) -> Self {
        Self {
            order_ref: order_ref.into(),
            status: CollectStatus::Complete,
            hint_code: None,
            completion_data: Some(data),
        }
    }
}

/// Payload of a completed order.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionData {
    pub user: CompletionUser,
    #[serde(default)]
    pub device: Option<CompletionDevice>,
    pub cert: CompletionCert,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub ocsp_response: Option<String>,
}

impl CompletionData {
    /// Both the signature and the OCSP response are present and decode as
    /// base64. Recorded as evidence only; chain validation is out of scope.
    pub fn has_ocsp_evidence(&self) -> bool {
        let engine = base64::engine::general_purpose::STANDARD;
        match (&self.signature, &self.ocsp_response) {
            (Some(sig), Some(ocsp)) if !sig.is_empty() && !ocsp.is_empty() => {
                engine.decode(sig).is_ok() && engine.decode(ocsp).is_ok()
            }
            _ => false,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionUser {
    pub personal_number: PersonalNumber,
    pub name: String,
    pub given_name: String,
    pub surname: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionDevice {
    pub ip_address: String,
    #[serde(default)]
    pub uhi: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionCert {
    pub not_before: String,
    pub not_after: String,
}

/// Provider error codes.
///
/// Accepts both the `UPPER_SNAKE` and the `lowerCamel` spelling on input.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    InvalidParameters,
    InvalidOrderRef,
    OrderRefNotFound,
    NotDelivered,
    RequestBlocked,
    AlreadyInProgress,
    GeneralError,
    UserCancel,
    Cancelled,
    StartFailed,
    /// Non-2xx response without a parseable error body
    Unknown,
    /// Transport failure while starting an order
    InitFailed,
    /// Transport failure while collecting an order
    PollFailed,
    Other(String),
}

impl ProviderErrorCode {
    pub fn from_code(code: &str) -> Self {
        match upper_snake(code).as_str() {
            "INVALID_PARAMETERS" => Self::InvalidParameters,
            "INVALID_ORDER_REF" => Self::InvalidOrderRef,
            "ORDER_REF_NOT_FOUND" => Self::OrderRefNotFound,
            "NOT_DELIVERED" => Self::NotDelivered,
            "REQUEST_BLOCKED" => Self::RequestBlocked,
            "ALREADY_IN_PROGRESS" => Self::AlreadyInProgress,
            "GENERAL_ERROR" => Self::GeneralError,
            "USER_CANCEL" => Self::UserCancel,
            "CANCELLED" => Self::Cancelled,
            "START_FAILED" => Self::StartFailed,
            "UNKNOWN_ERROR" => Self::Unknown,
            "INIT_FAILED" => Self::InitFailed,
            "POLL_FAILED" => Self::PollFailed,
            _ => Self::Other(code.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::InvalidParameters => "INVALID_PARAMETERS",
            Self::InvalidOrderRef => "INVALID_ORDER_REF",
            Self::OrderRefNotFound => "ORDER_REF_NOT_FOUND",
            Self::NotDelivered => "NOT_DELIVERED",
            Self::RequestBlocked => "REQUEST_BLOCKED",
            Self::AlreadyInProgress => "ALREADY_IN_PROGRESS",
            Self::GeneralError => "GENERAL_ERROR",
            Self::UserCancel => "USER_CANCEL",
            Self::Cancelled => "CANCELLED",
            Self::StartFailed => "START_FAILED",
            Self::Unknown => "UNKNOWN_ERROR",
            Self::InitFailed => "INIT_FAILED",
            Self::PollFailed => "POLL_FAILED",
            Self::Other(code) => code,
        }
    }

    /// Fixed user-facing message, if the code has one.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            Self::InvalidParameters => Some("Invalid authentication parameters"),
            Self::InvalidOrderRef => Some("Authentication request expired or invalid"),
            Self::OrderRefNotFound => Some("Authentication session not found"),
            Self::NotDelivered => Some("Request was not delivered to your device"),
            Self::RequestBlocked => Some("Authentication request was blocked by your device"),
            Self::AlreadyInProgress => Some("Authentication is already in progress"),
            Self::GeneralError => Some("BankID service error"),
            Self::UserCancel => Some("You cancelled the authentication"),
            Self::Cancelled => Some("Authentication was cancelled"),
            Self::StartFailed => Some("Failed to start BankID application"),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn upper_snake(code: &str) -> String {
    let mut out = String::with_capacity(code.len() + 4);
    let mut prev_lower = false;
    for c in code.chars() {
        if c.is_ascii_uppercase() && prev_lower {
            out.push('_');
        }
        prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        out.push(c.to_ascii_uppercase());
    }
    out
}

/// Normalized provider failure.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("identity provider error {code}: {details}")]
pub struct ProviderError {
    pub code: ProviderErrorCode,
    pub details: String,
    pub hint: Option<String>,
}

impl ProviderError {
    pub fn new(code: ProviderErrorCode, details: impl Into<String>) -> Self {
        Self {
            code,
            details: details.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: Option<String>) -> Self {
        self.hint = hint;
        self
    }

    pub fn user_message(&self) -> String {
        format_provider_error_message(self)
    }
}

/// Map a provider error to the message shown to the signer.
///
/// Known codes use a fixed message; otherwise the raw details, and
/// `"Authentication failed"` when those are empty.
pub fn format_provider_error_message(error: &ProviderError) -> String {
    if let Some(message) = error.code.user_message() {
        return message.to_string();
    }
    if error.details.trim().is_empty() {
        return "Authentication failed".to_string();
    }
    error.details.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes_have_fixed_messages() {
        let cases = [
            ("INVALID_PARAMETERS", "Invalid authentication parameters"),
            ("INVALID_ORDER_REF", "Authentication request expired or invalid"),
            ("ORDER_REF_NOT_FOUND", "Authentication session not found"),
            ("NOT_DELIVERED", "Request was not delivered to your device"),
            ("REQUEST_BLOCKED", "Authentication request was blocked by your device"),
            ("ALREADY_IN_PROGRESS", "Authentication is already in progress"),
            ("GENERAL_ERROR", "BankID service error"),
            ("USER_CANCEL", "You cancelled the authentication"),
            ("CANCELLED", "Authentication was cancelled"),
            ("START_FAILED", "Failed to start BankID application"),
        ];
        for (code, message) in cases {
            let err = ProviderError::new(ProviderErrorCode::from_code(code), "raw details");
            assert_eq!(format_provider_error_message(&err), message, "code {code}");
        }
    }

    #[test]
    fn test_camel_case_codes_are_recognised() {
        assert_eq!(
            ProviderErrorCode::from_code("alreadyInProgress"),
            ProviderErrorCode::AlreadyInProgress
        );
        assert_eq!(
            ProviderErrorCode::from_code("invalidParameters"),
            ProviderErrorCode::InvalidParameters
        );
        assert_eq!(
            ProviderErrorCode::from_code("userCancel"),
            ProviderErrorCode::UserCancel
        );
    }

    #[test]
    fn test_unknown_code_falls_back_to_details() {
        let err = ProviderError::new(ProviderErrorCode::from_code("maintenance"), "Down for maintenance");
        assert_eq!(err.code.as_str(), "maintenance");
        assert_eq!(format_provider_error_message(&err), "Down for maintenance");

        let empty = ProviderError::new(ProviderErrorCode::Other("X".into()), "");
        assert_eq!(format_provider_error_message(&empty), "Authentication failed");
    }

    #[test]
    fn test_collect_response_parses_completion() {
        let json = r#"{
            "orderRef": "131daac9-16c6-4618-beb0-365768f37288",
            "status": "complete",
            "completionData": {
                "user": {
                    "personalNumber": "197603021234",
                    "name": "Anna Svensson",
                    "givenName": "Anna",
                    "surname": "Svensson"
                },
                "device": { "ipAddress": "192.168.0.1", "uhi": "OZvYM9VvyiAmG7NA5jU5zC0B2gvG" },
                "cert": { "notBefore": "1502983274000", "notAfter": "1563549674000" },
                "signature": "c2lnbmF0dXJl",
                "ocspResponse": "b2NzcA=="
            }
        }"#;
        let response: CollectResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.status, CollectStatus::Complete);
        let data = response.completion_data.unwrap();
        assert_eq!(data.user.personal_number.expose(), "197603021234");
        assert_eq!(data.user.given_name, "Anna");
        assert!(data.has_ocsp_evidence());
        assert!(!format!("{:?}", data).contains("197603021234"));
    }

    #[test]
    fn test_collect_response_parses_pending() {
        let json = r#"{"orderRef":"abc","status":"pending","hintCode":"outstandingTransaction"}"#;
        let response: CollectResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.status, CollectStatus::Pending);
        assert_eq!(response.hint_code.as_deref(), Some("outstandingTransaction"));
        assert!(response.completion_data.is_none());
    }

    #[test]
    fn test_missing_ocsp_is_not_evidence() {
        let json = r#"{
            "user": {"personalNumber":"197603021234","name":"A B","givenName":"A","surname":"B"},
            "cert": {"notBefore":"1","notAfter":"2"},
            "signature": "not base64!!"
        }"#;
        let data: CompletionData = serde_json::from_str(json).unwrap();
        assert!(!data.has_ocsp_evidence());
    }
}
