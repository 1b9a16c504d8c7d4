//! Request and response bodies for the SafeProtocol endpoints.
//!
//! Requests are parsed in two steps: `serde` enforces the shape (camelCase
//! keys, unknown keys rejected), then `validate()` checks field contents
//! and collects every problem before any side effect happens. Fields
//! default to empty so that a missing field is reported by name from
//! `validate()`.

use super::error::{ApiError, FieldError};
use serde::{Deserialize, Serialize};
use serde_json::error::Category;
use ss_safeprotocol::{
    ConsentCategory, PersonalNumber, SignerId, SignerStatus, VerificationState,
};
use tracing::debug;
use uuid::Uuid;

/// Parse a JSON body. Shape errors are reported against `body` with a
/// fixed message; the decoder's own text is only logged.
pub fn parse_body<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(bytes).map_err(|e| {
        debug!(error = %e, "Rejected request body");
        let message = match e.classify() {
            Category::Data => "Request body contains unknown or mistyped fields",
            Category::Syntax | Category::Eof | Category::Io => "Request body is not valid JSON",
        };
        ApiError::invalid_field("body", message)
    })
}

fn parse_signer_id(raw: &str, details: &mut Vec<FieldError>) -> Option<SignerId> {
    if raw.trim().is_empty() {
        details.push(FieldError::new("signerId", "Signer ID is required"));
        return None;
    }
    match Uuid::parse_str(raw.trim()) {
        Ok(id) => Some(id),
        Err(_) => {
            details.push(FieldError::new("signerId", "Invalid signer ID"));
            None
        }
    }
}

fn parse_order_ref(raw: &str, details: &mut Vec<FieldError>) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        details.push(FieldError::new("orderRef", "Order reference is required"));
        return None;
    }
    Some(trimmed.to_string())
}

fn finish<T>(value: Option<T>, details: Vec<FieldError>) -> Result<T, ApiError> {
    match value {
        Some(value) if details.is_empty() => Ok(value),
        _ => Err(ApiError::invalid_request(details)),
    }
}

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct InitVerificationRequest {
    pub signer_id: String,
    pub personal_number: Option<String>,
}

impl InitVerificationRequest {
    pub fn validate(self) -> Result<(SignerId, Option<PersonalNumber>), ApiError> {
        let mut details = Vec::new();
        let signer_id = parse_signer_id(&self.signer_id, &mut details);

        let personal_number = match self.personal_number.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => {
                let digits = raw.chars().filter(char::is_ascii_digit).count();
                if digits != 10 && digits != 12 {
                    details.push(FieldError::new(
                        "personalNumber",
                        "Invalid Swedish personal number format",
                    ));
                }
                Some(PersonalNumber::new(raw))
            }
        };

        finish(signer_id.map(|id| (id, personal_number)), details)
    }
}

/// Body shared by collect and cancel.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct OrderRequest {
    pub order_ref: String,
    pub signer_id: String,
}

impl OrderRequest {
    pub fn validate(self) -> Result<(String, SignerId), ApiError> {
        let mut details = Vec::new();
        let order_ref = parse_order_ref(&self.order_ref, &mut details);
        let signer_id = parse_signer_id(&self.signer_id, &mut details);
        finish(order_ref.zip(signer_id), details)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ConsentSubmitRequest {
    pub signer_id: String,
    #[serde(alias = "consentTypes")]
    pub consent_categories: Vec<String>,
    pub device_id: Option<String>,
}

/// Validated consent submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentSubmission {
    pub signer_id: SignerId,
    pub categories: Vec<ConsentCategory>,
    pub device_id: Option<String>,
}

impl ConsentSubmitRequest {
    pub fn validate(self) -> Result<ConsentSubmission, ApiError> {
        let mut details = Vec::new();
        let signer_id = parse_signer_id(&self.signer_id, &mut details);

        if self.consent_categories.is_empty() {
            details.push(FieldError::new(
                "consentCategories",
                "At least one consent category is required",
            ));
        }
        let mut categories = Vec::with_capacity(self.consent_categories.len());
        for raw in &self.consent_categories {
            match raw.parse::<ConsentCategory>() {
                Ok(category) => categories.push(category),
                Err(_) => details.push(FieldError::new(
                    "consentCategories",
                    format!("Invalid consent category: {raw}"),
                )),
            }
        }

        let device_id = self
            .device_id
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        finish(
            signer_id.map(|signer_id| ConsentSubmission {
                signer_id,
                categories,
                device_id,
            }),
            details,
        )
    }
}

/// Query string of the templates endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemplatesQuery {
    #[serde(alias = "type")]
    pub category: Option<String>,
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitVerificationResponse {
    pub success: bool,
    pub order_ref: String,
    pub auto_start_token: String,
    pub signer_id: SignerId,
    pub message: &'static str,
}

/// Body of a collect response; failures are sent with status 400.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CollectResponse {
    #[serde(rename_all = "camelCase")]
    Pending {
        #[serde(skip_serializing_if = "Option::is_none")]
        hint_code: Option<String>,
        message: &'static str,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_code: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Complete {
        verified: bool,
        signer: VerifiedSignerBody,
        message: &'static str,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedSignerBody {
    pub id: SignerId,
    pub verified_name: String,
    pub verified_email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub success: bool,
    pub cancelled: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentSubmitResponse {
    pub success: bool,
    pub message: &'static str,
    pub signer_id: SignerId,
    pub consented_categories: Vec<ConsentCategory>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerStatusResponse {
    pub signer_id: SignerId,
    pub state: VerificationState,
    pub identity_verified: bool,
    pub consent_given: bool,
    pub complete: bool,
}

impl From<SignerStatus> for SignerStatusResponse {
    fn from(status: SignerStatus) -> Self {
        Self {
            signer_id: status.signer_id,
            state: status.state,
            identity_verified: status.identity_verified,
            consent_given: status.consent_given,
            complete: status.complete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_field_is_a_body_error() {
        let err = parse_body::<OrderRequest>(
            br#"{"orderRef":"a","signerId":"b","extra":1}"#,
        )
        .unwrap_err();
        assert_eq!(
            err.details,
            vec![FieldError::new(
                "body",
                "Request body contains unknown or mistyped fields"
            )]
        );
    }

    #[test]
    fn test_mistyped_field_hides_decoder_text() {
        let err = parse_body::<OrderRequest>(br#"{"orderRef":7,"signerId":"b"}"#).unwrap_err();
        assert_eq!(err.details[0].field, "body");
        assert!(!err.details[0].message.contains("integer"));
    }

    #[test]
    fn test_missing_field_is_reported_by_name() {
        let request = parse_body::<OrderRequest>(br#"{"orderRef":"a"}"#).unwrap();
        let err = request.validate().unwrap_err();
        assert_eq!(
            err.details,
            vec![FieldError::new("signerId", "Signer ID is required")]
        );
    }

    #[test]
    fn test_malformed_json() {
        let err = parse_body::<OrderRequest>(b"{not json").unwrap_err();
        assert_eq!(
            err.details,
            vec![FieldError::new("body", "Request body is not valid JSON")]
        );

        let err = parse_body::<OrderRequest>(b"").unwrap_err();
        assert_eq!(err.details[0].message, "Request body is not valid JSON");
    }

    #[test]
    fn test_order_request_collects_all_problems() {
        let err = OrderRequest {
            order_ref: "  ".into(),
            signer_id: "nope".into(),
        }
        .validate()
        .unwrap_err();
        let fields: Vec<_> = err.details.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["orderRef", "signerId"]);
    }

    #[test]
    fn test_init_accepts_absent_personal_number() {
        let id = Uuid::new_v4();
        let (signer_id, pnr) = InitVerificationRequest {
            signer_id: id.to_string(),
            personal_number: None,
        }
        .validate()
        .unwrap();
        assert_eq!(signer_id, id);
        assert!(pnr.is_none());
    }

    #[test]
    fn test_init_rejects_short_personal_number() {
        let err = InitVerificationRequest {
            signer_id: Uuid::new_v4().to_string(),
            personal_number: Some("12345".into()),
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.details[0].field, "personalNumber");
    }

    #[test]
    fn test_consent_accepts_legacy_names() {
        let request: ConsentSubmitRequest = parse_body(
            format!(
                r#"{{"signerId":"{}","consentTypes":["eidas_advanced_signature","gdpr_data_processing"]}}"#,
                Uuid::new_v4()
            )
            .as_bytes(),
        )
        .unwrap();
        let submission = request.validate().unwrap();
        assert_eq!(
            submission.categories,
            vec![
                ConsentCategory::IdentitySignatureConsent,
                ConsentCategory::DataProcessingConsent
            ]
        );
    }

    #[test]
    fn test_consent_rejects_unknown_category() {
        let err = ConsentSubmitRequest {
            signer_id: Uuid::new_v4().to_string(),
            consent_categories: vec!["marketing".into()],
            device_id: None,
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.details[0].field, "consentCategories");
    }

    #[test]
    fn test_consent_rejects_empty_list() {
        let err = ConsentSubmitRequest {
            signer_id: Uuid::new_v4().to_string(),
            consent_categories: vec![],
            device_id: None,
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.details.len(), 1);
    }
}
