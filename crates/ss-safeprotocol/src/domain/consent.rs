//! # Consent Categories and Templates
//!
//! The closed set of legally distinct acknowledgments a signer gives before
//! signing, with the Swedish legal text shown for each.
//!
//! Every stored [`ConsentRecord`] carries a snapshot of the text the signer
//! accepted, together with the template version, so later template edits
//! never rewrite history.

use super::entities::{DocumentId, RequestContext, SignerId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Version tag stored alongside every text snapshot.
pub const CONSENT_TEMPLATE_VERSION: &str = "2024-01";

/// Consent category.
///
/// The legacy names `eidas_advanced_signature` and `gdpr_data_processing`
/// are accepted as input aliases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentCategory {
    #[serde(alias = "eidas_advanced_signature")]
    IdentitySignatureConsent,
    #[serde(alias = "gdpr_data_processing")]
    DataProcessingConsent,
}

/// Every category must be accepted before signing.
pub const REQUIRED_CONSENTS: [ConsentCategory; 2] = [
    ConsentCategory::IdentitySignatureConsent,
    ConsentCategory::DataProcessingConsent,
];

const IDENTITY_SIGNATURE_TEXT: &str = "Du är på väg att skapa en juridiskt bindande elektronisk signatur enligt eIDAS-förordningen.
Denna signatur är lika gällande som en handskriven signatur och kan inte enkelt ändras senare.
Genom att klicka \"Acceptera\" bekräftar du att du är den person som identifierades via BankID
och att du är medveten om innebörden av att signera detta dokument.";

const DATA_PROCESSING_TEXT: &str = "Din identitet har verifierats genom BankID och ditt personliga identifieringsnummer
(personnummer) lagras i krypterad form för revisionsändamål enligt lagkrav.
Denna data behandlas enligt GDPR och lagras i högst 7 år för juridisk compliance.
Genom att klicka \"Acceptera\" samtycker du till denna databehandling.";

impl ConsentCategory {
    pub const ALL: [ConsentCategory; 2] = REQUIRED_CONSENTS;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IdentitySignatureConsent => "identity_signature_consent",
            Self::DataProcessingConsent => "data_processing_consent",
        }
    }

    pub fn template(&self) -> &'static str {
        match self {
            Self::IdentitySignatureConsent => IDENTITY_SIGNATURE_TEXT,
            Self::DataProcessingConsent => DATA_PROCESSING_TEXT,
        }
    }
}

impl fmt::Display for ConsentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown consent category name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown consent category: {0}")]
pub struct UnknownConsentCategory(pub String);

impl FromStr for ConsentCategory {
    type Err = UnknownConsentCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "identity_signature_consent" | "eidas_advanced_signature" => {
                Ok(Self::IdentitySignatureConsent)
            }
            "data_processing_consent" | "gdpr_data_processing" => Ok(Self::DataProcessingConsent),
            other => Err(UnknownConsentCategory(other.to_string())),
        }
    }
}

/// Legal text for one category.
pub fn consent_template(category: ConsentCategory) -> &'static str {
    category.template()
}

/// All templates keyed by category.
pub fn consent_templates() -> BTreeMap<ConsentCategory, &'static str> {
    ConsentCategory::ALL
        .iter()
        .map(|c| (*c, c.template()))
        .collect()
}

/// One accepted consent category. Append-only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub signer_id: SignerId,
    pub document_id: DocumentId,
    pub category: ConsentCategory,
    pub consent_text: String,
    pub template_version: String,
    pub accepted: bool,
    pub accepted_at: Timestamp,
    pub ip_address: IpAddr,
    pub user_agent: Option<String>,
    pub device_id: Option<String>,
}

impl ConsentRecord {
    /// Accepted record with the current template text snapshotted.
    pub fn accepted(
        signer_id: SignerId,
        document_id: DocumentId,
        category: ConsentCategory,
        context: &RequestContext,
        accepted_at: Timestamp,
    ) -> Self {
        Self {
            signer_id,
            document_id,
            category,
            consent_text: category.template().to_string(),
            template_version: CONSENT_TEMPLATE_VERSION.to_string(),
            accepted: true,
            accepted_at,
            ip_address: context.ip_address,
            user_agent: context.user_agent.clone(),
            device_id: context.device_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::net::Ipv4Addr;
    use uuid::Uuid;

    #[test]
    fn test_legacy_aliases_deserialize() {
        let c: ConsentCategory = serde_json::from_str("\"eidas_advanced_signature\"").unwrap();
        assert_eq!(c, ConsentCategory::IdentitySignatureConsent);
        let c: ConsentCategory = serde_json::from_str("\"gdpr_data_processing\"").unwrap();
        assert_eq!(c, ConsentCategory::DataProcessingConsent);
    }

    #[test]
    fn test_canonical_names_serialize() {
        let json = serde_json::to_string(&ConsentCategory::DataProcessingConsent).unwrap();
        assert_eq!(json, "\"data_processing_consent\"");
    }

    #[test]
    fn test_unknown_category_rejected() {
        assert!(serde_json::from_str::<ConsentCategory>("\"marketing\"").is_err());
        assert!("marketing".parse::<ConsentCategory>().is_err());
        assert_eq!(
            "gdpr_data_processing".parse::<ConsentCategory>().unwrap(),
            ConsentCategory::DataProcessingConsent
        );
    }

    #[test]
    fn test_templates_cover_every_category() {
        let templates = consent_templates();
        assert_eq!(templates.len(), REQUIRED_CONSENTS.len());
        assert!(templates[&ConsentCategory::IdentitySignatureConsent].contains("eIDAS"));
        assert!(templates[&ConsentCategory::DataProcessingConsent].contains("GDPR"));
    }

    #[test]
    fn test_record_snapshots_template_text() {
        let ctx = RequestContext::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)))
            .with_device_id("device-1");
        let record = ConsentRecord::accepted(
            Uuid::new_v4(),
            Uuid::new_v4(),
            ConsentCategory::IdentitySignatureConsent,
            &ctx,
            Utc::now(),
        );
        assert!(record.accepted);
        assert_eq!(
            record.consent_text,
            consent_template(ConsentCategory::IdentitySignatureConsent)
        );
        assert_eq!(record.template_version, CONSENT_TEMPLATE_VERSION);
        assert_eq!(record.device_id.as_deref(), Some("device-1"));
    }
}
