//! # Core Domain Entities
//!
//! Signers, verified identities and the request context every operation
//! carries for the audit trail.

use super::personal_number::HashedPersonalNumber;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use uuid::Uuid;

/// Signer identifier.
pub type SignerId = Uuid;

/// Document identifier.
pub type DocumentId = Uuid;

/// Wall-clock timestamp (UTC).
pub type Timestamp = DateTime<Utc>;

/// Identity provider recorded on a verified signer.
pub const IDENTITY_PROVIDER_BANKID: &str = "bankid";

/// Verification method recorded on a verified signer.
pub const VERIFICATION_METHOD_BANKID_CHALLENGE: &str = "bankid_challenge";

/// A party invited to sign a document.
///
/// All verification fields live in [`VerifiedIdentity`], so a hash without a
/// verified flag (or the reverse) cannot be represented.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    pub id: SignerId,
    pub document_id: DocumentId,
    pub email: String,
    pub name: Option<String>,
    #[serde(default)]
    pub verified_identity: Option<VerifiedIdentity>,
}

impl Signer {
    pub fn new(
        id: SignerId,
        document_id: DocumentId,
        email: impl Into<String>,
        name: Option<String>,
    ) -> Self {
        Self {
            id,
            document_id,
            email: email.into(),
            name,
            verified_identity: None,
        }
    }

    pub fn identity_verified(&self) -> bool {
        self.verified_identity.is_some()
    }

    pub fn personal_identifier_hash(&self) -> Option<&HashedPersonalNumber> {
        self.verified_identity
            .as_ref()
            .map(|v| &v.personal_identifier_hash)
    }

    /// Label used in the identity provider prompt.
    pub fn prompt_label(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => "the document",
        }
    }
}

/// Outcome of a successful identity challenge, written once per signer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedIdentity {
    pub verified_name: String,
    pub identity_provider: String,
    pub verification_method: String,
    pub personal_identifier_hash: HashedPersonalNumber,
    pub verified_at: Timestamp,
}

impl VerifiedIdentity {
    /// Identity verified through a BankID challenge.
    pub fn bankid(
        verified_name: impl Into<String>,
        personal_identifier_hash: HashedPersonalNumber,
        verified_at: Timestamp,
    ) -> Self {
        Self {
            verified_name: verified_name.into(),
            identity_provider: IDENTITY_PROVIDER_BANKID.to_string(),
            verification_method: VERIFICATION_METHOD_BANKID_CHALLENGE.to_string(),
            personal_identifier_hash,
            verified_at,
        }
    }
}

/// Caller metadata attached to every audit and consent row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub ip_address: IpAddr,
    pub user_agent: Option<String>,
    pub device_id: Option<String>,
}

impl RequestContext {
    pub fn new(ip_address: IpAddr) -> Self {
        Self {
            ip_address,
            user_agent: None,
            device_id: None,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }
}

/// Position of a signer in the SafeProtocol workflow.
///
/// Derived from persisted state; never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationState {
    Unverified,
    VerificationPending,
    VerificationFailed,
    IdentityVerified,
    ConsentPending,
    ConsentGiven,
}

impl VerificationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unverified => "unverified",
            Self::VerificationPending => "verification_pending",
            Self::VerificationFailed => "verification_failed",
            Self::IdentityVerified => "identity_verified",
            Self::ConsentPending => "consent_pending",
            Self::ConsentGiven => "consent_given",
        }
    }
}

impl fmt::Display for VerificationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a signer's progress, served to the status endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerStatus {
    pub signer_id: SignerId,
    pub state: VerificationState,
    pub identity_verified: bool,
    pub consent_given: bool,
    pub complete: bool,
}
