//! # Compliance Audit Events
//!
//! Append-only record of every SafeProtocol state transition.
//!
//! Stored events are chained per signer: each entry hashes the previous
//! entry's hash together with its own canonical JSON, starting from the
//! literal `"genesis"`. Any edit, deletion or reordering of a stored event
//! breaks the chain at that sequence.

use super::entities::{DocumentId, RequestContext, SignerId, Timestamp};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::net::IpAddr;
use tracing::warn;

/// `previous_hash` of the first entry in every chain.
pub const GENESIS_HASH: &str = "genesis";

/// Metadata key correlating an event with a provider order.
pub const ORDER_REF_KEY: &str = "orderRef";

/// Closed set of audited transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    IdentityVerificationInitiated,
    IdentityVerificationSuccess,
    IdentityVerificationFailed,
    IdentityVerificationCancelled,
    ConsentAccepted,
    SigningAuthorized,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IdentityVerificationInitiated => "identity_verification_initiated",
            Self::IdentityVerificationSuccess => "identity_verification_success",
            Self::IdentityVerificationFailed => "identity_verification_failed",
            Self::IdentityVerificationCancelled => "identity_verification_cancelled",
            Self::ConsentAccepted => "consent_accepted",
            Self::SigningAuthorized => "signing_authorized",
        }
    }

    /// Events that close a verification attempt.
    pub fn resolves_attempt(&self) -> bool {
        matches!(
            self,
            Self::IdentityVerificationSuccess
                | Self::IdentityVerificationFailed
                | Self::IdentityVerificationCancelled
        )
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Pending,
    Success,
    Failed,
}

/// An audit event before it is assigned a place in the chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub signer_id: SignerId,
    pub document_id: DocumentId,
    pub event_type: AuditEventType,
    pub status: AuditStatus,
    pub ip_address: IpAddr,
    pub user_agent: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
}

impl AuditEvent {
    pub fn new(
        signer_id: SignerId,
        document_id: DocumentId,
        event_type: AuditEventType,
        status: AuditStatus,
        context: &RequestContext,
        created_at: Timestamp,
    ) -> Self {
        Self {
            signer_id,
            document_id,
            event_type,
            status,
            ip_address: context.ip_address,
            user_agent: context.user_agent.clone(),
            metadata: None,
            error_code: None,
            error_message: None,
            created_at,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_error(mut self, code: Option<String>, message: impl Into<String>) -> Self {
        self.error_code = code;
        self.error_message = Some(message.into());
        self
    }

    /// Provider order reference carried in the metadata, if any.
    pub fn order_ref(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(ORDER_REF_KEY))
            .and_then(|v| v.as_str())
    }
}

/// An audit event with its position in the signer's chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredAuditEvent {
    pub sequence: u64,
    pub previous_hash: String,
    pub entry_hash: String,
    pub event: AuditEvent,
}

impl StoredAuditEvent {
    /// Chain an event after `previous_hash`.
    pub fn chain(
        event: AuditEvent,
        sequence: u64,
        previous_hash: String,
    ) -> Result<Self, serde_json::Error> {
        let entry_hash = compute_entry_hash(&event, sequence, &previous_hash)?;
        Ok(Self {
            sequence,
            previous_hash,
            entry_hash,
            event,
        })
    }

    /// False when the stored hash does not match, or the entry can no
    /// longer be encoded.
    pub fn verify_hash(&self) -> bool {
        matches!(
            compute_entry_hash(&self.event, self.sequence, &self.previous_hash),
            Ok(hash) if hash == self.entry_hash
        )
    }
}

#[derive(Serialize)]
struct CanonicalEntry<'a> {
    sequence: u64,
    previous_hash: &'a str,
    event: &'a AuditEvent,
}

/// SHA-256 over the canonical JSON of sequence, previous hash and event.
pub fn compute_entry_hash(
    event: &AuditEvent,
    sequence: u64,
    previous_hash: &str,
) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_vec(&CanonicalEntry {
        sequence,
        previous_hash,
        event,
    })?;

    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(hex::encode(hasher.finalize()))
}

/// Result of re-verifying a signer's chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub valid: bool,
    pub entries_verified: u64,
    pub first_tampered_sequence: Option<u64>,
    pub errors: Vec<String>,
}

/// Verify a chain given in sequence order.
///
/// Checks the genesis link, sequence continuity, back-links and each
/// entry's own hash.
pub fn verify_audit_chain(entries: &[StoredAuditEvent]) -> ChainVerification {
    let mut errors = Vec::new();
    let mut first_tampered: Option<u64> = None;
    let mut previous_hash = GENESIS_HASH.to_string();
    let mut entries_verified = 0u64;

    for (i, entry) in entries.iter().enumerate() {
        let mut entry_ok = true;

        if entry.sequence != i as u64 {
            errors.push(format!(
                "Sequence gap: expected {}, got {}",
                i, entry.sequence
            ));
            entry_ok = false;
        }

        if entry.previous_hash != previous_hash {
            errors.push(format!(
                "Broken link at sequence {}: previous_hash does not match",
                entry.sequence
            ));
            entry_ok = false;
        }

        if !entry.verify_hash() {
            errors.push(format!("Hash mismatch at sequence {}", entry.sequence));
            entry_ok = false;
        }

        if entry_ok {
            entries_verified += 1;
        } else if first_tampered.is_none() {
            first_tampered = Some(entry.sequence);
        }

        previous_hash = entry.entry_hash.clone();
    }

    if let Some(seq) = first_tampered {
        warn!(first_tampered_sequence = seq, "Audit chain verification failed");
    }

    ChainVerification {
        valid: errors.is_empty(),
        entries_verified,
        first_tampered_sequence: first_tampered,
        errors,
    }
}

/// Most recent pending `attempt_type` event created at or after `cutoff`
/// whose order reference has not been closed by a later success, failure or
/// cancellation.
///
/// `events` must be in chain order.
pub fn unresolved_attempt<'a>(
    events: impl IntoIterator<Item = &'a AuditEvent>,
    attempt_type: AuditEventType,
    cutoff: Timestamp,
) -> Option<String> {
    let events: Vec<&AuditEvent> = events.into_iter().collect();

    for (i, event) in events.iter().enumerate().rev() {
        if event.event_type != attempt_type || event.status != AuditStatus::Pending {
            continue;
        }
        if event.created_at < cutoff {
            // Older attempts are all outside the window.
            return None;
        }
        let Some(order_ref) = event.order_ref() else {
            continue;
        };
        let resolved = events[i + 1..].iter().any(|later| {
            later.event_type.resolves_attempt() && later.order_ref() == Some(order_ref)
        });
        if !resolved {
            return Some(order_ref.to_string());
        }
    }

    None
}
