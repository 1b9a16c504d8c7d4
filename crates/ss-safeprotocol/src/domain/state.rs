//! # State Derivation
//!
//! The workflow state is never stored. It is recomputed from the signer row,
//! the audit trail and the consent registry, so every gateway instance sees
//! the same answer.

use super::audit::{AuditEvent, AuditEventType};
use super::consent::{ConsentCategory, REQUIRED_CONSENTS};
use super::entities::{Signer, VerificationState};
use std::collections::BTreeSet;

/// True when every required category has been accepted.
pub fn consent_given(consented: &BTreeSet<ConsentCategory>) -> bool {
    REQUIRED_CONSENTS.iter().all(|c| consented.contains(c))
}

/// Signing precondition: verified identity and full consent.
pub fn is_complete(identity_verified: bool, consented: &BTreeSet<ConsentCategory>) -> bool {
    identity_verified && consent_given(consented)
}

/// Derive the signer's position in the workflow.
///
/// `events` must be in chain order.
pub fn derive_state<'a>(
    signer: &Signer,
    events: impl IntoIterator<Item = &'a AuditEvent>,
    consented: &BTreeSet<ConsentCategory>,
) -> VerificationState {
    if signer.identity_verified() {
        return if consent_given(consented) {
            VerificationState::ConsentGiven
        } else if consented.is_empty() {
            VerificationState::IdentityVerified
        } else {
            VerificationState::ConsentPending
        };
    }

    let last_verification_event = events
        .into_iter()
        .filter(|e| {
            matches!(
                e.event_type,
                AuditEventType::IdentityVerificationInitiated
                    | AuditEventType::IdentityVerificationFailed
                    | AuditEventType::IdentityVerificationCancelled
            )
        })
        .last();

    match last_verification_event.map(|e| e.event_type) {
        Some(AuditEventType::IdentityVerificationInitiated) => {
            VerificationState::VerificationPending
        }
        Some(_) => VerificationState::VerificationFailed,
        None => VerificationState::Unverified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audit::AuditStatus;
    use crate::domain::entities::{RequestContext, VerifiedIdentity};
    use crate::domain::personal_number::hash_personal_number;
    use chrono::Utc;
    use std::net::{IpAddr, Ipv4Addr};
    use uuid::Uuid;

    fn signer(verified: bool) -> Signer {
        let mut s = Signer::new(Uuid::new_v4(), Uuid::new_v4(), "a@b.se", None);
        if verified {
            s.verified_identity = Some(VerifiedIdentity::bankid(
                "Anna",
                hash_personal_number("197603021234"),
                Utc::now(),
            ));
        }
        s
    }

    fn event(kind: AuditEventType) -> AuditEvent {
        let ctx = RequestContext::new(IpAddr::V4(Ipv4Addr::LOCALHOST));
        AuditEvent::new(Uuid::nil(), Uuid::nil(), kind, AuditStatus::Pending, &ctx, Utc::now())
    }

    #[test]
    fn test_complete_requires_both_categories() {
        let mut consented = BTreeSet::new();
        assert!(!is_complete(true, &consented));

        consented.insert(ConsentCategory::IdentitySignatureConsent);
        assert!(!is_complete(true, &consented));

        consented.insert(ConsentCategory::DataProcessingConsent);
        assert!(is_complete(true, &consented));
        assert!(!is_complete(false, &consented));
    }

    #[test]
    fn test_unverified_states() {
        let s = signer(false);
        let none = BTreeSet::new();
        assert_eq!(derive_state(&s, &[], &none), VerificationState::Unverified);

        let pending = vec![event(AuditEventType::IdentityVerificationInitiated)];
        assert_eq!(
            derive_state(&s, &pending, &none),
            VerificationState::VerificationPending
        );

        let failed = vec![
            event(AuditEventType::IdentityVerificationInitiated),
            event(AuditEventType::IdentityVerificationFailed),
        ];
        assert_eq!(
            derive_state(&s, &failed, &none),
            VerificationState::VerificationFailed
        );

        let retried = vec![
            event(AuditEventType::IdentityVerificationInitiated),
            event(AuditEventType::IdentityVerificationCancelled),
            event(AuditEventType::IdentityVerificationInitiated),
        ];
        assert_eq!(
            derive_state(&s, &retried, &none),
            VerificationState::VerificationPending
        );
    }

    #[test]
    fn test_verified_states() {
        let s = signer(true);
        let mut consented = BTreeSet::new();
        assert_eq!(
            derive_state(&s, &[], &consented),
            VerificationState::IdentityVerified
        );

        consented.insert(ConsentCategory::DataProcessingConsent);
        assert_eq!(
            derive_state(&s, &[], &consented),
            VerificationState::ConsentPending
        );

        consented.insert(ConsentCategory::IdentitySignatureConsent);
        assert_eq!(
            derive_state(&s, &[], &consented),
            VerificationState::ConsentGiven
        );
    }
}
