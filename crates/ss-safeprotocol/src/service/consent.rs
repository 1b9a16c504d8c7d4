//! Consent recording, completion checks and signing authorization.

use super::SafeProtocolService;
use crate::domain::audit::{verify_audit_chain, AuditEvent, AuditEventType, AuditStatus};
use crate::domain::consent::ConsentCategory;
use crate::domain::entities::{RequestContext, SignerId, SignerStatus};
use crate::domain::errors::SafeProtocolError;
use crate::domain::state::{consent_given, derive_state, is_complete};
use crate::ports::inbound::AuditTrail;
use crate::ports::outbound::{
    AuditLogStore, ConsentStore, IdentityProviderGateway, SignerRepository, TimeSource,
};
use serde_json::json;
use std::collections::BTreeSet;
use tracing::{error, info, instrument, warn};

impl<P, S, T> SafeProtocolService<P, S, T>
where
    P: IdentityProviderGateway,
    S: SignerRepository + AuditLogStore + ConsentStore,
    T: TimeSource,
{
    #[instrument(skip(self, categories, context), fields(count = categories.len()))]
    pub(crate) async fn submit(
        &self,
        signer_id: SignerId,
        categories: &[ConsentCategory],
        context: RequestContext,
    ) -> Result<Vec<ConsentCategory>, SafeProtocolError> {
        // Collapse duplicates, keep first-seen order.
        let mut seen = BTreeSet::new();
        let categories: Vec<ConsentCategory> = categories
            .iter()
            .copied()
            .filter(|c| seen.insert(*c))
            .collect();
        if categories.is_empty() {
            return Err(SafeProtocolError::Validation(
                "at least one consent category is required".to_string(),
            ));
        }

        let signer = self.load_signer(signer_id).await?;
        if !signer.identity_verified() {
            warn!("Consent submitted before identity verification");
            return Err(SafeProtocolError::RequiresIdentityVerification);
        }

        // Re-submissions are recorded again, not deduplicated against
        // earlier acceptances.
        let now = self.time_source.now();
        self.store
            .record_consents(signer.id, signer.document_id, &categories, &context, now)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to record consent");
                SafeProtocolError::Persistence(e)
            })?;

        let event = AuditEvent::new(
            signer.id,
            signer.document_id,
            AuditEventType::ConsentAccepted,
            AuditStatus::Success,
            &context,
            now,
        )
        .with_metadata(json!({
            "consentCategories": categories,
            "deviceId": context.device_id,
        }));
        self.record_audit(event).await;

        info!(categories = ?categories, "Consent recorded");
        Ok(categories)
    }

    pub(crate) async fn status(&self, signer_id: SignerId) -> Result<SignerStatus, SafeProtocolError> {
        let signer = self.load_signer(signer_id).await?;
        let consented = self.store.consented_categories(signer_id).await?;
        let events = self.store.events_for_signer(signer_id).await?;

        let identity_verified = signer.identity_verified();
        Ok(SignerStatus {
            signer_id,
            state: derive_state(&signer, events.iter().map(|e| &e.event), &consented),
            identity_verified,
            consent_given: consent_given(&consented),
            complete: is_complete(identity_verified, &consented),
        })
    }

    #[instrument(skip(self, context))]
    pub(crate) async fn authorize(
        &self,
        signer_id: SignerId,
        context: RequestContext,
    ) -> Result<(), SafeProtocolError> {
        let signer = self.load_signer(signer_id).await?;
        let consented = self.store.consented_categories(signer_id).await?;
        let identity_verified = signer.identity_verified();

        if !is_complete(identity_verified, &consented) {
            warn!(
                identity_verified,
                consent_given = consent_given(&consented),
                "Signing refused"
            );
            return Err(SafeProtocolError::SafeProtocolIncomplete {
                identity_verified,
                consent_given: consent_given(&consented),
            });
        }

        let event = AuditEvent::new(
            signer.id,
            signer.document_id,
            AuditEventType::SigningAuthorized,
            AuditStatus::Success,
            &context,
            self.time_source.now(),
        );
        self.record_audit(event).await;
        Ok(())
    }

    pub(crate) async fn trail(&self, signer_id: SignerId) -> Result<AuditTrail, SafeProtocolError> {
        self.load_signer(signer_id).await?;
        let events = self.store.events_for_signer(signer_id).await?;
        let verification = verify_audit_chain(&events);
        Ok(AuditTrail {
            signer_id,
            events,
            verification,
        })
    }
}
