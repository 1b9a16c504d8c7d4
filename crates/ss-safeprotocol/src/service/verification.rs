//! Identity verification: start, poll, cancel.

use super::SafeProtocolService;
use crate::domain::audit::{AuditEvent, AuditEventType, AuditStatus};
use crate::domain::entities::{RequestContext, Signer, SignerId, VerifiedIdentity};
use crate::domain::errors::{SafeProtocolError, StoreError};
use crate::domain::personal_number::{validate_and_hash, PersonalNumber};
use crate::domain::provider::{
    format_provider_error_message, CollectStatus, CompletionData, InitiateRequest, OrderTokens,
};
use crate::ports::inbound::{VerificationOutcome, VerifiedSigner};
use crate::ports::outbound::{
    AuditLogStore, ConsentStore, IdentityProviderGateway, SignerRepository, TimeSource,
};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

const FAILED_MESSAGE: &str = "Authentication failed. Please try again.";

fn verified_signer(signer: &Signer, verified_name: &str) -> VerifiedSigner {
    VerifiedSigner {
        id: signer.id,
        verified_name: verified_name.to_string(),
        verified_email: signer.email.clone(),
    }
}

impl<P, S, T> SafeProtocolService<P, S, T>
where
    P: IdentityProviderGateway,
    S: SignerRepository + AuditLogStore + ConsentStore,
    T: TimeSource,
{
    #[instrument(skip(self, personal_number, context), fields(ip = %context.ip_address))]
    pub(crate) async fn start(
        &self,
        signer_id: SignerId,
        personal_number: Option<PersonalNumber>,
        context: RequestContext,
    ) -> Result<OrderTokens, SafeProtocolError> {
        let key = format!("verify-init:{}", context.ip_address);
        if !self.rate_limit.check_and_consume(&key) {
            warn!("Verification start rate limited");
            return Err(SafeProtocolError::RateLimited);
        }

        let signer = self.load_signer(signer_id).await?;
        if signer.identity_verified() {
            return Err(SafeProtocolError::AlreadyVerified { signer_id });
        }

        let cutoff = self.dedup_cutoff(self.time_source.now());
        if let Some(order_ref) = self
            .store
            .find_recent_pending_attempt(
                signer_id,
                AuditEventType::IdentityVerificationInitiated,
                cutoff,
            )
            .await?
        {
            info!(order_ref = %order_ref, "Verification already in progress");
            return Err(SafeProtocolError::AttemptInProgress { order_ref });
        }

        let request = InitiateRequest {
            ip_address: context.ip_address,
            personal_number,
            end_user_message: format!(
                "Please authenticate with BankID to sign \"{}\"",
                signer.prompt_label()
            ),
        };
        let tokens = self.provider.initiate(request).await.map_err(|e| {
            warn!(code = %e.code, details = %e.details, "Identity provider refused order");
            SafeProtocolError::provider(e)
        })?;

        if let Err(e) = self.store.bind_order(&tokens.order_ref, signer.id).await {
            warn!(order_ref = %tokens.order_ref, error = %e, "Failed to bind order; cancelling it");
            self.provider.cancel(&tokens.order_ref).await;
            return Err(e.into());
        }

        let event = AuditEvent::new(
            signer.id,
            signer.document_id,
            AuditEventType::IdentityVerificationInitiated,
            AuditStatus::Pending,
            &context,
            self.time_source.now(),
        )
        .with_metadata(json!({
            "orderRef": tokens.order_ref,
            "autoStartToken": tokens.auto_start_token,
        }));
        self.record_audit(event).await;

        info!(order_ref = %tokens.order_ref, "Identity verification initiated");
        Ok(tokens)
    }

    #[instrument(skip(self, context))]
    pub(crate) async fn check(
        &self,
        order_ref: &str,
        signer_id: SignerId,
        context: RequestContext,
    ) -> Result<VerificationOutcome, SafeProtocolError> {
        let signer = self.load_signer(signer_id).await?;

        if let Some(identity) = &signer.verified_identity {
            debug!("Signer already verified");
            return Ok(VerificationOutcome::Complete {
                signer: verified_signer(&signer, &identity.verified_name),
            });
        }
        self.ensure_order_issued(signer_id, order_ref).await?;

        let response = match self.provider.poll(order_ref).await {
            Ok(response) => response,
            Err(e) => {
                warn!(code = %e.code, "Identity provider poll failed");
                let event = self
                    .failure_event(&signer, order_ref, &context)
                    .with_error(Some(e.code.as_str().to_string()), e.details.clone());
                self.record_audit(event).await;
                return Ok(VerificationOutcome::Failed {
                    error: format_provider_error_message(&e),
                    error_code: Some(e.code.as_str().to_string()),
                });
            }
        };

        match (response.status, response.completion_data) {
            (CollectStatus::Pending, _) => Ok(VerificationOutcome::Pending {
                hint_code: response.hint_code,
            }),
            (CollectStatus::Complete, Some(data)) => {
                self.complete(signer, order_ref, data, &context).await
            }
            (status, _) => {
                let reason = response
                    .hint_code
                    .clone()
                    .unwrap_or_else(|| "Authentication failed".to_string());
                info!(status = ?status, reason = %reason, "Identity verification failed");
                let event = self
                    .failure_event(&signer, order_ref, &context)
                    .with_error(None, reason);
                self.record_audit(event).await;
                Ok(VerificationOutcome::Failed {
                    error: FAILED_MESSAGE.to_string(),
                    error_code: response.hint_code,
                })
            }
        }
    }

    async fn complete(
        &self,
        signer: Signer,
        order_ref: &str,
        data: CompletionData,
        context: &RequestContext,
    ) -> Result<VerificationOutcome, SafeProtocolError> {
        let hash = match validate_and_hash(data.user.personal_number.expose()) {
            Ok(hash) => hash,
            Err(e) => {
                warn!(reason = %e, "Identity provider returned invalid personal number");
                let event = self
                    .failure_event(&signer, order_ref, context)
                    .with_error(None, e.to_string());
                self.record_audit(event).await;
                return Err(SafeProtocolError::InvalidIdentity(e));
            }
        };

        let identity = VerifiedIdentity::bankid(&data.user.name, hash, self.time_source.now());
        let signer = match self.store.record_verified_identity(signer.id, identity).await {
            Ok(updated) => updated,
            Err(StoreError::AlreadyVerified { .. }) => {
                // A concurrent poll of the same order won the write.
                let current = self.load_signer(signer.id).await?;
                let name = current
                    .verified_identity
                    .as_ref()
                    .map_or(data.user.name.as_str(), |v| v.verified_name.as_str());
                return Ok(VerificationOutcome::Complete {
                    signer: verified_signer(&current, name),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let event = AuditEvent::new(
            signer.id,
            signer.document_id,
            AuditEventType::IdentityVerificationSuccess,
            AuditStatus::Success,
            context,
            self.time_source.now(),
        )
        .with_metadata(json!({
            "orderRef": order_ref,
            "verifiedName": data.user.name,
            "givenName": data.user.given_name,
            "surname": data.user.surname,
            "certNotBefore": data.cert.not_before,
            "certNotAfter": data.cert.not_after,
            "ocspEvidence": data.has_ocsp_evidence(),
        }));
        self.record_audit(event).await;

        info!(signer_id = %signer.id, "Identity verified");
        Ok(VerificationOutcome::Complete {
            signer: verified_signer(&signer, &data.user.name),
        })
    }

    #[instrument(skip(self, context))]
    pub(crate) async fn cancel(
        &self,
        order_ref: &str,
        signer_id: SignerId,
        context: RequestContext,
    ) -> Result<bool, SafeProtocolError> {
        let signer = self.load_signer(signer_id).await?;
        self.ensure_order_issued(signer_id, order_ref).await?;

        let acknowledged = self.provider.cancel(order_ref).await;
        if !acknowledged {
            debug!("Identity provider did not acknowledge cancel");
        }

        let event = AuditEvent::new(
            signer.id,
            signer.document_id,
            AuditEventType::IdentityVerificationCancelled,
            AuditStatus::Failed,
            &context,
            self.time_source.now(),
        )
        .with_metadata(json!({
            "orderRef": order_ref,
            "providerAcknowledged": acknowledged,
        }));
        self.record_audit(event).await;

        Ok(acknowledged)
    }

    /// The order must have been started for this signer.
    async fn ensure_order_issued(
        &self,
        signer_id: SignerId,
        order_ref: &str,
    ) -> Result<(), SafeProtocolError> {
        let owner = self.store.order_owner(order_ref).await?;
        if owner != Some(signer_id) {
            warn!(order_ref = %order_ref, "Order reference not issued to this signer");
            return Err(SafeProtocolError::UnknownOrder {
                order_ref: order_ref.to_string(),
            });
        }
        Ok(())
    }

    fn failure_event(&self, signer: &Signer, order_ref: &str, context: &RequestContext) -> AuditEvent {
        AuditEvent::new(
            signer.id,
            signer.document_id,
            AuditEventType::IdentityVerificationFailed,
            AuditStatus::Failed,
            context,
            self.time_source.now(),
        )
        .with_metadata(json!({ "orderRef": order_ref }))
    }
}
