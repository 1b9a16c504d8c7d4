//! # SafeProtocol Service
//!
//! The orchestrator implementing `SafeProtocolApi`.
//!
//! ## Architecture
//!
//! This service:
//! 1. Sequences identity verification, consent and signing authorization
//! 2. Holds no per-signer state; everything is re-read from the store ports
//! 3. Treats signer and consent writes as primary (failures surface) and
//!    audit writes as secondary (failures are logged and swallowed)
//! 4. Uses dependency injection for all external dependencies

mod consent;
pub mod poller;
mod verification;

use crate::domain::audit::AuditEvent;
use crate::domain::consent::ConsentCategory;
use crate::domain::entities::{
    RequestContext, Signer, SignerId, SignerStatus, Timestamp, VerificationState,
};
use crate::domain::errors::SafeProtocolError;
use crate::domain::personal_number::PersonalNumber;
use crate::domain::provider::OrderTokens;
use crate::ports::inbound::{AuditTrail, SafeProtocolApi, VerificationOutcome};
use crate::ports::outbound::{
    AuditLogStore, ConsentStore, IdentityProviderGateway, RateLimitGate, SignerRepository,
    TimeSource,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::error;

/// Orchestrator configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafeProtocolConfig {
    /// Span during which a second initiation is rejected in favour of the
    /// existing attempt.
    #[serde(with = "humantime_serde")]
    pub dedup_window: Duration,
}

impl Default for SafeProtocolConfig {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SafeProtocolConfigError {
    #[error("dedup_window must be greater than zero")]
    ZeroDedupWindow,
}

impl SafeProtocolConfig {
    pub fn validate(&self) -> Result<(), SafeProtocolConfigError> {
        if self.dedup_window.is_zero() {
            return Err(SafeProtocolConfigError::ZeroDedupWindow);
        }
        Ok(())
    }
}

/// Dependencies for SafeProtocolService
pub struct SafeProtocolDependencies<P, S, T> {
    pub provider: P,
    pub store: S,
    pub time_source: T,
    pub rate_limit: Arc<dyn RateLimitGate>,
}

/// The SafeProtocol orchestrator.
///
/// `S` provides all three compliance repositories so that one backend
/// serves signers, audit events and consents.
pub struct SafeProtocolService<P, S, T>
where
    P: IdentityProviderGateway,
    S: SignerRepository + AuditLogStore + ConsentStore,
    T: TimeSource,
{
    pub(crate) provider: P,
    pub(crate) store: S,
    pub(crate) time_source: T,
    pub(crate) rate_limit: Arc<dyn RateLimitGate>,
    pub(crate) config: SafeProtocolConfig,
}

impl<P, S, T> SafeProtocolService<P, S, T>
where
    P: IdentityProviderGateway,
    S: SignerRepository + AuditLogStore + ConsentStore,
    T: TimeSource,
{
    pub fn new(deps: SafeProtocolDependencies<P, S, T>, config: SafeProtocolConfig) -> Self {
        Self {
            provider: deps.provider,
            store: deps.store,
            time_source: deps.time_source,
            rate_limit: deps.rate_limit,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn time_source(&self) -> &T {
        &self.time_source
    }

    pub fn config(&self) -> &SafeProtocolConfig {
        &self.config
    }

    pub(crate) async fn load_signer(&self, signer_id: SignerId) -> Result<Signer, SafeProtocolError> {
        self.store
            .find_signer(signer_id)
            .await?
            .ok_or(SafeProtocolError::NotFound { signer_id })
    }

    /// Append to the audit log. Failures are logged, never returned.
    pub(crate) async fn record_audit(&self, event: AuditEvent) {
        let signer_id = event.signer_id;
        let event_type = event.event_type;
        if let Err(e) = self.store.append(event).await {
            error!(
                signer_id = %signer_id,
                event_type = %event_type,
                error = %e,
                "Failed to write compliance audit event"
            );
        }
    }

    /// Earliest creation time of an attempt that still blocks a new one.
    pub(crate) fn dedup_cutoff(&self, now: Timestamp) -> Timestamp {
        chrono::Duration::from_std(self.config.dedup_window)
            .ok()
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[async_trait]
impl<P, S, T> SafeProtocolApi for SafeProtocolService<P, S, T>
where
    P: IdentityProviderGateway,
    S: SignerRepository + AuditLogStore + ConsentStore,
    T: TimeSource,
{
    async fn start_verification(
        &self,
        signer_id: SignerId,
        personal_number: Option<PersonalNumber>,
        context: RequestContext,
    ) -> Result<OrderTokens, SafeProtocolError> {
        self.start(signer_id, personal_number, context).await
    }

    async fn check_verification(
        &self,
        order_ref: &str,
        signer_id: SignerId,
        context: RequestContext,
    ) -> Result<VerificationOutcome, SafeProtocolError> {
        self.check(order_ref, signer_id, context).await
    }

    async fn cancel_verification(
        &self,
        order_ref: &str,
        signer_id: SignerId,
        context: RequestContext,
    ) -> Result<bool, SafeProtocolError> {
        self.cancel(order_ref, signer_id, context).await
    }

    async fn submit_consent(
        &self,
        signer_id: SignerId,
        categories: &[ConsentCategory],
        context: RequestContext,
    ) -> Result<Vec<ConsentCategory>, SafeProtocolError> {
        self.submit(signer_id, categories, context).await
    }

    async fn is_complete(&self, signer_id: SignerId) -> Result<bool, SafeProtocolError> {
        Ok(self.status(signer_id).await?.complete)
    }

    async fn verification_state(
        &self,
        signer_id: SignerId,
    ) -> Result<VerificationState, SafeProtocolError> {
        Ok(self.status(signer_id).await?.state)
    }

    async fn signer_status(&self, signer_id: SignerId) -> Result<SignerStatus, SafeProtocolError> {
        self.status(signer_id).await
    }

    async fn authorize_signing(
        &self,
        signer_id: SignerId,
        context: RequestContext,
    ) -> Result<(), SafeProtocolError> {
        self.authorize(signer_id, context).await
    }

    async fn audit_trail(&self, signer_id: SignerId) -> Result<AuditTrail, SafeProtocolError> {
        self.trail(signer_id).await
    }
}
