//! # Inbound Ports (Driving Ports)
//!
//! The primary API for the SafeProtocol subsystem, consumed by the HTTP
//! gateway and by the signing endpoint.

use crate::domain::audit::{ChainVerification, StoredAuditEvent};
use crate::domain::consent::ConsentCategory;
use crate::domain::entities::{RequestContext, SignerId, SignerStatus, VerificationState};
use crate::domain::errors::SafeProtocolError;
use crate::domain::personal_number::PersonalNumber;
use crate::domain::provider::OrderTokens;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of one poll against the identity provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum VerificationOutcome {
    Pending {
        hint_code: Option<String>,
    },
    Failed {
        error: String,
        error_code: Option<String>,
    },
    Complete {
        signer: VerifiedSigner,
    },
}

impl VerificationOutcome {
    /// Failed or complete.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending { .. })
    }
}

/// Signer summary returned on successful verification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedSigner {
    pub id: SignerId,
    pub verified_name: String,
    pub verified_email: String,
}

/// A signer's full audit chain with its verification result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditTrail {
    pub signer_id: SignerId,
    pub events: Vec<StoredAuditEvent>,
    pub verification: ChainVerification,
}

/// Primary API for the SafeProtocol subsystem.
///
/// Implementations enforce the workflow ordering: no consent without a
/// verified identity, no signing without both.
#[async_trait]
pub trait SafeProtocolApi: Send + Sync {
    /// Start an identity challenge for a signer.
    ///
    /// ## Errors
    ///
    /// - `RateLimited`: the caller's IP exhausted its budget
    /// - `NotFound`: unknown signer
    /// - `AlreadyVerified`: identity already on record
    /// - `AttemptInProgress`: an unresolved attempt exists inside the window
    /// - `Provider`: the identity provider refused the order
    /// - `Persistence`: the order could not be bound to the signer; the
    ///   provider order is cancelled
    async fn start_verification(
        &self,
        signer_id: SignerId,
        personal_number: Option<PersonalNumber>,
        context: RequestContext,
    ) -> Result<OrderTokens, SafeProtocolError>;

    /// Poll an order and apply its outcome.
    ///
    /// ## Errors
    ///
    /// - `NotFound`: unknown signer
    /// - `UnknownOrder`: the order was not started for this signer
    /// - `InvalidIdentity`: the completed order carried a bad personal number
    async fn check_verification(
        &self,
        order_ref: &str,
        signer_id: SignerId,
        context: RequestContext,
    ) -> Result<VerificationOutcome, SafeProtocolError>;

    /// Cancel an order; returns whether the provider acknowledged.
    ///
    /// Fails with `UnknownOrder` when the order belongs to someone else.
    async fn cancel_verification(
        &self,
        order_ref: &str,
        signer_id: SignerId,
        context: RequestContext,
    ) -> Result<bool, SafeProtocolError>;

    /// Record consent for a verified signer.
    ///
    /// The registry is append-only: submitting an already accepted category
    /// again adds a new record and audit event with the current text, and
    /// completion is unaffected.
    ///
    /// ## Errors
    ///
    /// - `Validation`: empty category list
    /// - `NotFound`: unknown signer
    /// - `RequiresIdentityVerification`: identity not yet verified
    /// - `Persistence`: the consent batch was not written
    async fn submit_consent(
        &self,
        signer_id: SignerId,
        categories: &[ConsentCategory],
        context: RequestContext,
    ) -> Result<Vec<ConsentCategory>, SafeProtocolError>;

    /// Verified identity and every required consent on record.
    async fn is_complete(&self, signer_id: SignerId) -> Result<bool, SafeProtocolError>;

    async fn verification_state(
        &self,
        signer_id: SignerId,
    ) -> Result<VerificationState, SafeProtocolError>;

    async fn signer_status(&self, signer_id: SignerId) -> Result<SignerStatus, SafeProtocolError>;

    /// Gate for the signing endpoint. Fails with `SafeProtocolIncomplete`
    /// unless `is_complete`.
    async fn authorize_signing(
        &self,
        signer_id: SignerId,
        context: RequestContext,
    ) -> Result<(), SafeProtocolError>;

    async fn audit_trail(&self, signer_id: SignerId) -> Result<AuditTrail, SafeProtocolError>;
}
