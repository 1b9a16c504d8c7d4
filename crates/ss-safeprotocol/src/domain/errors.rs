//! # Domain Errors
//!
//! Error types for the SafeProtocol subsystem.
//!
//! Storage failures are [`StoreError`]; everything the orchestrator can
//! report to a caller is a [`SafeProtocolError`].

use super::entities::SignerId;
use super::personal_number::PersonalNumberError;
use super::provider::ProviderError;
use thiserror::Error;

/// Raw key-value backend errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KVStoreError {
    #[error("KV store I/O error: {message}")]
    IOError { message: String },

    #[error("KV store corruption: {message}")]
    CorruptionError { message: String },
}

impl From<KVStoreError> for StoreError {
    fn from(err: KVStoreError) -> Self {
        StoreError::Database {
            message: err.to_string(),
        }
    }
}

/// Errors raised by the persistence ports.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Signer does not exist.
    #[error("signer not found: {signer_id}")]
    SignerNotFound { signer_id: SignerId },

    /// Verified identity is write-once.
    #[error("signer {signer_id} is already verified")]
    AlreadyVerified { signer_id: SignerId },

    /// Backend I/O failure.
    #[error("database error: {message}")]
    Database { message: String },

    /// Stored row could not be (de)serialized.
    #[error("serialization error: {message}")]
    Serialization { message: String },
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}

/// Errors reported by SafeProtocol operations.
#[derive(Debug, Error)]
pub enum SafeProtocolError {
    /// Request is well-formed but semantically invalid.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("signer not found: {signer_id}")]
    NotFound { signer_id: SignerId },

    #[error("identity already verified for signer {signer_id}")]
    AlreadyVerified { signer_id: SignerId },

    /// An unresolved attempt exists inside the dedup window.
    #[error("verification already in progress (order {order_ref})")]
    AttemptInProgress { order_ref: String },

    /// The order reference was never issued to this signer.
    #[error("verification order {order_ref} not found for this signer")]
    UnknownOrder { order_ref: String },

    /// Consent submitted before identity verification.
    #[error("identity verification required before accepting consent")]
    RequiresIdentityVerification,

    /// Signing attempted before verification and consent are complete.
    #[error("SafeProtocol incomplete (identity verified: {identity_verified}, consent given: {consent_given})")]
    SafeProtocolIncomplete {
        identity_verified: bool,
        consent_given: bool,
    },

    #[error("too many verification requests")]
    RateLimited,

    /// Identity provider rejected or failed the request.
    #[error("{message}")]
    Provider {
        message: String,
        #[source]
        source: ProviderError,
    },

    /// Completed challenge carried an invalid personal number.
    #[error("Invalid identity information received from BankID")]
    InvalidIdentity(#[source] PersonalNumberError),

    /// A primary write failed.
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

impl SafeProtocolError {
    pub fn provider(source: ProviderError) -> Self {
        Self::Provider {
            message: source.user_message(),
            source,
        }
    }

    /// Short machine-readable label, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound { .. } => "not_found",
            Self::AlreadyVerified { .. } => "already_verified",
            Self::AttemptInProgress { .. } => "attempt_in_progress",
            Self::UnknownOrder { .. } => "unknown_order",
            Self::RequiresIdentityVerification => "requires_identity_verification",
            Self::SafeProtocolIncomplete { .. } => "safeprotocol_incomplete",
            Self::RateLimited => "rate_limited",
            Self::Provider { .. } => "provider",
            Self::InvalidIdentity(_) => "invalid_identity",
            Self::Persistence(_) => "persistence",
        }
    }
}
