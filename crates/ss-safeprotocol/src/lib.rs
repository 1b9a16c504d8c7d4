//! # SafeProtocol Subsystem
//!
//! Identity verification and consent state machine for SimpleSign signers.
//!
//! A signer must prove their identity through BankID and accept every
//! required consent category before the signing endpoint accepts their
//! signature. Every transition lands in an append-only, hash-chained
//! compliance audit trail.
//!
//! ## Architecture
//!
//! This subsystem follows hexagonal architecture:
//! - **Domain Layer** (`domain/`): Personal number validation, consent
//!   templates, audit chain hashing, state derivation. No I/O.
//! - **Ports Layer** (`ports/`): `SafeProtocolApi` (inbound) and the
//!   identity provider, repository, clock and rate-limit traits (outbound)
//! - **Adapters Layer** (`adapters/`): BankID HTTP client, key-value backed
//!   compliance store, in-memory key-value store, system clock
//! - **Service Layer** (`service/`): The orchestrator wiring domain logic to
//!   ports
//!
//! ## Flow
//!
//! ```text
//! start_verification ──► provider.initiate ──► audit(initiated, pending)
//!         │
//! check_verification ──► provider.poll
//!         │                 ├─ pending  ──► (no state change)
//!         │                 ├─ failed   ──► audit(failed)
//!         │                 └─ complete ──► validate + hash personal number
//!         │                                   ──► signer.verified_identity
//!         │                                   ──► audit(success)
//! submit_consent ──► consent records ──► audit(consent_accepted)
//!         │
//! authorize_signing ──► is_complete ──► audit(signing_authorized)
//! ```
//!
//! ## Privacy
//!
//! Raw personal numbers only exist inside [`PersonalNumber`], whose `Debug`
//! output is redacted. Only the SHA-256 digest crosses the persistence
//! boundary.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export public API
pub use adapters::{
    BankIdConfig, BankIdEnvironment, BankIdGateway, ComplianceStore, InMemoryKVStore,
    SystemClock, Unlimited,
};
pub use domain::audit::{
    verify_audit_chain, AuditEvent, AuditEventType, AuditStatus, ChainVerification,
    StoredAuditEvent,
};
pub use domain::consent::{
    consent_template, consent_templates, ConsentCategory, ConsentRecord, REQUIRED_CONSENTS,
};
pub use domain::entities::{
    DocumentId, RequestContext, Signer, SignerId, SignerStatus, Timestamp, VerificationState,
    VerifiedIdentity,
};
pub use domain::errors::{KVStoreError, SafeProtocolError, StoreError};
pub use domain::personal_number::{
    hash_personal_number, validate_and_hash, HashedPersonalNumber, PersonalNumber,
    PersonalNumberError,
};
pub use domain::provider::{
    format_provider_error_message, CollectResponse, CollectStatus, CompletionData,
    InitiateRequest, OrderTokens, ProviderError, ProviderErrorCode,
};
pub use ports::inbound::{AuditTrail, SafeProtocolApi, VerificationOutcome, VerifiedSigner};
pub use ports::outbound::{
    AuditLogStore, BatchOperation, ConsentStore, IdentityProviderGateway, KeyValueStore,
    RateLimitGate, ScanResult, SignerRepository, TimeSource,
};
pub use service::poller::{poll_until_resolved, PollError, PollSchedule};
pub use service::{SafeProtocolConfig, SafeProtocolDependencies, SafeProtocolService};
