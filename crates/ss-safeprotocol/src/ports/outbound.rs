//! # Outbound Ports (Driven Ports)
//!
//! Dependencies required by the SafeProtocol service.
//!
//! These are the interfaces the host application implements: the identity
//! provider, the three compliance repositories, a clock and the rate-limit
//! gate.

use crate::domain::audit::{AuditEvent, AuditEventType, StoredAuditEvent};
use crate::domain::consent::{ConsentCategory, ConsentRecord};
use crate::domain::entities::{
    DocumentId, RequestContext, Signer, SignerId, Timestamp, VerifiedIdentity,
};
use crate::domain::errors::{KVStoreError, StoreError};
use crate::domain::provider::{CollectResponse, InitiateRequest, OrderTokens, ProviderError};
use async_trait::async_trait;
use std::collections::BTreeSet;

/// External identity challenge protocol.
///
/// Production: `BankIdGateway`.
/// Testing: `ScriptedIdentityProvider` (test_utils).
#[async_trait]
pub trait IdentityProviderGateway: Send + Sync {
    /// Start a challenge. Transport failures come back as `ProviderError`.
    async fn initiate(&self, request: InitiateRequest) -> Result<OrderTokens, ProviderError>;

    /// Current state of an order. Idempotent.
    async fn poll(&self, order_ref: &str) -> Result<CollectResponse, ProviderError>;

    /// Best-effort cancellation.
    async fn cancel(&self, order_ref: &str) -> bool;
}

/// Signer rows.
#[async_trait]
pub trait SignerRepository: Send + Sync {
    async fn find_signer(&self, signer_id: SignerId) -> Result<Option<Signer>, StoreError>;

    async fn insert_signer(&self, signer: Signer) -> Result<(), StoreError>;

    /// Set the verified identity. Write-once: a second call fails with
    /// `StoreError::AlreadyVerified`.
    async fn record_verified_identity(
        &self,
        signer_id: SignerId,
        identity: VerifiedIdentity,
    ) -> Result<Signer, StoreError>;

    /// Record that the provider issued `order_ref` for `signer_id`.
    async fn bind_order(&self, order_ref: &str, signer_id: SignerId) -> Result<(), StoreError>;

    /// The signer an order reference was issued for.
    async fn order_owner(&self, order_ref: &str) -> Result<Option<SignerId>, StoreError>;
}

/// Append-only compliance audit log.
#[async_trait]
pub trait AuditLogStore: Send + Sync {
    /// Append an event to the signer's chain.
    async fn append(&self, event: AuditEvent) -> Result<StoredAuditEvent, StoreError>;

    /// Order reference of the latest unresolved attempt of `event_type`
    /// created at or after `since`.
    async fn find_recent_pending_attempt(
        &self,
        signer_id: SignerId,
        event_type: AuditEventType,
        since: Timestamp,
    ) -> Result<Option<String>, StoreError>;

    /// The signer's chain in sequence order.
    async fn events_for_signer(&self, signer_id: SignerId)
        -> Result<Vec<StoredAuditEvent>, StoreError>;
}

/// Append-only consent registry.
#[async_trait]
pub trait ConsentStore: Send + Sync {
    /// Write one record per category in a single atomic batch.
    async fn record_consents(
        &self,
        signer_id: SignerId,
        document_id: DocumentId,
        categories: &[ConsentCategory],
        context: &RequestContext,
        accepted_at: Timestamp,
    ) -> Result<Vec<ConsentRecord>, StoreError>;

    async fn consented_categories(
        &self,
        signer_id: SignerId,
    ) -> Result<BTreeSet<ConsentCategory>, StoreError>;

    async fn consents_for_signer(&self, signer_id: SignerId)
        -> Result<Vec<ConsentRecord>, StoreError>;
}

/// Abstract interface for key-value database operations.
///
/// Production: `RocksDbStore` (ss-runtime, feature `rocksdb`)
/// Testing: `InMemoryKVStore`
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError>;

    /// Put a single key-value pair.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError>;

    /// Execute an atomic batch write.
    ///
    /// Either ALL operations in the batch succeed, or NONE are applied.
    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError>;

    /// Key-ordered entries under a prefix.
    fn prefix_scan(&self, prefix: &[u8]) -> Result<ScanResult, KVStoreError>;
}

/// Key-value pairs returned by a prefix scan.
pub type ScanResult = Vec<(Vec<u8>, Vec<u8>)>;

/// Batch operation for atomic writes.
///
/// Compliance rows are never removed, so puts are the only operation.
#[derive(Debug, Clone)]
pub enum BatchOperation {
    Put { key: Vec<u8>, value: Vec<u8> },
}

impl BatchOperation {
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Wall clock.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Admission gate consulted before starting a verification.
///
/// The gate's storage is the host's concern.
pub trait RateLimitGate: Send + Sync {
    /// Consume one unit for `key`; false when the caller must back off.
    fn check_and_consume(&self, key: &str) -> bool;
}
