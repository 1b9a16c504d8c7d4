//! # Compliance Store
//!
//! Implements the signer, audit and consent repositories on top of any
//! [`KeyValueStore`], with rows encoded as JSON.
//!
//! ## Key Layout
//!
//! | Key | Value |
//! |---|---|
//! | `signer:{id}` | `Signer` |
//! | `order:{order_ref}` | owning signer id |
//! | `audit:{id}:{seq:020}` | `StoredAuditEvent` |
//! | `audit_head:{id}` | next sequence and last entry hash |
//! | `consent:{id}:{idx:020}` | `ConsentRecord` |
//! | `consent_head:{id}` | next consent index |
//!
//! Zero-padded sequence numbers make prefix scans return rows in append
//! order. Every multi-key write goes through one atomic batch under a single
//! lock, so chain heads never drift from their rows.

use crate::domain::audit::{unresolved_attempt, AuditEvent, AuditEventType, StoredAuditEvent, GENESIS_HASH};
use crate::domain::consent::{ConsentCategory, ConsentRecord};
use crate::domain::entities::{
    DocumentId, RequestContext, Signer, SignerId, Timestamp, VerifiedIdentity,
};
use crate::domain::errors::StoreError;
use crate::ports::outbound::{
    AuditLogStore, BatchOperation, ConsentStore, KeyValueStore, SignerRepository,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AuditHead {
    next_sequence: u64,
    last_hash: String,
}

impl Default for AuditHead {
    fn default() -> Self {
        Self {
            next_sequence: 0,
            last_hash: GENESIS_HASH.to_string(),
        }
    }
}

fn signer_key(signer_id: SignerId) -> Vec<u8> {
    format!("signer:{signer_id}").into_bytes()
}

fn order_key(order_ref: &str) -> Vec<u8> {
    format!("order:{order_ref}").into_bytes()
}

fn audit_prefix(signer_id: SignerId) -> Vec<u8> {
    format!("audit:{signer_id}:").into_bytes()
}

fn audit_key(signer_id: SignerId, sequence: u64) -> Vec<u8> {
    format!("audit:{signer_id}:{sequence:020}").into_bytes()
}

fn audit_head_key(signer_id: SignerId) -> Vec<u8> {
    format!("audit_head:{signer_id}").into_bytes()
}

fn consent_prefix(signer_id: SignerId) -> Vec<u8> {
    format!("consent:{signer_id}:").into_bytes()
}

fn consent_key(signer_id: SignerId, index: u64) -> Vec<u8> {
    format!("consent:{signer_id}:{index:020}").into_bytes()
}

fn consent_head_key(signer_id: SignerId) -> Vec<u8> {
    format!("consent_head:{signer_id}").into_bytes()
}

fn read<K: KeyValueStore, T: DeserializeOwned>(kv: &K, key: &[u8]) -> Result<Option<T>, StoreError> {
    match kv.get(key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

fn scan<K: KeyValueStore, T: DeserializeOwned>(kv: &K, prefix: &[u8]) -> Result<Vec<T>, StoreError> {
    kv.prefix_scan(prefix)?
        .into_iter()
        .map(|(_, v)| serde_json::from_slice(&v).map_err(StoreError::from))
        .collect()
}

/// Compliance repositories backed by a key-value store.
pub struct ComplianceStore<K: KeyValueStore> {
    kv: Mutex<K>,
}

impl<K: KeyValueStore> ComplianceStore<K> {
    pub fn new(kv: K) -> Self {
        Self { kv: Mutex::new(kv) }
    }

    /// Direct access to the underlying store.
    pub fn with_kv<R>(&self, f: impl FnOnce(&mut K) -> R) -> R {
        f(&mut self.kv.lock())
    }
}

#[async_trait]
impl<K: KeyValueStore> SignerRepository for ComplianceStore<K> {
    async fn find_signer(&self, signer_id: SignerId) -> Result<Option<Signer>, StoreError> {
        let kv = self.kv.lock();
        read(&*kv, &signer_key(signer_id))
    }

    async fn insert_signer(&self, signer: Signer) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(&signer)?;
        let mut kv = self.kv.lock();
        kv.put(&signer_key(signer.id), &bytes)?;
        Ok(())
    }

    async fn record_verified_identity(
        &self,
        signer_id: SignerId,
        identity: VerifiedIdentity,
    ) -> Result<Signer, StoreError> {
        let mut kv = self.kv.lock();
        let key = signer_key(signer_id);

        let mut signer: Signer =
            read(&*kv, &key)?.ok_or(StoreError::SignerNotFound { signer_id })?;
        if signer.identity_verified() {
            return Err(StoreError::AlreadyVerified { signer_id });
        }

        signer.verified_identity = Some(identity);
        kv.put(&key, &serde_json::to_vec(&signer)?)?;
        Ok(signer)
    }

    async fn bind_order(&self, order_ref: &str, signer_id: SignerId) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(&signer_id)?;
        let mut kv = self.kv.lock();
        kv.put(&order_key(order_ref), &bytes)?;
        Ok(())
    }

    async fn order_owner(&self, order_ref: &str) -> Result<Option<SignerId>, StoreError> {
        let kv = self.kv.lock();
        read(&*kv, &order_key(order_ref))
    }
}

#[async_trait]
impl<K: KeyValueStore> AuditLogStore for ComplianceStore<K> {
    async fn append(&self, event: AuditEvent) -> Result<StoredAuditEvent, StoreError> {
        let signer_id = event.signer_id;
        let mut kv = self.kv.lock();

        let head: AuditHead = read(&*kv, &audit_head_key(signer_id))?.unwrap_or_default();
        let stored = StoredAuditEvent::chain(event, head.next_sequence, head.last_hash)?;
        let next_head = AuditHead {
            next_sequence: stored.sequence + 1,
            last_hash: stored.entry_hash.clone(),
        };

        kv.atomic_batch_write(vec![
            BatchOperation::put(
                audit_key(signer_id, stored.sequence),
                serde_json::to_vec(&stored)?,
            ),
            BatchOperation::put(audit_head_key(signer_id), serde_json::to_vec(&next_head)?),
        ])?;

        debug!(
            signer_id = %signer_id,
            sequence = stored.sequence,
            event_type = %stored.event.event_type,
            "Audit event appended"
        );
        Ok(stored)
    }

    async fn find_recent_pending_attempt(
        &self,
        signer_id: SignerId,
        event_type: AuditEventType,
        since: Timestamp,
    ) -> Result<Option<String>, StoreError> {
        let events: Vec<StoredAuditEvent> = {
            let kv = self.kv.lock();
            scan(&*kv, &audit_prefix(signer_id))?
        };
        Ok(unresolved_attempt(
            events.iter().map(|s| &s.event),
            event_type,
            since,
        ))
    }

    async fn events_for_signer(
        &self,
        signer_id: SignerId,
    ) -> Result<Vec<StoredAuditEvent>, StoreError> {
        let kv = self.kv.lock();
        scan(&*kv, &audit_prefix(signer_id))
    }
}

#[async_trait]
impl<K: KeyValueStore> ConsentStore for ComplianceStore<K> {
    async fn record_consents(
        &self,
        signer_id: SignerId,
        document_id: DocumentId,
        categories: &[ConsentCategory],
        context: &RequestContext,
        accepted_at: Timestamp,
    ) -> Result<Vec<ConsentRecord>, StoreError> {
        let records: Vec<ConsentRecord> = categories
            .iter()
            .map(|c| ConsentRecord::accepted(signer_id, document_id, *c, context, accepted_at))
            .collect();

        let mut kv = self.kv.lock();
        let first_index: u64 = read(&*kv, &consent_head_key(signer_id))?.unwrap_or(0);

        let mut ops = Vec::with_capacity(records.len() + 1);
        for (offset, record) in records.iter().enumerate() {
            ops.push(BatchOperation::put(
                consent_key(signer_id, first_index + offset as u64),
                serde_json::to_vec(record)?,
            ));
        }
        let next_index = first_index + records.len() as u64;
        ops.push(BatchOperation::put(
            consent_head_key(signer_id),
            serde_json::to_vec(&next_index)?,
        ));

        kv.atomic_batch_write(ops)?;
        Ok(records)
    }

    async fn consented_categories(
        &self,
        signer_id: SignerId,
    ) -> Result<BTreeSet<ConsentCategory>, StoreError> {
        let records = self.consents_for_signer(signer_id).await?;
        Ok(records
            .into_iter()
            .filter(|r| r.accepted)
            .map(|r| r.category)
            .collect())
    }

    async fn consents_for_signer(
        &self,
        signer_id: SignerId,
    ) -> Result<Vec<ConsentRecord>, StoreError> {
        let kv = self.kv.lock();
        scan(&*kv, &consent_prefix(signer_id))
    }
}
