//! Fakes and fixtures shared by this crate's tests and downstream crates
//! (feature `test-utils`).

use crate::adapters::{ComplianceStore, InMemoryKVStore};
use crate::domain::entities::{RequestContext, Signer, Timestamp};
use crate::domain::errors::KVStoreError;
use crate::domain::personal_number::PersonalNumber;
use crate::domain::provider::{
    CollectResponse, CompletionCert, CompletionData, CompletionDevice, CompletionUser,
    InitiateRequest, OrderTokens, ProviderError,
};
use crate::ports::outbound::{
    BatchOperation, IdentityProviderGateway, KeyValueStore, RateLimitGate, ScanResult, TimeSource,
};
use crate::service::{SafeProtocolConfig, SafeProtocolDependencies, SafeProtocolService};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Passes the check digit test.
pub const VALID_PERSONAL_NUMBER: &str = "197603021234";

/// Right length, wrong check digit.
pub const INVALID_CHECKSUM_PERSONAL_NUMBER: &str = "197603029999";

pub fn test_context() -> RequestContext {
    RequestContext::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 44))).with_user_agent("test-agent/1.0")
}

pub fn make_signer(name: Option<&str>) -> Signer {
    Signer::new(
        Uuid::new_v4(),
        Uuid::new_v4(),
        "anna.svensson@example.se",
        name.map(str::to_string),
    )
}

pub fn completion(personal_number: &str) -> CompletionData {
    CompletionData {
        user: CompletionUser {
            personal_number: PersonalNumber::new(personal_number),
            name: "Anna Svensson".to_string(),
            given_name: "Anna".to_string(),
            surname: "Svensson".to_string(),
        },
        device: Some(CompletionDevice {
            ip_address: "192.0.2.44".to_string(),
            uhi: None,
        }),
        cert: CompletionCert {
            not_before: "1502983274000".to_string(),
            not_after: "1563549674000".to_string(),
        },
        signature: Some("c2lnbmF0dXJl".to_string()),
        ocsp_response: Some("b2NzcA==".to_string()),
    }
}

/// Identity provider that replays scripted responses.
///
/// Unscripted `initiate` calls succeed with `order-{n}` / `token-{n}`;
/// unscripted polls report `pending`.
#[derive(Default)]
pub struct ScriptedIdentityProvider {
    initiate_results: Mutex<VecDeque<Result<OrderTokens, ProviderError>>>,
    poll_results: Mutex<HashMap<String, VecDeque<Result<CollectResponse, ProviderError>>>>,
    initiate_requests: Mutex<Vec<InitiateRequest>>,
    cancelled: Mutex<Vec<String>>,
    refuse_cancel: AtomicBool,
    next_order: AtomicUsize,
    polls: AtomicUsize,
}

impl ScriptedIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_initiate(&self, result: Result<OrderTokens, ProviderError>) {
        self.initiate_results.lock().push_back(result);
    }

    /// Queue poll results for one order, consumed in order.
    pub fn script_poll(
        &self,
        order_ref: &str,
        results: impl IntoIterator<Item = Result<CollectResponse, ProviderError>>,
    ) {
        self.poll_results
            .lock()
            .entry(order_ref.to_string())
            .or_default()
            .extend(results);
    }

    pub fn refuse_cancel(&self, refuse: bool) {
        self.refuse_cancel.store(refuse, Ordering::SeqCst);
    }

    pub fn initiate_count(&self) -> usize {
        self.initiate_requests.lock().len()
    }

    pub fn last_initiate_message(&self) -> Option<String> {
        self.initiate_requests
            .lock()
            .last()
            .map(|r| r.end_user_message.clone())
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn cancelled_orders(&self) -> Vec<String> {
        self.cancelled.lock().clone()
    }
}

#[async_trait]
impl IdentityProviderGateway for ScriptedIdentityProvider {
    async fn initiate(&self, request: InitiateRequest) -> Result<OrderTokens, ProviderError> {
        self.initiate_requests.lock().push(request);
        if let Some(result) = self.initiate_results.lock().pop_front() {
            return result;
        }
        let n = self.next_order.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(OrderTokens {
            order_ref: format!("order-{n}"),
            auto_start_token: format!("token-{n}"),
        })
    }

    async fn poll(&self, order_ref: &str) -> Result<CollectResponse, ProviderError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .poll_results
            .lock()
            .get_mut(order_ref)
            .and_then(|queue| queue.pop_front());
        scripted.unwrap_or_else(|| Ok(CollectResponse::pending(order_ref, Some("outstandingTransaction"))))
    }

    async fn cancel(&self, order_ref: &str) -> bool {
        self.cancelled.lock().push(order_ref.to_string());
        !self.refuse_cancel.load(Ordering::SeqCst)
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: std::time::Duration) {
        let delta = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        let mut now = self.now.lock();
        *now += delta;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).single().unwrap_or_else(Utc::now))
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}

/// Handle controlling which writes a [`FlakyKVStore`] rejects.
#[derive(Clone, Default)]
pub struct FailureSwitch {
    prefixes: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl FailureSwitch {
    /// Reject every write touching a key that starts with `prefix`.
    pub fn fail_writes_to(&self, prefix: &str) {
        self.prefixes.lock().push(prefix.as_bytes().to_vec());
    }

    pub fn heal(&self) {
        self.prefixes.lock().clear();
    }

    fn rejects(&self, key: &[u8]) -> bool {
        self.prefixes.lock().iter().any(|p| key.starts_with(p))
    }
}

/// In-memory store whose writes can be made to fail by key prefix.
///
/// A rejected batch applies nothing.
pub struct FlakyKVStore {
    inner: InMemoryKVStore,
    switch: FailureSwitch,
}

impl FlakyKVStore {
    pub fn new() -> (Self, FailureSwitch) {
        let switch = FailureSwitch::default();
        (
            Self {
                inner: InMemoryKVStore::new(),
                switch: switch.clone(),
            },
            switch,
        )
    }

    /// Drop a row without going through the store's write path.
    pub fn remove(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        self.inner.remove(key)
    }

    fn rejected() -> KVStoreError {
        KVStoreError::IOError {
            message: "injected write failure".to_string(),
        }
    }
}

impl KeyValueStore for FlakyKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        self.inner.get(key)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        if self.switch.rejects(key) {
            return Err(Self::rejected());
        }
        self.inner.put(key, value)
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        let rejected = operations.iter().any(|op| match op {
            BatchOperation::Put { key, .. } => self.switch.rejects(key),
        });
        if rejected {
            return Err(Self::rejected());
        }
        self.inner.atomic_batch_write(operations)
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<ScanResult, KVStoreError> {
        self.inner.prefix_scan(prefix)
    }
}

/// Gate admitting a fixed number of requests in total.
pub struct BudgetGate {
    remaining: AtomicU32,
    keys: Mutex<Vec<String>>,
}

impl BudgetGate {
    pub fn new(budget: u32) -> Self {
        Self {
            remaining: AtomicU32::new(budget),
            keys: Mutex::new(Vec::new()),
        }
    }

    /// Keys seen so far, admitted or not.
    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().clone()
    }
}

impl RateLimitGate for BudgetGate {
    fn check_and_consume(&self, key: &str) -> bool {
        self.keys.lock().push(key.to_string());
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

pub type TestService =
    SafeProtocolService<ScriptedIdentityProvider, ComplianceStore<FlakyKVStore>, ManualClock>;

/// Service over fakes, with an effectively unlimited gate.
pub fn make_test_service() -> (TestService, FailureSwitch) {
    make_test_service_with_gate(Arc::new(BudgetGate::new(u32::MAX)))
}

pub fn make_test_service_with_gate(gate: Arc<dyn RateLimitGate>) -> (TestService, FailureSwitch) {
    let (kv, switch) = FlakyKVStore::new();
    let deps = SafeProtocolDependencies {
        provider: ScriptedIdentityProvider::new(),
        store: ComplianceStore::new(kv),
        time_source: ManualClock::default(),
        rate_limit: gate,
    };
    (
        SafeProtocolService::new(deps, SafeProtocolConfig::default()),
        switch,
    )
}
