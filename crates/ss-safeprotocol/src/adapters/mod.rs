//! # Adapters Layer
//!
//! Implementations of the outbound ports.
//!
//! - `bankid` - BankID relying-party HTTP client
//! - `compliance_store` - signer, audit and consent repositories over a KV store
//! - `memory` - in-memory KV store
//! - `infra` - system clock, pass-through rate-limit gate

pub mod bankid;
pub mod compliance_store;
pub mod infra;
pub mod memory;

pub use bankid::{BankIdConfig, BankIdEnvironment, BankIdGateway, BankIdSetupError};
pub use compliance_store::ComplianceStore;
pub use infra::{SystemClock, Unlimited};
pub use memory::InMemoryKVStore;
