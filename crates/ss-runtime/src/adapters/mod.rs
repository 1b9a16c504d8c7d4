//! # Production Storage Adapters
//!
//! Enable the `rocksdb` feature for persistent storage:
//!
//! ```toml
//! ss-runtime = { path = "...", features = ["rocksdb"] }
//! ```
//!
//! Without it only the in-memory store from `ss-safeprotocol` is available.

#[cfg(feature = "rocksdb")]
pub mod rocksdb_adapter;

#[cfg(feature = "rocksdb")]
pub use rocksdb_adapter::{RocksDbConfig, RocksDbStore};

pub use ss_safeprotocol::InMemoryKVStore;
