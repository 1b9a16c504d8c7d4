//! # RocksDB Storage Adapter
//!
//! Persistent `KeyValueStore` for the compliance store.
//!
//! Signers, audit events and consents share the default column family;
//! `ComplianceStore` separates them by key prefix. Writes are fsynced by
//! default since audit rows are legal evidence.

use parking_lot::RwLock;
use rocksdb::{IteratorMode, Options, WriteBatch, WriteOptions, DB};
use ss_safeprotocol::{BatchOperation, KVStoreError, KeyValueStore, ScanResult};
use std::path::PathBuf;
use std::sync::Arc;

/// RocksDB configuration
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Path to the database directory
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Write buffer size in bytes (default: 16MB)
    pub write_buffer_size: usize,
    /// Enable fsync after each write (default: true)
    pub sync_writes: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/compliance"),
            block_cache_size: 64 * 1024 * 1024,
            write_buffer_size: 16 * 1024 * 1024,
            sync_writes: true,
        }
    }
}

impl RocksDbConfig {
    /// Create config for testing (smaller buffers, no sync)
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            write_buffer_size: 4 * 1024 * 1024,
            sync_writes: false,
        }
    }
}

fn io_error(operation: &str, e: rocksdb::Error) -> KVStoreError {
    KVStoreError::IOError {
        message: format!("RocksDB {operation} failed: {e}"),
    }
}

/// RocksDB-backed key-value store implementing the KeyValueStore trait
pub struct RocksDbStore {
    db: Arc<RwLock<DB>>,
    config: RocksDbConfig,
}

impl RocksDbStore {
    /// Open or create a RocksDB database
    pub fn open(config: RocksDbConfig) -> Result<Self, KVStoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_compression_type(rocksdb::DBCompressionType::Snappy);

        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        block_opts.set_block_cache(&rocksdb::Cache::new_lru_cache(config.block_cache_size));
        opts.set_block_based_table_factory(&block_opts);

        let db = DB::open(&opts, &config.path).map_err(|e| KVStoreError::IOError {
            message: format!("Failed to open RocksDB at {}: {e}", config.path.display()),
        })?;

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
            config,
        })
    }

    fn write_options(&self) -> WriteOptions {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        write_opts
    }
}

impl KeyValueStore for RocksDbStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        self.db.read().get(key).map_err(|e| io_error("get", e))
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        let write_opts = self.write_options();
        self.db
            .write()
            .put_opt(key, value, &write_opts)
            .map_err(|e| io_error("put", e))
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        let mut batch = WriteBatch::default();
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => batch.put(&key, &value),
            }
        }

        let write_opts = self.write_options();
        self.db
            .write()
            .write_opt(batch, &write_opts)
            .map_err(|e| io_error("batch write", e))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<ScanResult, KVStoreError> {
        let db = self.db.read();
        let mut results = Vec::new();

        for item in db.iterator(IteratorMode::From(prefix, rocksdb::Direction::Forward)) {
            let (key, value) = item.map_err(|e| io_error("scan", e))?;
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key.to_vec(), value.to_vec()));
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (RocksDbStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksDbStore::open(RocksDbConfig::for_testing(dir.path())).unwrap();
        (store, dir)
    }

    #[test]
    fn test_put_get() {
        let (mut store, _dir) = open_temp();
        assert_eq!(store.get(b"signer:1").unwrap(), None);
        store.put(b"signer:1", b"row").unwrap();
        assert_eq!(store.get(b"signer:1").unwrap(), Some(b"row".to_vec()));
    }

    #[test]
    fn test_prefix_scan_is_ordered_and_bounded() {
        let (mut store, _dir) = open_temp();
        store
            .atomic_batch_write(vec![
                BatchOperation::put(b"audit:a:0002".to_vec(), b"2".to_vec()),
                BatchOperation::put(b"audit:a:0001".to_vec(), b"1".to_vec()),
                BatchOperation::put(b"audit:b:0001".to_vec(), b"x".to_vec()),
                BatchOperation::put(b"consent:a:1".to_vec(), b"c".to_vec()),
            ])
            .unwrap();

        let rows = store.prefix_scan(b"audit:a:").unwrap();
        let values: Vec<_> = rows.into_iter().map(|(_, v)| v).collect();
        assert_eq!(values, vec![b"1".to_vec(), b"2".to_vec()]);
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = RocksDbStore::open(RocksDbConfig::for_testing(dir.path())).unwrap();
            store.put(b"k", b"v").unwrap();
        }
        let store = RocksDbStore::open(RocksDbConfig::for_testing(dir.path())).unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
    }
}
