//! # SimpleSign Runtime
//!
//! Wires the SafeProtocol orchestrator to its production adapters and
//! serves it through the HTTP gateway.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (TOML file, then environment)
//! 2. Initialize logging
//! 3. Open the compliance store (in-memory or RocksDB)
//! 4. Build the BankID client and the orchestrator
//! 5. Insert missing signers from the seed file, if configured
//! 6. Serve until Ctrl+C, then drain in-flight requests
//!
//! The per-IP rate-limit state is shared: the orchestrator consults it as
//! its `RateLimitGate`, the gateway sweeps its idle buckets.

pub mod adapters;
pub mod config;
pub mod seed;
pub mod telemetry;

use anyhow::{Context, Result};
use ss_api_gateway::{ApiGatewayService, RateLimitState};
use ss_safeprotocol::{
    BankIdGateway, ComplianceStore, KeyValueStore, RateLimitGate, SafeProtocolApi,
    SafeProtocolDependencies, SafeProtocolService, SystemClock,
};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::{RuntimeConfig, StorageBackend};

/// Orchestrator over `kv` with the production provider and clock, with
/// the configured signers seeded.
pub async fn build_api<K>(
    kv: K,
    config: &RuntimeConfig,
    rate_limit: Arc<dyn RateLimitGate>,
) -> Result<Arc<dyn SafeProtocolApi>>
where
    K: KeyValueStore + 'static,
{
    let provider = BankIdGateway::new(&config.bankid).context("failed to build BankID client")?;
    let deps = SafeProtocolDependencies {
        provider,
        store: ComplianceStore::new(kv),
        time_source: SystemClock,
        rate_limit,
    };
    let service = SafeProtocolService::new(deps, config.safeprotocol.clone());

    if let Some(path) = &config.seed.signers_file {
        info!(path = %path.display(), "Seeding signers");
        let seeds = seed::load_seed_file(path)?;
        seed::seed_signers(service.store(), seeds)
            .await
            .context("failed to seed signers")?;
    }

    Ok(Arc::new(service))
}

/// Gateway with storage chosen by `config.storage`.
pub async fn build_gateway(config: &RuntimeConfig) -> Result<ApiGatewayService> {
    let rate_limit = Arc::new(RateLimitState::new(config.gateway.rate_limit.clone()));
    let gate: Arc<dyn RateLimitGate> = Arc::clone(&rate_limit) as Arc<dyn RateLimitGate>;

    let api = match config.storage.backend {
        StorageBackend::Memory => {
            info!("Using in-memory compliance store; data is lost on restart");
            build_api(adapters::InMemoryKVStore::new(), config, gate).await?
        }
        StorageBackend::Rocksdb => open_rocksdb(config, gate).await?,
    };

    ApiGatewayService::new(config.gateway.clone(), api, rate_limit)
        .context("invalid gateway configuration")
}

#[cfg(feature = "rocksdb")]
async fn open_rocksdb(
    config: &RuntimeConfig,
    gate: Arc<dyn RateLimitGate>,
) -> Result<Arc<dyn SafeProtocolApi>> {
    use adapters::{RocksDbConfig, RocksDbStore};

    let path = config.storage.data_dir.join("compliance");
    info!(path = %path.display(), "Opening RocksDB compliance store");
    let store = RocksDbStore::open(RocksDbConfig {
        path,
        ..Default::default()
    })
    .context("failed to open compliance store")?;
    build_api(store, config, gate).await
}

#[cfg(not(feature = "rocksdb"))]
async fn open_rocksdb(
    _config: &RuntimeConfig,
    _gate: Arc<dyn RateLimitGate>,
) -> Result<Arc<dyn SafeProtocolApi>> {
    Err(config::RuntimeConfigError::RocksDbUnavailable.into())
}

/// Serve until Ctrl+C or until the server fails.
pub async fn run(config: RuntimeConfig) -> Result<()> {
    let mut gateway = build_gateway(&config).await?;
    let stop = gateway
        .shutdown_handle()
        .context("gateway shutdown handle already taken")?;

    info!(
        addr = %config.gateway.http_addr(),
        bankid = ?config.bankid.environment,
        storage = ?config.storage.backend,
        "Starting SimpleSign runtime"
    );
    let mut server = tokio::spawn(async move { gateway.start().await });

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl+C")?;
            info!("Shutdown requested");
            let _ = stop.send(());
            server
                .await
                .context("gateway task panicked")?
                .context("gateway stopped with an error")?;
        }
        result = &mut server => {
            let result = result.context("gateway task panicked")?;
            if let Err(e) = &result {
                error!(error = %e, "Gateway exited unexpectedly");
            }
            result.context("gateway stopped with an error")?;
        }
    }

    info!("SimpleSign runtime stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ss_safeprotocol::{SignerId, Unlimited, VerificationState};
    use std::io::Write;

    const SEEDED: &str = "6f1c0c1e-8d1a-4a53-9a43-6f0d3c7a2b11";

    fn signers_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[[signers]]
id = "{SEEDED}"
document_id = "0b9e7d2c-5f4e-4c3b-8a1d-2e6f7a8b9c0d"
email = "anna.svensson@example.se"
name = "Hyresavtal 2024"
"#
        )
        .unwrap();
        file
    }

    #[tokio::test]
    async fn test_build_gateway_in_memory() {
        let config = RuntimeConfig::default();
        let gateway = build_gateway(&config).await.unwrap();
        assert_eq!(gateway.config().http.port, 3000);
    }

    #[tokio::test]
    async fn test_invalid_gateway_config_is_rejected() {
        let mut config = RuntimeConfig::default();
        config.gateway.limits.max_request_size = 0;
        assert!(build_gateway(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_seeded_signer_is_served() {
        let file = signers_file();
        let mut config = RuntimeConfig::default();
        config.seed.signers_file = Some(file.path().to_path_buf());

        let api = build_api(adapters::InMemoryKVStore::new(), &config, Arc::new(Unlimited))
            .await
            .unwrap();
        let id: SignerId = SEEDED.parse().unwrap();
        let status = api.signer_status(id).await.unwrap();
        assert_eq!(status.state, VerificationState::Unverified);
        assert!(!status.complete);
    }

    #[tokio::test]
    async fn test_missing_signers_file_fails_startup() {
        let mut config = RuntimeConfig::default();
        config.seed.signers_file = Some("/nonexistent/signers.toml".into());
        assert!(build_gateway(&config).await.is_err());
    }

    #[cfg(not(feature = "rocksdb"))]
    #[tokio::test]
    async fn test_rocksdb_backend_requires_feature() {
        let mut config = RuntimeConfig::default();
        config.storage.backend = StorageBackend::Rocksdb;
        assert!(build_gateway(&config).await.is_err());
    }

    #[cfg(feature = "rocksdb")]
    #[tokio::test]
    async fn test_build_gateway_on_rocksdb() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = RuntimeConfig::default();
        config.storage.backend = StorageBackend::Rocksdb;
        config.storage.data_dir = dir.path().to_path_buf();
        assert!(build_gateway(&config).await.is_ok());
        assert!(dir.path().join("compliance").exists());
    }

    #[cfg(feature = "rocksdb")]
    #[tokio::test]
    async fn test_seed_survives_restart_on_rocksdb() {
        use adapters::{RocksDbConfig, RocksDbStore};

        let dir = tempfile::TempDir::new().unwrap();
        let file = signers_file();
        let mut config = RuntimeConfig::default();
        config.seed.signers_file = Some(file.path().to_path_buf());
        let id: SignerId = SEEDED.parse().unwrap();

        for _ in 0..2 {
            let store = RocksDbStore::open(RocksDbConfig::for_testing(dir.path())).unwrap();
            let api = build_api(store, &config, Arc::new(Unlimited)).await.unwrap();
            assert!(api.signer_status(id).await.is_ok());
        }
    }
}
