//! Runtime configuration.
//!
//! Loaded from an optional TOML file named by `SS_CONFIG`, then overridden
//! from the environment:
//!
//! - `SS_HTTP_PORT`: gateway port
//! - `BANKID_ENVIRONMENT`: `test` or `production`
//! - `BANKID_CERT_PATH`: relying-party PEM bundle
//! - `SS_DATA_DIR`: data directory; selects RocksDB storage
//! - `SS_LOG_JSON`: `true`/`1` for JSON logs
//! - `SS_DEDUP_WINDOW`: dedup window, e.g. `5m`
//! - `SS_SIGNERS_FILE`: TOML file of signers inserted at startup

use serde::{Deserialize, Serialize};
use ss_api_gateway::GatewayConfig;
use ss_safeprotocol::{BankIdConfig, BankIdEnvironment, SafeProtocolConfig};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_PATH_ENV: &str = "SS_CONFIG";

#[derive(Debug, Error)]
pub enum RuntimeConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {var}: {reason}")]
    Env { var: &'static str, reason: String },

    #[error("gateway: {0}")]
    Gateway(#[from] ss_api_gateway::ConfigError),

    #[error("safeprotocol: {0}")]
    SafeProtocol(String),

    #[error("storage backend `rocksdb` requires building with the `rocksdb` feature")]
    RocksDbUnavailable,
}

/// Top-level runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub log: LogConfig,
    pub storage: StorageConfig,
    pub seed: SeedConfig,
    pub bankid: BankIdConfig,
    pub safeprotocol: SafeProtocolConfig,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,
    /// JSON output for containers; pretty output otherwise
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Rocksdb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            data_dir: PathBuf::from("./data"),
        }
    }
}

/// Startup data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    /// Signers to insert when missing; see [`crate::seed`].
    pub signers_file: Option<PathBuf>,
}

impl RuntimeConfig {
    /// File named by `SS_CONFIG` (if any), then process environment overrides.
    pub fn load() -> Result<Self, RuntimeConfigError> {
        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, RuntimeConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| RuntimeConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| RuntimeConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply overrides from `lookup`, which maps variable names to values.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), RuntimeConfigError> {
        if let Some(port) = lookup("SS_HTTP_PORT") {
            self.gateway.http.port = port.trim().parse().map_err(|_| RuntimeConfigError::Env {
                var: "SS_HTTP_PORT",
                reason: format!("not a port number: {port}"),
            })?;
        }

        if let Some(env) = lookup("BANKID_ENVIRONMENT") {
            self.bankid.environment = env
                .trim()
                .parse::<BankIdEnvironment>()
                .map_err(|reason| RuntimeConfigError::Env {
                    var: "BANKID_ENVIRONMENT",
                    reason,
                })?;
        }

        if let Some(path) = lookup("BANKID_CERT_PATH").filter(|p| !p.trim().is_empty()) {
            self.bankid.client_cert_path = Some(PathBuf::from(path.trim()));
        }

        if let Some(dir) = lookup("SS_DATA_DIR").filter(|d| !d.trim().is_empty()) {
            self.storage.data_dir = PathBuf::from(dir.trim());
            self.storage.backend = StorageBackend::Rocksdb;
        }

        if let Some(path) = lookup("SS_SIGNERS_FILE").filter(|p| !p.trim().is_empty()) {
            self.seed.signers_file = Some(PathBuf::from(path.trim()));
        }

        if let Some(json) = lookup("SS_LOG_JSON") {
            let json = json.trim().to_ascii_lowercase();
            self.log.json = json == "true" || json == "1";
        }

        if let Some(window) = lookup("SS_DEDUP_WINDOW") {
            self.safeprotocol.dedup_window =
                humantime_serde::re::humantime::parse_duration(window.trim()).map_err(|e| {
                    RuntimeConfigError::Env {
                        var: "SS_DEDUP_WINDOW",
                        reason: e.to_string(),
                    }
                })?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), RuntimeConfigError> {
        self.gateway.validate()?;
        self.safeprotocol
            .validate()
            .map_err(|e| RuntimeConfigError::SafeProtocol(e.to_string()))?;
        if self.storage.backend == StorageBackend::Rocksdb && !cfg!(feature = "rocksdb") {
            return Err(RuntimeConfigError::RocksDbUnavailable);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::time::Duration;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = RuntimeConfig::default();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.gateway.http.port, 3000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = RuntimeConfig::default();
        config
            .apply_env(env(&[
                ("SS_HTTP_PORT", "8088"),
                ("BANKID_ENVIRONMENT", "production"),
                ("BANKID_CERT_PATH", "/etc/bankid/rp.pem"),
                ("SS_LOG_JSON", "1"),
                ("SS_DEDUP_WINDOW", "90s"),
                ("SS_SIGNERS_FILE", "/etc/ss/signers.toml"),
            ]))
            .unwrap();

        assert_eq!(config.gateway.http.port, 8088);
        assert_eq!(config.bankid.environment, BankIdEnvironment::Production);
        assert_eq!(
            config.bankid.client_cert_path.as_deref(),
            Some(Path::new("/etc/bankid/rp.pem"))
        );
        assert!(config.log.json);
        assert_eq!(config.safeprotocol.dedup_window, Duration::from_secs(90));
        assert_eq!(
            config.seed.signers_file.as_deref(),
            Some(Path::new("/etc/ss/signers.toml"))
        );
    }

    #[test]
    fn test_data_dir_selects_rocksdb() {
        let mut config = RuntimeConfig::default();
        config.apply_env(env(&[("SS_DATA_DIR", "/var/lib/ss")])).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Rocksdb);
        assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/ss"));
        assert_eq!(config.validate().is_ok(), cfg!(feature = "rocksdb"));
    }

    #[test]
    fn test_bad_port_names_variable() {
        let mut config = RuntimeConfig::default();
        let err = config
            .apply_env(env(&[("SS_HTTP_PORT", "eighty")]))
            .unwrap_err();
        assert!(matches!(err, RuntimeConfigError::Env { var: "SS_HTTP_PORT", .. }));
    }

    #[test]
    fn test_zero_dedup_window_rejected() {
        let mut config = RuntimeConfig::default();
        config.safeprotocol.dedup_window = Duration::ZERO;
        assert!(matches!(
            config.validate(),
            Err(RuntimeConfigError::SafeProtocol(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[log]
level = "debug"

[bankid]
environment = "production"
request_timeout = "15s"

[safeprotocol]
dedup_window = "2m"

[seed]
signers_file = "signers.toml"

[gateway.http]
port = 9000

[gateway.rate_limit]
verify_init_per_minute = 20
"#
        )
        .unwrap();

        let config = RuntimeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.bankid.environment, BankIdEnvironment::Production);
        assert_eq!(config.bankid.request_timeout, Duration::from_secs(15));
        assert_eq!(config.safeprotocol.dedup_window, Duration::from_secs(120));
        assert_eq!(config.seed.signers_file, Some(PathBuf::from("signers.toml")));
        assert_eq!(config.gateway.http.port, 9000);
        assert_eq!(config.gateway.rate_limit.verify_init_per_minute, 20);
        assert_eq!(config.gateway.rate_limit.burst_size, 5);
    }

    #[test]
    fn test_unreadable_file() {
        let err = RuntimeConfig::from_file(Path::new("/nonexistent/ss.toml")).unwrap_err();
        assert!(matches!(err, RuntimeConfigError::Read { .. }));
    }
}
