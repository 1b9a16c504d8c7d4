//! SimpleSign SafeProtocol server.

use anyhow::{Context, Result};
use ss_runtime::config::RuntimeConfig;
use ss_runtime::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let config = RuntimeConfig::load().context("failed to load configuration")?;
    init_tracing(&config.log).context("failed to initialize logging")?;

    ss_runtime::run(config).await
}
