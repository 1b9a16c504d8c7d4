//! API Gateway service: binds the HTTP listener and serves the SafeProtocol routes.

use crate::domain::config::GatewayConfig;
use crate::domain::error::GatewayError;
use crate::middleware::{cleanup_task, create_cors_layer, IpProtectionLayer, RateLimitState};
use crate::routes::{safeprotocol_routes, AppState};
use axum::{extract::DefaultBodyLimit, Router};
use ss_safeprotocol::SafeProtocolApi;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

/// API Gateway service state
pub struct ApiGatewayService {
    config: GatewayConfig,
    api: Arc<dyn SafeProtocolApi>,
    rate_limit: Arc<RateLimitState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_rx: Option<oneshot::Receiver<()>>,
}

impl ApiGatewayService {
    /// Create a new API Gateway service.
    ///
    /// `rate_limit` must be the same state the orchestrator was built with,
    /// so the background sweep cleans the buckets that are actually used.
    pub fn new(
        config: GatewayConfig,
        api: Arc<dyn SafeProtocolApi>,
        rate_limit: Arc<RateLimitState>,
    ) -> Result<Self, GatewayError> {
        config.validate()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        Ok(Self {
            config,
            api,
            rate_limit,
            shutdown_tx: Some(shutdown_tx),
            shutdown_rx: Some(shutdown_rx),
        })
    }

    /// Routes with the full middleware stack.
    pub fn router(&self) -> Router {
        let state = AppState {
            api: Arc::clone(&self.api),
        };

        let middleware = ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(create_cors_layer(&self.config.cors))
            .layer(IpProtectionLayer::new(self.config.security.clone()))
            .layer(TimeoutLayer::new(self.config.timeouts.request));

        safeprotocol_routes(state)
            .layer(DefaultBodyLimit::max(self.config.limits.max_request_size))
            .layer(middleware)
    }

    /// Serve until the shutdown handle fires or is dropped.
    pub async fn start(&mut self) -> Result<(), GatewayError> {
        let shutdown_rx = self.shutdown_rx.take();

        let sweep = tokio::spawn(cleanup_task(
            Arc::clone(&self.rate_limit),
            self.config.rate_limit.cleanup_interval,
            self.config.rate_limit.max_idle,
        ));

        let addr = self.config.http_addr();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(GatewayError::Bind)?;
        info!(addr = %addr, "SafeProtocol gateway listening");

        let result = axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => std::future::pending::<()>().await,
            }
            info!("Received shutdown signal");
        })
        .await
        .map_err(GatewayError::Serve);

        sweep.abort();
        info!("SafeProtocol gateway stopped");
        result
    }

    /// Sender that stops [`start`](Self::start). Taking it disables
    /// [`shutdown`](Self::shutdown).
    pub fn shutdown_handle(&mut self) -> Option<oneshot::Sender<()>> {
        self.shutdown_tx.take()
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::ConfigError;
    use ss_safeprotocol::test_utils::make_test_service;

    fn api() -> Arc<dyn SafeProtocolApi> {
        let (service, _switch) = make_test_service();
        Arc::new(service)
    }

    #[tokio::test]
    async fn test_start_stops_on_shutdown() {
        let mut config = GatewayConfig::default();
        config.http.host = std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST);
        config.http.port = 0;
        let rate_limit = Arc::new(RateLimitState::new(config.rate_limit.clone()));
        let mut service = ApiGatewayService::new(config, api(), rate_limit).unwrap();
        let stop = service.shutdown_handle().unwrap();

        let server = tokio::spawn(async move { service.start().await });
        stop.send(()).unwrap();

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), server)
            .await
            .expect("server did not stop")
            .unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = GatewayConfig::default();
        config.timeouts.request = std::time::Duration::ZERO;
        let rate_limit = Arc::new(RateLimitState::new(config.rate_limit.clone()));

        let result = ApiGatewayService::new(config, api(), rate_limit);
        assert!(matches!(
            result,
            Err(GatewayError::Config(ConfigError::InvalidTimeout(_)))
        ));
    }

    #[test]
    fn test_shutdown_handle_is_taken_once() {
        let config = GatewayConfig::default();
        let rate_limit = Arc::new(RateLimitState::new(config.rate_limit.clone()));
        let mut service = ApiGatewayService::new(config, api(), rate_limit).unwrap();
        assert!(service.shutdown_handle().is_some());
        service.shutdown();
        assert!(service.shutdown_handle().is_none());
    }
}
