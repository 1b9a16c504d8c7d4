//! SafeProtocol API Gateway - HTTP surface for identity verification and consent.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  SAFEPROTOCOL API GATEWAY                     │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Middleware: Trace → CORS → IpProtection → Timeout           │
//! │                          │                                   │
//! │  Routes:                 ▼                                   │
//! │    POST /api/safeprotocol/verify-identity/{init,collect,cancel}
//! │    POST /api/safeprotocol/consent/submit                     │
//! │    GET  /api/safeprotocol/consent/templates                  │
//! │    GET  /api/safeprotocol/signers/:signer_id/status          │
//! │    GET  /health                                              │
//! │                          │                                   │
//! │                          ▼                                   │
//! │            Arc<dyn SafeProtocolApi> (ss-safeprotocol)        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Per-IP throttling of verification starts lives in [`RateLimitState`],
//! which the orchestrator consults through its `RateLimitGate` port. The
//! gateway owns the state so it can sweep idle buckets.
//!
//! # Usage
//!
//! ```ignore
//! use ss_api_gateway::{ApiGatewayService, GatewayConfig, RateLimitState};
//!
//! let config = GatewayConfig::default();
//! let rate_limit = Arc::new(RateLimitState::new(config.rate_limit.clone()));
//! let api = build_orchestrator(Arc::clone(&rate_limit));
//! let mut service = ApiGatewayService::new(config, api, rate_limit)?;
//! service.start().await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod domain;
pub mod middleware;
pub mod routes;
pub mod service;

pub use domain::config::{
    ConfigError, CorsConfig, GatewayConfig, HttpConfig, LimitsConfig, RateLimitConfig,
    SecurityConfig, TimeoutConfig,
};
pub use domain::error::{ApiError, ApiResult, FieldError, GatewayError};
pub use middleware::{ClientIp, IpProtectionLayer, RateLimitState};
pub use routes::{safeprotocol_routes, AppState, RequestMeta};
pub use service::ApiGatewayService;
