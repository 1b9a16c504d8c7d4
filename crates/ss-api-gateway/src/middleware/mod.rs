//! Middleware for the API Gateway.
//!
//! Layer order: Request → Trace → CORS → IpProtection → Timeout → Handler.
//! Rate limiting is not a layer: the orchestrator consults
//! [`RateLimitState`] through its `RateLimitGate` port.

pub mod cors;
pub mod ip_protection;
pub mod rate_limit;

pub use cors::create_cors_layer;
pub use ip_protection::{determine_client_ip, ClientIp, IpProtectionLayer};
pub use rate_limit::{cleanup_task, RateLimitState};
