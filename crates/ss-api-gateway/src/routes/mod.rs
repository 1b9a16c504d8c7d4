//! HTTP routes for the SafeProtocol API.

mod consent;
mod status;
mod verification;

use crate::middleware::ClientIp;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::USER_AGENT, request::Parts},
    routing::{get, post},
    Router,
};
use ss_safeprotocol::{RequestContext, SafeProtocolApi};
use std::convert::Infallible;
use std::sync::Arc;

pub const INIT_PATH: &str = "/api/safeprotocol/verify-identity/init";
pub const COLLECT_PATH: &str = "/api/safeprotocol/verify-identity/collect";
pub const CANCEL_PATH: &str = "/api/safeprotocol/verify-identity/cancel";
pub const CONSENT_SUBMIT_PATH: &str = "/api/safeprotocol/consent/submit";
pub const CONSENT_TEMPLATES_PATH: &str = "/api/safeprotocol/consent/templates";
pub const SIGNER_STATUS_PATH: &str = "/api/safeprotocol/signers/:signer_id/status";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub api: Arc<dyn SafeProtocolApi>,
}

/// Client IP and user agent of the calling request.
pub struct RequestMeta(pub RequestContext);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let ClientIp(ip) = ClientIp::from_request_parts(parts, state).await?;
        let mut context = RequestContext::new(ip);
        if let Some(agent) = parts.headers.get(USER_AGENT).and_then(|v| v.to_str().ok()) {
            context = context.with_user_agent(agent);
        }
        Ok(Self(context))
    }
}

/// All SafeProtocol routes plus `/health`, without middleware.
pub fn safeprotocol_routes(state: AppState) -> Router {
    Router::new()
        .route(INIT_PATH, post(verification::init))
        .route(COLLECT_PATH, post(verification::collect))
        .route(CANCEL_PATH, post(verification::cancel))
        .route(CONSENT_SUBMIT_PATH, post(consent::submit))
        .route(CONSENT_TEMPLATES_PATH, get(consent::templates))
        .route(SIGNER_STATUS_PATH, get(status::signer_status))
        .route("/health", get(status::health))
        .with_state(state)
}
