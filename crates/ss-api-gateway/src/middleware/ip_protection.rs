//! Client IP resolution with spoofing protection.
//!
//! Forwarded-IP headers are honoured only when the direct peer is a trusted
//! proxy. The resolved address is stored as a [`ClientIp`] request extension.

use crate::domain::config::SecurityConfig;
use axum::{
    async_trait,
    body::Body,
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap, Request},
    response::Response,
};
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tower::{Layer, Service};
use tracing::{debug, warn};

/// Headers consulted for the real client IP, in order of preference.
pub const CLIENT_IP_HEADERS: [&str; 6] = [
    "x-forwarded-for",
    "cf-connecting-ip",
    "x-real-ip",
    "x-client-ip",
    "x-appengine-user-ip",
    "true-client-ip",
];

/// Resolved client address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

impl Default for ClientIp {
    fn default() -> Self {
        Self(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ip) = parts.extensions.get::<ClientIp>() {
            return Ok(*ip);
        }
        // Layer not installed: fall back to the socket peer.
        Ok(parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ClientIp(ci.0.ip()))
            .unwrap_or_default())
    }
}

/// IP protection layer
#[derive(Clone)]
pub struct IpProtectionLayer {
    config: Arc<SecurityConfig>,
}

impl IpProtectionLayer {
    pub fn new(config: SecurityConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Never trust forwarded headers.
    pub fn direct_only() -> Self {
        Self::new(SecurityConfig {
            trusted_proxies: Vec::new(),
            trust_localhost: false,
            trust_private_ips: false,
        })
    }
}

impl<S> Layer<S> for IpProtectionLayer {
    type Service = IpProtectionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        IpProtectionService {
            inner,
            config: Arc::clone(&self.config),
        }
    }
}

/// IP protection service
#[derive(Clone)]
pub struct IpProtectionService<S> {
    inner: S,
    config: Arc<SecurityConfig>,
}

impl<S> Service<Request<Body>> for IpProtectionService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let config = Arc::clone(&self.config);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let direct_ip = req
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip())
                .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

            let client_ip = determine_client_ip(req.headers(), direct_ip, &config);
            req.extensions_mut().insert(ClientIp(client_ip));

            inner.call(req).await
        })
    }
}

/// Resolve the client IP for a request arriving from `direct_ip`.
pub fn determine_client_ip(headers: &HeaderMap, direct_ip: IpAddr, config: &SecurityConfig) -> IpAddr {
    if !is_trusted_proxy(direct_ip, config) {
        if CLIENT_IP_HEADERS.iter().any(|h| headers.contains_key(*h)) {
            warn!(
                direct_ip = %direct_ip,
                "Ignoring forwarded IP headers from untrusted source"
            );
        }
        return direct_ip;
    }

    for header in CLIENT_IP_HEADERS {
        let Some(value) = headers.get(header).and_then(|v| v.to_str().ok()) else {
            continue;
        };
        // x-forwarded-for lists client first, then each proxy
        let candidate = value.split(',').next().unwrap_or_default().trim();
        if let Ok(ip) = candidate.parse::<IpAddr>() {
            debug!(header, extracted_ip = %ip, "Extracted client IP from header");
            return ip;
        }
    }

    direct_ip
}

/// Check if an IP is a trusted proxy
fn is_trusted_proxy(ip: IpAddr, config: &SecurityConfig) -> bool {
    config.trusted_proxies.contains(&ip)
        || (config.trust_localhost && ip.is_loopback())
        || (config.trust_private_ips && is_private_ip(ip))
}

/// Check if IP is in private range
fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => ipv4.is_private() || ipv4.is_link_local(),
        IpAddr::V6(ipv6) => {
            // IPv6 unique local addresses (fc00::/7)
            let octets = ipv6.octets();
            (octets[0] & 0xfe) == 0xfc
        }
    }
}
