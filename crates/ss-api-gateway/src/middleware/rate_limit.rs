//! Per-key token buckets backing the orchestrator's rate-limit gate.
//!
//! Keys have the form `<purpose>:<ip>`; the orchestrator decides what to
//! key on, this module only counts.

use crate::domain::config::RateLimitConfig;
use dashmap::DashMap;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use ss_safeprotocol::RateLimitGate;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Token bucket for one key
struct TokenBucket {
    limiter: DefaultDirectRateLimiter,
    /// Last access time (for cleanup)
    last_access: Instant,
}

impl TokenBucket {
    fn new(config: &RateLimitConfig) -> Self {
        let per_minute = NonZeroU32::new(config.verify_init_per_minute).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::direct(Quota::per_minute(per_minute).allow_burst(burst)),
            last_access: Instant::now(),
        }
    }

    fn check(&mut self) -> bool {
        self.last_access = Instant::now();
        self.limiter.check().is_ok()
    }
}

/// Rate limiter state shared across requests
pub struct RateLimitState {
    buckets: DashMap<String, TokenBucket>,
    config: RateLimitConfig,
}

impl RateLimitState {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            config,
        }
    }

    fn whitelisted(&self, key: &str) -> bool {
        key.split_once(':')
            .and_then(|(_, ip)| ip.parse::<IpAddr>().ok())
            .is_some_and(|ip| self.config.whitelist.contains(&ip))
    }

    /// Clean up old buckets (call periodically)
    pub fn cleanup(&self, max_age: Duration) {
        let now = Instant::now();
        self.buckets.retain(|key, bucket| {
            let age = now.duration_since(bucket.last_access);
            if age > max_age {
                debug!(key = %key, age_secs = age.as_secs(), "Removing stale rate limit bucket");
                false
            } else {
                true
            }
        });
    }

    /// Get number of tracked keys
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

impl RateLimitGate for RateLimitState {
    fn check_and_consume(&self, key: &str) -> bool {
        if !self.config.enabled || self.whitelisted(key) {
            return true;
        }

        let allowed = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| {
                debug!(key = %key, "Creating new rate limit bucket");
                TokenBucket::new(&self.config)
            })
            .check();

        if !allowed {
            warn!(key = %key, "Rate limit exceeded");
        }
        allowed
    }
}

/// Background task to clean up stale rate limit buckets
pub async fn cleanup_task(state: Arc<RateLimitState>, interval: Duration, max_age: Duration) {
    let mut cleanup_interval = tokio::time::interval(interval);
    cleanup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        cleanup_interval.tick().await;
        state.cleanup(max_age);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn test_config() -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            verify_init_per_minute: 2,
            burst_size: 3,
            whitelist: vec![IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1))],
            ..Default::default()
        }
    }

    #[test]
    fn test_burst_then_blocked() {
        let state = RateLimitState::new(test_config());
        for _ in 0..3 {
            assert!(state.check_and_consume("verify-init:10.0.0.1"));
        }
        assert!(!state.check_and_consume("verify-init:10.0.0.1"));
    }

    #[test]
    fn test_keys_are_independent() {
        let state = RateLimitState::new(test_config());
        for _ in 0..4 {
            let _ = state.check_and_consume("verify-init:10.0.0.2");
        }
        assert!(state.check_and_consume("verify-init:10.0.0.3"));
        assert_eq!(state.bucket_count(), 2);
    }

    #[test]
    fn test_whitelist_bypasses_limit() {
        let state = RateLimitState::new(test_config());
        for _ in 0..50 {
            assert!(state.check_and_consume("verify-init:192.168.1.1"));
        }
        assert_eq!(state.bucket_count(), 0);
    }

    #[test]
    fn test_ipv6_key_is_whitelisted() {
        let mut config = test_config();
        config.whitelist.push("2001:db8::5".parse().unwrap());
        let state = RateLimitState::new(config);
        for _ in 0..10 {
            assert!(state.check_and_consume("verify-init:2001:db8::5"));
        }
    }

    #[test]
    fn test_disabled_rate_limiting() {
        let mut config = test_config();
        config.enabled = false;
        let state = RateLimitState::new(config);
        for _ in 0..100 {
            assert!(state.check_and_consume("verify-init:10.0.0.4"));
        }
    }

    #[test]
    fn test_cleanup_removes_stale_buckets() {
        let state = RateLimitState::new(test_config());
        let _ = state.check_and_consume("verify-init:10.0.0.5");
        assert_eq!(state.bucket_count(), 1);

        // Cleanup with 0 duration should remove all
        state.cleanup(Duration::ZERO);
        assert_eq!(state.bucket_count(), 0);
    }
}
