use crate::domain::entities::Timestamp;
use crate::ports::outbound::{RateLimitGate, TimeSource};
use chrono::Utc;

/// System time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Gate that admits everything. For deployments that rate-limit upstream.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unlimited;

impl RateLimitGate for Unlimited {
    fn check_and_consume(&self, _key: &str) -> bool {
        true
    }
}
