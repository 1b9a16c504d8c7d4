//! # Verification Poller
//!
//! Drives `check_verification` on a fixed schedule until the order reaches
//! a terminal outcome, for callers that prefer a single awaitable over their
//! own polling loop.

use crate::domain::entities::{RequestContext, SignerId};
use crate::domain::errors::SafeProtocolError;
use crate::ports::inbound::{SafeProtocolApi, VerificationOutcome};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Poll interval and attempt ceiling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSchedule {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: 30,
        }
    }
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("verification still pending after {attempts} polls")]
    PollTimeout { attempts: u32 },

    #[error(transparent)]
    SafeProtocol(#[from] SafeProtocolError),
}

/// Poll until the order is failed or complete.
///
/// The first poll happens immediately; later polls wait `interval`.
pub async fn poll_until_resolved<A>(
    api: &A,
    order_ref: &str,
    signer_id: SignerId,
    context: RequestContext,
    schedule: PollSchedule,
) -> Result<VerificationOutcome, PollError>
where
    A: SafeProtocolApi + ?Sized,
{
    for attempt in 1..=schedule.max_attempts {
        if attempt > 1 {
            tokio::time::sleep(schedule.interval).await;
        }

        let outcome = api
            .check_verification(order_ref, signer_id, context.clone())
            .await?;
        if outcome.is_terminal() {
            return Ok(outcome);
        }
        debug!(attempt, order_ref, "Verification still pending");
    }

    Err(PollError::PollTimeout {
        attempts: schedule.max_attempts,
    })
}
