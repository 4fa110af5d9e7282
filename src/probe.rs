//! Availability probe
//!
//! Polls a resource until it reports ready, with a bounded number of
//! retries and a fixed delay between attempts.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// A resource whose readiness can be checked
pub trait Readiness {
    type Error;

    /// Check once whether the resource is ready
    fn check_ready(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Retry budget for a single probe call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePolicy {
    /// Retries allowed after the first attempt
    pub max_retry: u32,
    /// Delay between a failed attempt and the next one
    pub retry_interval: Duration,
}

impl ProbePolicy {
    /// Create a new probe policy
    pub fn new(max_retry: u32, retry_interval: Duration) -> Self {
        Self {
            max_retry,
            retry_interval,
        }
    }

    /// Total number of attempts this policy allows
    pub fn max_attempts(&self) -> u64 {
        u64::from(self.max_retry) + 1
    }
}

/// Wait for `resource` to become ready.
///
/// Makes up to `max_retry + 1` attempts, sleeping `retry_interval` after
/// every failed attempt except the last. Returns as soon as an attempt
/// succeeds, otherwise the error of the final attempt. The resource is only
/// borrowed; closing it stays with the caller.
pub async fn probe<R>(resource: &R, policy: &ProbePolicy) -> Result<(), R::Error>
where
    R: Readiness + ?Sized,
    R::Error: Display,
{
    let max_attempts = policy.max_attempts();
    let mut attempt: u64 = 1;

    loop {
        match resource.check_ready().await {
            Ok(()) => {
                debug!(attempt, "resource ready");
                return Ok(());
            }
            Err(err) if attempt >= max_attempts => {
                warn!(attempts = attempt, error = %err, "resource not ready, giving up");
                return Err(err);
            }
            Err(err) => {
                debug!(
                    attempt,
                    max_attempts,
                    error = %err,
                    "resource not ready, retrying in {:?}",
                    policy.retry_interval
                );
                if !policy.retry_interval.is_zero() {
                    tokio::time::sleep(policy.retry_interval).await;
                }
                attempt += 1;
            }
        }
    }
}
