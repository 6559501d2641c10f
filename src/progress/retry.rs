//! Bounded retries for optimistic-concurrency conflicts, and timeouts for
//! calls that leave the engine

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use super::error::{EngineError, EngineResult};

/// How many times a conflicting operation is attempted before giving up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// `retries` extra attempts after the first one
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_retries(5)
    }
}

/// Re-run `attempt` from a fresh read while it reports a version conflict
pub fn with_conflict_retry<T>(
    policy: RetryPolicy,
    operation: &'static str,
    mut attempt: impl FnMut() -> EngineResult<T>,
) -> EngineResult<T> {
    let mut tries = 1;
    loop {
        match attempt() {
            Err(EngineError::Conflict { user_id }) if tries < policy.max_attempts => {
                debug!(
                    "[questlog:retry] {} conflicted for {} (attempt {}/{})",
                    operation, user_id, tries, policy.max_attempts
                );
                tries += 1;
                std::thread::yield_now();
            }
            Err(err @ EngineError::Conflict { .. }) => {
                warn!(
                    "[questlog:retry] {} gave up after {} attempts: {}",
                    operation, tries, err
                );
                return Err(err);
            }
            other => return other,
        }
    }
}

/// Await a collaborator call, turning an overrun into a retryable `Timeout`
pub async fn with_timeout<T>(
    after: Duration,
    operation: &'static str,
    call: impl Future<Output = anyhow::Result<T>>,
) -> EngineResult<T> {
    match tokio::time::timeout(after, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(EngineError::Collaborator(format!("{operation}: {err:#}"))),
        Err(_) => Err(EngineError::Timeout { operation, after }),
    }
}
