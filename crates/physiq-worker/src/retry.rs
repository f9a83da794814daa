//! Retry policy for stage calls.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::clients::StageError;

/// Policy for retrying failed stage calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryPolicy {
    /// No retries - fail immediately.
    None,

    /// Fixed delay between retries.
    Fixed {
        /// Maximum number of retries.
        max_attempts: u32,
        delay: Duration,
    },

    /// Exponential backoff between retries.
    Exponential {
        /// Maximum number of retries.
        max_attempts: u32,
        /// Initial delay (doubles each attempt).
        initial_delay: Duration,
        /// Maximum delay cap.
        max_delay: Duration,
    },
}

impl Default for RetryPolicy {
    /// Two retries, 1s then 2s.
    fn default() -> Self {
        Self::Exponential {
            max_attempts: 2,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn exponential(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        if max_attempts == 0 {
            return Self::None;
        }
        Self::Exponential {
            max_attempts,
            initial_delay,
            max_delay,
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::Fixed {
            max_attempts,
            delay,
        }
    }

    /// Delay before retry number `attempt` (1-indexed), or `None` once the
    /// retry budget is spent.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::Fixed {
                max_attempts,
                delay,
            } => (attempt <= *max_attempts).then_some(*delay),
            Self::Exponential {
                max_attempts,
                initial_delay,
                max_delay,
            } => {
                if attempt > *max_attempts {
                    return None;
                }
                // 2^(attempt-1) * initial_delay, capped at max_delay
                let multiplier = 2u32.saturating_pow(attempt.saturating_sub(1));
                Some(initial_delay.saturating_mul(multiplier).min(*max_delay))
            }
        }
    }

    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Fixed { max_attempts, .. } => *max_attempts,
            Self::Exponential { max_attempts, .. } => *max_attempts,
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy gives up. `op` receives the 1-indexed attempt number.
///
/// Backoff sleeps end early with [`StageError::Cancelled`] when `cancel` fires.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, StageError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, StageError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let error = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => e,
            Err(e) => return Err(e),
        };

        let Some(delay) = policy.delay_for_attempt(attempt) else {
            return Err(error);
        };
        warn!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Stage call failed, retrying"
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(StageError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
