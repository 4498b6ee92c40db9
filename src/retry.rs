//! Bounded polling for eventually-consistent ARM state.
//!
//! Two places in the engine wait on the cloud: the long-running operation
//! adapter and the post-delete confirmation loop. Both use a [`PollPolicy`]
//! that caps the number of probes and, optionally, the wall-clock time,
//! whichever fires first. Mutations themselves are never retried here.
//!
//! # Example
//!
//! ```rust,ignore
//! use azrm::retry::{PollPolicy, Probe, PollOutcome};
//! use std::time::Duration;
//!
//! let policy = PollPolicy::constant(10, Duration::from_secs(5));
//!
//! let outcome = policy.poll_until(|attempt| async move {
//!     if resource_gone().await? {
//!         Ok::<_, Error>(Probe::Ready(()))
//!     } else {
//!         Ok(Probe::pending())
//!     }
//! }).await?;
//! ```

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Backoff strategy for calculating delay between probes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum BackoffStrategy {
    /// Constant delay between probes.
    #[default]
    Constant,

    /// Linear backoff: delay = interval * (attempt + 1)
    Linear,

    /// Exponential backoff: delay = interval * multiplier^attempt
    Exponential {
        /// Multiplier for exponential growth (default: 2.0)
        multiplier: f64,
    },
}

impl BackoffStrategy {
    /// Calculate the delay after a given attempt number (0-indexed).
    pub fn calculate_delay(&self, attempt: u32, interval: Duration) -> Duration {
        let base_millis = interval.as_millis() as f64;

        let delay_millis = match self {
            Self::Constant => base_millis,
            Self::Linear => base_millis * (f64::from(attempt) + 1.0),
            Self::Exponential { multiplier } => base_millis * multiplier.powf(f64::from(attempt)),
        };

        Duration::from_millis(delay_millis as u64)
    }
}

/// Result of a single probe.
#[derive(Debug, Clone, PartialEq)]
pub enum Probe<T> {
    /// The awaited condition holds.
    Ready(T),
    /// Not there yet. The server may suggest when to ask again.
    Pending {
        /// Server-provided `Retry-After` hint.
        retry_after: Option<Duration>,
    },
}

impl<T> Probe<T> {
    /// Pending without a server hint.
    pub fn pending() -> Self {
        Self::Pending { retry_after: None }
    }
}

/// Final state of a polling loop that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    /// The condition was met.
    Ready(T),
    /// The attempt or time ceiling was reached first.
    Exhausted {
        /// Number of probes issued.
        attempts: u32,
        /// Time spent polling.
        elapsed: Duration,
    },
}

/// Ceiling and pacing for a polling loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    /// Delay between probes (before backoff is applied).
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Upper bound on any single delay.
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    /// Maximum number of probes, including the first one.
    pub max_attempts: u32,

    /// Wall-clock ceiling for the whole loop.
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,

    /// How the delay grows between probes.
    pub backoff: BackoffStrategy,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            max_attempts: 360,
            timeout: Some(Duration::from_secs(30 * 60)),
            backoff: BackoffStrategy::Constant,
        }
    }
}

impl PollPolicy {
    /// Fixed interval, bounded only by attempts.
    pub fn constant(max_attempts: u32, interval: Duration) -> Self {
        Self {
            interval,
            max_delay: interval,
            max_attempts,
            timeout: None,
            backoff: BackoffStrategy::Constant,
        }
    }

    /// Set the wall-clock ceiling.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the backoff strategy.
    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay to wait after the given attempt, honoring a server hint.
    pub fn delay_for_attempt(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let computed = self
            .backoff
            .calculate_delay(attempt, self.interval)
            .min(self.max_delay);
        match retry_after {
            Some(hint) => hint.max(computed),
            None => computed,
        }
    }

    /// Probe until the condition holds or a ceiling is reached.
    ///
    /// The first probe runs immediately. Errors returned by the probe abort
    /// the loop at once and are propagated unchanged.
    pub async fn poll_until<F, Fut, T, E>(&self, mut probe: F) -> Result<PollOutcome<T>, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Probe<T>, E>>,
    {
        let start = Instant::now();
        let mut attempt = 0u32;

        loop {
            trace!("Poll attempt {} of {}", attempt + 1, self.max_attempts);

            let retry_after = match probe(attempt).await? {
                Probe::Ready(value) => {
                    if attempt > 0 {
                        debug!("Condition met after {} probes", attempt + 1);
                    }
                    return Ok(PollOutcome::Ready(value));
                }
                Probe::Pending { retry_after } => retry_after,
            };

            attempt += 1;
            if attempt >= self.max_attempts {
                return Ok(PollOutcome::Exhausted {
                    attempts: attempt,
                    elapsed: start.elapsed(),
                });
            }

            let delay = self.delay_for_attempt(attempt - 1, retry_after);

            if let Some(timeout) = self.timeout {
                let remaining = timeout.saturating_sub(start.elapsed());
                if delay > remaining {
                    return Ok(PollOutcome::Exhausted {
                        attempts: attempt,
                        elapsed: start.elapsed(),
                    });
                }
            }

            debug!("Waiting {:?} before next probe", delay);
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_constant_backoff() {
        let strategy = BackoffStrategy::Constant;
        let interval = Duration::from_millis(100);

        assert_eq!(strategy.calculate_delay(0, interval), interval);
        assert_eq!(strategy.calculate_delay(5, interval), interval);
    }

    #[test]
    fn test_linear_backoff() {
        let strategy = BackoffStrategy::Linear;
        let interval = Duration::from_millis(100);

        assert_eq!(strategy.calculate_delay(0, interval), Duration::from_millis(100));
        assert_eq!(strategy.calculate_delay(2, interval), Duration::from_millis(300));
    }

    #[test]
    fn test_exponential_backoff() {
        let strategy = BackoffStrategy::Exponential { multiplier: 2.0 };
        let interval = Duration::from_millis(100);

        assert_eq!(strategy.calculate_delay(0, interval), Duration::from_millis(100));
        assert_eq!(strategy.calculate_delay(3, interval), Duration::from_millis(800));
    }

    #[test]
    fn test_delay_capped_by_max_delay() {
        let policy = PollPolicy {
            interval: Duration::from_secs(10),
            max_delay: Duration::from_secs(15),
            backoff: BackoffStrategy::Exponential { multiplier: 2.0 },
            ..PollPolicy::default()
        };
        assert_eq!(policy.delay_for_attempt(4, None), Duration::from_secs(15));
    }

    #[test]
    fn test_retry_after_hint_lengthens_delay() {
        let policy = PollPolicy::constant(5, Duration::from_secs(1));
        assert_eq!(
            policy.delay_for_attempt(0, Some(Duration::from_secs(7))),
            Duration::from_secs(7)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_ready() {
        let policy = PollPolicy::constant(5, Duration::from_secs(2));
        let calls = AtomicU32::new(0);

        let outcome = policy
            .poll_until(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 2 {
                        Ok::<_, String>(Probe::Ready("done"))
                    } else {
                        Ok(Probe::pending())
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Ready("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_exhausts_attempts() {
        let policy = PollPolicy::constant(3, Duration::from_secs(1));

        let outcome = policy
            .poll_until(|_| async { Ok::<Probe<()>, String>(Probe::pending()) })
            .await
            .unwrap();

        match outcome {
            PollOutcome::Exhausted { attempts, .. } => assert_eq!(attempts, 3),
            PollOutcome::Ready(()) => panic!("should not be ready"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_respects_timeout() {
        let policy = PollPolicy::constant(1000, Duration::from_secs(10))
            .with_timeout(Duration::from_secs(25));

        let outcome = policy
            .poll_until(|_| async { Ok::<Probe<()>, String>(Probe::pending()) })
            .await
            .unwrap();

        match outcome {
            PollOutcome::Exhausted { attempts, elapsed } => {
                assert_eq!(attempts, 3);
                assert!(elapsed <= Duration::from_secs(25));
            }
            PollOutcome::Ready(()) => panic!("should not be ready"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_propagates_errors() {
        let policy = PollPolicy::constant(5, Duration::from_secs(1));

        let result = policy
            .poll_until(|_| async { Err::<Probe<()>, _>("boom".to_string()) })
            .await;

        assert_eq!(result.unwrap_err(), "boom");
    }
}
