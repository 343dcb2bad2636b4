//! Jittered exponential backoff for network operations.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Outcome of a retried operation that did not succeed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetryError<E> {
    /// The cancellation token fired before the operation succeeded.
    #[error("operation cancelled")]
    Cancelled,
    /// The last error, after `attempts` tries.
    #[error("failed after {attempts} attempt(s): {error}")]
    Exhausted { error: E, attempts: usize },
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::Cancelled => None,
            RetryError::Exhausted { error, .. } => Some(error),
        }
    }
}

/// Simple jittered exponential backoff policy for async operations.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_pct: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay_ms: u64, max_delay_ms: u64, jitter_pct: f64) -> Self {
        let clamped_base = base_delay_ms.max(1);
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: clamped_base,
            max_delay_ms: max_delay_ms.max(clamped_base),
            jitter_pct: jitter_pct.clamp(0.0, 1.0),
        }
    }

    pub fn default_network() -> Self {
        Self::new(5, 250, 5_000, 0.25)
    }

    /// Delay before retry number `attempt` (zero-based), jitter included.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let delay = self.capped_delay_ms(attempt);
        if self.jitter_pct <= 0.0 {
            return Duration::from_millis(delay);
        }
        let spread = (delay as f64 * self.jitter_pct) as i64;
        let delta = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_millis(delay.saturating_add_signed(delta))
    }

    /// Longest `run` can take when every attempt is cut off at
    /// `per_attempt` and every backoff draws its maximum jitter. An outer
    /// deadline shorter than this pre-empts the policy's own retries.
    pub fn worst_case(&self, per_attempt: Duration) -> Duration {
        let attempts = u32::try_from(self.max_attempts).unwrap_or(u32::MAX);
        let mut total = per_attempt.saturating_mul(attempts);
        let retries = self.max_attempts.saturating_sub(1);
        for retry in 0..retries {
            let delay = self.capped_delay_ms(retry);
            let ceiling = Duration::from_millis((delay as f64 * (1.0 + self.jitter_pct)).ceil() as u64);
            if delay == self.max_delay_ms {
                // Every remaining backoff sits at the cap.
                let remaining = u32::try_from(retries - retry).unwrap_or(u32::MAX);
                return total.saturating_add(ceiling.saturating_mul(remaining));
            }
            total = total.saturating_add(ceiling);
        }
        total
    }

    fn capped_delay_ms(&self, attempt: usize) -> u64 {
        let exp = 2_u64.saturating_pow(attempt.min(32) as u32);
        self.base_delay_ms.saturating_mul(exp).min(self.max_delay_ms)
    }

    /// Run `op` until it succeeds, returns a non-retryable error, runs out of
    /// attempts, or `cancel` fires. `op` receives the zero-based attempt.
    ///
    /// Cancellation is honoured both during an attempt and during backoff.
    pub async fn run<F, Fut, T, E, R>(
        &self,
        cancel: &CancellationToken,
        retryable: R,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                outcome = op(attempt) => outcome,
            };
            match outcome {
                Ok(value) => return Ok(value),
                Err(error) => {
                    attempt += 1;
                    if attempt >= self.max_attempts || !retryable(&error) {
                        return Err(RetryError::Exhausted {
                            error,
                            attempts: attempt,
                        });
                    }
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                        _ = sleep(self.delay_for(attempt - 1)) => {}
                    }
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, 250, 5_000, 0.2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn new_clamps_input_parameters() {
        let policy = RetryPolicy::new(0, 0, 0, 2.0);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.base_delay_ms, 1);
        assert_eq!(policy.max_delay_ms, 1);
        assert_eq!(policy.jitter_pct, 1.0);
    }

    #[test]
    fn delay_doubles_and_caps() {
        let policy = RetryPolicy::new(5, 100, 500, 0.0);
        let delays: Vec<_> = (0..5).map(|attempt| policy.delay_for(attempt)).collect();
        assert_eq!(delays[0], Duration::from_millis(100));
        assert_eq!(delays[1], Duration::from_millis(200));
        assert_eq!(delays[2], Duration::from_millis(400));
        assert_eq!(delays[3], Duration::from_millis(500)); // capped
        assert_eq!(delays[4], Duration::from_millis(500));
    }

    #[test]
    fn worst_case_covers_every_attempt_and_backoff() {
        let policy = RetryPolicy::new(3, 100, 1_000, 0.0);
        assert_eq!(
            policy.worst_case(Duration::from_secs(1)),
            Duration::from_millis(3_000 + 100 + 200)
        );

        let jittered = RetryPolicy::new(3, 100, 1_000, 0.5);
        assert_eq!(
            jittered.worst_case(Duration::from_secs(1)),
            Duration::from_millis(3_000 + 150 + 300)
        );

        let capped = RetryPolicy::new(5, 100, 200, 0.0);
        assert_eq!(capped.worst_case(Duration::ZERO), Duration::from_millis(100 + 200 + 200 + 200));

        assert_eq!(RetryPolicy::new(1, 100, 100, 0.0).worst_case(Duration::from_secs(2)), Duration::from_secs(2));
    }

    #[test]
    fn worst_case_saturates_for_unbounded_policies() {
        let forever = RetryPolicy::new(usize::MAX, 5, 20, 0.0);
        assert!(forever.worst_case(Duration::from_secs(1)) > Duration::from_secs(86_400));
    }

    #[tokio::test(start_paused = true)]
    async fn run_retries_until_success() {
        let policy = RetryPolicy::new(3, 10, 10, 0.0);
        let attempts = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let result: Result<&'static str, RetryError<&str>> = policy
            .run(&cancel, |_| true, |attempt| {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    if attempt < 2 {
                        Err("boom")
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_after_max_attempts() {
        let policy = RetryPolicy::new(2, 5, 5, 0.0);
        let cancel = CancellationToken::new();

        let result: Result<(), RetryError<&str>> =
            policy.run(&cancel, |_| true, |_| async { Err("nope") }).await;

        assert_eq!(
            result,
            Err(RetryError::Exhausted {
                error: "nope",
                attempts: 2
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn run_does_not_retry_permanent_errors() {
        let policy = RetryPolicy::new(5, 5, 5, 0.0);
        let cancel = CancellationToken::new();
        let attempts = AtomicUsize::new(0);

        let result: Result<(), RetryError<&str>> = policy
            .run(&cancel, |e| *e != "fatal", |_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err("fatal") }
            })
            .await;

        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 1, .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_honours_cancellation_mid_flight() {
        let policy = RetryPolicy::default_network();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result: Result<(), RetryError<&str>> = policy
            .run(&cancel, |_| true, |_| async {
                sleep(Duration::from_secs(3600)).await;
                Ok(())
            })
            .await;

        assert_eq!(result, Err(RetryError::Cancelled));
    }
}
