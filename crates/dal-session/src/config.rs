//! Session configuration.

use dal_ledger::LedgerTimeouts;
use dal_training::TrainingClientConfig;
use dal_types::{RetryPolicy, Round};
use std::time::Duration;

/// Timing and policy knobs for one iteration session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bound on every ledger read issued by the session. Covers all the
    /// attempts of a retrying gateway; see `covering_ledger`.
    pub ledger_read_timeout: Duration,
    /// Bound on every ledger write issued by the session.
    pub ledger_write_timeout: Duration,
    /// Bound on `start_iteration` and `final_training`, including the
    /// client's own retries; see `covering_training`.
    pub training_timeout: Duration,
    /// Bound on one `submit_labels` attempt.
    pub submit_timeout: Duration,
    /// Bound on a single health check or status poll.
    pub health_timeout: Duration,
    /// Bound on exporting or loading one round.
    pub export_timeout: Duration,
    /// Backoff for `submit_labels` while aggregating. The only retry layer
    /// for label submission.
    pub submit_retry: RetryPolicy,
    /// Backoff between ledger re-subscription attempts. `max_attempts` is
    /// ignored: the bridge never gives up.
    pub resubscribe_backoff: RetryPolicy,
    /// Consecutive failed subscription attempts before an error is surfaced.
    pub subscription_failure_threshold: usize,
    pub health_interval: Duration,
    pub status_poll_interval: Duration,
    /// The project should end once this round has been trained.
    pub max_rounds: Option<Round>,
    /// Queue depth of the session's command channel.
    pub command_buffer: usize,
    /// Events buffered per subscriber.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let config = Self {
            ledger_read_timeout: Duration::from_secs(15),
            ledger_write_timeout: Duration::from_secs(90),
            training_timeout: Duration::from_secs(300),
            submit_timeout: Duration::from_secs(300),
            health_timeout: Duration::from_secs(5),
            export_timeout: Duration::from_secs(30),
            submit_retry: RetryPolicy::new(4, 1_000, 15_000, 0.2),
            resubscribe_backoff: RetryPolicy::new(usize::MAX, 500, 30_000, 0.2),
            subscription_failure_threshold: 5,
            health_interval: Duration::from_secs(30),
            status_poll_interval: Duration::from_secs(5),
            max_rounds: None,
            command_buffer: 64,
            event_capacity: dal_bus::DEFAULT_CHANNEL_CAPACITY,
        };
        config
            .covering_ledger(&RetryPolicy::default_network(), &LedgerTimeouts::default())
            .covering_training(&TrainingClientConfig::default())
    }
}

impl SessionConfig {
    /// Short timeouts and near-zero backoff; the periodic health check is
    /// effectively disabled so tests drive it explicitly.
    pub fn for_testing() -> Self {
        Self {
            ledger_read_timeout: Duration::from_secs(2),
            ledger_write_timeout: Duration::from_secs(2),
            training_timeout: Duration::from_secs(2),
            submit_timeout: Duration::from_secs(2),
            health_timeout: Duration::from_millis(500),
            export_timeout: Duration::from_secs(2),
            submit_retry: RetryPolicy::new(3, 5, 20, 0.0),
            resubscribe_backoff: RetryPolicy::new(usize::MAX, 5, 20, 0.0),
            subscription_failure_threshold: 3,
            health_interval: Duration::from_secs(3_600),
            status_poll_interval: Duration::from_millis(10),
            max_rounds: None,
            command_buffer: 64,
            event_capacity: 1_024,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: Round) -> Self {
        self.max_rounds = Some(max_rounds);
        self
    }

    /// Stretch the ledger bounds over a gateway that retries reads with
    /// `policy` and cuts every attempt at `timeouts`. Bounds only grow.
    pub fn covering_ledger(mut self, policy: &RetryPolicy, timeouts: &LedgerTimeouts) -> Self {
        let reads = policy.worst_case(timeouts.read);
        self.ledger_read_timeout = self.ledger_read_timeout.max(reads);
        self.ledger_write_timeout = self.ledger_write_timeout.max(timeouts.write);
        self.export_timeout = self.export_timeout.max(reads);
        self
    }

    /// Stretch the training bounds over the HTTP client's own retries.
    /// Bounds only grow.
    pub fn covering_training(mut self, client: &TrainingClientConfig) -> Self {
        self.training_timeout = self.training_timeout.max(client.start_budget());
        self.submit_timeout = self.submit_timeout.max(client.submit_attempt_budget());
        self
    }

    /// Whether training `round` exhausts the configured round budget.
    pub fn round_limit_reached(&self, round: Round) -> bool {
        self.max_rounds.is_some_and(|max| round >= max)
    }
}
