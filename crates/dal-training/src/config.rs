//! Training client configuration.

use dal_types::RetryPolicy;
use std::time::Duration;

/// Health checks never wait longer than this.
pub const MAX_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct TrainingClientConfig {
    /// e.g. `http://localhost:5050`
    pub base_url: String,
    pub health_timeout: Duration,
    /// `/status` and `/results`
    pub query_timeout: Duration,
    /// `/start_iteration` and `/submit_labels`; training runs synchronously.
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for TrainingClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5050".to_string(),
            health_timeout: MAX_HEALTH_TIMEOUT,
            query_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(300),
            retry: RetryPolicy::new(3, 1_000, 10_000, 0.2),
        }
    }
}

impl TrainingClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Longest `start_iteration` can take: retried training, then the
    /// retried `/results` fallback. Also bounds `final_training`.
    pub fn start_budget(&self) -> Duration {
        self.retry
            .worst_case(self.request_timeout)
            .saturating_add(self.retry.worst_case(self.query_timeout))
    }

    /// Longest a single `submit_labels` attempt can take.
    pub fn submit_attempt_budget(&self) -> Duration {
        self.request_timeout
    }

    /// Health timeout clamped to the five-second ceiling.
    pub fn effective_health_timeout(&self) -> Duration {
        self.health_timeout.min(MAX_HEALTH_TIMEOUT)
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}
