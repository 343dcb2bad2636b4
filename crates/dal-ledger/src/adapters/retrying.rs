//! Timeout and retry policy around any ledger gateway.
//!
//! Reads are retried transparently with jittered backoff and surface only
//! once the policy is exhausted. Writes get exactly one attempt: a write that
//! timed out may still have been mined, so resubmitting risks a double write.

use crate::domain::{BatchStart, VoteDistribution, VotingStatus};
use crate::error::LedgerError;
use crate::ports::{LedgerGateway, LedgerSubscription};
use async_trait::async_trait;
use dal_telemetry::LEDGER_READ_RETRIES;
use dal_types::{ParticipantAddress, ProjectId, RetryError, RetryPolicy, Round, SampleId};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Per-call deadlines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTimeouts {
    pub read: Duration,
    pub write: Duration,
    pub subscribe: Duration,
}

impl Default for LedgerTimeouts {
    fn default() -> Self {
        Self {
            read: Duration::from_secs(10),
            write: Duration::from_secs(60),
            subscribe: Duration::from_secs(10),
        }
    }
}

pub struct RetryingLedger<L> {
    inner: L,
    policy: RetryPolicy,
    timeouts: LedgerTimeouts,
    cancel: CancellationToken,
}

impl<L: LedgerGateway> RetryingLedger<L> {
    pub fn new(inner: L, policy: RetryPolicy, timeouts: LedgerTimeouts) -> Self {
        Self {
            inner,
            policy,
            timeouts,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort pending retries once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    async fn read<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let limit = self.timeouts.read;
        let outcome = self
            .policy
            .run(&self.cancel, LedgerError::is_transient, |attempt| {
                if attempt > 0 {
                    LEDGER_READ_RETRIES.inc();
                    debug!(operation, attempt, "Retrying ledger read");
                }
                let fut = call();
                async move {
                    tokio::time::timeout(limit, fut)
                        .await
                        .unwrap_or(Err(LedgerError::Timeout {
                            operation,
                            after: limit,
                        }))
                }
            })
            .await;

        match outcome {
            Ok(value) => Ok(value),
            Err(RetryError::Cancelled) => Err(LedgerError::Cancelled),
            Err(RetryError::Exhausted { error, attempts }) => {
                warn!(operation, attempts, error = %error, "Ledger read failed");
                Err(error)
            }
        }
    }

    async fn write<Fut>(&self, operation: &'static str, call: Fut) -> Result<(), LedgerError>
    where
        Fut: Future<Output = Result<(), LedgerError>>,
    {
        let limit = self.timeouts.write;
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(LedgerError::Cancelled),
            result = tokio::time::timeout(limit, call) => result.unwrap_or(Err(LedgerError::Timeout {
                operation,
                after: limit,
            })),
        };
        if let Err(error) = &result {
            warn!(operation, error = %error, "Ledger write failed");
        }
        result
    }
}

#[async_trait]
impl<L: LedgerGateway> LedgerGateway for RetryingLedger<L> {
    async fn current_round(&self, project: &ProjectId) -> Result<Round, LedgerError> {
        self.read("getCurrentRound", || self.inner.current_round(project))
            .await
    }

    async fn batch_sample_ids(
        &self,
        project: &ProjectId,
        round: Round,
    ) -> Result<Vec<SampleId>, LedgerError> {
        self.read("getBatchSampleIds", || {
            self.inner.batch_sample_ids(project, round)
        })
        .await
    }

    async fn voting_status(&self, project: &ProjectId) -> Result<VotingStatus, LedgerError> {
        self.read("isVotingActive", || self.inner.voting_status(project))
            .await
    }

    async fn voting_distribution(
        &self,
        project: &ProjectId,
        sample: &SampleId,
    ) -> Result<VoteDistribution, LedgerError> {
        self.read("getVotingDistribution", || {
            self.inner.voting_distribution(project, sample)
        })
        .await
    }

    async fn completed_samples(
        &self,
        project: &ProjectId,
        round: Round,
    ) -> Result<Vec<SampleId>, LedgerError> {
        self.read("getCompletedSamples", || {
            self.inner.completed_samples(project, round)
        })
        .await
    }

    async fn final_label(
        &self,
        project: &ProjectId,
        sample: &SampleId,
    ) -> Result<Option<String>, LedgerError> {
        self.read("getFinalLabel", || self.inner.final_label(project, sample))
            .await
    }

    async fn is_project_ended(&self, project: &ProjectId) -> Result<bool, LedgerError> {
        self.read("isProjectEnded", || self.inner.is_project_ended(project))
            .await
    }

    async fn latest_seq(&self, project: &ProjectId) -> Result<u64, LedgerError> {
        self.read("latestSeq", || self.inner.latest_seq(project)).await
    }

    async fn submit_batch_vote(
        &self,
        project: &ProjectId,
        voter: &ParticipantAddress,
        sample_ids: &[SampleId],
        labels: &[String],
    ) -> Result<(), LedgerError> {
        self.write(
            "submitBatchVote",
            self.inner.submit_batch_vote(project, voter, sample_ids, labels),
        )
        .await
    }

    async fn start_batch_voting(
        &self,
        project: &ProjectId,
        caller: &ParticipantAddress,
        batch: &BatchStart,
    ) -> Result<(), LedgerError> {
        self.write(
            "startBatchVoting",
            self.inner.start_batch_voting(project, caller, batch),
        )
        .await
    }

    async fn end_batch_voting(
        &self,
        project: &ProjectId,
        caller: &ParticipantAddress,
        round: Round,
    ) -> Result<(), LedgerError> {
        self.write(
            "endBatchVoting",
            self.inner.end_batch_voting(project, caller, round),
        )
        .await
    }

    async fn subscribe(
        &self,
        project: &ProjectId,
        from_seq: u64,
    ) -> Result<LedgerSubscription, LedgerError> {
        let limit = self.timeouts.subscribe;
        tokio::time::timeout(limit, self.inner.subscribe(project, from_seq))
            .await
            .unwrap_or(Err(LedgerError::Timeout {
                operation: "subscribe",
                after: limit,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryLedger, ProjectSetup};
    use std::sync::Arc;

    fn wrapped(ledger: Arc<InMemoryLedger>, attempts: usize) -> RetryingLedger<Arc<InMemoryLedger>> {
        RetryingLedger::new(
            ledger,
            RetryPolicy::new(attempts, 10, 100, 0.0),
            LedgerTimeouts {
                read: Duration::from_millis(200),
                write: Duration::from_millis(200),
                subscribe: Duration::from_millis(200),
            },
        )
    }

    fn memory() -> Arc<InMemoryLedger> {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.add_project("p1", ProjectSetup::new("0xcoord").starting_at_round(4));
        ledger
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_retry_transparently() {
        let ledger = memory();
        ledger.fail_next_reads(2);
        let gateway = wrapped(ledger, 3);

        let round = gateway.current_round(&ProjectId::new("p1")).await.unwrap();
        assert_eq!(round, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_surface_after_exhaustion() {
        let ledger = memory();
        ledger.fail_next_reads(5);
        let gateway = wrapped(ledger, 3);

        let err = gateway.current_round(&ProjectId::new("p1")).await.unwrap_err();
        assert!(matches!(err, LedgerError::Unreachable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout_is_retried_then_reported() {
        let ledger = memory();
        ledger.set_read_delay(Some(Duration::from_secs(5)));
        let gateway = wrapped(ledger, 2);

        let err = gateway.voting_status(&ProjectId::new("p1")).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Timeout {
                operation: "isVotingActive",
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_first_attempt_is_retried() {
        let ledger = memory();
        ledger.stall_next_reads(1, Duration::from_secs(60));
        let gateway = wrapped(ledger, 3);

        let round = gateway.current_round(&ProjectId::new("p1")).await.unwrap();
        assert_eq!(round, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_read_errors_are_not_retried() {
        let gateway = wrapped(memory(), 5);
        let err = gateway
            .current_round(&ProjectId::new("unknown"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::UnknownProject(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_get_one_attempt() {
        let ledger = memory();
        ledger.reject_writes(Some("nonce too low"));
        let gateway = wrapped(ledger.clone(), 5);

        let err = gateway
            .end_batch_voting(&ProjectId::new("p1"), &ParticipantAddress::new("0xcoord"), 4)
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::Reverted(_)));
        assert_eq!(ledger.write_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_aborts_retries() {
        let ledger = memory();
        ledger.fail_next_reads(100);
        let token = CancellationToken::new();
        let gateway = RetryingLedger::new(
            ledger,
            RetryPolicy::new(100, 1_000, 1_000, 0.0),
            LedgerTimeouts::default(),
        )
        .with_cancellation(token.clone());

        token.cancel();
        let err = gateway.current_round(&ProjectId::new("p1")).await.unwrap_err();
        assert_eq!(err, LedgerError::Cancelled);
    }
}
