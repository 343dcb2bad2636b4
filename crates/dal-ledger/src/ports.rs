//! # Outbound Port
//!
//! The semantic operations the coordinator needs from the voting contract.
//! The contract ABI itself is an external artifact.

use crate::domain::{BatchStart, LedgerLog, VoteDistribution, VotingStatus};
use crate::error::LedgerError;
use async_trait::async_trait;
use dal_types::{ParticipantAddress, ProjectId, Round, SampleId};
use tokio::sync::mpsc;

/// Voting contract gateway.
///
/// Reads have no side effects. Writes are signed by `caller` and must never
/// be retried blindly.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// `getCurrentRound`
    async fn current_round(&self, project: &ProjectId) -> Result<Round, LedgerError>;

    /// `getBatchSampleIds`, in batch order.
    async fn batch_sample_ids(
        &self,
        project: &ProjectId,
        round: Round,
    ) -> Result<Vec<SampleId>, LedgerError>;

    /// `isVotingActive`
    async fn voting_status(&self, project: &ProjectId) -> Result<VotingStatus, LedgerError>;

    /// `getVotingDistribution`
    async fn voting_distribution(
        &self,
        project: &ProjectId,
        sample: &SampleId,
    ) -> Result<VoteDistribution, LedgerError>;

    /// Samples of `round` that reached consensus, in completion order.
    async fn completed_samples(
        &self,
        project: &ProjectId,
        round: Round,
    ) -> Result<Vec<SampleId>, LedgerError>;

    /// Consensus label, if voting on `sample` concluded.
    async fn final_label(
        &self,
        project: &ProjectId,
        sample: &SampleId,
    ) -> Result<Option<String>, LedgerError>;

    /// Explicit project end flag.
    async fn is_project_ended(&self, project: &ProjectId) -> Result<bool, LedgerError>;

    /// Sequence number of the newest event, `0` when none was emitted.
    async fn latest_seq(&self, project: &ProjectId) -> Result<u64, LedgerError>;

    /// `submitBatchVote` (write)
    async fn submit_batch_vote(
        &self,
        project: &ProjectId,
        voter: &ParticipantAddress,
        sample_ids: &[SampleId],
        labels: &[String],
    ) -> Result<(), LedgerError>;

    /// `startBatchVoting` (write, coordinator only). Opens the next round.
    async fn start_batch_voting(
        &self,
        project: &ProjectId,
        caller: &ParticipantAddress,
        batch: &BatchStart,
    ) -> Result<(), LedgerError>;

    /// `endBatchVoting` (write, coordinator only).
    async fn end_batch_voting(
        &self,
        project: &ProjectId,
        caller: &ParticipantAddress,
        round: Round,
    ) -> Result<(), LedgerError>;

    /// Stream contract events with `seq > from_seq`, in finalisation order.
    ///
    /// An `Err` item or the end of the stream means the subscription is lost
    /// and must be re-established.
    async fn subscribe(
        &self,
        project: &ProjectId,
        from_seq: u64,
    ) -> Result<LedgerSubscription, LedgerError>;
}

/// Receiving end of a ledger event subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct LedgerSubscription {
    receiver: mpsc::UnboundedReceiver<Result<LedgerLog, LedgerError>>,
}

impl LedgerSubscription {
    pub fn new(receiver: mpsc::UnboundedReceiver<Result<LedgerLog, LedgerError>>) -> Self {
        Self { receiver }
    }

    /// A connected pair, for adapters that push logs from elsewhere.
    pub fn channel() -> (mpsc::UnboundedSender<Result<LedgerLog, LedgerError>>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self::new(rx))
    }

    pub async fn next(&mut self) -> Option<Result<LedgerLog, LedgerError>> {
        self.receiver.recv().await
    }
}

#[async_trait]
impl<L: LedgerGateway + ?Sized> LedgerGateway for std::sync::Arc<L> {
    async fn current_round(&self, project: &ProjectId) -> Result<Round, LedgerError> {
        (**self).current_round(project).await
    }

    async fn batch_sample_ids(
        &self,
        project: &ProjectId,
        round: Round,
    ) -> Result<Vec<SampleId>, LedgerError> {
        (**self).batch_sample_ids(project, round).await
    }

    async fn voting_status(&self, project: &ProjectId) -> Result<VotingStatus, LedgerError> {
        (**self).voting_status(project).await
    }

    async fn voting_distribution(
        &self,
        project: &ProjectId,
        sample: &SampleId,
    ) -> Result<VoteDistribution, LedgerError> {
        (**self).voting_distribution(project, sample).await
    }

    async fn completed_samples(
        &self,
        project: &ProjectId,
        round: Round,
    ) -> Result<Vec<SampleId>, LedgerError> {
        (**self).completed_samples(project, round).await
    }

    async fn final_label(
        &self,
        project: &ProjectId,
        sample: &SampleId,
    ) -> Result<Option<String>, LedgerError> {
        (**self).final_label(project, sample).await
    }

    async fn is_project_ended(&self, project: &ProjectId) -> Result<bool, LedgerError> {
        (**self).is_project_ended(project).await
    }

    async fn latest_seq(&self, project: &ProjectId) -> Result<u64, LedgerError> {
        (**self).latest_seq(project).await
    }

    async fn submit_batch_vote(
        &self,
        project: &ProjectId,
        voter: &ParticipantAddress,
        sample_ids: &[SampleId],
        labels: &[String],
    ) -> Result<(), LedgerError> {
        (**self)
            .submit_batch_vote(project, voter, sample_ids, labels)
            .await
    }

    async fn start_batch_voting(
        &self,
        project: &ProjectId,
        caller: &ParticipantAddress,
        batch: &BatchStart,
    ) -> Result<(), LedgerError> {
        (**self).start_batch_voting(project, caller, batch).await
    }

    async fn end_batch_voting(
        &self,
        project: &ProjectId,
        caller: &ParticipantAddress,
        round: Round,
    ) -> Result<(), LedgerError> {
        (**self).end_batch_voting(project, caller, round).await
    }

    async fn subscribe(
        &self,
        project: &ProjectId,
        from_seq: u64,
    ) -> Result<LedgerSubscription, LedgerError> {
        (**self).subscribe(project, from_seq).await
    }
}
