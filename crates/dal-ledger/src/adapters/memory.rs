//! In-process simulation of the voting contract.
//!
//! Consensus is a simple majority, reached once every registered voter has
//! voted on a sample. When the last sample of a batch reaches consensus the
//! batch closes and `BatchVotingEnded` is emitted, as the contract does.
//!
//! Fault injection covers what the coordinator has to survive: failing or
//! slow reads, rejected writes, dropped subscriptions and redelivered logs.

use crate::domain::{BatchStart, LedgerEvent, LedgerLog, VoteDistribution, VotingStatus};
use crate::error::LedgerError;
use crate::ports::{LedgerGateway, LedgerSubscription};
use async_trait::async_trait;
use dal_types::{ParticipantAddress, ProjectId, Round, SampleId};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tracing::debug;

/// Initial contract state for one project.
#[derive(Debug, Clone)]
pub struct ProjectSetup {
    pub coordinator: ParticipantAddress,
    pub voters: Vec<ParticipantAddress>,
    pub initial_round: Round,
    pub voting_timeout: Duration,
}

impl ProjectSetup {
    /// The coordinator is also the only voter until more are added.
    pub fn new(coordinator: impl Into<ParticipantAddress>) -> Self {
        let coordinator = coordinator.into();
        Self {
            voters: vec![coordinator.clone()],
            coordinator,
            initial_round: 0,
            voting_timeout: Duration::from_secs(600),
        }
    }

    pub fn with_voters<I, A>(mut self, voters: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<ParticipantAddress>,
    {
        self.voters = voters.into_iter().map(Into::into).collect();
        self
    }

    pub fn starting_at_round(mut self, round: Round) -> Self {
        self.initial_round = round;
        self
    }

    pub fn with_voting_timeout(mut self, timeout: Duration) -> Self {
        self.voting_timeout = timeout;
        self
    }
}

/// A write call as it reached the contract, accepted or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedWrite {
    SubmitBatchVote {
        project: ProjectId,
        voter: ParticipantAddress,
        samples: usize,
    },
    StartBatchVoting {
        project: ProjectId,
        caller: ParticipantAddress,
        samples: usize,
    },
    EndBatchVoting {
        project: ProjectId,
        caller: ParticipantAddress,
        round: Round,
    },
}

type LogSender = UnboundedSender<Result<LedgerLog, LedgerError>>;

struct ProjectState {
    setup: ProjectSetup,
    round: Round,
    active: bool,
    deadline: Option<Instant>,
    ended: bool,
    batches: HashMap<Round, BatchStart>,
    votes: HashMap<SampleId, BTreeMap<ParticipantAddress, String>>,
    final_labels: HashMap<SampleId, String>,
    completed: HashMap<Round, Vec<SampleId>>,
    logs: Vec<LedgerLog>,
    subscribers: Vec<LogSender>,
}

impl ProjectState {
    fn new(setup: ProjectSetup) -> Self {
        Self {
            round: setup.initial_round,
            setup,
            active: false,
            deadline: None,
            ended: false,
            batches: HashMap::new(),
            votes: HashMap::new(),
            final_labels: HashMap::new(),
            completed: HashMap::new(),
            logs: Vec::new(),
            subscribers: Vec::new(),
        }
    }

    fn emit(&mut self, event: LedgerEvent) -> u64 {
        let seq = self.logs.last().map_or(1, |log| log.seq + 1);
        let log = LedgerLog { seq, event };
        debug!(%log, "Ledger event");
        self.subscribers.retain(|tx| tx.send(Ok(log.clone())).is_ok());
        self.logs.push(log);
        seq
    }

    fn current_batch(&self) -> Option<&BatchStart> {
        self.batches.get(&self.round)
    }

    fn open_samples(&self) -> usize {
        let total = self.current_batch().map_or(0, BatchStart::len);
        let done = self.completed.get(&self.round).map_or(0, Vec::len);
        total.saturating_sub(done)
    }

    fn require_coordinator(&self, caller: &ParticipantAddress) -> Result<(), LedgerError> {
        if *caller == self.setup.coordinator {
            Ok(())
        } else {
            Err(LedgerError::SignatureRejected(format!(
                "{caller} is not the project coordinator"
            )))
        }
    }

    fn finalize(&mut self, sample: &SampleId, label: String) {
        if self.final_labels.contains_key(sample) {
            return;
        }
        let round = self.round;
        self.final_labels.insert(sample.clone(), label.clone());
        self.completed.entry(round).or_default().push(sample.clone());
        self.emit(LedgerEvent::SampleCompleted {
            round,
            sample_id: sample.clone(),
            final_label: label,
        });

        if self.active && self.open_samples() == 0 {
            self.close_batch();
        }
    }

    fn close_batch(&mut self) {
        self.active = false;
        self.deadline = None;
        let round = self.round;
        self.emit(LedgerEvent::BatchVotingEnded { round });
    }
}

#[derive(Default)]
struct Faults {
    failing_reads: usize,
    failing_subscribes: usize,
    rejected_writes: Option<String>,
    read_delay: Option<Duration>,
    stalled_reads: usize,
    stall: Duration,
}

/// In-memory voting contract.
#[derive(Default)]
pub struct InMemoryLedger {
    projects: Mutex<HashMap<ProjectId, ProjectState>>,
    faults: Mutex<Faults>,
    writes: Mutex<Vec<RecordedWrite>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_project(&self, project: impl Into<ProjectId>, setup: ProjectSetup) {
        self.projects
            .lock()
            .insert(project.into(), ProjectState::new(setup));
    }

    // ---------------------------------------------------------------------
    // Fault injection
    // ---------------------------------------------------------------------

    /// The next `count` reads fail with `Unreachable`.
    pub fn fail_next_reads(&self, count: usize) {
        self.faults.lock().failing_reads = count;
    }

    /// The next `count` subscribe calls fail with `Unreachable`.
    pub fn fail_next_subscribes(&self, count: usize) {
        self.faults.lock().failing_subscribes = count;
    }

    /// Reject every write with `Reverted(reason)` until cleared with `None`.
    pub fn reject_writes(&self, reason: Option<&str>) {
        self.faults.lock().rejected_writes = reason.map(str::to_string);
    }

    /// Delay every read by `delay`.
    pub fn set_read_delay(&self, delay: Option<Duration>) {
        self.faults.lock().read_delay = delay;
    }

    /// The next `count` reads hang for `stall` before answering.
    pub fn stall_next_reads(&self, count: usize, stall: Duration) {
        let mut faults = self.faults.lock();
        faults.stalled_reads = count;
        faults.stall = stall;
    }

    /// Break every live subscription of `project`, as a node restart would.
    pub fn disconnect_subscribers(&self, project: &ProjectId) {
        if let Some(state) = self.projects.lock().get_mut(project) {
            for tx in state.subscribers.drain(..) {
                let _ = tx.send(Err(LedgerError::Unreachable("connection reset".into())));
            }
        }
    }

    /// Deliver an already-emitted log again to every live subscriber.
    pub fn redeliver(&self, project: &ProjectId, seq: u64) -> bool {
        let mut projects = self.projects.lock();
        let Some(state) = projects.get_mut(project) else {
            return false;
        };
        let Some(log) = state.logs.iter().find(|log| log.seq == seq).cloned() else {
            return false;
        };
        state.subscribers.retain(|tx| tx.send(Ok(log.clone())).is_ok());
        true
    }

    // ---------------------------------------------------------------------
    // Direct contract manipulation
    // ---------------------------------------------------------------------

    /// Append a raw event with a fresh sequence number, bypassing contract
    /// rules. Returns the sequence number.
    pub fn append_event(&self, project: &ProjectId, event: LedgerEvent) -> Option<u64> {
        self.projects
            .lock()
            .get_mut(project)
            .map(|state| state.emit(event))
    }

    /// Conclude voting on `sample` in the open batch with `label`.
    pub fn complete_sample(&self, project: &ProjectId, sample: &SampleId, label: &str) -> bool {
        let mut projects = self.projects.lock();
        let Some(state) = projects.get_mut(project) else {
            return false;
        };
        let in_batch = state
            .current_batch()
            .is_some_and(|batch| batch.sample_ids.contains(sample));
        if !state.active || !in_batch {
            return false;
        }
        state.finalize(sample, label.to_string());
        true
    }

    pub fn set_project_ended(&self, project: &ProjectId, ended: bool) {
        if let Some(state) = self.projects.lock().get_mut(project) {
            state.ended = ended;
        }
    }

    // ---------------------------------------------------------------------
    // Inspection
    // ---------------------------------------------------------------------

    pub fn write_calls(&self) -> Vec<RecordedWrite> {
        self.writes.lock().clone()
    }

    pub fn logs(&self, project: &ProjectId) -> Vec<LedgerLog> {
        self.projects
            .lock()
            .get(project)
            .map(|state| state.logs.clone())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, project: &ProjectId) -> usize {
        self.projects
            .lock()
            .get_mut(project)
            .map(|state| {
                state.subscribers.retain(|tx| !tx.is_closed());
                state.subscribers.len()
            })
            .unwrap_or(0)
    }

    // ---------------------------------------------------------------------

    async fn read_fault(&self) -> Result<(), LedgerError> {
        let delay = {
            let mut faults = self.faults.lock();
            if faults.stalled_reads > 0 {
                faults.stalled_reads -= 1;
                Some(faults.stall)
            } else {
                faults.read_delay
            }
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut faults = self.faults.lock();
        if faults.failing_reads > 0 {
            faults.failing_reads -= 1;
            return Err(LedgerError::Unreachable("injected read failure".into()));
        }
        Ok(())
    }

    fn write_fault(&self, write: RecordedWrite) -> Result<(), LedgerError> {
        self.writes.lock().push(write);
        match &self.faults.lock().rejected_writes {
            Some(reason) => Err(LedgerError::Reverted(reason.clone())),
            None => Ok(()),
        }
    }

    fn read<T>(
        &self,
        project: &ProjectId,
        f: impl FnOnce(&ProjectState) -> T,
    ) -> Result<T, LedgerError> {
        self.projects
            .lock()
            .get(project)
            .map(f)
            .ok_or_else(|| LedgerError::UnknownProject(project.to_string()))
    }

    fn write<T>(
        &self,
        project: &ProjectId,
        f: impl FnOnce(&mut ProjectState) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let mut projects = self.projects.lock();
        let state = projects
            .get_mut(project)
            .ok_or_else(|| LedgerError::UnknownProject(project.to_string()))?;
        f(state)
    }
}

#[async_trait]
impl LedgerGateway for InMemoryLedger {
    async fn current_round(&self, project: &ProjectId) -> Result<Round, LedgerError> {
        self.read_fault().await?;
        self.read(project, |state| state.round)
    }

    async fn batch_sample_ids(
        &self,
        project: &ProjectId,
        round: Round,
    ) -> Result<Vec<SampleId>, LedgerError> {
        self.read_fault().await?;
        self.read(project, |state| {
            state
                .batches
                .get(&round)
                .map(|batch| batch.sample_ids.clone())
                .unwrap_or_default()
        })
    }

    async fn voting_status(&self, project: &ProjectId) -> Result<VotingStatus, LedgerError> {
        self.read_fault().await?;
        self.read(project, |state| {
            if !state.active {
                return VotingStatus::inactive(state.round);
            }
            let remaining = state
                .deadline
                .map(|deadline| deadline.saturating_duration_since(Instant::now()))
                .unwrap_or_default();
            VotingStatus {
                active: true,
                round: state.round,
                active_samples: state.open_samples(),
                time_remaining_secs: remaining.as_millis().div_ceil(1000) as u64,
            }
        })
    }

    async fn voting_distribution(
        &self,
        project: &ProjectId,
        sample: &SampleId,
    ) -> Result<VoteDistribution, LedgerError> {
        self.read_fault().await?;
        self.read(project, |state| {
            let mut dist = VoteDistribution::default();
            if let Some(votes) = state.votes.get(sample) {
                for label in votes.values() {
                    *dist.votes.entry(label.clone()).or_insert(0) += 1;
                }
            }
            dist
        })
    }

    async fn completed_samples(
        &self,
        project: &ProjectId,
        round: Round,
    ) -> Result<Vec<SampleId>, LedgerError> {
        self.read_fault().await?;
        self.read(project, |state| {
            state.completed.get(&round).cloned().unwrap_or_default()
        })
    }

    async fn final_label(
        &self,
        project: &ProjectId,
        sample: &SampleId,
    ) -> Result<Option<String>, LedgerError> {
        self.read_fault().await?;
        self.read(project, |state| state.final_labels.get(sample).cloned())
    }

    async fn is_project_ended(&self, project: &ProjectId) -> Result<bool, LedgerError> {
        self.read_fault().await?;
        self.read(project, |state| state.ended)
    }

    async fn latest_seq(&self, project: &ProjectId) -> Result<u64, LedgerError> {
        self.read_fault().await?;
        self.read(project, |state| state.logs.last().map_or(0, |log| log.seq))
    }

    async fn submit_batch_vote(
        &self,
        project: &ProjectId,
        voter: &ParticipantAddress,
        sample_ids: &[SampleId],
        labels: &[String],
    ) -> Result<(), LedgerError> {
        self.write_fault(RecordedWrite::SubmitBatchVote {
            project: project.clone(),
            voter: voter.clone(),
            samples: sample_ids.len(),
        })?;
        self.write(project, |state| {
            if !state.setup.voters.contains(voter) {
                return Err(LedgerError::SignatureRejected(format!(
                    "{voter} is not a registered voter"
                )));
            }
            if !state.active {
                return Err(LedgerError::Reverted("no active batch".into()));
            }
            if sample_ids.len() != labels.len() {
                return Err(LedgerError::Reverted("sample/label length mismatch".into()));
            }
            let batch = state.current_batch().cloned().unwrap_or_default();
            if let Some(stray) = sample_ids.iter().find(|id| !batch.sample_ids.contains(id)) {
                return Err(LedgerError::Reverted(format!("{stray} is not in the active batch")));
            }
            if sample_ids
                .iter()
                .any(|id| state.votes.get(id).is_some_and(|v| v.contains_key(voter)))
            {
                return Err(LedgerError::Reverted(format!("{voter} already voted")));
            }

            for (sample, label) in sample_ids.iter().zip(labels) {
                state
                    .votes
                    .entry(sample.clone())
                    .or_default()
                    .insert(voter.clone(), label.clone());
            }

            let voters = state.setup.voters.len();
            for sample in sample_ids {
                let Some(votes) = state.votes.get(sample) else {
                    continue;
                };
                if votes.len() < voters {
                    continue;
                }
                let mut dist = VoteDistribution::default();
                for label in votes.values() {
                    *dist.votes.entry(label.clone()).or_insert(0) += 1;
                }
                if let Some(label) = dist.leader().map(str::to_string) {
                    state.finalize(sample, label);
                }
            }
            Ok(())
        })
    }

    async fn start_batch_voting(
        &self,
        project: &ProjectId,
        caller: &ParticipantAddress,
        batch: &BatchStart,
    ) -> Result<(), LedgerError> {
        self.write_fault(RecordedWrite::StartBatchVoting {
            project: project.clone(),
            caller: caller.clone(),
            samples: batch.len(),
        })?;
        self.write(project, |state| {
            state.require_coordinator(caller)?;
            if state.ended {
                return Err(LedgerError::Reverted("project has ended".into()));
            }
            if state.active {
                return Err(LedgerError::Reverted("batch voting already active".into()));
            }
            if !batch.is_well_formed() {
                return Err(LedgerError::Reverted("batch arrays differ in length".into()));
            }

            state.round += 1;
            let round = state.round;
            state.batches.insert(round, batch.clone());
            state.active = true;
            state.deadline = Some(Instant::now() + state.setup.voting_timeout);
            state.emit(LedgerEvent::BatchVotingStarted {
                round,
                sample_ids: batch.sample_ids.clone(),
            });
            if batch.is_empty() {
                state.close_batch();
            }
            Ok(())
        })
    }

    async fn end_batch_voting(
        &self,
        project: &ProjectId,
        caller: &ParticipantAddress,
        round: Round,
    ) -> Result<(), LedgerError> {
        self.write_fault(RecordedWrite::EndBatchVoting {
            project: project.clone(),
            caller: caller.clone(),
            round,
        })?;
        self.write(project, |state| {
            state.require_coordinator(caller)?;
            if !state.active || state.round != round {
                return Err(LedgerError::Reverted(format!(
                    "round {round} has no active batch"
                )));
            }
            state.close_batch();
            Ok(())
        })
    }

    async fn subscribe(
        &self,
        project: &ProjectId,
        from_seq: u64,
    ) -> Result<LedgerSubscription, LedgerError> {
        {
            let mut faults = self.faults.lock();
            if faults.failing_subscribes > 0 {
                faults.failing_subscribes -= 1;
                return Err(LedgerError::Unreachable("injected subscribe failure".into()));
            }
        }
        self.write(project, |state| {
            let (tx, subscription) = LedgerSubscription::channel();
            for log in state.logs.iter().filter(|log| log.seq > from_seq) {
                let _ = tx.send(Ok(log.clone()));
            }
            state.subscribers.push(tx);
            Ok(subscription)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> ProjectId {
        ProjectId::new("p1")
    }

    fn batch(ids: &[&str]) -> BatchStart {
        BatchStart {
            sample_ids: ids.iter().map(|id| SampleId::new(*id)).collect(),
            data_hashes: ids.iter().map(|id| format!("hash-{id}")).collect(),
            original_indices: (0..ids.len() as u64).collect(),
        }
    }

    fn ledger() -> InMemoryLedger {
        let ledger = InMemoryLedger::new();
        ledger.add_project(
            "p1",
            ProjectSetup::new("0xcoord").with_voters(["0xcoord", "0xv1", "0xv2"]),
        );
        ledger
    }

    #[tokio::test]
    async fn test_start_batch_opens_next_round() {
        let ledger = ledger();
        let coord = ParticipantAddress::new("0xcoord");

        ledger
            .start_batch_voting(&project(), &coord, &batch(&["s1", "s2"]))
            .await
            .unwrap();

        assert_eq!(ledger.current_round(&project()).await.unwrap(), 1);
        let status = ledger.voting_status(&project()).await.unwrap();
        assert!(status.active);
        assert_eq!(status.active_samples, 2);
        assert_eq!(
            ledger.batch_sample_ids(&project(), 1).await.unwrap(),
            vec![SampleId::new("s1"), SampleId::new("s2")]
        );
    }

    #[tokio::test]
    async fn test_non_coordinator_cannot_start() {
        let ledger = ledger();
        let err = ledger
            .start_batch_voting(&project(), &ParticipantAddress::new("0xv1"), &batch(&["s1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::SignatureRejected(_)));
        assert_eq!(ledger.current_round(&project()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_overlapping_batches_revert() {
        let ledger = ledger();
        let coord = ParticipantAddress::new("0xcoord");
        ledger
            .start_batch_voting(&project(), &coord, &batch(&["s1"]))
            .await
            .unwrap();

        let err = ledger
            .start_batch_voting(&project(), &coord, &batch(&["s2"]))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Reverted(_)));
    }

    #[tokio::test]
    async fn test_majority_consensus_after_all_voters() {
        let ledger = ledger();
        let p = project();
        ledger
            .start_batch_voting(&p, &ParticipantAddress::new("0xcoord"), &batch(&["s1"]))
            .await
            .unwrap();

        let s1 = [SampleId::new("s1")];
        for (voter, label) in [("0xcoord", "cat"), ("0xv1", "dog")] {
            ledger
                .submit_batch_vote(&p, &ParticipantAddress::new(voter), &s1, &[label.to_string()])
                .await
                .unwrap();
        }
        assert_eq!(ledger.final_label(&p, &s1[0]).await.unwrap(), None);

        ledger
            .submit_batch_vote(&p, &ParticipantAddress::new("0xv2"), &s1, &["dog".to_string()])
            .await
            .unwrap();

        assert_eq!(ledger.final_label(&p, &s1[0]).await.unwrap().as_deref(), Some("dog"));
        assert_eq!(ledger.completed_samples(&p, 1).await.unwrap(), s1.to_vec());
        assert!(!ledger.voting_status(&p).await.unwrap().active);

        let names: Vec<_> = ledger.logs(&p).iter().map(|log| log.event.name()).collect();
        assert_eq!(
            names,
            vec!["BatchVotingStarted", "SampleCompleted", "BatchVotingEnded"]
        );
    }

    #[tokio::test]
    async fn test_subscribe_backfills_after_seq() {
        let ledger = ledger();
        let p = project();
        ledger
            .start_batch_voting(&p, &ParticipantAddress::new("0xcoord"), &batch(&["s1", "s2"]))
            .await
            .unwrap();
        ledger.complete_sample(&p, &SampleId::new("s1"), "cat");

        let mut sub = ledger.subscribe(&p, 1).await.unwrap();
        let log = sub.next().await.unwrap().unwrap();
        assert_eq!(log.seq, 2);
        assert!(matches!(log.event, LedgerEvent::SampleCompleted { .. }));

        ledger.complete_sample(&p, &SampleId::new("s2"), "dog");
        assert_eq!(sub.next().await.unwrap().unwrap().seq, 3);
        assert_eq!(sub.next().await.unwrap().unwrap().seq, 4);
    }

    #[tokio::test]
    async fn test_latest_seq_tracks_head() {
        let ledger = ledger();
        let p = project();
        assert_eq!(ledger.latest_seq(&p).await.unwrap(), 0);

        ledger
            .start_batch_voting(&p, &ParticipantAddress::new("0xcoord"), &batch(&["s1"]))
            .await
            .unwrap();
        assert_eq!(ledger.latest_seq(&p).await.unwrap(), 1);

        ledger.complete_sample(&p, &SampleId::new("s1"), "cat");
        assert_eq!(ledger.latest_seq(&p).await.unwrap(), 3);
        assert!(matches!(
            ledger.latest_seq(&ProjectId::new("nope")).await,
            Err(LedgerError::UnknownProject(_))
        ));
    }

    #[tokio::test]
    async fn test_disconnect_and_redelivery() {
        let ledger = ledger();
        let p = project();
        ledger
            .start_batch_voting(&p, &ParticipantAddress::new("0xcoord"), &batch(&["s1"]))
            .await
            .unwrap();

        let mut sub = ledger.subscribe(&p, 0).await.unwrap();
        assert_eq!(sub.next().await.unwrap().unwrap().seq, 1);
        assert!(ledger.redeliver(&p, 1));
        assert_eq!(sub.next().await.unwrap().unwrap().seq, 1);

        ledger.disconnect_subscribers(&p);
        assert!(sub.next().await.unwrap().is_err());
        assert!(sub.next().await.is_none());
        assert_eq!(ledger.subscriber_count(&p), 0);
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let ledger = ledger();
        let p = project();

        ledger.fail_next_reads(1);
        assert!(ledger.current_round(&p).await.is_err());
        assert!(ledger.current_round(&p).await.is_ok());

        ledger.reject_writes(Some("out of gas"));
        let err = ledger
            .end_batch_voting(&p, &ParticipantAddress::new("0xcoord"), 0)
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::Reverted("out of gas".into()));
        assert_eq!(ledger.write_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_remaining_counts_down() {
        let ledger = InMemoryLedger::new();
        ledger.add_project(
            "p1",
            ProjectSetup::new("0xcoord").with_voting_timeout(Duration::from_secs(120)),
        );
        ledger
            .start_batch_voting(&project(), &ParticipantAddress::new("0xcoord"), &batch(&["s1"]))
            .await
            .unwrap();

        assert_eq!(
            ledger.voting_status(&project()).await.unwrap().time_remaining_secs,
            120
        );
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(
            ledger.voting_status(&project()).await.unwrap().time_remaining_secs,
            90
        );
    }
}
