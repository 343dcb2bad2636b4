//! Shared harness for session integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use dal_bus::{IterationEvent, SessionEvent, Subscription};
use dal_export::{ExportConfig, FileResultsExporter};
use dal_ledger::{
    BatchStart, InMemoryLedger, LedgerError, LedgerEvent, LedgerGateway, LedgerSubscription,
    ProjectSetup, VoteDistribution, VotingStatus,
};
use dal_session::{IterationSession, SessionConfig, SessionPorts};
use dal_training::MockTrainingService;
use dal_types::{
    ClassifiedError, ParticipantAddress, Phase, ProjectId, Role, Round, SampleId, SessionKey,
    SessionSnapshot,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const PROJECT: &str = "p1";
pub const COORDINATOR: &str = "0xcoord";
pub const CONTRIBUTOR: &str = "0xcontrib";

const WAIT: Duration = Duration::from_secs(5);

pub fn project() -> ProjectId {
    ProjectId::new(PROJECT)
}

pub fn ids(names: &[&str]) -> Vec<SampleId> {
    names.iter().map(|name| SampleId::new(*name)).collect()
}

pub fn batch(names: &[&str]) -> BatchStart {
    BatchStart {
        sample_ids: ids(names),
        data_hashes: names.iter().map(|name| format!("hash-{name}")).collect(),
        original_indices: (0..names.len() as u64).collect(),
    }
}

pub fn completed(round: Round, sample: &str) -> LedgerEvent {
    LedgerEvent::SampleCompleted {
        round,
        sample_id: SampleId::new(sample),
        final_label: "cat".into(),
    }
}

/// In-memory ledger whose `isVotingActive` answer can be pinned and whose
/// log history can be made unavailable to new subscriptions.
pub struct PinnedLedger {
    inner: Arc<InMemoryLedger>,
    status: Mutex<Option<VotingStatus>>,
    skip_replay: AtomicBool,
}

impl PinnedLedger {
    pub fn new(inner: Arc<InMemoryLedger>) -> Self {
        Self {
            inner,
            status: Mutex::new(None),
            skip_replay: AtomicBool::new(false),
        }
    }

    pub fn pin_status(&self, status: VotingStatus) {
        *self.status.lock() = Some(status);
    }

    /// Subscriptions start at the current head, like a node that pruned
    /// its logs: nothing missed while disconnected is replayed.
    pub fn skip_replay(&self, skip: bool) {
        self.skip_replay.store(skip, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerGateway for PinnedLedger {
    async fn current_round(&self, project: &ProjectId) -> Result<Round, LedgerError> {
        self.inner.current_round(project).await
    }

    async fn batch_sample_ids(
        &self,
        project: &ProjectId,
        round: Round,
    ) -> Result<Vec<SampleId>, LedgerError> {
        self.inner.batch_sample_ids(project, round).await
    }

    async fn voting_status(&self, project: &ProjectId) -> Result<VotingStatus, LedgerError> {
        let pinned = self.status.lock().clone();
        match pinned {
            Some(status) => Ok(status),
            None => self.inner.voting_status(project).await,
        }
    }

    async fn voting_distribution(
        &self,
        project: &ProjectId,
        sample: &SampleId,
    ) -> Result<VoteDistribution, LedgerError> {
        self.inner.voting_distribution(project, sample).await
    }

    async fn completed_samples(
        &self,
        project: &ProjectId,
        round: Round,
    ) -> Result<Vec<SampleId>, LedgerError> {
        self.inner.completed_samples(project, round).await
    }

    async fn final_label(
        &self,
        project: &ProjectId,
        sample: &SampleId,
    ) -> Result<Option<String>, LedgerError> {
        self.inner.final_label(project, sample).await
    }

    async fn is_project_ended(&self, project: &ProjectId) -> Result<bool, LedgerError> {
        self.inner.is_project_ended(project).await
    }

    async fn latest_seq(&self, project: &ProjectId) -> Result<u64, LedgerError> {
        self.inner.latest_seq(project).await
    }

    async fn submit_batch_vote(
        &self,
        project: &ProjectId,
        voter: &ParticipantAddress,
        sample_ids: &[SampleId],
        labels: &[String],
    ) -> Result<(), LedgerError> {
        self.inner
            .submit_batch_vote(project, voter, sample_ids, labels)
            .await
    }

    async fn start_batch_voting(
        &self,
        project: &ProjectId,
        caller: &ParticipantAddress,
        batch: &BatchStart,
    ) -> Result<(), LedgerError> {
        self.inner.start_batch_voting(project, caller, batch).await
    }

    async fn end_batch_voting(
        &self,
        project: &ProjectId,
        caller: &ParticipantAddress,
        round: Round,
    ) -> Result<(), LedgerError> {
        self.inner.end_batch_voting(project, caller, round).await
    }

    async fn subscribe(
        &self,
        project: &ProjectId,
        from_seq: u64,
    ) -> Result<LedgerSubscription, LedgerError> {
        let from_seq = if self.skip_replay.load(Ordering::SeqCst) {
            self.inner.latest_seq(project).await?
        } else {
            from_seq
        };
        self.inner.subscribe(project, from_seq).await
    }
}

/// One ledger, one training double, one export directory.
pub struct Harness {
    pub ledger: Arc<InMemoryLedger>,
    pub training: Arc<MockTrainingService>,
    pub exporter: Arc<FileResultsExporter>,
    pub config: SessionConfig,
    pub output: TempDir,
}

impl Harness {
    pub fn new(setup: ProjectSetup) -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.add_project(project(), setup);
        let output = tempfile::tempdir().unwrap();
        let exporter = Arc::new(FileResultsExporter::new(
            Arc::clone(&ledger) as Arc<dyn LedgerGateway>,
            ExportConfig {
                output_dir: output.path().to_path_buf(),
            },
        ));
        Self {
            ledger,
            training: Arc::new(MockTrainingService::new()),
            exporter,
            config: SessionConfig::for_testing(),
            output,
        }
    }

    /// Coordinator is the only voter.
    pub fn single_voter() -> Self {
        Self::new(ProjectSetup::new(COORDINATOR))
    }

    pub fn ports(&self) -> SessionPorts {
        self.ports_with(Arc::clone(&self.ledger) as Arc<dyn LedgerGateway>)
    }

    pub fn ports_with(&self, ledger: Arc<dyn LedgerGateway>) -> SessionPorts {
        SessionPorts::new(
            ledger,
            Arc::clone(&self.training) as _,
            Arc::clone(&self.exporter) as _,
        )
    }

    pub async fn open(&self, participant: &str, role: Role) -> IterationSession {
        self.open_with(self.ports(), participant, role).await
    }

    pub async fn open_with(
        &self,
        ports: SessionPorts,
        participant: &str,
        role: Role,
    ) -> IterationSession {
        IterationSession::open(
            SessionKey::new(PROJECT, participant),
            role,
            ports,
            self.config.clone(),
        )
        .await
        .unwrap()
    }

    pub async fn coordinator(&self) -> IterationSession {
        self.open(COORDINATOR, Role::Coordinator).await
    }

    pub async fn contributor(&self) -> IterationSession {
        self.open(CONTRIBUTOR, Role::Contributor).await
    }
}

pub async fn next_event(subscription: &mut Subscription) -> SessionEvent {
    tokio::time::timeout(WAIT, subscription.recv())
        .await
        .expect("no event within deadline")
        .expect("event stream closed")
}

/// Receive `StateChanged` snapshots until one is in `phase`.
pub async fn states_until(subscription: &mut Subscription, phase: Phase) -> Vec<SessionSnapshot> {
    let mut states = Vec::new();
    loop {
        if let IterationEvent::StateChanged(snapshot) = next_event(subscription).await.event {
            let reached = snapshot.phase == phase;
            states.push(snapshot);
            if reached {
                return states;
            }
        }
    }
}

/// Wait for the session's published state to satisfy `predicate`.
pub async fn wait_until(
    session: &IterationSession,
    predicate: impl Fn(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let mut watch = session.watch();
    tokio::time::timeout(WAIT, async {
        loop {
            let current = watch.borrow_and_update().clone();
            if predicate(&current) {
                return current;
            }
            watch.changed().await.expect("session closed while waiting");
        }
    })
    .await
    .expect("state not reached within deadline")
}

pub async fn wait_for_phase(session: &IterationSession, phase: Phase) -> SessionSnapshot {
    wait_until(session, |snapshot| snapshot.phase == phase).await
}

pub fn errors(events: &[SessionEvent]) -> Vec<ClassifiedError> {
    events
        .iter()
        .filter_map(|event| match &event.event {
            IterationEvent::Error(error) => Some(error.clone()),
            _ => None,
        })
        .collect()
}
