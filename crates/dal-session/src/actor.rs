//! The session's serialization point.
//!
//! Every command and every observation from the bridge and the monitor is
//! applied here, one at a time, so phase and batch progress need no locks.
//! Outbound calls are awaited inline, each bounded by a timeout and raced
//! against the session's cancellation token.

use crate::command::{bounded, Interrupted, SessionCommand, SessionInput};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::policy::{Disposition, ErrorPolicy};
use crate::session::SessionPorts;
use dal_bus::{EventPublisher, InMemoryEventBus, IterationEvent, SessionEvent};
use dal_export::ExportError;
use dal_ledger::{BatchStart, LedgerError, LedgerEvent};
use dal_telemetry::{
    metric_inc, DUPLICATE_COMPLETIONS, ITERATIONS_COMPLETED, SAMPLES_COMPLETED, SESSION_ERRORS,
};
use dal_training::{LabeledSample, TrainingError, TrainingPhase, TrainingStatus};
use dal_types::{
    BatchProgress, ClassifiedError, Phase, RetryError, Role, Round, SampleId, SessionKey,
    SessionSnapshot, Severity,
};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

pub(crate) struct SessionActor {
    key: SessionKey,
    role: Role,
    config: SessionConfig,
    ports: SessionPorts,
    snapshot: SessionSnapshot,
    /// Idempotency keys of the samples counted in the open batch.
    seen: HashSet<(Round, SampleId)>,
    /// Newest round whose voting is over. Never reopened.
    closed_round: Round,
    health_outage: bool,
    subscription_degraded: bool,
    end_announced: bool,
    event_seq: u64,
    bus: Arc<InMemoryEventBus>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    cancel: CancellationToken,
}

impl SessionActor {
    pub(crate) fn new(
        key: SessionKey,
        role: Role,
        config: SessionConfig,
        ports: SessionPorts,
        bus: Arc<InMemoryEventBus>,
        snapshot_tx: watch::Sender<SessionSnapshot>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            snapshot: SessionSnapshot::new(key.clone(), role),
            key,
            role,
            config,
            ports,
            seen: HashSet::new(),
            closed_round: 0,
            health_outage: false,
            subscription_degraded: false,
            end_announced: false,
            event_seq: 0,
            bus,
            snapshot_tx,
            cancel,
        }
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        debug!(phase = %self.snapshot.phase, round = self.snapshot.round, "Session actor started");
        loop {
            let command = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };
            self.handle(command).await;
        }
        debug!("Session actor stopped");
    }

    async fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::StartIteration { reply } => {
                let result = self.start_iteration().await;
                let _ = reply.send(result);
            }
            SessionCommand::EndRound { reply } => {
                let result = self.end_round().await;
                let _ = reply.send(result);
            }
            SessionCommand::Input { input, ack } => {
                trace!(input = input.name(), "Applying input");
                self.apply(input).await;
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
        }
    }

    async fn apply(&mut self, input: SessionInput) {
        match input {
            SessionInput::Ledger(event) => self.on_ledger_event(event).await,
            SessionInput::TrainingStatus(status) => self.on_training_status(status).await,
            SessionInput::Health { healthy } => self.on_health(healthy).await,
            SessionInput::SubscriptionDegraded { attempts, reason } => {
                if !self.subscription_degraded {
                    self.subscription_degraded = true;
                    let error = SessionError::SubscriptionDegraded { attempts, reason };
                    self.surface(&error).await;
                }
            }
            SessionInput::SubscriptionRestored => {
                if self.subscription_degraded {
                    info!("Ledger subscription restored");
                    self.subscription_degraded = false;
                }
                self.rehydrate_or_surface().await;
            }
        }
    }

    // =========================================================================
    // Coordinator commands
    // =========================================================================

    async fn start_iteration(&mut self) -> Result<Round, SessionError> {
        let result = self.try_start_iteration().await;
        if let Err(error) = &result {
            self.surface(error).await;
        }
        result
    }

    async fn try_start_iteration(&mut self) -> Result<Round, SessionError> {
        if !self.role.is_coordinator() {
            return Err(SessionError::PermissionDenied {
                action: "startIteration",
                role: self.role,
            });
        }
        let phase = self.snapshot.phase;
        if !phase.accepts_start() {
            return Err(SessionError::InvalidPhase {
                action: "start an iteration",
                phase,
            });
        }

        let ledger = Arc::clone(&self.ports.ledger);
        let status = self
            .read("isVotingActive", ledger.voting_status(&self.key.project))
            .await?;
        if status.active {
            return Err(SessionError::ConflictingRound {
                round: status.round,
                active_samples: status.active_samples,
                time_remaining_secs: status.time_remaining_secs,
            });
        }

        let finished = status.round.max(self.snapshot.round);
        self.transition(Phase::Starting).await;
        match self.open_round(finished).await {
            Ok(round) => Ok(round),
            Err(error) if error.is_cancelled() => Err(error),
            Err(error) => {
                // Training outages park the session in `error`; anything else
                // means the ledger never saw a new round.
                let fallback = match error {
                    SessionError::TrainingUnavailable { .. } => Phase::Error,
                    _ => Phase::Idle,
                };
                self.transition(fallback).await;
                Err(error)
            }
        }
    }

    /// Export, ask the training service for a batch, open it on the ledger.
    async fn open_round(&mut self, finished: Round) -> Result<Round, SessionError> {
        let project = self.key.project.clone();
        let exported = self.export_finished_rounds(finished).await?;

        let iteration = finished + 1;
        let training = Arc::clone(&self.ports.training);
        let plan = self
            .train(
                "start_iteration",
                training.start_iteration(&project, iteration, &exported),
            )
            .await?;
        if plan.round != iteration {
            warn!(requested = iteration, planned = plan.round, "Training service planned a different iteration");
        }

        let batch = BatchStart {
            sample_ids: plan.sample_ids(),
            data_hashes: plan.samples.iter().map(|s| s.data_hash.clone()).collect(),
            original_indices: plan.samples.iter().map(|s| s.original_index).collect(),
        };
        let ledger = Arc::clone(&self.ports.ledger);
        self.write(
            "startBatchVoting",
            ledger.start_batch_voting(&project, &self.key.participant, &batch),
        )
        .await?;

        // The ledger decides the round number.
        let round = match self.read("getCurrentRound", ledger.current_round(&project)).await {
            Ok(round) => round,
            Err(error) if error.is_cancelled() => return Err(error),
            Err(error) => {
                warn!(error = %error, planned = plan.round, "Could not confirm round, using planned round");
                plan.round
            }
        }
        .max(self.snapshot.round);
        if round != plan.round {
            warn!(ledger_round = round, planned = plan.round, "Ledger round differs from plan");
        }

        info!(round, samples = batch.len(), "Batch voting started");
        self.enter_voting(round, batch.sample_ids, &[]).await;
        Ok(round)
    }

    /// Export every finished round that has no artifact yet and return the
    /// full list of finished rounds.
    async fn export_finished_rounds(&self, finished: Round) -> Result<Vec<Round>, SessionError> {
        let exporter = Arc::clone(&self.ports.exporter);
        let project = &self.key.project;
        let existing = self.export(exporter.exported_rounds(project)).await?;
        for round in (1..=finished).filter(|round| !existing.contains(round)) {
            let records = self.export(exporter.export_round(project, round)).await?;
            debug!(round, records, "Exported finished round");
        }
        Ok((1..=finished).collect())
    }

    async fn end_round(&mut self) -> Result<(), SessionError> {
        let result = self.try_end_round().await;
        if let Err(error) = &result {
            self.surface(error).await;
        }
        result
    }

    async fn try_end_round(&mut self) -> Result<(), SessionError> {
        if !self.role.is_coordinator() {
            return Err(SessionError::PermissionDenied {
                action: "endRound",
                role: self.role,
            });
        }
        let Some(progress) = self.voting_progress().cloned() else {
            return Err(SessionError::InvalidPhase {
                action: "end the round",
                phase: self.snapshot.phase,
            });
        };

        let ledger = Arc::clone(&self.ports.ledger);
        self.write(
            "endBatchVoting",
            ledger.end_batch_voting(&self.key.project, &self.key.participant, progress.round()),
        )
        .await?;
        info!(
            round = progress.round(),
            completed = progress.completed_samples(),
            total = progress.total_samples(),
            "Round ended by coordinator"
        );
        Ok(())
    }

    // =========================================================================
    // Ledger observations
    // =========================================================================

    async fn on_ledger_event(&mut self, event: LedgerEvent) {
        match event {
            LedgerEvent::BatchVotingStarted { round, sample_ids } => {
                self.on_batch_started(round, sample_ids).await;
            }
            LedgerEvent::SampleCompleted {
                round,
                sample_id,
                final_label,
            } => self.on_sample_completed(round, sample_id, &final_label).await,
            LedgerEvent::BatchVotingEnded { round } => {
                match self.voting_progress() {
                    Some(progress) if progress.round() == round => {
                        info!(
                            round,
                            completed = progress.completed_samples(),
                            total = progress.total_samples(),
                            "Batch voting ended"
                        );
                        self.begin_aggregation(round).await;
                    }
                    _ => trace!(round, phase = %self.snapshot.phase, "BatchVotingEnded ignored"),
                }
            }
        }
    }

    async fn on_batch_started(&mut self, round: Round, sample_ids: Vec<SampleId>) {
        let phase = self.snapshot.phase;
        if phase.is_terminal() || round <= self.closed_round {
            trace!(round, closed = self.closed_round, %phase, "BatchVotingStarted for a closed round ignored");
            return;
        }
        let already_voting = self
            .voting_progress()
            .is_some_and(|progress| progress.round() >= round);
        let reopens_current = round == self.snapshot.round && matches!(phase, Phase::Idle | Phase::Error);
        if already_voting || (round <= self.snapshot.round && !reopens_current) {
            trace!(round, %phase, "BatchVotingStarted ignored");
            return;
        }

        let ledger = Arc::clone(&self.ports.ledger);
        if reopens_current {
            match self.read("isVotingActive", ledger.voting_status(&self.key.project)).await {
                Ok(status) if status.active && status.round == round => {}
                Ok(status) => {
                    debug!(round, ledger_round = status.round, active = status.active, "Round not active on the ledger, not reopening");
                    return;
                }
                Err(error) if error.is_cancelled() => return,
                Err(error) => {
                    debug!(error = %error, round, "Could not confirm round is active, not reopening");
                    return;
                }
            }
        }

        let completed = match self
            .read("getCompletedSamples", ledger.completed_samples(&self.key.project, round))
            .await
        {
            Ok(completed) => completed,
            Err(error) if error.is_cancelled() => return,
            Err(error) => {
                debug!(error = %error, round, "Completed samples unavailable, starting from zero");
                Vec::new()
            }
        };
        info!(round, samples = sample_ids.len(), "Observed new voting round");
        self.enter_voting(round, sample_ids, &completed).await;
    }

    async fn on_sample_completed(&mut self, round: Round, sample_id: SampleId, final_label: &str) {
        let Some(progress) = self.voting_progress().cloned() else {
            trace!(round, sample = %sample_id, "Completion outside voting ignored");
            return;
        };
        if progress.round() != round {
            debug!(round, open_round = progress.round(), sample = %sample_id, "Completion for another round ignored");
            return;
        }
        if !progress.contains(&sample_id) {
            warn!(round, sample = %sample_id, "Completion for a sample outside the batch ignored");
            return;
        }
        if !self.seen.insert((round, sample_id.clone())) {
            metric_inc!(DUPLICATE_COMPLETIONS);
            debug!(round, sample = %sample_id, "Duplicate completion, count unchanged");
            self.emit_state().await;
            return;
        }

        metric_inc!(SAMPLES_COMPLETED);
        let progress = progress.advanced(&sample_id);
        info!(
            round,
            sample = %sample_id,
            label = final_label,
            completed = progress.completed_samples(),
            total = progress.total_samples(),
            "Sample reached consensus"
        );
        let complete = progress.is_complete();
        self.snapshot.batch_progress = Some(progress);
        self.emit_state().await;
        if complete {
            self.begin_aggregation(round).await;
        }
    }

    // =========================================================================
    // Aggregation and training
    // =========================================================================

    async fn begin_aggregation(&mut self, round: Round) {
        self.closed_round = self.closed_round.max(round);
        self.transition(Phase::Aggregating).await;
        if !self.role.is_coordinator() {
            self.transition(Phase::Training).await;
            return;
        }

        match self.hand_off_round(round).await {
            Ok(accepted) => {
                info!(round, accepted, "Labels handed to training service");
                self.transition(Phase::Training).await;
            }
            Err(error) if error.is_cancelled() => {}
            Err(error) => {
                self.transition(Phase::Error).await;
                self.surface(&error).await;
            }
        }
    }

    /// Export `round`, read the artifact back and submit its labels.
    async fn hand_off_round(&self, round: Round) -> Result<usize, SessionError> {
        let project = &self.key.project;
        let exporter = Arc::clone(&self.ports.exporter);
        self.export(exporter.export_round(project, round)).await?;
        let labels: Vec<LabeledSample> = self
            .export(exporter.load_round(project, round))
            .await?
            .into_iter()
            .map(|record| LabeledSample {
                sample_id: record.sample_id,
                label: record.final_label,
            })
            .collect();

        let training = Arc::clone(&self.ports.training);
        let limit = self.config.submit_timeout;
        let labels = &labels;
        let outcome = self
            .config
            .submit_retry
            .run(&self.cancel, TrainingError::is_transient, |attempt| {
                let training = Arc::clone(&training);
                async move {
                    if attempt > 0 {
                        debug!(round, attempt, "Resubmitting labels");
                    }
                    match tokio::time::timeout(limit, training.submit_labels(project, round, labels)).await {
                        Ok(result) => result,
                        Err(_) => Err(TrainingError::Timeout {
                            endpoint: "/submit_labels",
                            after: limit,
                        }),
                    }
                }
            })
            .await;

        match outcome {
            Ok(accepted) => Ok(accepted),
            Err(RetryError::Cancelled)
            | Err(RetryError::Exhausted {
                error: TrainingError::Cancelled,
                ..
            }) => Err(SessionError::Cancelled),
            Err(RetryError::Exhausted { error, attempts }) => {
                warn!(round, attempts, error = %error, "Label submission gave up");
                Err(SessionError::TrainingUnavailable {
                    operation: "submit_labels",
                    source: error,
                })
            }
        }
    }

    async fn on_training_status(&mut self, status: TrainingStatus) {
        if self.snapshot.phase != Phase::Training {
            trace!(phase = %self.snapshot.phase, "Training status outside training ignored");
            return;
        }
        let round = self.snapshot.round;
        match status.phase {
            TrainingPhase::Completed if status.completes(round) => {
                self.finish_iteration(round, status.samples_labeled).await;
            }
            TrainingPhase::Failed if status.iteration.map_or(true, |it| it == round) => {
                self.transition(Phase::Error).await;
                let error = SessionError::TrainingUnavailable {
                    operation: "training",
                    source: TrainingError::Unavailable(format!("training of iteration {round} failed")),
                };
                self.surface(&error).await;
            }
            _ => trace!(round, phase = ?status.phase, "Training still in progress"),
        }
    }

    async fn finish_iteration(&mut self, round: Round, samples_labeled: usize) {
        metric_inc!(ITERATIONS_COMPLETED);
        info!(round, samples_labeled, "Iteration completed");
        self.publish(IterationEvent::IterationCompleted {
            round,
            samples_labeled,
        })
        .await;

        match self.end_condition(round).await {
            Some(reason) => self.end_project(reason, round, true).await,
            None => self.transition(Phase::Idle).await,
        }
    }

    async fn end_condition(&self, round: Round) -> Option<String> {
        if let Some(max) = self.config.max_rounds.filter(|_| self.config.round_limit_reached(round)) {
            return Some(format!("round {round} reached the maximum of {max} rounds"));
        }
        let ledger = Arc::clone(&self.ports.ledger);
        match self
            .read("isProjectEnded", ledger.is_project_ended(&self.key.project))
            .await
        {
            Ok(true) => Some("project marked as ended on the ledger".to_string()),
            Ok(false) => None,
            Err(error) => {
                warn!(error = %error, "Could not read project end flag");
                None
            }
        }
    }

    /// Move to `ended` and announce it once. `train_final` is set when this
    /// session trained the last round itself.
    async fn end_project(&mut self, reason: String, round: Round, train_final: bool) {
        self.transition(Phase::Ended).await;
        if self.end_announced {
            return;
        }
        self.end_announced = true;
        if train_final && self.role.is_coordinator() {
            self.final_training(round).await;
        }
        info!(round, reason = %reason, "Project should end");
        self.publish(IterationEvent::ProjectShouldEnd { reason, round })
            .await;
    }

    /// Closing pass over every labeled sample. A failure is surfaced like any
    /// training outage and never keeps the project open.
    async fn final_training(&mut self, round: Round) {
        let training = Arc::clone(&self.ports.training);
        let project = self.key.project.clone();
        match self
            .train("final_training", training.final_training(&project, round + 1))
            .await
        {
            Ok(model) => {
                info!(iteration = model.iteration, performance = ?model.performance, "Final training completed");
            }
            Err(error) if error.is_cancelled() => {}
            Err(error) => self.surface(&error).await,
        }
    }

    async fn on_health(&mut self, healthy: bool) {
        if healthy {
            if self.health_outage {
                info!("Training service healthy again");
                self.health_outage = false;
            }
            return;
        }
        if self.health_outage {
            trace!("Training service still unhealthy");
            return;
        }
        self.health_outage = true;
        let error = SessionError::TrainingUnavailable {
            operation: "health",
            source: TrainingError::Unavailable("health check failed".into()),
        };
        self.surface(&error).await;
    }

    // =========================================================================
    // Rehydration
    // =========================================================================

    async fn rehydrate_or_surface(&mut self) {
        if let Err(error) = self.rehydrate().await {
            self.surface(&error).await;
        }
    }

    /// Rebuild round, phase and batch progress from the ledger snapshot.
    pub(crate) async fn rehydrate(&mut self) -> Result<(), SessionError> {
        if self.snapshot.phase.is_terminal() {
            return Ok(());
        }
        let ledger = Arc::clone(&self.ports.ledger);
        let project = self.key.project.clone();

        let status = self.read("isVotingActive", ledger.voting_status(&project)).await?;
        if self.read("isProjectEnded", ledger.is_project_ended(&project)).await? {
            self.snapshot.round = self.snapshot.round.max(status.round);
            let round = self.snapshot.round;
            self.end_project("project marked as ended on the ledger".into(), round, false)
                .await;
            return Ok(());
        }

        if status.active && status.round >= self.snapshot.round {
            let sample_ids = self
                .read("getBatchSampleIds", ledger.batch_sample_ids(&project, status.round))
                .await?;
            let completed = self
                .read("getCompletedSamples", ledger.completed_samples(&project, status.round))
                .await?;
            info!(round = status.round, samples = sample_ids.len(), completed = completed.len(), "Rehydrated open batch");
            self.enter_voting(status.round, sample_ids, &completed).await;
            return Ok(());
        }

        if let Some(round) = self.voting_progress().map(BatchProgress::round) {
            info!(round, "Voting closed while disconnected");
            self.begin_aggregation(round).await;
        } else if status.round > self.snapshot.round {
            self.snapshot.round = status.round;
            self.emit_state().await;
        }
        if !status.active {
            self.closed_round = self.closed_round.max(status.round);
        }
        Ok(())
    }

    /// Newest ledger sequence number, read before rehydrating so the bridge
    /// can resume from there.
    pub(crate) async fn ledger_head(&self) -> Result<u64, SessionError> {
        let ledger = Arc::clone(&self.ports.ledger);
        self.read("latestSeq", ledger.latest_seq(&self.key.project))
            .await
    }

    // =========================================================================
    // State and events
    // =========================================================================

    fn voting_progress(&self) -> Option<&BatchProgress> {
        match self.snapshot.phase {
            Phase::Voting => self.snapshot.batch_progress.as_ref(),
            _ => None,
        }
    }

    async fn enter_voting(&mut self, round: Round, sample_ids: Vec<SampleId>, completed: &[SampleId]) {
        self.seen.clear();
        for sample in completed.iter().filter(|sample| sample_ids.contains(*sample)) {
            self.seen.insert((round, sample.clone()));
        }
        let progress = BatchProgress::with_completed(round, sample_ids, self.seen.len());
        let complete = progress.is_complete();

        self.snapshot.round = round;
        self.snapshot.phase = Phase::Voting;
        self.snapshot.batch_progress = Some(progress);
        self.snapshot.last_error = None;
        debug!(round, "Phase transition to voting");
        self.emit_state().await;

        if complete {
            self.begin_aggregation(round).await;
        }
    }

    async fn transition(&mut self, phase: Phase) {
        let from = self.snapshot.phase;
        if phase != Phase::Voting {
            self.snapshot.batch_progress = None;
        }
        self.snapshot.phase = phase;
        debug!(%from, to = %phase, round = self.snapshot.round, "Phase transition");
        self.emit_state().await;
    }

    async fn emit_state(&mut self) {
        self.snapshot_tx.send_replace(self.snapshot.clone());
        self.publish(IterationEvent::StateChanged(self.snapshot.clone()))
            .await;
    }

    async fn publish(&mut self, event: IterationEvent) {
        if self.cancel.is_cancelled() {
            trace!(event = event.name(), "Session ending, event dropped");
            return;
        }
        self.event_seq += 1;
        self.bus
            .publish(SessionEvent {
                session: self.key.clone(),
                seq: self.event_seq,
                event,
            })
            .await;
    }

    /// Apply the role policy to a failed operation.
    async fn surface(&mut self, failure: &SessionError) {
        let Some(class) = failure.class() else {
            return;
        };
        metric_inc!(SESSION_ERRORS, &[class.as_str()]);

        match ErrorPolicy::disposition(self.role, class) {
            Disposition::Suppress => {
                debug!(%class, error = %failure, "Error suppressed for role");
            }
            Disposition::Surface(severity) => {
                match severity {
                    Severity::Blocking => error!(%class, error = %failure, "Session error"),
                    Severity::Warning => warn!(%class, error = %failure, "Session warning"),
                }
                let classified = ClassifiedError::new(class, severity, failure.to_string())
                    .in_round(self.snapshot.round);
                self.snapshot.last_error = Some(classified.clone());
                self.publish(IterationEvent::Error(classified)).await;
                self.emit_state().await;
            }
        }
    }

    // =========================================================================
    // Bounded outbound calls
    // =========================================================================

    async fn read<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, LedgerError>>,
    ) -> Result<T, SessionError> {
        match bounded(&self.cancel, self.config.ledger_read_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(LedgerError::Cancelled)) | Err(Interrupted::Cancelled) => {
                Err(SessionError::Cancelled)
            }
            Ok(Err(source)) => Err(SessionError::LedgerRead { operation, source }),
            Err(Interrupted::TimedOut(after)) => Err(SessionError::LedgerRead {
                operation,
                source: LedgerError::Timeout { operation, after },
            }),
        }
    }

    async fn write(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<(), LedgerError>>,
    ) -> Result<(), SessionError> {
        match bounded(&self.cancel, self.config.ledger_write_timeout, call).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(LedgerError::Cancelled)) | Err(Interrupted::Cancelled) => {
                Err(SessionError::Cancelled)
            }
            Ok(Err(source)) => Err(SessionError::LedgerWrite { operation, source }),
            Err(Interrupted::TimedOut(after)) => Err(SessionError::LedgerWrite {
                operation,
                source: LedgerError::Timeout { operation, after },
            }),
        }
    }

    async fn train<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, TrainingError>>,
    ) -> Result<T, SessionError> {
        match bounded(&self.cancel, self.config.training_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(TrainingError::Cancelled)) | Err(Interrupted::Cancelled) => {
                Err(SessionError::Cancelled)
            }
            Ok(Err(source)) => Err(SessionError::TrainingUnavailable { operation, source }),
            Err(Interrupted::TimedOut(after)) => Err(SessionError::TrainingUnavailable {
                operation,
                source: TrainingError::Timeout {
                    endpoint: operation,
                    after,
                },
            }),
        }
    }

    async fn export<T>(
        &self,
        call: impl Future<Output = Result<T, ExportError>>,
    ) -> Result<T, SessionError> {
        match bounded(&self.cancel, self.config.export_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(ExportError::Ledger(LedgerError::Cancelled))) | Err(Interrupted::Cancelled) => {
                Err(SessionError::Cancelled)
            }
            Ok(Err(source)) => Err(SessionError::Export(source)),
            Err(Interrupted::TimedOut(after)) => Err(SessionError::Export(ExportError::Ledger(
                LedgerError::Timeout {
                    operation: "export",
                    after,
                },
            ))),
        }
    }
}
