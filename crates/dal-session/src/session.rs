//! `IterationSession`: the handle owned by whoever opened the project view.
//!
//! Opening a session rebuilds its state from the ledger and spawns three
//! tasks sharing one cancellation token:
//!
//! ```text
//!   EventBridge ──┐
//!                 ├──→ mpsc ──→ SessionActor ──→ InMemoryEventBus ──→ subscribers
//!   TrainingMonitor┘                 │
//!                                    └──→ watch (latest snapshot)
//! ```
//!
//! `end()` cancels the token, waits for all three tasks and closes the bus;
//! nothing is delivered to any subscriber after it returns.

use crate::actor::SessionActor;
use crate::bridge::EventBridge;
use crate::command::{Reply, SessionCommand, SessionInput};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::monitor::{check_health, TrainingMonitor};
use dal_bus::{EventFilter, InMemoryEventBus, Subscription};
use dal_export::ResultsExporter;
use dal_ledger::{LedgerEvent, LedgerGateway};
use dal_telemetry::session_span;
use dal_training::{TrainingService, TrainingStatus};
use dal_types::{Role, Round, SessionKey, SessionSnapshot};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Instrument};

/// The three external collaborators of a session.
#[derive(Clone)]
pub struct SessionPorts {
    pub ledger: Arc<dyn LedgerGateway>,
    pub training: Arc<dyn TrainingService>,
    pub exporter: Arc<dyn ResultsExporter>,
}

impl SessionPorts {
    pub fn new(
        ledger: Arc<dyn LedgerGateway>,
        training: Arc<dyn TrainingService>,
        exporter: Arc<dyn ResultsExporter>,
    ) -> Self {
        Self {
            ledger,
            training,
            exporter,
        }
    }
}

/// One participant's session on one project.
pub struct IterationSession {
    key: SessionKey,
    role: Role,
    commands: mpsc::Sender<SessionCommand>,
    bus: Arc<InMemoryEventBus>,
    snapshot: watch::Receiver<SessionSnapshot>,
    training: Arc<dyn TrainingService>,
    health_timeout: Duration,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    ended: AtomicBool,
}

impl IterationSession {
    /// Rebuild the session from the ledger and start its listeners.
    ///
    /// Fails if the ledger cannot be read; nothing is spawned in that case.
    pub async fn open(
        key: SessionKey,
        role: Role,
        ports: SessionPorts,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let span = session_span!(key.project, key.participant, role);
        let cancel = CancellationToken::new();
        let bus = Arc::new(InMemoryEventBus::with_capacity(config.event_capacity));
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::new(key.clone(), role));
        let (commands_tx, commands_rx) = mpsc::channel(config.command_buffer.max(1));

        let mut actor = SessionActor::new(
            key.clone(),
            role,
            config.clone(),
            ports.clone(),
            Arc::clone(&bus),
            snapshot_tx,
            cancel.clone(),
        );
        let head = actor.ledger_head().instrument(span.clone()).await?;
        actor.rehydrate().instrument(span.clone()).await?;

        let bridge = EventBridge::new(
            key.project.clone(),
            Arc::clone(&ports.ledger),
            commands_tx.clone(),
            cancel.clone(),
            &config,
        )
        .starting_after(head);
        let monitor = TrainingMonitor::new(
            key.project.clone(),
            Arc::clone(&ports.training),
            commands_tx.clone(),
            snapshot_rx.clone(),
            cancel.clone(),
            &config,
        );

        let tasks = vec![
            tokio::spawn(actor.run(commands_rx).instrument(span.clone())),
            tokio::spawn(bridge.run().instrument(span.clone())),
            tokio::spawn(monitor.run().instrument(span.clone())),
        ];

        let snapshot = snapshot_rx.borrow().clone();
        span.in_scope(|| {
            info!(phase = %snapshot.phase, round = snapshot.round, from_seq = head, "Session opened");
        });

        Ok(Self {
            key,
            role,
            commands: commands_tx,
            bus,
            snapshot: snapshot_rx,
            training: ports.training,
            health_timeout: config.health_timeout,
            cancel,
            tasks: Mutex::new(tasks),
            ended: AtomicBool::new(false),
        })
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Latest published state.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that observes every published state.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Every event of this session. Dropping the subscription unsubscribes.
    pub fn subscribe(&self) -> Subscription {
        self.subscribe_with(EventFilter::for_session(self.key.clone()))
    }

    pub fn subscribe_with(&self, filter: EventFilter) -> Subscription {
        self.bus.subscribe(filter)
    }

    /// Open the next round. Coordinator only; returns the round the ledger
    /// opened.
    pub async fn start_iteration(&self) -> Result<Round, SessionError> {
        self.request(|reply| SessionCommand::StartIteration { reply })
            .await
    }

    /// Close the open round early. Coordinator only.
    pub async fn end_round(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::EndRound { reply })
            .await
    }

    /// Apply a ledger event received outside the session's own subscription.
    pub async fn apply_ledger_event(&self, event: LedgerEvent) -> Result<(), SessionError> {
        self.notify(SessionInput::Ledger(event)).await
    }

    /// Push a training status, as a status webhook would.
    pub async fn notify_training_status(&self, status: TrainingStatus) -> Result<(), SessionError> {
        self.notify(SessionInput::TrainingStatus(status)).await
    }

    /// Check the training service now and apply the outcome.
    pub async fn check_training_health(&self) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let healthy = check_health(self.training.as_ref(), &self.cancel, self.health_timeout)
            .await
            .ok_or(SessionError::Cancelled)?;
        self.notify(SessionInput::Health { healthy }).await?;
        Ok(healthy)
    }

    /// Cancel in-flight work, stop the listeners and release every
    /// subscription. Safe to call any number of times.
    pub async fn end(&self) {
        if self.ended.swap(true, Ordering::SeqCst) {
            debug!(session = %self.key, "Session already ended");
            return;
        }
        self.cancel.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(join_error) = task.await {
                if join_error.is_panic() {
                    error!(session = %self.key, "Session task panicked: {}", join_error);
                }
            }
        }
        self.bus.close();
        info!(session = %self.key, "Session ended");
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.is_ended() {
            Err(SessionError::SessionEnded)
        } else {
            Ok(())
        }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        self.ensure_open()?;
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| SessionError::SessionEnded)?;
        response.await.unwrap_or(Err(SessionError::SessionEnded))
    }

    async fn notify(&self, input: SessionInput) -> Result<(), SessionError> {
        self.ensure_open()?;
        let (ack, applied) = oneshot::channel();
        self.commands
            .send(SessionCommand::Input {
                input,
                ack: Some(ack),
            })
            .await
            .map_err(|_| SessionError::SessionEnded)?;
        applied.await.map_err(|_| SessionError::SessionEnded)
    }
}

impl Drop for IterationSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.bus.close();
    }
}
