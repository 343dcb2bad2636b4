//! Periodic training-service health checks and status polls.

use crate::command::{bounded, Interrupted, SessionCommand, SessionInput};
use crate::config::SessionConfig;
use dal_training::TrainingService;
use dal_types::{ProjectId, SessionSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// One health check. `None` when cancelled; a timeout counts as unhealthy.
pub(crate) async fn check_health(
    training: &dyn TrainingService,
    cancel: &CancellationToken,
    limit: Duration,
) -> Option<bool> {
    match bounded(cancel, limit, training.health()).await {
        Ok(healthy) => Some(healthy),
        Err(Interrupted::TimedOut(_)) => Some(false),
        Err(Interrupted::Cancelled) => None,
    }
}

pub(crate) struct TrainingMonitor {
    project: ProjectId,
    training: Arc<dyn TrainingService>,
    commands: mpsc::Sender<SessionCommand>,
    snapshot: watch::Receiver<SessionSnapshot>,
    cancel: CancellationToken,
    health_interval: Duration,
    poll_interval: Duration,
    health_timeout: Duration,
}

impl TrainingMonitor {
    pub(crate) fn new(
        project: ProjectId,
        training: Arc<dyn TrainingService>,
        commands: mpsc::Sender<SessionCommand>,
        snapshot: watch::Receiver<SessionSnapshot>,
        cancel: CancellationToken,
        config: &SessionConfig,
    ) -> Self {
        Self {
            project,
            training,
            commands,
            snapshot,
            cancel,
            health_interval: config.health_interval,
            poll_interval: config.status_poll_interval,
            health_timeout: config.health_timeout,
        }
    }

    pub(crate) async fn run(self) {
        info!(project = %self.project, "Training monitor started");
        let start = Instant::now();
        let mut health = interval_at(start + self.health_interval, self.health_interval);
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut poll = interval_at(start + self.poll_interval, self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let input = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = health.tick() => {
                    match check_health(self.training.as_ref(), &self.cancel, self.health_timeout).await {
                        Some(healthy) => SessionInput::Health { healthy },
                        None => break,
                    }
                }
                _ = poll.tick() => {
                    let phase = self.snapshot.borrow().phase;
                    if !phase.awaits_training() {
                        continue;
                    }
                    match bounded(&self.cancel, self.health_timeout, self.training.poll_status(&self.project)).await {
                        Ok(Ok(status)) => SessionInput::TrainingStatus(status),
                        Ok(Err(error)) => {
                            debug!(project = %self.project, error = %error, "Status poll failed");
                            continue;
                        }
                        Err(_) => continue,
                    }
                }
            };

            let command = SessionCommand::Input { input, ack: None };
            let sent = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                sent = self.commands.send(command) => sent,
            };
            if sent.is_err() {
                break;
            }
        }
        debug!(project = %self.project, "Training monitor stopped");
    }
}
