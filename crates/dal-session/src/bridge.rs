//! Durable ledger subscription feeding one session.
//!
//! ```text
//! subscribe(from_seq) ──ok──→ pump logs ──lost──┐
//!      ↑    │                                   │
//!      │    └─fail──→ backoff ──(N failures)──→ SubscriptionDegraded
//!      └────────────────────────────────────────┘
//! ```
//!
//! The bridge never gives up. Logs at or below the last forwarded `seq` are
//! transport redeliveries and are dropped here; everything else becomes
//! exactly one session input.

use crate::command::{SessionCommand, SessionInput};
use crate::config::SessionConfig;
use dal_ledger::{LedgerGateway, LedgerSubscription};
use dal_telemetry::{metric_inc, BRIDGE_RECONNECTS};
use dal_types::{ProjectId, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

enum Pump {
    Cancelled,
    Lost(String),
}

pub(crate) struct EventBridge {
    project: ProjectId,
    ledger: Arc<dyn LedgerGateway>,
    commands: mpsc::Sender<SessionCommand>,
    cancel: CancellationToken,
    backoff: RetryPolicy,
    subscribe_timeout: Duration,
    failure_threshold: usize,
    last_seq: u64,
}

impl EventBridge {
    pub(crate) fn new(
        project: ProjectId,
        ledger: Arc<dyn LedgerGateway>,
        commands: mpsc::Sender<SessionCommand>,
        cancel: CancellationToken,
        config: &SessionConfig,
    ) -> Self {
        Self {
            project,
            ledger,
            commands,
            cancel,
            backoff: config.resubscribe_backoff.clone(),
            subscribe_timeout: config.ledger_read_timeout,
            failure_threshold: config.subscription_failure_threshold.max(1),
            last_seq: 0,
        }
    }

    /// Only logs after `seq` are forwarded.
    pub(crate) fn starting_after(mut self, seq: u64) -> Self {
        self.last_seq = seq;
        self
    }

    pub(crate) async fn run(mut self) {
        info!(project = %self.project, from_seq = self.last_seq, "Ledger event bridge started");
        let mut failures = 0usize;
        let mut degraded = false;
        let mut resumed = false;

        loop {
            let attempt = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                attempt = tokio::time::timeout(
                    self.subscribe_timeout,
                    self.ledger.subscribe(&self.project, self.last_seq),
                ) => attempt,
            };
            let attempt = match attempt {
                Ok(Ok(subscription)) => Ok(subscription),
                Ok(Err(error)) => Err(error.to_string()),
                Err(_) => Err(format!("subscribe timed out after {:?}", self.subscribe_timeout)),
            };

            match attempt {
                Ok(mut subscription) => {
                    if resumed || degraded {
                        metric_inc!(BRIDGE_RECONNECTS);
                        info!(project = %self.project, from_seq = self.last_seq, "Ledger subscription re-established");
                        if !self.forward(SessionInput::SubscriptionRestored).await {
                            break;
                        }
                    }
                    failures = 0;
                    degraded = false;
                    match self.pump(&mut subscription).await {
                        Pump::Cancelled => break,
                        Pump::Lost(reason) => {
                            warn!(project = %self.project, last_seq = self.last_seq, reason = %reason, "Ledger subscription lost");
                            resumed = true;
                        }
                    }
                }
                Err(reason) => {
                    failures += 1;
                    warn!(project = %self.project, failures, reason = %reason, "Ledger subscribe failed");
                    if failures >= self.failure_threshold && !degraded {
                        degraded = true;
                        let input = SessionInput::SubscriptionDegraded {
                            attempts: failures,
                            reason,
                        };
                        if !self.forward(input).await {
                            break;
                        }
                    }
                }
            }

            let delay = self.backoff.delay_for(failures.saturating_sub(1));
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        debug!(project = %self.project, "Ledger event bridge stopped");
    }

    async fn pump(&mut self, subscription: &mut LedgerSubscription) -> Pump {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Pump::Cancelled,
                next = subscription.next() => next,
            };
            match next {
                Some(Ok(log)) => {
                    if log.seq <= self.last_seq {
                        debug!(%log, last_seq = self.last_seq, "Redelivered ledger log dropped");
                        continue;
                    }
                    self.last_seq = log.seq;
                    trace!(%log, "Forwarding ledger log");
                    if !self.forward(SessionInput::Ledger(log.event)).await {
                        return Pump::Cancelled;
                    }
                }
                Some(Err(error)) => return Pump::Lost(error.to_string()),
                None => return Pump::Lost("subscription closed".into()),
            }
        }
    }

    /// `false` once the session is gone.
    async fn forward(&self, input: SessionInput) -> bool {
        let command = SessionCommand::Input { input, ack: None };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.commands.send(command) => sent.is_ok(),
        }
    }
}
