//! Messages accepted by the session actor, and the bound put on every
//! outbound call it makes.

use crate::error::SessionError;
use dal_ledger::LedgerEvent;
use dal_training::TrainingStatus;
use dal_types::Round;
use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

pub(crate) type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

pub(crate) enum SessionCommand {
    StartIteration { reply: Reply<Round> },
    EndRound { reply: Reply<()> },
    Input {
        input: SessionInput,
        /// Fired once the input has been applied.
        ack: Option<oneshot::Sender<()>>,
    },
}

/// Observations pushed into the session by its listeners.
#[derive(Debug)]
pub(crate) enum SessionInput {
    Ledger(LedgerEvent),
    TrainingStatus(TrainingStatus),
    Health { healthy: bool },
    SubscriptionDegraded { attempts: usize, reason: String },
    SubscriptionRestored,
}

impl SessionInput {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Ledger(event) => event.name(),
            Self::TrainingStatus(_) => "TrainingStatus",
            Self::Health { .. } => "Health",
            Self::SubscriptionDegraded { .. } => "SubscriptionDegraded",
            Self::SubscriptionRestored => "SubscriptionRestored",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interrupted {
    Cancelled,
    TimedOut(Duration),
}

/// Run `call` under `limit`, giving up as soon as `cancel` fires.
pub(crate) async fn bounded<F: Future>(
    cancel: &CancellationToken,
    limit: Duration,
    call: F,
) -> Result<F::Output, Interrupted> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupted::Cancelled),
        outcome = tokio::time::timeout(limit, call) => {
            outcome.map_err(|_| Interrupted::TimedOut(limit))
        }
    }
}
