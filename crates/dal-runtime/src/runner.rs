//! Drives one open session until the project ends or shutdown is requested.

use crate::event_log::EventLog;
use crate::RuntimeError;
use dal_bus::IterationEvent;
use dal_session::IterationSession;
use dal_types::{Phase, Round};
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why `drive` returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    ProjectEnded { round: Round },
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct DriveOptions {
    /// Start an iteration whenever the session is idle.
    pub auto_start: bool,
    pub restart_delay: Duration,
}

/// Log every event of `session` until the project ends or `shutdown`
/// resolves, then end the session.
pub async fn drive<W: Write>(
    session: Arc<IterationSession>,
    options: DriveOptions,
    log: &mut EventLog<W>,
    shutdown: impl Future<Output = ()>,
) -> Result<Outcome, RuntimeError> {
    let mut events = session.subscribe();
    let stop = CancellationToken::new();
    let starter = options.auto_start.then(|| {
        tokio::spawn(auto_start(
            Arc::clone(&session),
            options.restart_delay,
            stop.clone(),
        ))
    });

    let initial = session.snapshot();
    let result = if initial.phase.is_terminal() {
        info!(round = initial.round, "Project already ended");
        Ok(Outcome::ProjectEnded {
            round: initial.round,
        })
    } else {
        pump(&mut events, log, shutdown).await
    };

    // Ending first interrupts a start still waiting on the training service.
    stop.cancel();
    session.end().await;
    if let Some(starter) = starter {
        let _ = starter.await;
    }
    result
}

async fn pump<W: Write>(
    events: &mut dal_bus::Subscription,
    log: &mut EventLog<W>,
    shutdown: impl Future<Output = ()>,
) -> Result<Outcome, RuntimeError> {
    tokio::pin!(shutdown);
    loop {
        let event = tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("Shutdown requested");
                return Ok(Outcome::Shutdown);
            }
            event = events.recv() => event,
        };
        let Some(event) = event else {
            debug!("Session event stream closed");
            return Ok(Outcome::Shutdown);
        };
        log.record(&event)?;
        if let IterationEvent::ProjectShouldEnd { round, reason } = &event.event {
            info!(round, reason = %reason, "Project ended");
            return Ok(Outcome::ProjectEnded { round: *round });
        }
    }
}

/// Start a new iteration each time the session settles in `idle`.
async fn auto_start(session: Arc<IterationSession>, restart_delay: Duration, stop: CancellationToken) {
    let mut watch = session.watch();
    loop {
        let phase = watch.borrow_and_update().phase;
        if phase.is_terminal() {
            break;
        }
        if phase == Phase::Idle {
            match session.start_iteration().await {
                Ok(round) => info!(round, "Iteration started"),
                Err(error) if error.is_cancelled() => break,
                Err(error) => {
                    warn!(error = %error, delay = ?restart_delay, "Automatic start failed");
                    tokio::select! {
                        _ = stop.cancelled() => break,
                        _ = tokio::time::sleep(restart_delay) => {}
                    }
                    continue;
                }
            }
        }
        tokio::select! {
            _ = stop.cancelled() => break,
            changed = watch.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}
