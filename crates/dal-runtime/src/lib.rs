//! # DAL Coordinator Runtime
//!
//! Library half of the `dal-coordinator` binary.
//!
//! ## Startup Sequence
//!
//! 1. Parse arguments (env fallbacks) into a validated `RuntimeConfig`
//! 2. Initialize telemetry
//! 3. Build the ledger, training-service and exporter adapters
//! 4. Open the session (rehydrates from the ledger)
//! 5. Log events as JSON lines; optionally auto-start iterations
//! 6. On Ctrl-C or project end, end the session

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod cli;
pub mod config;
pub mod event_log;
pub mod runner;
pub mod wiring;

pub use config::{ConfigError, LedgerBackend, RuntimeConfig};
pub use event_log::EventLog;
pub use runner::{drive, DriveOptions, Outcome};

use dal_export::{ExportError, ResultsExporter};
use dal_ledger::LedgerError;
use dal_session::{IterationSession, SessionError};
use dal_training::TrainingError;
use dal_types::{ParticipantAddress, ProjectId, Round};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("ledger adapter: {0}")]
    Ledger(#[from] LedgerError),

    #[error("training client: {0}")]
    Training(#[from] TrainingError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("event log write failed: {0}")]
    EventLog(#[from] std::io::Error),
}

/// Open the configured session and drive it, logging to stdout.
pub async fn run(
    config: RuntimeConfig,
    shutdown: impl Future<Output = ()>,
) -> Result<Outcome, RuntimeError> {
    config.validate()?;
    let cancel = CancellationToken::new();
    let ports = wiring::build_ports(&config, &cancel)?;

    let session = IterationSession::open(
        config.session_key(),
        config.role,
        ports,
        wiring::session_config(&config),
    )
    .await?;
    info!(
        session = %session.key(),
        role = %config.role,
        auto_start = config.auto_start,
        max_rounds = ?config.max_rounds(),
        "Coordinator running"
    );

    let mut log = EventLog::new(std::io::stdout());
    let options = DriveOptions {
        auto_start: config.auto_start,
        restart_delay: config.restart_delay,
    };
    let outcome = drive(Arc::new(session), options, &mut log, shutdown).await;
    cancel.cancel();
    outcome
}

/// Export `round` of `project` and return the record count and artifact
/// path.
pub async fn export_round(
    backend: &LedgerBackend,
    project: &ProjectId,
    participant: &ParticipantAddress,
    output_dir: &std::path::Path,
    round: Round,
) -> Result<(usize, PathBuf), RuntimeError> {
    let cancel = CancellationToken::new();
    let ledger = wiring::build_ledger(backend, project, participant, &cancel)?;
    let exporter = wiring::build_exporter(ledger, output_dir);
    let records = exporter.export_round(project, round).await?;
    let path = exporter.artifact_path(project, round)?;
    info!(project = %project, round, records, path = %path.display(), "Export finished");
    Ok((records, path))
}
