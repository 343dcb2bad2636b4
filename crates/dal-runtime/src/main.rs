//! `dal-coordinator` entry point.

use anyhow::{Context, Result};
use clap::Parser;
use dal_runtime::cli::{Cli, Command};
use dal_telemetry::{init_telemetry, TelemetryConfig};
use dal_types::{ParticipantAddress, ProjectId};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _telemetry =
        init_telemetry(TelemetryConfig::from_env()).context("failed to initialize telemetry")?;

    match cli.command {
        Command::Run(args) => {
            let config = args.into_config().context("invalid configuration")?;
            let outcome = dal_runtime::run(config, shutdown_signal()).await?;
            info!(?outcome, "Coordinator stopped");
        }
        Command::Export(args) => {
            let backend = args.common.ledger_backend()?;
            let project = ProjectId::new(args.common.project);
            let participant = ParticipantAddress::new(args.common.participant);
            let (records, path) = dal_runtime::export_round(
                &backend,
                &project,
                &participant,
                &args.common.output_dir,
                args.round,
            )
            .await
            .with_context(|| format!("failed to export round {}", args.round))?;
            println!("{records} record(s) -> {}", path.display());
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "Ctrl-C handler unavailable, running until the project ends");
        std::future::pending::<()>().await;
    }
}
