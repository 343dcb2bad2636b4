//! Command-line interface of `dal-coordinator`.

use crate::config::{ConfigError, LedgerBackend, RuntimeConfig};
use clap::{Args, Parser, Subcommand};
use dal_session::SessionConfig;
use dal_types::{ParticipantAddress, ProjectId, Role, Round};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "dal-coordinator", version, about = "Decentralized active-learning iteration coordinator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Open a session and log its events until the project ends or Ctrl-C.
    Run(RunArgs),
    /// Export one finished round to its JSON artifact.
    Export(ExportArgs),
}

/// Connection and identity settings shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct CommonArgs {
    /// Project (voting contract) to coordinate.
    #[arg(long, env = "DAL_PROJECT")]
    pub project: String,

    /// JSON-RPC endpoint of the ledger node.
    #[arg(long, env = "DAL_LEDGER_RPC")]
    pub ledger_rpc: Option<String>,

    /// Use the in-process ledger simulator instead of a node.
    #[arg(long)]
    pub dev_ledger: bool,

    /// Root directory for round artifacts.
    #[arg(long, env = "DAL_OUTPUT_DIR", default_value = "results")]
    pub output_dir: PathBuf,

    /// Ledger address of this participant.
    #[arg(long, env = "DAL_PARTICIPANT")]
    pub participant: String,
}

impl CommonArgs {
    pub fn ledger_backend(&self) -> Result<LedgerBackend, ConfigError> {
        match (&self.ledger_rpc, self.dev_ledger) {
            (_, true) => Ok(LedgerBackend::Dev),
            (Some(url), false) => Ok(LedgerBackend::Rpc { url: url.clone() }),
            (None, false) => Err(ConfigError::NoLedger),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Base URL of the training service.
    #[arg(long, env = "DAL_TRAINING_URL", default_value = "http://localhost:5050")]
    pub training_url: String,

    /// Session role: coordinator or contributor.
    #[arg(long, env = "DAL_ROLE", default_value = "coordinator")]
    pub role: Role,

    /// End the project once this many rounds have been trained.
    #[arg(long, env = "DAL_MAX_ROUNDS")]
    pub max_rounds: Option<Round>,

    /// Start an iteration whenever the session is idle (coordinator only).
    #[arg(long)]
    pub start: bool,

    /// Seconds to wait after a failed automatic start.
    #[arg(long, default_value_t = 5)]
    pub restart_delay_secs: u64,
}

impl RunArgs {
    /// Assemble and validate the runtime configuration.
    pub fn into_config(self) -> Result<RuntimeConfig, ConfigError> {
        let ledger = self.common.ledger_backend()?;
        let mut session = SessionConfig::default();
        session.max_rounds = self.max_rounds;
        let config = RuntimeConfig {
            project: ProjectId::new(self.common.project),
            participant: ParticipantAddress::new(self.common.participant),
            role: self.role,
            ledger,
            training_url: self.training_url,
            output_dir: self.common.output_dir,
            auto_start: self.start,
            restart_delay: Duration::from_secs(self.restart_delay_secs),
            session,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Round to export.
    #[arg(long)]
    pub round: Round,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_run_with_dev_ledger() {
        let cli = parse(&[
            "dal-coordinator",
            "run",
            "--project",
            "p1",
            "--participant",
            "0xcoord",
            "--dev-ledger",
            "--start",
            "--max-rounds",
            "3",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        let config = args.into_config().unwrap();
        assert_eq!(config.ledger, LedgerBackend::Dev);
        assert_eq!(config.role, Role::Coordinator);
        assert!(config.auto_start);
        assert_eq!(config.max_rounds(), Some(3));
        assert_eq!(config.session_key().to_string(), "p1/0xcoord");
    }

    #[test]
    fn test_run_requires_a_ledger() {
        let cli = parse(&[
            "dal-coordinator",
            "run",
            "--project",
            "p1",
            "--participant",
            "0xcoord",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.into_config().unwrap_err(), ConfigError::NoLedger);
    }

    #[test]
    fn test_contributor_cannot_auto_start() {
        let cli = parse(&[
            "dal-coordinator",
            "run",
            "--project",
            "p1",
            "--participant",
            "0xv1",
            "--ledger-rpc",
            "http://node:8545",
            "--role",
            "contributor",
            "--start",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(matches!(
            args.into_config(),
            Err(ConfigError::StartRequiresCoordinator(Role::Contributor))
        ));
    }

    #[test]
    fn test_export_round() {
        let cli = parse(&[
            "dal-coordinator",
            "export",
            "--project",
            "p1",
            "--participant",
            "0xcoord",
            "--dev-ledger",
            "--round",
            "2",
        ]);
        let Command::Export(args) = cli.command else {
            panic!("expected export");
        };
        assert_eq!(args.round, 2);
        assert_eq!(args.common.output_dir, PathBuf::from("results"));
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let result = Cli::try_parse_from([
            "dal-coordinator",
            "run",
            "--project",
            "p1",
            "--participant",
            "0xcoord",
            "--role",
            "admin",
        ]);
        assert!(result.is_err());
    }
}
