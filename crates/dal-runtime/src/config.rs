//! # Runtime Configuration
//!
//! Everything the `dal-coordinator` binary needs to open one session. Built
//! from command-line arguments (each with an environment fallback) and
//! validated before any adapter is constructed.

use dal_session::SessionConfig;
use dal_types::{ParticipantAddress, ProjectId, Role, Round, SessionKey};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Where ledger calls go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerBackend {
    /// JSON-RPC node at `url`.
    Rpc { url: String },
    /// In-process contract simulator; the participant is its coordinator
    /// and only voter.
    Dev,
}

/// Complete runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub project: ProjectId,
    pub participant: ParticipantAddress,
    pub role: Role,
    pub ledger: LedgerBackend,
    /// Base URL of the training service.
    pub training_url: String,
    /// Root directory for exported round artifacts.
    pub output_dir: PathBuf,
    /// Start an iteration whenever the coordinator session is idle.
    pub auto_start: bool,
    /// Pause after a failed automatic start before trying again.
    pub restart_delay: Duration,
    pub session: SessionConfig,
}

impl RuntimeConfig {
    pub fn session_key(&self) -> SessionKey {
        SessionKey {
            project: self.project.clone(),
            participant: self.participant.clone(),
        }
    }

    pub fn max_rounds(&self) -> Option<Round> {
        self.session.max_rounds
    }

    /// Check the configuration before wiring.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project.as_str().trim().is_empty() {
            return Err(ConfigError::Missing("project"));
        }
        if self.participant.as_str().trim().is_empty() {
            return Err(ConfigError::Missing("participant"));
        }
        check_url("training url", &self.training_url)?;
        if let LedgerBackend::Rpc { url } = &self.ledger {
            check_url("ledger rpc url", url)?;
        }
        if self.session.max_rounds == Some(0) {
            return Err(ConfigError::ZeroMaxRounds);
        }
        if self.auto_start && !self.role.is_coordinator() {
            return Err(ConfigError::StartRequiresCoordinator(self.role));
        }
        Ok(())
    }
}

fn check_url(field: &'static str, url: &str) -> Result<(), ConfigError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidUrl {
            field,
            url: url.to_string(),
        })
    }
}

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{field} must be an http(s) URL, got {url:?}")]
    InvalidUrl { field: &'static str, url: String },

    #[error("max rounds must be at least 1")]
    ZeroMaxRounds,

    #[error("--start needs the coordinator role, configured role is {0}")]
    StartRequiresCoordinator(Role),

    #[error("--ledger-rpc (or DAL_LEDGER_RPC) is required unless --dev-ledger is set")]
    NoLedger,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RuntimeConfig {
        RuntimeConfig {
            project: ProjectId::new("p1"),
            participant: ParticipantAddress::new("0xcoord"),
            role: Role::Coordinator,
            ledger: LedgerBackend::Rpc {
                url: "http://localhost:8545".into(),
            },
            training_url: "http://localhost:5050".into(),
            output_dir: PathBuf::from("results"),
            auto_start: false,
            restart_delay: Duration::from_secs(5),
            session: SessionConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert_eq!(config().validate(), Ok(()));
    }

    #[test]
    fn test_rejects_blank_identity() {
        let mut c = config();
        c.project = ProjectId::new("  ");
        assert_eq!(c.validate(), Err(ConfigError::Missing("project")));

        let mut c = config();
        c.participant = ParticipantAddress::new("");
        assert_eq!(c.validate(), Err(ConfigError::Missing("participant")));
    }

    #[test]
    fn test_rejects_non_http_urls() {
        let mut c = config();
        c.training_url = "localhost:5050".into();
        assert!(matches!(
            c.validate(),
            Err(ConfigError::InvalidUrl { field: "training url", .. })
        ));

        let mut c = config();
        c.ledger = LedgerBackend::Rpc {
            url: "ws://node".into(),
        };
        assert!(matches!(
            c.validate(),
            Err(ConfigError::InvalidUrl { field: "ledger rpc url", .. })
        ));

        let mut c = config();
        c.ledger = LedgerBackend::Dev;
        assert_eq!(c.validate(), Ok(()));
    }

    #[test]
    fn test_round_limit_and_auto_start_checks() {
        let mut c = config();
        c.session.max_rounds = Some(0);
        assert_eq!(c.validate(), Err(ConfigError::ZeroMaxRounds));

        let mut c = config();
        c.role = Role::Contributor;
        c.auto_start = true;
        assert_eq!(
            c.validate(),
            Err(ConfigError::StartRequiresCoordinator(Role::Contributor))
        );
    }
}
