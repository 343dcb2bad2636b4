//! Session error type and its mapping onto the shared taxonomy.

use dal_export::ExportError;
use dal_ledger::LedgerError;
use dal_training::TrainingError;
use dal_types::{ErrorClass, Phase, Role, Round};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{action} requires the coordinator role, this session is a {role}")]
    PermissionDenied { action: &'static str, role: Role },

    #[error(
        "batch voting already active: round {round} has {active_samples} active samples, \
         {time_remaining_secs}s remaining ({})",
        minutes(.time_remaining_secs)
    )]
    ConflictingRound {
        round: Round,
        active_samples: usize,
        time_remaining_secs: u64,
    },

    #[error("cannot {action} while {phase}")]
    InvalidPhase { action: &'static str, phase: Phase },

    #[error("training service unavailable during {operation}: {source}")]
    TrainingUnavailable {
        operation: &'static str,
        #[source]
        source: TrainingError,
    },

    #[error("ledger write {operation} failed: {source}")]
    LedgerWrite {
        operation: &'static str,
        #[source]
        source: LedgerError,
    },

    #[error("ledger read {operation} failed: {source}")]
    LedgerRead {
        operation: &'static str,
        #[source]
        source: LedgerError,
    },

    #[error("results export failed: {0}")]
    Export(#[from] ExportError),

    #[error("ledger event subscription failing after {attempts} attempts: {reason}")]
    SubscriptionDegraded { attempts: usize, reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("session has ended")]
    SessionEnded,
}

impl SessionError {
    /// Taxonomy class, `None` for lifecycle outcomes that are only reported
    /// to the caller.
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            Self::PermissionDenied { .. } => Some(ErrorClass::PermissionDenied),
            Self::ConflictingRound { .. } => Some(ErrorClass::ConflictingRound),
            Self::TrainingUnavailable { .. } => Some(ErrorClass::TrainingServiceUnavailable),
            Self::LedgerWrite { .. } => Some(ErrorClass::LedgerWriteFailed),
            Self::LedgerRead { .. } | Self::SubscriptionDegraded { .. } => {
                Some(ErrorClass::LedgerReadFailed)
            }
            // The artifact only feeds the training service; a local write
            // failure blocks training, not the ledger round.
            Self::Export(ExportError::Ledger(_)) => Some(ErrorClass::LedgerReadFailed),
            Self::Export(_) => Some(ErrorClass::TrainingServiceUnavailable),
            Self::InvalidPhase { .. } | Self::Cancelled | Self::SessionEnded => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::SessionEnded)
    }
}

fn minutes(secs: &u64) -> String {
    format!("{}m {}s", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflicting_round_message_carries_context() {
        let error = SessionError::ConflictingRound {
            round: 5,
            active_samples: 2,
            time_remaining_secs: 120,
        };
        let message = error.to_string();
        assert!(message.contains("round 5"));
        assert!(message.contains("2 active samples"));
        assert!(message.contains("120s"));
        assert!(message.contains("2m 0s"));
    }

    #[test]
    fn test_classes() {
        let read = SessionError::LedgerRead {
            operation: "isVotingActive",
            source: LedgerError::Unreachable("down".into()),
        };
        assert_eq!(read.class(), Some(ErrorClass::LedgerReadFailed));

        let export = SessionError::Export(ExportError::Ledger(LedgerError::SubscriptionClosed));
        assert_eq!(export.class(), Some(ErrorClass::LedgerReadFailed));

        let training = SessionError::TrainingUnavailable {
            operation: "start_iteration",
            source: TrainingError::Unavailable("refused".into()),
        };
        assert_eq!(training.class(), Some(ErrorClass::TrainingServiceUnavailable));

        assert_eq!(SessionError::Cancelled.class(), None);
        assert_eq!(
            SessionError::InvalidPhase {
                action: "start an iteration",
                phase: Phase::Voting
            }
            .class(),
            None
        );
    }
}
