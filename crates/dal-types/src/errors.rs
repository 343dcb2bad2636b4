//! # Error Taxonomy
//!
//! Classification shared by every subsystem. Subsystem errors are mapped onto
//! exactly one `ErrorClass`; the session's error policy then decides, per
//! role, whether the error is surfaced or absorbed.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::ids::Round;

/// Classification of every error a session can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorClass {
    /// A coordinator-only action was invoked by a contributor.
    PermissionDenied,
    /// A round is already open on the ledger.
    ConflictingRound,
    /// The training service could not be reached or refused the request.
    TrainingServiceUnavailable,
    /// A signed ledger transaction failed (rejected, reverted, timed out).
    LedgerWriteFailed,
    /// A ledger read failed after exhausting its retries.
    LedgerReadFailed,
}

impl ErrorClass {
    /// Whether the failing operation may be retried automatically.
    ///
    /// Writes are never retried: a blind resubmission risks a double vote or
    /// a duplicate round.
    pub fn is_retryable(self) -> bool {
        match self {
            ErrorClass::TrainingServiceUnavailable | ErrorClass::LedgerReadFailed => true,
            ErrorClass::PermissionDenied
            | ErrorClass::ConflictingRound
            | ErrorClass::LedgerWriteFailed => false,
        }
    }

    /// Whether the error leaves the session inconsistent with the ledger
    /// unless the phase is rolled back.
    pub fn affects_consistency(self) -> bool {
        match self {
            ErrorClass::PermissionDenied
            | ErrorClass::ConflictingRound
            | ErrorClass::LedgerWriteFailed => true,
            ErrorClass::TrainingServiceUnavailable | ErrorClass::LedgerReadFailed => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::PermissionDenied => "PermissionDenied",
            ErrorClass::ConflictingRound => "ConflictingRound",
            ErrorClass::TrainingServiceUnavailable => "TrainingServiceUnavailable",
            ErrorClass::LedgerWriteFailed => "LedgerWriteFailed",
            ErrorClass::LedgerReadFailed => "LedgerReadFailed",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an error is presented to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Shown, but the UI keeps working.
    Warning,
    /// Halts the action that produced it.
    Blocking,
}

/// An error after classification, as carried on the event stream.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("{class} ({severity:?}): {message}")]
pub struct ClassifiedError {
    pub class: ErrorClass,
    pub severity: Severity,
    pub message: String,
    pub round: Option<Round>,
}

impl ClassifiedError {
    pub fn new(class: ErrorClass, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            class,
            severity,
            message: message.into(),
            round: None,
        }
    }

    #[must_use]
    pub fn in_round(mut self, round: Round) -> Self {
        self.round = Some(round);
        self
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Blocking
    }
}
