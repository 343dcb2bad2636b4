//! Ledger error types.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger node unreachable: {0}")]
    Unreachable(String),

    #[error("ledger {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("transaction reverted: {0}")]
    Reverted(String),

    #[error("signature rejected for {0}")]
    SignatureRejected(String),

    #[error("unknown project: {0}")]
    UnknownProject(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("failed to decode ledger response: {0}")]
    Decode(String),

    #[error("event subscription closed")]
    SubscriptionClosed,

    #[error("ledger call cancelled")]
    Cancelled,
}

impl LedgerError {
    /// Whether retrying the same read could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unreachable(_) | Self::Timeout { .. } | Self::Rpc { .. } | Self::SubscriptionClosed
        )
    }
}
