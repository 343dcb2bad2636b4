//! Training-service error types.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrainingError {
    #[error("training service unavailable: {0}")]
    Unavailable(String),

    #[error("{endpoint} timed out after {after:?}")]
    Timeout {
        endpoint: &'static str,
        after: Duration,
    },

    /// The service answered but refused the request.
    #[error("training service rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("failed to decode training response: {0}")]
    Decode(String),

    #[error("training request cancelled")]
    Cancelled,
}

impl TrainingError {
    /// 5xx responses, timeouts and connection failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::Timeout { .. } => true,
            Self::Rejected { status, .. } => *status >= 500,
            Self::Decode(_) | Self::Cancelled => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(TrainingError::Unavailable("refused".into()).is_transient());
        assert!(TrainingError::Rejected {
            status: 503,
            message: "busy".into()
        }
        .is_transient());
        assert!(!TrainingError::Rejected {
            status: 400,
            message: "iteration number is required".into()
        }
        .is_transient());
        assert!(!TrainingError::Cancelled.is_transient());
    }
}
