//! Role-dependent error disposition.
//!
//! The only place that decides whether a classified error is shown to a
//! participant, and how loudly.
//!
//! | Class | Coordinator | Contributor |
//! |-------|-------------|-------------|
//! | PermissionDenied | blocking | blocking |
//! | ConflictingRound | blocking | blocking |
//! | LedgerWriteFailed | blocking | blocking |
//! | LedgerReadFailed | warning | warning |
//! | TrainingServiceUnavailable | warning | suppressed |

use dal_types::{ErrorClass, Role, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Publish an `error` event and record it as the session's last error.
    Surface(Severity),
    /// Log only.
    Suppress,
}

pub struct ErrorPolicy;

impl ErrorPolicy {
    pub fn disposition(role: Role, class: ErrorClass) -> Disposition {
        match (class, role) {
            // Contributors never initiate training and cannot act on it.
            (ErrorClass::TrainingServiceUnavailable, Role::Contributor) => Disposition::Suppress,
            (class, _) if class.affects_consistency() => Disposition::Surface(Severity::Blocking),
            _ => Disposition::Surface(Severity::Warning),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_outage_per_role() {
        assert_eq!(
            ErrorPolicy::disposition(Role::Coordinator, ErrorClass::TrainingServiceUnavailable),
            Disposition::Surface(Severity::Warning)
        );
        assert_eq!(
            ErrorPolicy::disposition(Role::Contributor, ErrorClass::TrainingServiceUnavailable),
            Disposition::Suppress
        );
    }

    #[test]
    fn test_consistency_errors_block_for_everyone() {
        for role in [Role::Coordinator, Role::Contributor] {
            for class in [
                ErrorClass::PermissionDenied,
                ErrorClass::ConflictingRound,
                ErrorClass::LedgerWriteFailed,
            ] {
                assert_eq!(
                    ErrorPolicy::disposition(role, class),
                    Disposition::Surface(Severity::Blocking)
                );
            }
            assert_eq!(
                ErrorPolicy::disposition(role, ErrorClass::LedgerReadFailed),
                Disposition::Surface(Severity::Warning)
            );
        }
    }
}
