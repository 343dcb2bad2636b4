//! # Core Domain Entities
//!
//! ## Clusters
//!
//! - **Participants**: `Role`
//! - **Round lifecycle**: `Phase`, `BatchProgress`
//! - **Event stream payload**: `SessionSnapshot`

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ClassifiedError;
use crate::ids::{Round, SampleId, SessionKey};

// =============================================================================
// PARTICIPANTS
// =============================================================================

/// Role of a participant, fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// May start and end rounds and trigger training.
    Coordinator,
    /// May only submit votes.
    Contributor,
}

impl Role {
    pub fn is_coordinator(self) -> bool {
        matches!(self, Role::Coordinator)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Coordinator => "coordinator",
            Role::Contributor => "contributor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "coordinator" => Ok(Role::Coordinator),
            "contributor" => Ok(Role::Contributor),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

// =============================================================================
// ROUND LIFECYCLE
// =============================================================================

/// Phase of an iteration session.
///
/// ```text
/// idle ──start──→ starting ──→ voting ──→ aggregating ──→ training ──→ idle
///   ↑                                                                    │
///   └────────────────────────────────────────────────────────────────────┘
///
/// error:  reachable from any non-terminal phase
/// ended:  terminal, entered when the project end condition holds
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Starting,
    Voting,
    Aggregating,
    Training,
    Error,
    Ended,
}

impl Phase {
    /// Phases from which a coordinator may start a new iteration.
    pub fn accepts_start(self) -> bool {
        match self {
            Phase::Idle | Phase::Error => true,
            Phase::Starting
            | Phase::Voting
            | Phase::Aggregating
            | Phase::Training
            | Phase::Ended => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Ended)
    }

    /// Phases during which the training service is expected to report progress.
    pub fn awaits_training(self) -> bool {
        match self {
            Phase::Aggregating | Phase::Training => true,
            Phase::Idle | Phase::Starting | Phase::Voting | Phase::Error | Phase::Ended => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Starting => "starting",
            Phase::Voting => "voting",
            Phase::Aggregating => "aggregating",
            Phase::Training => "training",
            Phase::Error => "error",
            Phase::Ended => "ended",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of the batch open for voting in one round.
///
/// A value object: every update builds a new instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    round: Round,
    sample_ids: Vec<SampleId>,
    total_samples: usize,
    completed_samples: usize,
    current_sample_index: usize,
}

impl BatchProgress {
    /// Fresh progress for a round with nothing completed yet.
    pub fn new(round: Round, sample_ids: Vec<SampleId>) -> Self {
        Self::with_completed(round, sample_ids, 0)
    }

    /// Progress with `completed` samples already done (clamped to the batch size).
    pub fn with_completed(round: Round, sample_ids: Vec<SampleId>, completed: usize) -> Self {
        let total_samples = sample_ids.len();
        let completed_samples = completed.min(total_samples);
        Self {
            round,
            sample_ids,
            total_samples,
            completed_samples,
            current_sample_index: completed_samples.min(total_samples.saturating_sub(1)),
        }
    }

    /// The next value after one more distinct sample reached consensus.
    ///
    /// `sample` only moves the display pointer.
    #[must_use]
    pub fn advanced(&self, sample: &SampleId) -> Self {
        let completed_samples = (self.completed_samples + 1).min(self.total_samples);
        Self {
            completed_samples,
            current_sample_index: self.position_of(sample).unwrap_or(self.current_sample_index),
            ..self.clone()
        }
    }

    pub fn round(&self) -> Round {
        self.round
    }

    pub fn sample_ids(&self) -> &[SampleId] {
        &self.sample_ids
    }

    pub fn total_samples(&self) -> usize {
        self.total_samples
    }

    pub fn completed_samples(&self) -> usize {
        self.completed_samples
    }

    pub fn current_sample_index(&self) -> usize {
        self.current_sample_index
    }

    pub fn is_complete(&self) -> bool {
        self.completed_samples >= self.total_samples
    }

    pub fn contains(&self, sample: &SampleId) -> bool {
        self.sample_ids.contains(sample)
    }

    pub fn position_of(&self, sample: &SampleId) -> Option<usize> {
        self.sample_ids.iter().position(|s| s == sample)
    }
}

// =============================================================================
// EVENT STREAM PAYLOAD
// =============================================================================

/// Canonical view of a session carried by `state-changed` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub key: SessionKey,
    pub role: Role,
    pub phase: Phase,
    pub round: Round,
    pub batch_progress: Option<BatchProgress>,
    pub last_error: Option<ClassifiedError>,
}

impl SessionSnapshot {
    pub fn new(key: SessionKey, role: Role) -> Self {
        Self {
            key,
            role,
            phase: Phase::Idle,
            round: 0,
            batch_progress: None,
            last_error: None,
        }
    }

    pub fn completed_samples(&self) -> Option<usize> {
        self.batch_progress.as_ref().map(BatchProgress::completed_samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<SampleId> {
        names.iter().map(|n| SampleId::new(*n)).collect()
    }

    #[test]
    fn test_progress_totals_follow_sample_ids() {
        let progress = BatchProgress::new(3, ids(&["s1", "s2", "s3"]));
        assert_eq!(progress.total_samples(), 3);
        assert_eq!(progress.completed_samples(), 0);
        assert!(!progress.is_complete());
    }

    #[test]
    fn test_progress_advanced_is_a_new_value() {
        let progress = BatchProgress::new(3, ids(&["s1", "s2", "s3"]));
        let next = progress.advanced(&SampleId::new("s2"));

        assert_eq!(progress.completed_samples(), 0);
        assert_eq!(next.completed_samples(), 1);
        assert_eq!(next.current_sample_index(), 1);
        assert_eq!(next.round(), 3);
    }

    #[test]
    fn test_progress_never_exceeds_total() {
        let progress = BatchProgress::with_completed(1, ids(&["s1"]), 5);
        assert_eq!(progress.completed_samples(), 1);
        assert_eq!(progress.advanced(&SampleId::new("s1")).completed_samples(), 1);
    }

    #[test]
    fn test_empty_batch_is_complete() {
        let progress = BatchProgress::new(7, Vec::new());
        assert_eq!(progress.total_samples(), 0);
        assert!(progress.is_complete());
        assert_eq!(progress.current_sample_index(), 0);
    }

    #[test]
    fn test_phase_start_acceptance() {
        assert!(Phase::Idle.accepts_start());
        assert!(Phase::Error.accepts_start());
        assert!(!Phase::Voting.accepts_start());
        assert!(!Phase::Ended.accepts_start());
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("Coordinator".parse::<Role>().unwrap(), Role::Coordinator);
        assert_eq!("contributor".parse::<Role>().unwrap(), Role::Contributor);
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let mut snapshot = SessionSnapshot::new(SessionKey::new("p", "a"), Role::Contributor);
        snapshot.batch_progress = Some(BatchProgress::new(2, ids(&["s1"])));
        let json = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(json["phase"], "idle");
        assert_eq!(json["batchProgress"]["totalSamples"], 1);
        assert_eq!(json["batchProgress"]["completedSamples"], 0);
    }
}
