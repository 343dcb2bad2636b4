//! Contract-level values exchanged with the ledger.

use dal_types::{Round, SampleId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Answer to `isVotingActive`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingStatus {
    pub active: bool,
    pub round: Round,
    pub active_samples: usize,
    /// Seconds until the open batch times out.
    pub time_remaining_secs: u64,
}

impl VotingStatus {
    pub fn inactive(round: Round) -> Self {
        Self {
            active: false,
            round,
            active_samples: 0,
            time_remaining_secs: 0,
        }
    }

    /// Remaining time as `"{m}m {s}s"`.
    pub fn time_remaining_display(&self) -> String {
        format!(
            "{}m {}s",
            self.time_remaining_secs / 60,
            self.time_remaining_secs % 60
        )
    }
}

/// Per-label vote counts for one sample.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteDistribution {
    pub votes: BTreeMap<String, u64>,
}

impl VoteDistribution {
    pub fn total(&self) -> u64 {
        self.votes.values().sum()
    }

    /// Label with most votes; ties go to the lexicographically first label.
    pub fn leader(&self) -> Option<&str> {
        self.votes
            .iter()
            .fold(None::<(&String, u64)>, |best, (label, &count)| match best {
                Some((_, top)) if top >= count => best,
                _ => Some((label, count)),
            })
            .map(|(label, _)| label.as_str())
    }
}

/// Arguments of `startBatchVoting`. The three vectors are parallel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStart {
    pub sample_ids: Vec<SampleId>,
    pub data_hashes: Vec<String>,
    pub original_indices: Vec<u64>,
}

impl BatchStart {
    pub fn len(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_ids.is_empty()
    }

    /// Parallel vectors must have the same length.
    pub fn is_well_formed(&self) -> bool {
        self.data_hashes.len() == self.sample_ids.len()
            && self.original_indices.len() == self.sample_ids.len()
    }
}

/// Events emitted by the voting contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LedgerEvent {
    #[serde(rename_all = "camelCase")]
    BatchVotingStarted { round: Round, sample_ids: Vec<SampleId> },
    #[serde(rename_all = "camelCase")]
    SampleCompleted {
        round: Round,
        sample_id: SampleId,
        final_label: String,
    },
    #[serde(rename_all = "camelCase")]
    BatchVotingEnded { round: Round },
}

impl LedgerEvent {
    pub fn round(&self) -> Round {
        match self {
            Self::BatchVotingStarted { round, .. }
            | Self::SampleCompleted { round, .. }
            | Self::BatchVotingEnded { round } => *round,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::BatchVotingStarted { .. } => "BatchVotingStarted",
            Self::SampleCompleted { .. } => "SampleCompleted",
            Self::BatchVotingEnded { .. } => "BatchVotingEnded",
        }
    }
}

/// A contract event with its position in ledger finalisation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerLog {
    pub seq: u64,
    pub event: LedgerEvent,
}

impl fmt::Display for LedgerLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} (round {})", self.seq, self.event.name(), self.event.round())
    }
}
