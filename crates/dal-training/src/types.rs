//! Wire types of the training-service REST interface, plus the domain view
//! the coordinator works with.

use dal_types::{ProjectId, Round, SampleId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// =============================================================================
// /start_iteration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartIterationRequest {
    pub project_id: ProjectId,
    pub iteration: Round,
    pub exported_rounds: Vec<Round>,
}

/// A sample the query strategy selected for labeling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySample {
    pub sample_id: SampleId,
    #[serde(default)]
    pub original_index: u64,
    #[serde(default)]
    pub data_hash: Option<String>,
}

impl QuerySample {
    /// The reported hash, or SHA-256 of the sample id when the service omits it.
    pub fn data_hash_or_default(&self) -> String {
        match &self.data_hash {
            Some(hash) if !hash.is_empty() => hash.clone(),
            _ => hex::encode(Sha256::digest(self.sample_id.as_str().as_bytes())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartIterationResponse {
    pub success: bool,
    #[serde(default)]
    pub iteration: Option<Round>,
    #[serde(default)]
    pub query_samples: Vec<QuerySample>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// `/results/{iteration}` body; only the selected samples are used.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct IterationResults {
    #[serde(default)]
    pub query_samples: Vec<QuerySample>,
}

// =============================================================================
// Domain view of a started iteration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSample {
    pub sample_id: SampleId,
    pub original_index: u64,
    pub data_hash: String,
}

impl From<&QuerySample> for PlannedSample {
    fn from(sample: &QuerySample) -> Self {
        Self {
            sample_id: sample.sample_id.clone(),
            original_index: sample.original_index,
            data_hash: sample.data_hash_or_default(),
        }
    }
}

/// What the training service wants labeled next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationPlan {
    pub round: Round,
    pub samples: Vec<PlannedSample>,
}

impl IterationPlan {
    pub fn new(round: Round, samples: &[QuerySample]) -> Self {
        Self {
            round,
            samples: samples.iter().map(PlannedSample::from).collect(),
        }
    }

    pub fn sample_ids(&self) -> Vec<SampleId> {
        self.samples.iter().map(|s| s.sample_id.clone()).collect()
    }
}

// =============================================================================
// /status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingPhase {
    #[default]
    Idle,
    Training,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrainingStatus {
    #[serde(default)]
    pub phase: TrainingPhase,
    /// Iteration the phase refers to.
    #[serde(default)]
    pub iteration: Option<Round>,
    #[serde(default)]
    pub samples_labeled: usize,
}

impl TrainingStatus {
    pub fn completed(iteration: Round, samples_labeled: usize) -> Self {
        Self {
            phase: TrainingPhase::Completed,
            iteration: Some(iteration),
            samples_labeled,
        }
    }

    /// Whether this status reports training of `round` as finished.
    pub fn completes(&self, round: Round) -> bool {
        self.phase == TrainingPhase::Completed && self.iteration.map_or(true, |it| it == round)
    }
}

// =============================================================================
// /submit_labels
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledSample {
    pub sample_id: SampleId,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitLabelsRequest {
    pub project_id: ProjectId,
    pub iteration: Round,
    pub labeled_samples: Vec<LabeledSample>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitLabelsResponse {
    pub success: bool,
    #[serde(default)]
    pub samples_processed: usize,
    #[serde(default)]
    pub next_iteration_ready: bool,
    #[serde(default)]
    pub error: Option<String>,
}

// =============================================================================
// /final_training
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalTrainingRequest {
    pub project_id: ProjectId,
    pub iteration: Round,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalTrainingResponse {
    pub success: bool,
    /// Metrics of the final model, as reported by the service.
    #[serde(default)]
    pub performance: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Outcome of the closing training pass over every labeled sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalModel {
    pub iteration: Round,
    pub performance: Option<serde_json::Value>,
}
