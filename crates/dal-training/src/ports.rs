//! # Outbound Port
//!
//! Operations the coordinator needs from the training service.

use crate::error::TrainingError;
use crate::types::{FinalModel, IterationPlan, LabeledSample, QuerySample, TrainingStatus};
use async_trait::async_trait;
use dal_types::{ProjectId, Round};

#[async_trait]
pub trait TrainingService: Send + Sync {
    /// Best-effort liveness check. Single attempt, short timeout.
    async fn health(&self) -> bool;

    /// Train on the exported rounds and select the batch for `iteration`.
    async fn start_iteration(
        &self,
        project: &ProjectId,
        iteration: Round,
        exported_rounds: &[Round],
    ) -> Result<IterationPlan, TrainingError>;

    /// Current training phase for `project`.
    async fn poll_status(&self, project: &ProjectId) -> Result<TrainingStatus, TrainingError>;

    /// Ingest the consensus labels of a finished round. Resubmitting the same
    /// round is idempotent on the service side.
    async fn submit_labels(
        &self,
        project: &ProjectId,
        iteration: Round,
        labels: &[LabeledSample],
    ) -> Result<usize, TrainingError>;

    /// Samples selected for `iteration`.
    async fn iteration_results(
        &self,
        project: &ProjectId,
        iteration: Round,
    ) -> Result<Vec<QuerySample>, TrainingError>;

    /// Train once more on every labeled sample, without selecting a batch.
    /// `iteration` follows the last trained round.
    async fn final_training(
        &self,
        project: &ProjectId,
        iteration: Round,
    ) -> Result<FinalModel, TrainingError>;
}

#[async_trait]
impl<T: TrainingService + ?Sized> TrainingService for std::sync::Arc<T> {
    async fn health(&self) -> bool {
        (**self).health().await
    }

    async fn start_iteration(
        &self,
        project: &ProjectId,
        iteration: Round,
        exported_rounds: &[Round],
    ) -> Result<IterationPlan, TrainingError> {
        (**self)
            .start_iteration(project, iteration, exported_rounds)
            .await
    }

    async fn poll_status(&self, project: &ProjectId) -> Result<TrainingStatus, TrainingError> {
        (**self).poll_status(project).await
    }

    async fn submit_labels(
        &self,
        project: &ProjectId,
        iteration: Round,
        labels: &[LabeledSample],
    ) -> Result<usize, TrainingError> {
        (**self).submit_labels(project, iteration, labels).await
    }

    async fn iteration_results(
        &self,
        project: &ProjectId,
        iteration: Round,
    ) -> Result<Vec<QuerySample>, TrainingError> {
        (**self).iteration_results(project, iteration).await
    }

    async fn final_training(
        &self,
        project: &ProjectId,
        iteration: Round,
    ) -> Result<FinalModel, TrainingError> {
        (**self).final_training(project, iteration).await
    }
}
