//! Scriptable in-process training service.

use crate::error::TrainingError;
use crate::ports::TrainingService;
use crate::types::{
    FinalModel, IterationPlan, LabeledSample, QuerySample, TrainingPhase, TrainingStatus,
};
use async_trait::async_trait;
use dal_types::{ProjectId, Round, SampleId};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// A call as the mock received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrainingCall {
    Health,
    StartIteration {
        project: ProjectId,
        iteration: Round,
        exported_rounds: Vec<Round>,
    },
    PollStatus {
        project: ProjectId,
    },
    SubmitLabels {
        project: ProjectId,
        iteration: Round,
        labels: usize,
    },
    FinalTraining {
        project: ProjectId,
        iteration: Round,
    },
}

/// Training service double.
///
/// Each `start_iteration` pops the next scripted batch (or an empty one) and
/// answers with the requested iteration. `submit_labels` marks the project
/// as training; `finish_training` flips it to completed, or set
/// `complete_on_submit` to finish immediately.
#[derive(Default)]
pub struct MockTrainingService {
    healthy: AtomicBool,
    batches: Mutex<VecDeque<Vec<QuerySample>>>,
    status: Mutex<HashMap<ProjectId, TrainingStatus>>,
    failing_starts: AtomicUsize,
    failing_submits: AtomicUsize,
    failing_final_trainings: AtomicUsize,
    start_delay: Mutex<Option<Duration>>,
    complete_on_submit: AtomicBool,
    calls: Mutex<Vec<TrainingCall>>,
    results: Mutex<HashMap<Round, Vec<QuerySample>>>,
}

impl MockTrainingService {
    pub fn new() -> Self {
        let mock = Self::default();
        mock.healthy.store(true, Ordering::SeqCst);
        mock
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Queue the sample ids selected by the next `start_iteration`.
    pub fn push_batch<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<SampleId>,
    {
        let samples = ids
            .into_iter()
            .enumerate()
            .map(|(index, id)| QuerySample {
                sample_id: id.into(),
                original_index: index as u64,
                data_hash: None,
            })
            .collect();
        self.batches.lock().push_back(samples);
    }

    pub fn fail_next_starts(&self, count: usize) {
        self.failing_starts.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_submits(&self, count: usize) {
        self.failing_submits.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_final_trainings(&self, count: usize) {
        self.failing_final_trainings.store(count, Ordering::SeqCst);
    }

    /// Make `start_iteration` stall for `delay` before answering.
    pub fn set_start_delay(&self, delay: Option<Duration>) {
        *self.start_delay.lock() = delay;
    }

    pub fn complete_on_submit(&self, enabled: bool) {
        self.complete_on_submit.store(enabled, Ordering::SeqCst);
    }

    pub fn set_status(&self, project: &ProjectId, status: TrainingStatus) {
        self.status.lock().insert(project.clone(), status);
    }

    /// Report training of `iteration` as completed.
    pub fn finish_training(&self, project: &ProjectId, iteration: Round, samples_labeled: usize) {
        self.set_status(project, TrainingStatus::completed(iteration, samples_labeled));
    }

    pub fn calls(&self) -> Vec<TrainingCall> {
        self.calls.lock().clone()
    }

    pub fn start_calls(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, TrainingCall::StartIteration { .. }))
            .count()
    }

    pub fn final_training_calls(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, TrainingCall::FinalTraining { .. }))
            .count()
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl TrainingService for MockTrainingService {
    async fn health(&self) -> bool {
        self.calls.lock().push(TrainingCall::Health);
        self.healthy.load(Ordering::SeqCst)
    }

    async fn start_iteration(
        &self,
        project: &ProjectId,
        iteration: Round,
        exported_rounds: &[Round],
    ) -> Result<IterationPlan, TrainingError> {
        self.calls.lock().push(TrainingCall::StartIteration {
            project: project.clone(),
            iteration,
            exported_rounds: exported_rounds.to_vec(),
        });

        let delay = *self.start_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if Self::take_failure(&self.failing_starts) {
            return Err(TrainingError::Unavailable("connection refused".into()));
        }

        let samples = self.batches.lock().pop_front().unwrap_or_default();
        self.results.lock().insert(iteration, samples.clone());
        self.set_status(
            project,
            TrainingStatus {
                phase: TrainingPhase::Idle,
                iteration: Some(iteration),
                samples_labeled: 0,
            },
        );
        Ok(IterationPlan::new(iteration, &samples))
    }

    async fn poll_status(&self, project: &ProjectId) -> Result<TrainingStatus, TrainingError> {
        self.calls.lock().push(TrainingCall::PollStatus {
            project: project.clone(),
        });
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(TrainingError::Unavailable("connection refused".into()));
        }
        Ok(self
            .status
            .lock()
            .get(project)
            .cloned()
            .unwrap_or_default())
    }

    async fn submit_labels(
        &self,
        project: &ProjectId,
        iteration: Round,
        labels: &[LabeledSample],
    ) -> Result<usize, TrainingError> {
        self.calls.lock().push(TrainingCall::SubmitLabels {
            project: project.clone(),
            iteration,
            labels: labels.len(),
        });
        if Self::take_failure(&self.failing_submits) {
            return Err(TrainingError::Unavailable("connection refused".into()));
        }

        let status = if self.complete_on_submit.load(Ordering::SeqCst) {
            TrainingStatus::completed(iteration, labels.len())
        } else {
            TrainingStatus {
                phase: TrainingPhase::Training,
                iteration: Some(iteration),
                samples_labeled: labels.len(),
            }
        };
        self.set_status(project, status);
        Ok(labels.len())
    }

    async fn iteration_results(
        &self,
        _project: &ProjectId,
        iteration: Round,
    ) -> Result<Vec<QuerySample>, TrainingError> {
        Ok(self
            .results
            .lock()
            .get(&iteration)
            .cloned()
            .unwrap_or_default())
    }

    async fn final_training(
        &self,
        project: &ProjectId,
        iteration: Round,
    ) -> Result<FinalModel, TrainingError> {
        self.calls.lock().push(TrainingCall::FinalTraining {
            project: project.clone(),
            iteration,
        });
        if Self::take_failure(&self.failing_final_trainings) {
            return Err(TrainingError::Unavailable("connection refused".into()));
        }
        Ok(FinalModel {
            iteration,
            performance: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_batches_are_served_in_order() {
        let mock = MockTrainingService::new();
        mock.push_batch(["a", "b"]);
        mock.push_batch(["c"]);
        let p = ProjectId::new("p");

        let first = mock.start_iteration(&p, 1, &[]).await.unwrap();
        let second = mock.start_iteration(&p, 2, &[1]).await.unwrap();
        let third = mock.start_iteration(&p, 3, &[1, 2]).await.unwrap();

        assert_eq!(first.sample_ids().len(), 2);
        assert_eq!(second.round, 2);
        assert_eq!(second.sample_ids(), vec![SampleId::new("c")]);
        assert!(third.samples.is_empty());
        assert_eq!(mock.start_calls(), 3);
    }

    #[tokio::test]
    async fn test_failures_are_consumed() {
        let mock = MockTrainingService::new();
        mock.fail_next_starts(1);
        let p = ProjectId::new("p");

        assert!(mock.start_iteration(&p, 1, &[]).await.is_err());
        assert!(mock.start_iteration(&p, 1, &[]).await.is_ok());
    }

    #[tokio::test]
    async fn test_submit_then_finish_training() {
        let mock = MockTrainingService::new();
        let p = ProjectId::new("p");
        let labels = vec![LabeledSample {
            sample_id: SampleId::new("a"),
            label: "cat".into(),
        }];

        assert_eq!(mock.submit_labels(&p, 1, &labels).await.unwrap(), 1);
        assert_eq!(
            mock.poll_status(&p).await.unwrap().phase,
            TrainingPhase::Training
        );

        mock.finish_training(&p, 1, 1);
        assert!(mock.poll_status(&p).await.unwrap().completes(1));
    }

    #[tokio::test]
    async fn test_final_training_is_recorded() {
        let mock = MockTrainingService::new();
        mock.fail_next_final_trainings(1);
        let p = ProjectId::new("p");

        assert!(mock.final_training(&p, 3).await.is_err());
        assert_eq!(mock.final_training(&p, 3).await.unwrap().iteration, 3);
        assert_eq!(mock.final_training_calls(), 2);
    }
}
