//! reqwest implementation of the training-service port.

use crate::config::TrainingClientConfig;
use crate::error::TrainingError;
use crate::ports::TrainingService;
use crate::types::{
    FinalModel, FinalTrainingRequest, FinalTrainingResponse, IterationPlan, IterationResults,
    LabeledSample, QuerySample, StartIterationRequest, StartIterationResponse,
    SubmitLabelsRequest, SubmitLabelsResponse, TrainingStatus,
};
use async_trait::async_trait;
use dal_telemetry::TRAINING_POLLS;
use dal_types::{ProjectId, RetryError, Round};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct HttpTrainingClient {
    client: Client,
    config: TrainingClientConfig,
    cancel: CancellationToken,
}

impl HttpTrainingClient {
    pub fn new(config: TrainingClientConfig) -> Result<Self, TrainingError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| TrainingError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            config,
            cancel: CancellationToken::new(),
        })
    }

    /// Abort in-flight requests and pending retries once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &TrainingClientConfig {
        &self.config
    }

    /// One request with a deadline, raced against cancellation.
    async fn send<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
        limit: Duration,
    ) -> Result<T, TrainingError> {
        let call = async {
            let response = request.timeout(limit).send().await.map_err(|e| {
                if e.is_timeout() {
                    TrainingError::Timeout {
                        endpoint,
                        after: limit,
                    }
                } else {
                    TrainingError::Unavailable(e.to_string())
                }
            })?;
            decode(endpoint, response).await
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TrainingError::Cancelled),
            result = call => result,
        }
    }

    async fn with_retry<T, F, Fut>(&self, endpoint: &'static str, mut op: F) -> Result<T, TrainingError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TrainingError>>,
    {
        let outcome = self
            .config
            .retry
            .run(&self.cancel, TrainingError::is_transient, |attempt| {
                if attempt > 0 {
                    debug!(endpoint, attempt, "Retrying training-service request");
                }
                op()
            })
            .await;

        match outcome {
            Ok(value) => Ok(value),
            Err(RetryError::Cancelled) => Err(TrainingError::Cancelled),
            Err(RetryError::Exhausted { error, attempts }) => {
                warn!(endpoint, attempts, error = %error, "Training-service request failed");
                Err(error)
            }
        }
    }
}

async fn decode<T: DeserializeOwned>(
    endpoint: &'static str,
    response: Response,
) -> Result<T, TrainingError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| TrainingError::Decode(format!("{endpoint}: {e}")));
    }

    // The service reports failures as JSON with an `error` field.
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or(body);

    Err(TrainingError::Rejected {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl TrainingService for HttpTrainingClient {
    async fn health(&self) -> bool {
        let limit = self.config.effective_health_timeout();
        let request = self.client.get(self.config.endpoint("health"));
        let result: Result<serde_json::Value, _> = self.send("health", request, limit).await;

        let healthy = result.is_ok();
        TRAINING_POLLS
            .with_label_values(&["health", if healthy { "ok" } else { "error" }])
            .inc();
        if let Err(error) = result {
            debug!(error = %error, "Training-service health check failed");
        }
        healthy
    }

    async fn start_iteration(
        &self,
        project: &ProjectId,
        iteration: Round,
        exported_rounds: &[Round],
    ) -> Result<IterationPlan, TrainingError> {
        let body = StartIterationRequest {
            project_id: project.clone(),
            iteration,
            exported_rounds: exported_rounds.to_vec(),
        };
        info!(project = %project, iteration, ?exported_rounds, "Starting training iteration");

        let response: StartIterationResponse = self
            .with_retry("start_iteration", || {
                let request = self
                    .client
                    .post(self.config.endpoint("start_iteration"))
                    .json(&body);
                self.send("start_iteration", request, self.config.request_timeout)
            })
            .await?;

        if !response.success {
            return Err(TrainingError::Rejected {
                status: 200,
                message: response
                    .error
                    .unwrap_or_else(|| "iteration failed".to_string()),
            });
        }

        let round = response.iteration.unwrap_or(iteration);
        let samples = if response.query_samples.is_empty() {
            self.iteration_results(project, round).await?
        } else {
            response.query_samples
        };
        Ok(IterationPlan::new(round, &samples))
    }

    async fn poll_status(&self, project: &ProjectId) -> Result<TrainingStatus, TrainingError> {
        let request = self
            .client
            .get(self.config.endpoint("status"))
            .query(&[("project_id", project.as_str())]);
        let result = self.send("status", request, self.config.query_timeout).await;
        TRAINING_POLLS
            .with_label_values(&["status", if result.is_ok() { "ok" } else { "error" }])
            .inc();
        result
    }

    async fn submit_labels(
        &self,
        project: &ProjectId,
        iteration: Round,
        labels: &[LabeledSample],
    ) -> Result<usize, TrainingError> {
        let body = SubmitLabelsRequest {
            project_id: project.clone(),
            iteration,
            labeled_samples: labels.to_vec(),
        };

        // One attempt; the session owns the backoff for label submission.
        let request = self
            .client
            .post(self.config.endpoint("submit_labels"))
            .json(&body);
        let response: SubmitLabelsResponse = self
            .send("submit_labels", request, self.config.request_timeout)
            .await?;

        if !response.success {
            return Err(TrainingError::Rejected {
                status: 200,
                message: response
                    .error
                    .unwrap_or_else(|| "labels not accepted".to_string()),
            });
        }
        Ok(response.samples_processed)
    }

    async fn iteration_results(
        &self,
        project: &ProjectId,
        iteration: Round,
    ) -> Result<Vec<QuerySample>, TrainingError> {
        let results: IterationResults = self
            .with_retry("results", || {
                let request = self
                    .client
                    .get(self.config.endpoint(&format!("results/{iteration}")))
                    .query(&[("project_id", project.as_str())]);
                self.send("results", request, self.config.query_timeout)
            })
            .await?;
        Ok(results.query_samples)
    }

    async fn final_training(
        &self,
        project: &ProjectId,
        iteration: Round,
    ) -> Result<FinalModel, TrainingError> {
        let body = FinalTrainingRequest {
            project_id: project.clone(),
            iteration,
        };
        info!(project = %project, iteration, "Requesting final training");

        let response: FinalTrainingResponse = self
            .with_retry("final_training", || {
                let request = self
                    .client
                    .post(self.config.endpoint("final_training"))
                    .json(&body);
                self.send("final_training", request, self.config.request_timeout)
            })
            .await?;

        if !response.success {
            return Err(TrainingError::Rejected {
                status: 200,
                message: response
                    .error
                    .unwrap_or_else(|| "final training failed".to_string()),
            });
        }
        Ok(FinalModel {
            iteration,
            performance: response.performance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dal_types::RetryPolicy;

    fn unreachable_client() -> HttpTrainingClient {
        let mut config = TrainingClientConfig::new("http://127.0.0.1:9");
        config.retry = RetryPolicy::new(2, 1, 1, 0.0);
        config.health_timeout = Duration::from_millis(500);
        HttpTrainingClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_health_is_false_when_unreachable() {
        assert!(!unreachable_client().health().await);
    }

    #[tokio::test]
    async fn test_start_surfaces_unavailable_after_retries() {
        let err = unreachable_client()
            .start_iteration(&ProjectId::new("p1"), 1, &[])
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_final_training_surfaces_unavailable_after_retries() {
        let err = unreachable_client()
            .final_training(&ProjectId::new("p1"), 4)
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_cancelled_client_rejects_immediately() {
        let token = CancellationToken::new();
        token.cancel();
        let client = unreachable_client().with_cancellation(token);

        let err = client
            .poll_status(&ProjectId::new("p1"))
            .await
            .unwrap_err();
        assert_eq!(err, TrainingError::Cancelled);
    }
}
