//! JSON-RPC 2.0 ledger adapter.
//!
//! The node exposes the contract through `dal_*` methods. Event subscription
//! polls `dal_getLogs(project, fromSeq)`; a failed poll ends the
//! subscription with an error so the caller can reconnect.

use crate::domain::{BatchStart, LedgerLog, VoteDistribution, VotingStatus};
use crate::error::LedgerError;
use crate::ports::{LedgerGateway, LedgerSubscription};
use async_trait::async_trait;
use dal_types::{ParticipantAddress, ProjectId, Round, SampleId};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a, P> {
    jsonrpc: &'static str,
    method: &'a str,
    params: P,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    /// `None` when absent, `Some(None)` for an explicit `null`.
    #[serde(
        default = "absent",
        deserialize_with = "present",
        bound(deserialize = "T: Deserialize<'de>")
    )]
    result: Option<Option<T>>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

fn absent<T>() -> Option<Option<T>> {
    None
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Error codes the node uses for contract-level rejections.
const REVERTED: i64 = 3;
const UNAUTHORIZED: i64 = -32001;
const UNKNOWN_PROJECT: i64 = -32004;

#[derive(Clone)]
struct RpcTransport {
    client: Client,
    url: String,
    request_id: Arc<AtomicU64>,
}

impl RpcTransport {
    async fn call<P, R>(&self, method: &str, params: P) -> Result<R, LedgerError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        self.call_nullable(method, params)
            .await?
            .ok_or_else(|| LedgerError::Decode(format!("null result for {method}")))
    }

    /// Like `call`, for methods where a `null` result is a valid answer.
    async fn call_nullable<P, R>(&self, method: &str, params: P) -> Result<Option<R>, LedgerError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };
        trace!(method, id, "Ledger RPC call");

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LedgerError::Unreachable(format!("{method} timed out"))
                } else if e.is_connect() {
                    LedgerError::Unreachable(format!("cannot connect to {}", self.url))
                } else {
                    LedgerError::Unreachable(e.to_string())
                }
            })?;

        let body: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| LedgerError::Decode(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(match error.code {
                REVERTED => LedgerError::Reverted(error.message),
                UNAUTHORIZED => LedgerError::SignatureRejected(error.message),
                UNKNOWN_PROJECT => LedgerError::UnknownProject(error.message),
                code => LedgerError::Rpc {
                    code,
                    message: error.message,
                },
            });
        }

        body.result
            .ok_or_else(|| LedgerError::Decode(format!("missing result for {method}")))
    }
}

/// Ledger gateway speaking JSON-RPC to a node.
pub struct RpcLedgerGateway {
    transport: RpcTransport,
    poll_interval: Duration,
}

impl RpcLedgerGateway {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, LedgerError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| LedgerError::Unreachable(e.to_string()))?;

        Ok(Self {
            transport: RpcTransport {
                client,
                url: url.into(),
                request_id: Arc::new(AtomicU64::new(1)),
            },
            poll_interval: Duration::from_secs(2),
        })
    }

    /// How often `dal_getLogs` is polled for new events.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn url(&self) -> &str {
        &self.transport.url
    }
}

#[async_trait]
impl LedgerGateway for RpcLedgerGateway {
    async fn current_round(&self, project: &ProjectId) -> Result<Round, LedgerError> {
        self.transport.call("dal_getCurrentRound", [project]).await
    }

    async fn batch_sample_ids(
        &self,
        project: &ProjectId,
        round: Round,
    ) -> Result<Vec<SampleId>, LedgerError> {
        self.transport
            .call("dal_getBatchSampleIds", json!([project, round]))
            .await
    }

    async fn voting_status(&self, project: &ProjectId) -> Result<VotingStatus, LedgerError> {
        self.transport.call("dal_isVotingActive", [project]).await
    }

    async fn voting_distribution(
        &self,
        project: &ProjectId,
        sample: &SampleId,
    ) -> Result<VoteDistribution, LedgerError> {
        self.transport
            .call("dal_getVotingDistribution", json!([project, sample]))
            .await
    }

    async fn completed_samples(
        &self,
        project: &ProjectId,
        round: Round,
    ) -> Result<Vec<SampleId>, LedgerError> {
        self.transport
            .call("dal_getCompletedSamples", json!([project, round]))
            .await
    }

    async fn final_label(
        &self,
        project: &ProjectId,
        sample: &SampleId,
    ) -> Result<Option<String>, LedgerError> {
        // An undecided sample comes back as a null result.
        self.transport
            .call_nullable("dal_getFinalLabel", json!([project, sample]))
            .await
    }

    async fn is_project_ended(&self, project: &ProjectId) -> Result<bool, LedgerError> {
        self.transport.call("dal_isProjectEnded", [project]).await
    }

    async fn latest_seq(&self, project: &ProjectId) -> Result<u64, LedgerError> {
        self.transport.call("dal_getLatestSeq", [project]).await
    }

    async fn submit_batch_vote(
        &self,
        project: &ProjectId,
        voter: &ParticipantAddress,
        sample_ids: &[SampleId],
        labels: &[String],
    ) -> Result<(), LedgerError> {
        let _tx: serde_json::Value = self
            .transport
            .call(
                "dal_submitBatchVote",
                json!([project, voter, sample_ids, labels]),
            )
            .await?;
        Ok(())
    }

    async fn start_batch_voting(
        &self,
        project: &ProjectId,
        caller: &ParticipantAddress,
        batch: &BatchStart,
    ) -> Result<(), LedgerError> {
        let _tx: serde_json::Value = self
            .transport
            .call(
                "dal_startBatchVoting",
                json!([
                    project,
                    caller,
                    batch.sample_ids,
                    batch.data_hashes,
                    batch.original_indices
                ]),
            )
            .await?;
        Ok(())
    }

    async fn end_batch_voting(
        &self,
        project: &ProjectId,
        caller: &ParticipantAddress,
        round: Round,
    ) -> Result<(), LedgerError> {
        let _tx: serde_json::Value = self
            .transport
            .call("dal_endBatchVoting", json!([project, caller, round]))
            .await?;
        Ok(())
    }

    async fn subscribe(
        &self,
        project: &ProjectId,
        from_seq: u64,
    ) -> Result<LedgerSubscription, LedgerError> {
        // First poll inline so an unreachable node fails the subscribe call.
        let first: Vec<LedgerLog> = self
            .transport
            .call("dal_getLogs", json!([project, from_seq]))
            .await?;

        let (tx, subscription) = LedgerSubscription::channel();
        let mut cursor = from_seq;
        for log in first {
            cursor = cursor.max(log.seq);
            let _ = tx.send(Ok(log));
        }

        let transport = self.transport.clone();
        let project = project.clone();
        let interval = self.poll_interval;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                let polled: Result<Vec<LedgerLog>, LedgerError> = transport
                    .call("dal_getLogs", json!([project, cursor]))
                    .await;
                match polled {
                    Ok(logs) => {
                        for log in logs {
                            cursor = cursor.max(log.seq);
                            if tx.send(Ok(log)).is_err() {
                                return;
                            }
                        }
                    }
                    Err(error) => {
                        warn!(project = %project, error = %error, "Ledger log poll failed");
                        let _ = tx.send(Err(error));
                        return;
                    }
                }
            }
            debug!(project = %project, "Ledger log poller stopped");
        });

        Ok(subscription)
    }
}
