//! Adapter construction from `RuntimeConfig`.

use crate::config::{LedgerBackend, RuntimeConfig};
use crate::RuntimeError;
use dal_export::{ExportConfig, FileResultsExporter};
use dal_ledger::{
    InMemoryLedger, LedgerGateway, LedgerTimeouts, ProjectSetup, RetryingLedger, RpcLedgerGateway,
};
use dal_session::{SessionConfig, SessionPorts};
use dal_training::{HttpTrainingClient, TrainingClientConfig};
use dal_types::{ParticipantAddress, ProjectId, RetryPolicy};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Retry policy and per-attempt deadlines of the RPC ledger gateway.
fn rpc_ledger_policy() -> (RetryPolicy, LedgerTimeouts) {
    (RetryPolicy::default_network(), LedgerTimeouts::default())
}

fn training_client_config(config: &RuntimeConfig) -> TrainingClientConfig {
    TrainingClientConfig::new(config.training_url.clone())
}

/// Ledger gateway for `backend`.
///
/// RPC calls are retried and bounded; the dev simulator is seeded with
/// `project`, coordinated by `participant`.
pub fn build_ledger(
    backend: &LedgerBackend,
    project: &ProjectId,
    participant: &ParticipantAddress,
    cancel: &CancellationToken,
) -> Result<Arc<dyn LedgerGateway>, RuntimeError> {
    match backend {
        LedgerBackend::Rpc { url } => {
            let (policy, timeouts) = rpc_ledger_policy();
            let rpc = RpcLedgerGateway::new(url.clone(), timeouts.read)?;
            info!(url = %url, "Using JSON-RPC ledger");
            Ok(Arc::new(
                RetryingLedger::new(rpc, policy, timeouts).with_cancellation(cancel.child_token()),
            ))
        }
        LedgerBackend::Dev => {
            let ledger = InMemoryLedger::new();
            ledger.add_project(project.clone(), ProjectSetup::new(participant.clone()));
            info!(project = %project, "Using in-process ledger simulator");
            Ok(Arc::new(ledger))
        }
    }
}

pub fn build_exporter(ledger: Arc<dyn LedgerGateway>, output_dir: &Path) -> FileResultsExporter {
    FileResultsExporter::new(
        ledger,
        ExportConfig {
            output_dir: output_dir.to_path_buf(),
        },
    )
}

/// All three session ports for `config`.
pub fn build_ports(
    config: &RuntimeConfig,
    cancel: &CancellationToken,
) -> Result<SessionPorts, RuntimeError> {
    let ledger = build_ledger(&config.ledger, &config.project, &config.participant, cancel)?;
    let training = HttpTrainingClient::new(training_client_config(config))?
        .with_cancellation(cancel.child_token());
    let exporter = build_exporter(Arc::clone(&ledger), &config.output_dir);
    Ok(SessionPorts::new(ledger, Arc::new(training), Arc::new(exporter)))
}

/// The configured session bounds, stretched so that no outer deadline cuts
/// short a retry of the adapters `build_ports` creates.
pub fn session_config(config: &RuntimeConfig) -> SessionConfig {
    let session = config
        .session
        .clone()
        .covering_training(&training_client_config(config));
    match config.ledger {
        LedgerBackend::Rpc { .. } => {
            let (policy, timeouts) = rpc_ledger_policy();
            session.covering_ledger(&policy, &timeouts)
        }
        LedgerBackend::Dev => session,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dal_export::ResultsExporter;
    use dal_types::Role;
    use std::path::PathBuf;
    use std::time::Duration;

    fn runtime(ledger: LedgerBackend, session: SessionConfig) -> RuntimeConfig {
        RuntimeConfig {
            project: ProjectId::new("p1"),
            participant: ParticipantAddress::new("0xcoord"),
            role: Role::Coordinator,
            ledger,
            training_url: "http://localhost:5050".into(),
            output_dir: PathBuf::from("results"),
            auto_start: false,
            restart_delay: Duration::from_secs(5),
            session,
        }
    }

    #[test]
    fn test_session_bounds_cover_adapter_retries() {
        let mut tight = SessionConfig::for_testing();
        tight.ledger_read_timeout = LedgerTimeouts::default().read;
        tight.training_timeout = TrainingClientConfig::default().request_timeout;
        let config = runtime(
            LedgerBackend::Rpc {
                url: "http://localhost:8545".into(),
            },
            tight,
        );

        let session = session_config(&config);
        let (policy, timeouts) = rpc_ledger_policy();
        assert_eq!(session.ledger_read_timeout, policy.worst_case(timeouts.read));
        assert!(session.ledger_read_timeout > timeouts.read * 4);
        let client = training_client_config(&config);
        assert_eq!(session.training_timeout, client.start_budget());
        assert_eq!(session.submit_timeout, client.request_timeout);
    }

    #[test]
    fn test_dev_ledger_keeps_configured_read_bound() {
        let config = runtime(LedgerBackend::Dev, SessionConfig::for_testing());
        let session = session_config(&config);
        assert_eq!(session.ledger_read_timeout, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_dev_ledger_is_seeded_with_project() {
        let cancel = CancellationToken::new();
        let project = ProjectId::new("p1");
        let ledger = build_ledger(
            &LedgerBackend::Dev,
            &project,
            &ParticipantAddress::new("0xcoord"),
            &cancel,
        )
        .unwrap();
        assert_eq!(ledger.current_round(&project).await.unwrap(), 0);
        assert!(!ledger.is_project_ended(&project).await.unwrap());
    }

    #[tokio::test]
    async fn test_exporter_writes_under_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let project = ProjectId::new("p1");
        let ledger = build_ledger(
            &LedgerBackend::Dev,
            &project,
            &ParticipantAddress::new("0xcoord"),
            &cancel,
        )
        .unwrap();
        let exporter = build_exporter(ledger, dir.path());

        assert_eq!(exporter.export_round(&project, 1).await.unwrap(), 0);
        let path = exporter.artifact_path(&project, 1).unwrap();
        assert!(path.starts_with(dir.path()));
        assert!(path.exists());
    }
}
