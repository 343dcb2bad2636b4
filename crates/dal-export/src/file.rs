//! Filesystem exporter backed by ledger reads.

use crate::error::ExportError;
use crate::{ResultsExporter, VoteRecord};
use async_trait::async_trait;
use dal_ledger::LedgerGateway;
use dal_types::{ProjectId, Round};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const PREFIX: &str = "voting_results_round_";
const SUFFIX: &str = ".json";

/// File name of the artifact for `round`.
pub fn artifact_name(round: Round) -> String {
    format!("{PREFIX}{round}{SUFFIX}")
}

fn round_of(file_name: &str) -> Option<Round> {
    file_name
        .strip_prefix(PREFIX)?
        .strip_suffix(SUFFIX)?
        .parse()
        .ok()
}

#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./dal-output"),
        }
    }
}

pub struct FileResultsExporter {
    ledger: Arc<dyn LedgerGateway>,
    config: ExportConfig,
}

impl FileResultsExporter {
    pub fn new(ledger: Arc<dyn LedgerGateway>, config: ExportConfig) -> Self {
        Self { ledger, config }
    }

    pub fn project_dir(&self, project: &ProjectId) -> Result<PathBuf, ExportError> {
        let name = project.as_str();
        let safe = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\', '\0']);
        if !safe {
            return Err(ExportError::InvalidProject(name.to_string()));
        }
        Ok(self.config.output_dir.join(name))
    }

    pub fn artifact_path(&self, project: &ProjectId, round: Round) -> Result<PathBuf, ExportError> {
        Ok(self.project_dir(project)?.join(artifact_name(round)))
    }

    async fn collect(&self, project: &ProjectId, round: Round) -> Result<Vec<VoteRecord>, ExportError> {
        let sample_ids = self.ledger.batch_sample_ids(project, round).await?;
        let mut records = Vec::with_capacity(sample_ids.len());

        for sample_id in sample_ids {
            let Some(final_label) = self.ledger.final_label(project, &sample_id).await? else {
                debug!(project = %project, round, sample = %sample_id, "No consensus label, skipped");
                continue;
            };
            let distribution = self.ledger.voting_distribution(project, &sample_id).await?;
            let for_label = distribution.votes.get(&final_label).copied().unwrap_or(0);
            records.push(VoteRecord {
                consensus: for_label * 2 > distribution.total(),
                votes: distribution.votes,
                sample_id,
                final_label,
                round,
            });
        }
        Ok(records)
    }
}

async fn exists(path: &Path) -> Result<bool, ExportError> {
    tokio::fs::try_exists(path).await.map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[async_trait]
impl ResultsExporter for FileResultsExporter {
    async fn export_round(&self, project: &ProjectId, round: Round) -> Result<usize, ExportError> {
        let path = self.artifact_path(project, round)?;
        if exists(&path).await? {
            debug!(path = %path.display(), "Round already exported");
            return Ok(0);
        }

        let records = self.collect(project, round).await?;
        let dir = self.project_dir(project)?;
        let io = |source| ExportError::Io {
            path: dir.clone(),
            source,
        };
        tokio::fs::create_dir_all(&dir).await.map_err(io)?;

        let body = serde_json::to_vec_pretty(&records).map_err(|source| ExportError::Malformed {
            path: path.clone(),
            source,
        })?;

        // Concurrent exporters each write their own temp file; the rename is
        // atomic, so readers only ever see a complete artifact.
        let tmp = dir.join(format!(".{}.{}.tmp", artifact_name(round), uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, &body).await.map_err(io)?;
        if exists(&path).await? {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Ok(0);
        }
        tokio::fs::rename(&tmp, &path).await.map_err(io)?;

        info!(project = %project, round, records = records.len(), path = %path.display(), "Round exported");
        Ok(records.len())
    }

    async fn load_round(
        &self,
        project: &ProjectId,
        round: Round,
    ) -> Result<Vec<VoteRecord>, ExportError> {
        let path = self.artifact_path(project, round)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ExportError::NotExported(round))
            }
            Err(source) => return Err(ExportError::Io { path, source }),
        };
        serde_json::from_slice(&bytes).map_err(|source| ExportError::Malformed { path, source })
    }

    async fn exported_rounds(&self, project: &ProjectId) -> Result<Vec<Round>, ExportError> {
        let dir = self.project_dir(project)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(ExportError::Io { path: dir, source }),
        };

        let mut rounds = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    if let Some(round) = entry.file_name().to_str().and_then(round_of) {
                        rounds.push(round);
                    }
                }
                Ok(None) => break,
                Err(source) => return Err(ExportError::Io { path: dir, source }),
            }
        }
        rounds.sort_unstable();
        Ok(rounds)
    }
}
