//! # DAL Results Exporter
//!
//! Turns the ledger-recorded votes of a finished round into the JSON artifact
//! the training service ingests:
//!
//! ```text
//! {output_dir}/{project}/voting_results_round_{round}.json
//! ```
//!
//! Exporting is keyed by round. Re-exporting a round that already has an
//! artifact returns `0` and leaves the file untouched, so any code path may
//! call it speculatively.

#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod file;

pub use error::ExportError;
pub use file::{artifact_name, ExportConfig, FileResultsExporter};

use async_trait::async_trait;
use dal_types::{ProjectId, Round, SampleId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One sample's outcome in an exported round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub sample_id: SampleId,
    pub final_label: String,
    pub votes: BTreeMap<String, u64>,
    /// Share of votes for `final_label` reached a strict majority.
    pub consensus: bool,
    pub round: Round,
}

#[async_trait]
pub trait ResultsExporter: Send + Sync {
    /// Write the artifact for `round`; `0` when it already exists.
    async fn export_round(&self, project: &ProjectId, round: Round) -> Result<usize, ExportError>;

    async fn load_round(
        &self,
        project: &ProjectId,
        round: Round,
    ) -> Result<Vec<VoteRecord>, ExportError>;

    /// Rounds with an artifact, ascending.
    async fn exported_rounds(&self, project: &ProjectId) -> Result<Vec<Round>, ExportError>;
}

#[async_trait]
impl<E: ResultsExporter + ?Sized> ResultsExporter for std::sync::Arc<E> {
    async fn export_round(&self, project: &ProjectId, round: Round) -> Result<usize, ExportError> {
        (**self).export_round(project, round).await
    }

    async fn load_round(
        &self,
        project: &ProjectId,
        round: Round,
    ) -> Result<Vec<VoteRecord>, ExportError> {
        (**self).load_round(project, round).await
    }

    async fn exported_rounds(&self, project: &ProjectId) -> Result<Vec<Round>, ExportError> {
        (**self).exported_rounds(project).await
    }
}
