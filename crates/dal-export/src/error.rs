use dal_ledger::LedgerError;
use dal_types::Round;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("ledger read failed while exporting: {0}")]
    Ledger(#[from] LedgerError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed artifact {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("round {0} has not been exported")]
    NotExported(Round),

    #[error("project id {0:?} cannot be used as a directory name")]
    InvalidProject(String),
}
