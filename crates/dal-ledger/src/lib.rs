//! # DAL Ledger Gateway
//!
//! Read/write access to the voting contract that records rounds, batches,
//! votes and consensus labels.
//!
//! **Architecture:** Hexagonal (Ports/Adapters)
//!
//! ## Module Structure
//!
//! ```text
//! dal-ledger/
//! ├── domain.rs        # VotingStatus, VoteDistribution, LedgerEvent, LedgerLog
//! ├── error.rs         # LedgerError
//! ├── ports.rs         # LedgerGateway trait + LedgerSubscription
//! └── adapters/
//!     ├── retrying.rs  # timeouts, transparent read retry, write-once
//!     ├── memory.rs    # in-process contract simulator
//!     └── rpc.rs       # JSON-RPC over HTTP
//! ```
//!
//! ## Failure Policy
//!
//! | Operation | Timeout | Retry |
//! |-----------|---------|-------|
//! | read | yes | bounded, jittered backoff |
//! | write | yes | never (double-submission risk) |

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod domain;
pub mod error;
pub mod ports;

pub use adapters::{
    InMemoryLedger, LedgerTimeouts, ProjectSetup, RecordedWrite, RetryingLedger, RpcLedgerGateway,
};
pub use domain::{BatchStart, LedgerEvent, LedgerLog, VoteDistribution, VotingStatus};
pub use error::LedgerError;
pub use ports::{LedgerGateway, LedgerSubscription};
