//! Ledger adapters.

pub mod memory;
pub mod retrying;
pub mod rpc;

pub use memory::{InMemoryLedger, ProjectSetup, RecordedWrite};
pub use retrying::{LedgerTimeouts, RetryingLedger};
pub use rpc::RpcLedgerGateway;
