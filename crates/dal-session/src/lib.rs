//! # DAL Session - Iteration Coordination
//!
//! One `IterationSession` per (project, participant) owns the lifecycle of an
//! active-learning round:
//!
//! ```text
//! idle ──start──→ starting ──→ voting ──→ aggregating ──→ training ──→ idle
//!                    │                                        │
//!                    └──(training down)──→ error              └──→ ended
//! ```
//!
//! ## Module Structure
//!
//! ```text
//! dal-session/
//! ├── session.rs   # IterationSession handle, SessionPorts
//! ├── actor.rs     # serialized transitions, rehydration, error surfacing
//! ├── bridge.rs    # EventBridge: durable ledger subscription
//! ├── monitor.rs   # TrainingMonitor: health checks, status polls
//! ├── policy.rs    # ErrorPolicy: role-dependent disposition
//! ├── command.rs   # actor messages, bounded calls
//! ├── config.rs    # SessionConfig
//! └── error.rs     # SessionError
//! ```
//!
//! ## Invariants
//!
//! - Only one round is open per project: `start_iteration` checks the
//!   ledger's active flag before anything else.
//! - `completed_samples` grows by exactly one per distinct `(round, sample)`.
//! - The round number comes from the ledger and never decreases.
//! - After `end()` returns, no subscriber receives another event.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod actor;
mod bridge;
mod command;
pub mod config;
pub mod error;
mod monitor;
pub mod policy;
pub mod session;

pub use config::SessionConfig;
pub use error::SessionError;
pub use policy::{Disposition, ErrorPolicy};
pub use session::{IterationSession, SessionPorts};
