//! # DAL Types Crate
//!
//! Domain entities shared by every subsystem of the coordinator.
//!
//! ## Design Principles
//!
//! - **Ledger is the source of truth**: `Round` values only ever come from the
//!   ledger; nothing in this crate increments them.
//! - **Closed phase set**: `Phase` is an exhaustive enum, so a new phase cannot
//!   be introduced without every transition site being revisited.
//! - **Value objects**: `BatchProgress` and `SessionSnapshot` are replaced
//!   wholesale, never patched field-by-field from two sources.

pub mod entities;
pub mod errors;
pub mod ids;
pub mod retry;

pub use entities::*;
pub use errors::*;
pub use ids::*;
pub use retry::{RetryError, RetryPolicy};
