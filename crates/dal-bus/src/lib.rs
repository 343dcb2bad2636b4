//! # DAL Bus - Session Event Stream
//!
//! Carries the canonical events a session emits to its consumers
//! (`state-changed`, `iteration-completed`, `error`, `project-should-end`).
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │   Session    │                    │   UI panel   │
//! │    actor     │    publish()       │  / event log │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  Event Bus   │          │
//!                  │              │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! ## Subscriptions
//!
//! A `Subscription` is the only removal mechanism: dropping it releases the
//! listener. Closing the bus ends every subscription once the events already
//! buffered for it are drained, and every later `publish` is discarded.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod events;
pub mod publisher;
pub mod subscriber;

pub use events::{EventFilter, EventTopic, IterationEvent, SessionEvent};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{EventStream, Subscription, SubscriptionError};

/// Events buffered per subscriber before the slowest one starts lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;
