//! # DAL Training Service Client
//!
//! REST client for the training service (AL-Engine) that ingests labels,
//! trains, and selects the next batch of samples.
//!
//! | Endpoint | Timeout | Retry |
//! |----------|---------|-------|
//! | `GET /health` | short (≤5s) | never |
//! | `POST /start_iteration` | long | bounded backoff |
//! | `GET /status` | short | never (caller polls) |
//! | `POST /submit_labels` | long | never (the session backs off) |
//! | `GET /results/{iteration}` | short | bounded backoff |
//! | `POST /final_training` | long | bounded backoff |
//!
//! Every call can be cancelled mid-flight through the client's
//! `CancellationToken`.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod client;
pub mod config;
pub mod error;
pub mod mock;
pub mod ports;
pub mod types;

pub use client::HttpTrainingClient;
pub use config::TrainingClientConfig;
pub use error::TrainingError;
pub use mock::{MockTrainingService, TrainingCall};
pub use ports::TrainingService;
pub use types::{
    FinalModel, FinalTrainingRequest, FinalTrainingResponse, IterationPlan, LabeledSample,
    PlannedSample, QuerySample, StartIterationRequest, StartIterationResponse,
    SubmitLabelsRequest, SubmitLabelsResponse, TrainingPhase, TrainingStatus,
};
