//! Text-to-speech job orchestration.
//!
//! * [`config`]: settings file, environment overrides and data paths.
//! * [`store`]: job, history and artifact stores.
//! * [`models`]: model registry, availability tracker and downloads.
//! * [`provider`]: speech backends and the provider selection policy.
//! * [`pipeline`]: job state machine and the synthesis orchestrator.
//! * [`maintenance`]: cleanup, export and batch deletion.

pub mod config;
pub mod maintenance;
pub mod models;
pub mod pipeline;
pub mod provider;
pub mod store;
