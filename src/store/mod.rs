//! Persistent stores for jobs, history entries and audio artifacts.
//!
//! This module provides:
//! * [`JobStore`]: every submitted request and its lifecycle status.
//! * [`HistoryStore`]: completed, playable results.
//! * [`ArtifactStore`]: the audio bytes on disk, referenced by id.
//! * [`StoreError`] / [`BatchOutcome`]: shared error and batch reporting.
//!
//! Job and history stores keep their whole (bounded) collection in memory
//! and rewrite a JSON snapshot on every mutation.  Mutations are serialised
//! per store; readers see either the previous or the new collection, never
//! a half-applied one.

pub mod artifacts;
pub mod history;
pub mod jobs;
pub mod snapshot;

use serde::Serialize;
use thiserror::Error;

use crate::pipeline::JobStatus;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use artifacts::{ArtifactInfo, ArtifactStore, StoredArtifact};
pub use history::{text_preview, HistoryEntry, HistoryStore};
pub use jobs::{Job, JobInput, JobStore};

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Errors raised by the stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Unknown job, history entry or artifact id.
    #[error("not found: {0}")]
    NotFound(String),

    /// An artifact reference that would leave the artifact directory.
    #[error("invalid artifact reference: {0:?}")]
    InvalidRef(String),

    /// The requested transition is not an edge of the job state machine.
    /// The job is left in its prior state.
    #[error("invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    /// Reading or writing a snapshot or artifact failed.
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A snapshot could not be encoded.
    #[error("snapshot encoding failed: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_invalid_ref(&self) -> bool {
        matches!(self, StoreError::InvalidRef(_))
    }
}

// ---------------------------------------------------------------------------
// BatchOutcome
// ---------------------------------------------------------------------------

/// Per-id result of a batch deletion.  A missing id never fails the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    /// Ids that were present and are now gone.
    pub deleted: Vec<String>,
    /// Ids that were not present.
    pub not_found: Vec<String>,
}

impl BatchOutcome {
    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }
}
