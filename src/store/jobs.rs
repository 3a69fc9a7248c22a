//! Job store: the authoritative record of every submitted request.
//!
//! Jobs are held oldest-first and persisted as a JSON snapshot on every
//! mutation.  The collection is capped: creating a job beyond `max_items`
//! evicts the oldest job regardless of its status, so a job stuck in
//! `running` can never block the cap.
//!
//! On [`JobStore::open`] any job that was still `running` (or `queued`) when
//! the process stopped is reclassified as `failed` with an "interrupted"
//! reason; execution is never resumed across restarts.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::{JobOutcome, JobStatus, Transition};
use crate::provider::ProviderKind;

use super::snapshot::SnapshotCell;
use super::{BatchOutcome, StoreError};

/// Error text for a job that was executing when the process stopped.
pub const INTERRUPTED_RUNNING: &str = "interrupted: process stopped while the job was running";
/// Error text for a job that never reached a worker before the process stopped.
pub const INTERRUPTED_QUEUED: &str = "interrupted before start: process stopped while queued";

// ---------------------------------------------------------------------------
// JobInput / Job
// ---------------------------------------------------------------------------

/// The immutable request a job was created for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInput {
    pub text: String,
    pub voice_id: String,
    pub speed: f32,
    pub style: Option<String>,
}

/// One synthesis request's lifecycle record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub status: JobStatus,
    pub input: JobInput,
    /// History entry id; set only when `succeeded`.
    #[serde(default)]
    pub result_ref: Option<String>,
    /// Failure reason; set only when `failed`.
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub audio_ref: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub source: Option<ProviderKind>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    fn new(input: JobInput) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4().to_string(),
            status: JobStatus::Queued,
            input,
            result_ref: None,
            error: None,
            audio_ref: None,
            duration_seconds: None,
            model: None,
            source: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply `transition`, validating it against the state machine.
    fn apply(&mut self, transition: Transition) -> Result<(), StoreError> {
        let to = transition.target();
        if !self.status.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                job_id: self.job_id.clone(),
                from: self.status,
                to,
            });
        }

        match transition {
            Transition::Running => {}
            Transition::Succeeded(outcome) => self.set_outcome(outcome),
            Transition::Failed(reason) => self.set_failed(reason),
        }
        self.status = to;
        self.touch();
        Ok(())
    }

    fn set_outcome(&mut self, outcome: JobOutcome) {
        self.result_ref = Some(outcome.result_ref);
        self.audio_ref = Some(outcome.audio_ref);
        self.duration_seconds = Some(outcome.duration_seconds);
        self.model = Some(outcome.model);
        self.source = Some(outcome.source);
        self.error = None;
    }

    fn set_failed(&mut self, reason: String) {
        self.error = Some(if reason.trim().is_empty() {
            "unknown error".to_string()
        } else {
            reason
        });
        self.result_ref = None;
        self.audio_ref = None;
    }

    /// `updated_at` never moves backwards, even if the wall clock does.
    fn touch(&mut self) {
        self.updated_at = Utc::now().max(self.updated_at).max(self.created_at);
    }
}

// ---------------------------------------------------------------------------
// JobStore
// ---------------------------------------------------------------------------

pub struct JobStore {
    cell: SnapshotCell<Job>,
    max_items: usize,
}

impl JobStore {
    /// Load the snapshot at `path` and recover jobs interrupted by a restart.
    pub fn open(path: impl Into<PathBuf>, max_items: usize) -> Result<Self, StoreError> {
        let store = Self {
            cell: SnapshotCell::load(path),
            max_items: max_items.max(1),
        };

        let (recovered, evicted) = store.cell.read(|jobs| {
            let recovered = jobs.iter().filter(|j| !j.status.is_terminal()).count();
            (recovered, jobs.len().saturating_sub(store.max_items))
        });

        if recovered > 0 || evicted > 0 {
            store.cell.mutate(|jobs| {
                jobs.sort_by_key(|j| j.created_at);
                for job in jobs.iter_mut() {
                    let reason = match job.status {
                        JobStatus::Running => INTERRUPTED_RUNNING,
                        JobStatus::Queued => INTERRUPTED_QUEUED,
                        _ => continue,
                    };
                    job.status = JobStatus::Failed;
                    job.set_failed(reason.to_string());
                    job.touch();
                }
                let overflow = jobs.len().saturating_sub(store.max_items);
                jobs.drain(..overflow);
                Ok(())
            })?;
            log::warn!(
                "jobs: reload failed {recovered} interrupted job(s), evicted {evicted}"
            );
        }

        log::info!(
            "jobs: loaded {} job(s) from {}",
            store.len(),
            store.cell.path().display()
        );
        Ok(store)
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// Record a new `queued` job, evicting the oldest jobs past the cap.
    pub fn create(&self, input: JobInput) -> Result<Job, StoreError> {
        let job = Job::new(input);
        let created = job.clone();
        let max_items = self.max_items;

        let evicted = self.cell.mutate(move |jobs| {
            jobs.push(job);
            let overflow = jobs.len().saturating_sub(max_items);
            Ok(jobs.drain(..overflow).map(|j| j.job_id).collect::<Vec<_>>())
        })?;

        for id in &evicted {
            log::info!("jobs: cap {max_items} reached, evicted {id}");
        }
        log::debug!("jobs: created {}", created.job_id);
        Ok(created)
    }

    /// Move a job along the state machine and return its new state.
    pub fn transition(&self, job_id: &str, transition: Transition) -> Result<Job, StoreError> {
        let job = self.cell.mutate(|jobs| {
            let job = jobs
                .iter_mut()
                .find(|j| j.job_id == job_id)
                .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
            job.apply(transition)?;
            Ok(job.clone())
        })?;

        log::debug!("jobs: {job_id} -> {}", job.status);
        Ok(job)
    }

    pub fn get(&self, job_id: &str) -> Result<Job, StoreError> {
        self.cell
            .read(|jobs| jobs.iter().find(|j| j.job_id == job_id).cloned())
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.cell.read(|jobs| jobs.iter().any(|j| j.job_id == job_id))
    }

    /// Up to `limit` jobs, most recently created first.
    pub fn list(&self, limit: usize) -> Vec<Job> {
        self.cell
            .read(|jobs| jobs.iter().rev().take(limit).cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.cell.read(|jobs| jobs.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove one job, whatever its status.
    ///
    /// Removing a `queued`/`running` job does not stop its worker; the
    /// worker's later writes for this id become no-ops.
    pub fn delete(&self, job_id: &str) -> Result<(), StoreError> {
        self.cell.mutate(|jobs| {
            let idx = jobs
                .iter()
                .position(|j| j.job_id == job_id)
                .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
            jobs.remove(idx);
            Ok(())
        })?;
        log::info!("jobs: deleted {job_id}");
        Ok(())
    }

    /// Remove every listed job that exists, reporting the rest as not found.
    pub fn delete_batch(&self, job_ids: &[String]) -> Result<BatchOutcome, StoreError> {
        let outcome = self.cell.mutate(|jobs| {
            let mut outcome = BatchOutcome::default();
            for id in job_ids {
                match jobs.iter().position(|j| &j.job_id == id) {
                    Some(idx) => {
                        jobs.remove(idx);
                        outcome.deleted.push(id.clone());
                    }
                    None => outcome.not_found.push(id.clone()),
                }
            }
            Ok(outcome)
        })?;

        log::info!(
            "jobs: batch delete removed {}, {} not found",
            outcome.deleted.len(),
            outcome.not_found.len()
        );
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
