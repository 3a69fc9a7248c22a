//! Maintenance operations across the job, history and artifact stores.
//!
//! This module provides:
//! * [`MaintenanceService::cleanup`]: age out unreferenced artifacts, then
//!   cap history.
//! * [`MaintenanceService::export`]: bundle artifacts into a zip archive.
//! * [`MaintenanceService::batch_delete_jobs`] /
//!   [`MaintenanceService::batch_delete_history`]: per-id batch deletion.
//!
//! None of these fail a whole batch because of one bad id.

pub mod cleanup;
pub mod export;

use std::sync::Arc;

use thiserror::Error;

use crate::store::{ArtifactStore, BatchOutcome, HistoryStore, JobStore, StoreError};

pub use cleanup::CleanupReport;
pub use export::ExportArchive;

// ---------------------------------------------------------------------------
// MaintenanceError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("archive construction failed: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// MaintenanceService
// ---------------------------------------------------------------------------

pub struct MaintenanceService {
    jobs: Arc<JobStore>,
    history: Arc<HistoryStore>,
}

impl MaintenanceService {
    pub fn new(jobs: Arc<JobStore>, history: Arc<HistoryStore>) -> Self {
        Self { jobs, history }
    }

    fn artifacts(&self) -> &ArtifactStore {
        self.history.artifacts()
    }

    pub fn batch_delete_jobs(&self, job_ids: &[String]) -> Result<BatchOutcome, MaintenanceError> {
        Ok(self.jobs.delete_batch(job_ids)?)
    }

    pub fn batch_delete_history(
        &self,
        entry_ids: &[String],
        delete_artifact: bool,
    ) -> Result<BatchOutcome, MaintenanceError> {
        Ok(self.history.delete_batch(entry_ids, delete_artifact)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::provider::ProviderKind;
    use crate::store::{HistoryEntry, JobInput};
    use chrono::Utc;
    use tempfile::{tempdir, TempDir};

    pub(crate) struct Fixture {
        pub _dir: TempDir,
        pub jobs: Arc<JobStore>,
        pub history: Arc<HistoryStore>,
        pub service: MaintenanceService,
    }

    pub(crate) fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let artifacts = Arc::new(ArtifactStore::open(dir.path().join("audio")).unwrap());
        let jobs = Arc::new(JobStore::open(dir.path().join("jobs.json"), 50).unwrap());
        let history =
            Arc::new(HistoryStore::open(dir.path().join("history.json"), 50, artifacts).unwrap());
        let service = MaintenanceService::new(Arc::clone(&jobs), Arc::clone(&history));
        Fixture {
            _dir: dir,
            jobs,
            history,
            service,
        }
    }

    /// Store `bytes` as the artifact of a new history entry `id`.
    pub(crate) fn record(f: &Fixture, id: &str, bytes: &[u8]) -> HistoryEntry {
        let stored = f.history.artifacts().write(id, bytes).unwrap();
        let entry = HistoryEntry {
            entry_id: id.into(),
            text_preview: id.into(),
            voice_id: "kokoro_en_us_0".into(),
            model: "hexgrad/Kokoro-82M".into(),
            source: ProviderKind::Stub,
            audio_ref: stored.audio_ref,
            content_sha256: Some(stored.sha256),
            duration_seconds: 1.0,
            created_at: Utc::now(),
        };
        f.history.append(entry.clone()).unwrap();
        entry
    }

    #[test]
    fn batch_delete_jobs_reports_per_id() {
        let f = fixture();
        let job = f
            .jobs
            .create(JobInput {
                text: "hi".into(),
                voice_id: "kokoro_en_us_0".into(),
                speed: 1.0,
                style: None,
            })
            .unwrap();

        let outcome = f
            .service
            .batch_delete_jobs(&[job.job_id.clone(), "missing".to_string()])
            .unwrap();
        assert_eq!(outcome.deleted, vec![job.job_id]);
        assert_eq!(outcome.not_found, vec!["missing".to_string()]);
        assert!(f.jobs.is_empty());
    }

    #[test]
    fn batch_delete_history_can_keep_audio() {
        let f = fixture();
        let entry = record(&f, "keep", b"RIFF");
        let outcome = f
            .service
            .batch_delete_history(&["keep".to_string()], false)
            .unwrap();
        assert_eq!(outcome.deleted_count(), 1);
        assert!(f.history.artifacts().exists(&entry.audio_ref));
    }
}
