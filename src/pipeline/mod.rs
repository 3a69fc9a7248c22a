//! Job lifecycle and the synthesis orchestrator.
//!
//! # Architecture
//!
//! ```text
//! SynthesisService::submit(request, mode)
//!        │
//!        ├─ validate, select provider          (explicit mode unmet ⇒ Err)
//!        ├─ JobStore::create                   queued
//!        │
//!        ├─ Sync  ──▶ run_job (caller's task)
//!        └─ Async ──▶ mpsc queue ──▶ worker 1..N ──▶ run_job
//!
//! run_job: queued → running → ProviderSet::synthesize
//!            ├─ ok  → ArtifactStore::write, HistoryStore::append → succeeded
//!            └─ err → failed(error text)
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use speech_jobs::config::AppPaths;
//! use speech_jobs::models::{HfDownloader, ModelPaths, ModelTracker};
//! use speech_jobs::pipeline::{ServiceOptions, SubmitMode, SynthesisRequest, SynthesisService};
//! use speech_jobs::provider::ProviderSet;
//! use speech_jobs::store::{ArtifactStore, HistoryStore, JobStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let paths = AppPaths::new();
//! let artifacts = Arc::new(ArtifactStore::open(&paths.audio_dir)?);
//! let jobs = Arc::new(JobStore::open(&paths.jobs_file, 300)?);
//! let history = Arc::new(HistoryStore::open(&paths.history_file, 200, artifacts)?);
//! let tracker = Arc::new(ModelTracker::new(
//!     ModelPaths::from_app_paths(&paths),
//!     false,
//!     Arc::new(HfDownloader::new("https://huggingface.co", None)),
//! ));
//!
//! let service = SynthesisService::start(
//!     ServiceOptions::default(),
//!     jobs,
//!     history,
//!     tracker,
//!     ProviderSet::stub_only(),
//! );
//! let job = service
//!     .submit(SynthesisRequest::new("Hello"), SubmitMode::Sync)
//!     .await?;
//! println!("{} {}", job.job_id, job.status);
//! # Ok(())
//! # }
//! ```

pub mod runner;
pub mod state;
pub mod status;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use runner::{
    ServiceError, ServiceOptions, SubmitMode, SynthesisRequest, SynthesisService, MAX_SPEED,
    MAX_TEXT_CHARS, MIN_SPEED,
};
pub use state::{JobOutcome, JobStatus, Transition};
pub use status::ServiceStatus;
