//! Synthesis orchestrator: drives a job from `queued` to a terminal state.
//!
//! [`SynthesisService`] owns the worker pool and the dependencies every job
//! needs (stores, tracker, providers).
//!
//! # Job flow
//!
//! ```text
//! submit(request)
//!   └─▶ validate → select provider (explicit mode unmet ⇒ error, no job)
//!         └─▶ JobStore::create                                 [queued]
//!               ├─ Sync  → run_job in the caller's task
//!               └─ Async → FIFO queue → one of N workers
//!
//! run_job(id)
//!   └─▶ re-select (unmet ⇒ failed, nothing executed)
//!         └─▶ transition Running                               [running]
//!               └─▶ ProviderSet::synthesize
//!                     ├─ Err → transition Failed(text)         [failed]
//!                     └─ Ok  → write artifact, append history,
//!                              transition Succeeded            [succeeded]
//! ```
//!
//! A job deleted while queued or running is never resurrected: the worker
//! notices the missing record, logs it and drops the result.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{AppConfig, ProviderMode};
use crate::models::ModelTracker;
use crate::provider::{
    find_voice, resolve_provider, ProviderError, ProviderKind, ProviderSet, SelectionContext,
    SpeechRequest, VoicePreset, DEFAULT_VOICE_ID,
};
use crate::store::{
    text_preview, ArtifactStore, BatchOutcome, HistoryEntry, HistoryStore, Job, JobInput,
    JobStore, StoreError,
};

use super::state::{JobOutcome, Transition};

/// Longest accepted input, in characters.
pub const MAX_TEXT_CHARS: usize = 6000;
pub const MIN_SPEED: f32 = 0.5;
pub const MAX_SPEED: f32 = 2.0;

// ---------------------------------------------------------------------------
// ServiceError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request was rejected before any job was created.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// SynthesisRequest
// ---------------------------------------------------------------------------

/// A caller's request, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice_id: String,
    pub speed: f32,
    pub style: Option<String>,
}

impl SynthesisRequest {
    /// Request with the default voice at normal speed.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice_id: DEFAULT_VOICE_ID.to_string(),
            speed: 1.0,
            style: None,
        }
    }

    pub fn with_voice(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = voice_id.into();
        self
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    /// Normalise and check the request.
    pub fn validate(&self) -> Result<(JobInput, &'static VoicePreset), ServiceError> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(ServiceError::InvalidRequest("text is empty".into()));
        }
        let chars = text.chars().count();
        if chars > MAX_TEXT_CHARS {
            return Err(ServiceError::InvalidRequest(format!(
                "text is {chars} characters, the limit is {MAX_TEXT_CHARS}"
            )));
        }
        if !self.speed.is_finite() || !(MIN_SPEED..=MAX_SPEED).contains(&self.speed) {
            return Err(ServiceError::InvalidRequest(format!(
                "speed {} is outside {MIN_SPEED}..={MAX_SPEED}",
                self.speed
            )));
        }
        let voice = find_voice(self.voice_id.trim()).ok_or_else(|| {
            ServiceError::InvalidRequest(format!("unknown voice '{}'", self.voice_id))
        })?;

        let input = JobInput {
            text: text.to_string(),
            voice_id: voice.id.to_string(),
            speed: self.speed,
            style: self
                .style
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        };
        Ok((input, voice))
    }
}

/// How [`SynthesisService::submit`] waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    /// Run in the caller's task and return the terminal job.
    Sync,
    /// Queue for the worker pool and return the `queued` job.
    Async,
}

// ---------------------------------------------------------------------------
// ServiceOptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub mode: ProviderMode,
    /// Size of the asynchronous worker pool.
    pub workers: usize,
    /// Characters of input kept in each history entry.
    pub preview_chars: usize,
}

impl ServiceOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            mode: config.provider.mode,
            workers: config.jobs.workers,
            preview_chars: config.history.preview_chars,
        }
    }
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            mode: ProviderMode::Auto,
            workers: 2,
            preview_chars: 160,
        }
    }
}

// ---------------------------------------------------------------------------
// SynthesisService
// ---------------------------------------------------------------------------

pub struct SynthesisService {
    core: Arc<Core>,
    queue: mpsc::UnboundedSender<String>,
    workers: Vec<JoinHandle<()>>,
}

/// State shared by the service handle and every worker.
pub(super) struct Core {
    pub(super) options: ServiceOptions,
    pub(super) jobs: Arc<JobStore>,
    pub(super) history: Arc<HistoryStore>,
    pub(super) tracker: Arc<ModelTracker>,
    pub(super) providers: ProviderSet,
}

impl SynthesisService {
    /// Build the service and spawn its worker pool.  Must be called from
    /// within a tokio runtime.
    pub fn start(
        options: ServiceOptions,
        jobs: Arc<JobStore>,
        history: Arc<HistoryStore>,
        tracker: Arc<ModelTracker>,
        providers: ProviderSet,
    ) -> Self {
        let workers = options.workers.max(1);
        let core = Arc::new(Core {
            options,
            jobs,
            history,
            tracker,
            providers,
        });

        let (queue, rx) = mpsc::unbounded_channel();
        let workers = spawn_workers(&core, rx, workers);
        log::info!(
            "runner: started {} worker(s), provider mode {}",
            workers.len(),
            core.options.mode
        );

        Self {
            core,
            queue,
            workers,
        }
    }

    pub fn mode(&self) -> ProviderMode {
        self.core.options.mode
    }

    pub fn jobs(&self) -> &Arc<JobStore> {
        &self.core.jobs
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.core.history
    }

    pub fn artifacts(&self) -> &Arc<ArtifactStore> {
        self.core.history.artifacts()
    }

    pub fn tracker(&self) -> &Arc<ModelTracker> {
        &self.core.tracker
    }

    pub(super) fn core(&self) -> &Core {
        &self.core
    }

    /// Which provider would handle a request for `model` right now.
    pub fn select(&self, model: Option<&str>) -> Result<ProviderKind, ProviderError> {
        self.core.select(model)
    }

    /// Validate `request`, record a job and run it.
    ///
    /// An explicit provider mode whose precondition is unmet is rejected
    /// here, before any job exists.
    pub async fn submit(
        &self,
        request: SynthesisRequest,
        mode: SubmitMode,
    ) -> Result<Job, ServiceError> {
        let (input, voice) = request.validate()?;
        self.core.select(Some(voice.model))?;

        let job = self.core.jobs.create(input)?;
        log::info!("runner: job {} submitted ({mode:?})", job.job_id);

        match mode {
            SubmitMode::Sync => {
                self.core.run_job(&job.job_id).await;
                Ok(self.core.jobs.get(&job.job_id)?)
            }
            SubmitMode::Async => {
                if self.queue.send(job.job_id.clone()).is_err() {
                    self.core
                        .fail(&job.job_id, "worker pool is not running".to_string());
                    return Ok(self.core.jobs.get(&job.job_id)?);
                }
                Ok(job)
            }
        }
    }

    pub fn get_job(&self, job_id: &str) -> Result<Job, StoreError> {
        self.core.jobs.get(job_id)
    }

    pub fn list_jobs(&self, limit: usize) -> Vec<Job> {
        self.core.jobs.list(limit)
    }

    /// Remove a job record.  A queued or running job is removed too; its
    /// eventual result is discarded.
    pub fn delete_job(&self, job_id: &str) -> Result<(), StoreError> {
        self.core.jobs.delete(job_id)
    }

    pub fn delete_jobs(&self, job_ids: &[String]) -> Result<BatchOutcome, StoreError> {
        self.core.jobs.delete_batch(job_ids)
    }

    pub fn get_history(&self, entry_id: &str) -> Result<HistoryEntry, StoreError> {
        self.core.history.get(entry_id)
    }

    pub fn list_history(&self, limit: usize) -> Vec<HistoryEntry> {
        self.core.history.list(limit)
    }

    pub fn delete_history(&self, entry_id: &str, delete_artifact: bool) -> Result<(), StoreError> {
        self.core.history.delete(entry_id, delete_artifact)
    }

    /// Poll until `job_id` is terminal.
    pub async fn wait_for(&self, job_id: &str, poll: Duration) -> Result<Job, StoreError> {
        loop {
            let job = self.core.jobs.get(job_id)?;
            if job.status.is_terminal() {
                return Ok(job);
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Stop accepting work, let the workers drain the queue, then return.
    pub async fn shutdown(self) {
        drop(self.queue);
        for worker in self.workers {
            if let Err(e) = worker.await {
                log::error!("runner: worker ended abnormally: {e}");
            }
        }
        log::info!("runner: all workers stopped");
    }
}

// ---------------------------------------------------------------------------
// Worker pool
// ---------------------------------------------------------------------------

fn spawn_workers(
    core: &Arc<Core>,
    rx: mpsc::UnboundedReceiver<String>,
    count: usize,
) -> Vec<JoinHandle<()>> {
    // One shared receiver keeps admission FIFO across workers.
    let rx = Arc::new(tokio::sync::Mutex::new(rx));
    (0..count)
        .map(|worker| {
            let core = Arc::clone(core);
            let rx = Arc::clone(&rx);
            tokio::spawn(async move {
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(job_id) = next else { break };
                    log::debug!("runner: worker {worker} picked {job_id}");
                    core.run_job(&job_id).await;
                }
                log::debug!("runner: worker {worker} stopped");
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Job execution
// ---------------------------------------------------------------------------

impl Core {
    pub(super) fn select(&self, model: Option<&str>) -> Result<ProviderKind, ProviderError> {
        let models = self.tracker.status();
        let ctx = SelectionContext {
            models: &models,
            local_runtime: self.providers.has_local(),
            inference_credential: self.providers.has_inference(),
            model,
        };
        resolve_provider(self.options.mode, &ctx)
    }

    async fn run_job(&self, job_id: &str) {
        let job = match self.jobs.get(job_id) {
            Ok(job) => job,
            Err(_) => {
                log::info!("runner: job {job_id} was deleted before it started; skipping");
                return;
            }
        };

        let Some(voice) = find_voice(&job.input.voice_id) else {
            self.fail(job_id, format!("unknown voice '{}'", job.input.voice_id));
            return;
        };

        let kind = match self.select(Some(voice.model)) {
            Ok(kind) => kind,
            Err(e) => {
                self.fail(job_id, e.to_string());
                return;
            }
        };

        match self.jobs.transition(job_id, Transition::Running) {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                log::info!("runner: job {job_id} was deleted before it started; skipping");
                return;
            }
            Err(e) => {
                log::error!("runner: cannot start job {job_id}: {e}");
                return;
            }
        }
        log::info!("runner: job {job_id} using {kind} provider ({})", voice.model);

        let request = SpeechRequest {
            text: job.input.text.clone(),
            voice_id: voice.id.to_string(),
            model: voice.model.to_string(),
            speed: job.input.speed,
            style: job.input.style.clone(),
        };

        let audio = match self.providers.synthesize(kind, &request).await {
            Ok(audio) => audio,
            Err(e) => {
                self.fail(job_id, e.to_string());
                return;
            }
        };

        if !self.jobs.contains(job_id) {
            log::info!("runner: job {job_id} was deleted while running; discarding result");
            return;
        }

        let artifacts = self.history.artifacts();
        let stored = match artifacts.write(job_id, &audio.wav) {
            Ok(stored) => stored,
            Err(e) => {
                self.fail(job_id, format!("cannot store audio: {e}"));
                return;
            }
        };

        let entry = HistoryEntry {
            entry_id: job_id.to_string(),
            text_preview: text_preview(&job.input.text, self.options.preview_chars),
            voice_id: voice.id.to_string(),
            model: voice.model.to_string(),
            source: kind,
            audio_ref: stored.audio_ref.clone(),
            content_sha256: Some(stored.sha256.clone()),
            duration_seconds: audio.duration_seconds,
            created_at: Utc::now(),
        };
        if let Err(e) = self.history.append(entry) {
            if let Err(del) = artifacts.delete(&stored.audio_ref) {
                log::warn!("runner: cannot remove orphaned {}: {del}", stored.audio_ref);
            }
            self.fail(job_id, format!("cannot record history: {e}"));
            return;
        }

        let outcome = JobOutcome {
            result_ref: job_id.to_string(),
            audio_ref: stored.audio_ref,
            duration_seconds: audio.duration_seconds,
            model: voice.model.to_string(),
            source: kind,
        };
        match self.jobs.transition(job_id, Transition::Succeeded(outcome)) {
            Ok(_) => log::info!(
                "runner: job {job_id} succeeded ({:.2} s of audio)",
                audio.duration_seconds
            ),
            Err(e) if e.is_not_found() => {
                log::info!("runner: job {job_id} was deleted while running; discarding result");
                if let Err(e) = self.history.delete(job_id, true) {
                    log::warn!("runner: cannot roll back history for {job_id}: {e}");
                }
            }
            Err(e) => log::error!("runner: cannot complete job {job_id}: {e}"),
        }
    }

    /// Mark a job failed.  A job that no longer exists is skipped.
    fn fail(&self, job_id: &str, reason: String) {
        log::warn!("runner: job {job_id} failed: {reason}");
        match self.jobs.transition(job_id, Transition::Failed(reason)) {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                log::info!("runner: job {job_id} was deleted; failure not recorded");
            }
            Err(e) => log::error!("runner: cannot record failure of {job_id}: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
