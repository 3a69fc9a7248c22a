//! Model availability tracker.
//!
//! The tracker is the single source of truth the provider selector reads.
//! Presence is recomputed from the filesystem on every [`ModelTracker::status`]
//! call; nothing is cached beyond the returned snapshot.
//!
//! Downloads run as background tokio tasks, one per model.  At most one
//! download per model is in flight; asking for a model that is already
//! downloading joins the existing attempt.  A failed download is recorded
//! as that model's `last_error` and can be retried with another `ensure`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;

use super::download::{DownloadError, ModelDownloader};
use super::registry::{ModelPaths, ModelSpec, MODELS};

// ---------------------------------------------------------------------------
// ModelDescriptor / EnsureOutcome
// ---------------------------------------------------------------------------

/// Readiness snapshot for one declared model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelDescriptor {
    pub alias: String,
    pub repo_identifier: String,
    /// The on-device path can run this model (runtime configured and model
    /// local-capable), whether or not it is downloaded.
    pub local_supported: bool,
    pub exists_locally: bool,
    pub optional: bool,
    /// Error of the most recent failed download, cleared on success.
    pub last_error: Option<String>,
}

/// What an [`ModelTracker::ensure`] call did, by alias.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnsureOutcome {
    pub started: Vec<String>,
    pub already_running: Vec<String>,
    pub present: Vec<String>,
    /// Requested names that match no declared model.
    pub unknown: Vec<String>,
}

// ---------------------------------------------------------------------------
// ModelTracker
// ---------------------------------------------------------------------------

#[derive(Default)]
struct DownloadState {
    inflight: HashSet<&'static str>,
    last_errors: HashMap<&'static str, String>,
}

pub struct ModelTracker {
    paths: ModelPaths,
    specs: &'static [ModelSpec],
    local_runtime: bool,
    downloader: Arc<dyn ModelDownloader>,
    state: Mutex<DownloadState>,
    /// Woken whenever a download finishes.
    finished: Notify,
}

impl ModelTracker {
    pub fn new(
        paths: ModelPaths,
        local_runtime: bool,
        downloader: Arc<dyn ModelDownloader>,
    ) -> Self {
        Self::with_specs(paths, MODELS, local_runtime, downloader)
    }

    pub fn with_specs(
        paths: ModelPaths,
        specs: &'static [ModelSpec],
        local_runtime: bool,
        downloader: Arc<dyn ModelDownloader>,
    ) -> Self {
        Self {
            paths,
            specs,
            local_runtime,
            downloader,
            state: Mutex::new(DownloadState::default()),
            finished: Notify::new(),
        }
    }

    pub fn paths(&self) -> &ModelPaths {
        &self.paths
    }

    /// Current descriptors, with presence re-read from disk.
    pub fn status(&self) -> Vec<ModelDescriptor> {
        let state = self.state.lock();
        self.specs
            .iter()
            .map(|spec| ModelDescriptor {
                alias: spec.alias.to_string(),
                repo_identifier: spec.repo_id.to_string(),
                local_supported: spec.local_capable && self.local_runtime,
                exists_locally: self.paths.is_available(spec),
                optional: spec.optional,
                last_error: state.last_errors.get(spec.alias).cloned(),
            })
            .collect()
    }

    /// `true` iff a non-optional model is missing.
    pub fn needs_download(&self) -> bool {
        self.specs
            .iter()
            .any(|spec| !spec.optional && !self.paths.is_available(spec))
    }

    /// `true` while any download is in flight.
    pub fn downloading(&self) -> bool {
        !self.state.lock().inflight.is_empty()
    }

    /// Start background downloads.
    ///
    /// With `None`, every missing non-optional model is fetched.  With a
    /// list, each name is resolved by alias or repo id; optional models are
    /// fetched only when named.  Returns immediately.
    pub fn ensure(self: &Arc<Self>, names: Option<&[String]>) -> EnsureOutcome {
        let mut outcome = EnsureOutcome::default();

        let wanted: Vec<&'static ModelSpec> = match names {
            None => self.specs.iter().filter(|s| !s.optional).collect(),
            Some(names) => {
                let mut seen = HashSet::new();
                let mut wanted = Vec::new();
                for name in names {
                    match self.find(name) {
                        Some(spec) if seen.insert(spec.alias) => wanted.push(spec),
                        Some(_) => {}
                        None => outcome.unknown.push(name.clone()),
                    }
                }
                wanted
            }
        };

        for spec in wanted {
            if self.paths.is_available(spec) {
                outcome.present.push(spec.alias.to_string());
                continue;
            }

            let newly_started = self.state.lock().inflight.insert(spec.alias);
            if !newly_started {
                outcome.already_running.push(spec.alias.to_string());
                continue;
            }

            outcome.started.push(spec.alias.to_string());
            self.spawn_download(spec);
        }

        if !outcome.unknown.is_empty() {
            log::warn!("tracker: unknown model name(s): {:?}", outcome.unknown);
        }
        outcome
    }

    /// Resolve once no download is in flight.
    pub async fn wait_for_downloads(&self) {
        loop {
            let finished = self.finished.notified();
            if !self.downloading() {
                return;
            }
            finished.await;
        }
    }

    fn find(&self, name: &str) -> Option<&'static ModelSpec> {
        let name = name.trim();
        self.specs
            .iter()
            .find(|s| s.alias.eq_ignore_ascii_case(name) || s.repo_id == name)
    }

    fn spawn_download(self: &Arc<Self>, spec: &'static ModelSpec) {
        let tracker = Arc::clone(self);
        log::info!("tracker: downloading {} ({})", spec.alias, spec.repo_id);

        tokio::spawn(async move {
            let staging = tracker.paths.staging_dir(spec.repo_id);
            let dest = tracker.paths.model_dir(spec);
            if let Some(parent) = dest.parent() {
                let _ = tokio::fs::create_dir_all(parent).await;
            }

            // The download runs in its own task so that `finish` always
            // runs, even if the downloader panics.
            let downloader = Arc::clone(&tracker.downloader);
            let attempt = tokio::spawn(async move {
                downloader.download(spec.repo_id, &staging, &dest).await
            });
            let result = match attempt.await {
                Ok(result) => result,
                Err(e) => Err(DownloadError::Aborted(e.to_string())),
            };
            tracker.finish(spec, result);
        });
    }

    fn finish(&self, spec: &'static ModelSpec, result: Result<(), DownloadError>) {
        {
            let mut state = self.state.lock();
            state.inflight.remove(spec.alias);
            match &result {
                Ok(()) => {
                    state.last_errors.remove(spec.alias);
                }
                Err(e) => {
                    state.last_errors.insert(spec.alias, e.to_string());
                }
            }
        }

        match result {
            Ok(()) => log::info!("tracker: {} ready", spec.alias),
            Err(e) => log::error!("tracker: download of {} failed: {e}", spec.alias),
        }
        self.finished.notify_waiters();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
