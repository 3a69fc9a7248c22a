//! Consolidated, serialisable view of the service for operators.

use serde::Serialize;

use crate::config::ProviderMode;
use crate::models::ModelDescriptor;
use crate::provider::{ProviderKind, VOICES};
use crate::store::{HistoryEntry, Job};

use super::runner::SynthesisService;

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub mode: ProviderMode,
    /// Provider a default request would use right now.
    pub provider: Option<ProviderKind>,
    /// Why `provider` is `None`.
    pub provider_error: Option<String>,
    pub models: Vec<ModelDescriptor>,
    pub downloading: bool,
    pub needs_download: bool,
    pub job_count: usize,
    pub history_count: usize,
    pub voice_count: usize,
    pub recent_jobs: Vec<Job>,
    pub recent_history: Vec<HistoryEntry>,
}

impl SynthesisService {
    /// Snapshot of provider, model and store state with the `recent` newest
    /// jobs and history entries.
    pub fn status(&self, recent: usize) -> ServiceStatus {
        let core = self.core();
        let (provider, provider_error) = match core.select(None) {
            Ok(kind) => (Some(kind), None),
            Err(e) => (None, Some(e.to_string())),
        };

        ServiceStatus {
            mode: self.mode(),
            provider,
            provider_error,
            models: core.tracker.status(),
            downloading: core.tracker.downloading(),
            needs_download: core.tracker.needs_download(),
            job_count: core.jobs.len(),
            history_count: core.history.len(),
            voice_count: VOICES.len(),
            recent_jobs: core.jobs.list(recent),
            recent_history: core.history.list(recent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::runner::tests::FixtureBuilder;
    use crate::pipeline::{SubmitMode, SynthesisRequest};

    #[tokio::test]
    async fn reports_counts_and_recent_items() {
        let f = FixtureBuilder::new().build();
        for text in ["one", "two", "three"] {
            f.service
                .submit(SynthesisRequest::new(text), SubmitMode::Sync)
                .await
                .unwrap();
        }

        let status = f.service.status(2);
        assert_eq!(status.mode, ProviderMode::Auto);
        assert_eq!(status.provider, Some(ProviderKind::Stub));
        assert_eq!(status.job_count, 3);
        assert_eq!(status.history_count, 3);
        assert_eq!(status.recent_jobs.len(), 2);
        assert_eq!(status.recent_history[0].text_preview, "three");
        assert!(status.needs_download);
        assert!(!status.downloading);
        assert_eq!(status.voice_count, VOICES.len());

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["provider"], "stub");
    }

    #[tokio::test]
    async fn unavailable_explicit_mode_is_explained() {
        let f = FixtureBuilder::new().mode(ProviderMode::Inference).build();
        let status = f.service.status(5);
        assert!(status.provider.is_none());
        assert!(status.provider_error.unwrap().contains("credential"));
    }
}
