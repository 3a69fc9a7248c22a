//! Speech providers and the policy that chooses between them.
//!
//! This module provides:
//! * [`SpeechBackend`]: the async trait every provider implements.
//! * [`StubBackend`], [`InferenceBackend`], [`LocalCommandBackend`]: the
//!   three provider variants.
//! * [`resolve_provider`]: the pure selection policy.
//! * [`ProviderSet`]: the configured backends, dispatching by [`ProviderKind`].
//! * [`VOICES`]: the voice preset catalogue.

pub mod backend;
pub mod inference;
pub mod local;
pub mod selector;
pub mod stub;
pub mod voices;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AppConfig;
use crate::models::ModelPaths;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use crate::config::ProviderMode;
pub use backend::{BackendError, SpeechBackend, SpeechRequest, SynthesizedAudio};
pub use inference::InferenceBackend;
pub use local::LocalCommandBackend;
pub use selector::{resolve_provider, SelectionContext};
pub use stub::StubBackend;
pub use voices::{find_voice, VoicePreset, DEFAULT_VOICE_ID, VOICES};

// ---------------------------------------------------------------------------
// ProviderKind
// ---------------------------------------------------------------------------

/// The provider that actually handles (or handled) a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// On-device runtime.
    Local,
    /// Hosted inference endpoint.
    Inference,
    /// Placeholder tone.
    Stub,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Local => "local",
            ProviderKind::Inference => "inference",
            ProviderKind::Stub => "stub",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ProviderKind> for ProviderMode {
    fn from(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Local => ProviderMode::Local,
            ProviderKind::Inference => ProviderMode::Inference,
            ProviderKind::Stub => ProviderMode::Stub,
        }
    }
}

// ---------------------------------------------------------------------------
// ProviderError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The precondition for the requested mode is not met.  Nothing was
    /// executed.
    #[error("provider '{mode}' is unavailable: {reason}")]
    Unavailable { mode: ProviderMode, reason: String },

    /// The provider ran and failed.  Not retried.
    #[error("{provider} provider failed: {message}")]
    Execution {
        provider: ProviderKind,
        message: String,
    },
}

// ---------------------------------------------------------------------------
// ProviderSet
// ---------------------------------------------------------------------------

/// The backends available to this process.  The stub is always present.
#[derive(Clone)]
pub struct ProviderSet {
    local: Option<Arc<dyn SpeechBackend>>,
    inference: Option<Arc<dyn SpeechBackend>>,
    stub: Arc<dyn SpeechBackend>,
}

impl ProviderSet {
    pub fn stub_only() -> Self {
        Self {
            local: None,
            inference: None,
            stub: Arc::new(StubBackend::new()),
        }
    }

    /// Build the set from config: the local runtime if one can be found, the
    /// hosted endpoint if a credential is configured.
    pub fn from_config(config: &AppConfig, models: ModelPaths) -> Self {
        let mut set = Self::stub_only();
        if let Some(local) = LocalCommandBackend::discover(&config.local, models) {
            set = set.with_local(Arc::new(local));
        }
        if let Some(inference) = InferenceBackend::from_config(&config.provider) {
            set = set.with_inference(Arc::new(inference));
        }
        set
    }

    pub fn with_local(mut self, backend: Arc<dyn SpeechBackend>) -> Self {
        self.local = Some(backend);
        self
    }

    pub fn with_inference(mut self, backend: Arc<dyn SpeechBackend>) -> Self {
        self.inference = Some(backend);
        self
    }

    pub fn has_local(&self) -> bool {
        self.local.is_some()
    }

    pub fn has_inference(&self) -> bool {
        self.inference.is_some()
    }

    pub fn backend(&self, kind: ProviderKind) -> Option<&Arc<dyn SpeechBackend>> {
        match kind {
            ProviderKind::Local => self.local.as_ref(),
            ProviderKind::Inference => self.inference.as_ref(),
            ProviderKind::Stub => Some(&self.stub),
        }
    }

    /// Run `request` on the backend for `kind`.  A backend failure, or a
    /// panic inside the backend, becomes [`ProviderError::Execution`].
    ///
    /// The call runs in its own task so a panicking backend cannot unwind
    /// through the caller (a pool worker).
    pub async fn synthesize(
        &self,
        kind: ProviderKind,
        request: &SpeechRequest,
    ) -> Result<SynthesizedAudio, ProviderError> {
        let backend = Arc::clone(self.backend(kind).ok_or_else(|| {
            ProviderError::Unavailable {
                mode: kind.into(),
                reason: "backend is not configured".into(),
            }
        })?);

        let owned = request.clone();
        let outcome = tokio::spawn(async move { backend.synthesize(&owned).await }).await;

        let message = match outcome {
            Ok(Ok(audio)) => return Ok(audio),
            Ok(Err(e)) => e.to_string(),
            Err(e) if e.is_panic() => {
                format!("provider panicked: {}", panic_message(e.into_panic()))
            }
            Err(e) => format!("provider task was cancelled: {e}"),
        };
        log::warn!("provider: {kind} failed for voice {}: {message}", request.voice_id);
        Err(ProviderError::Execution {
            provider: kind,
            message,
        })
    }
}

/// Best-effort text of a panic payload.
fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FailingBackend;

    #[async_trait]
    impl SpeechBackend for FailingBackend {
        async fn synthesize(&self, _: &SpeechRequest) -> Result<SynthesizedAudio, BackendError> {
            Err(BackendError::Runtime("model crashed".into()))
        }
    }

    fn request() -> SpeechRequest {
        SpeechRequest {
            text: "hello".into(),
            voice_id: DEFAULT_VOICE_ID.into(),
            model: "hexgrad/Kokoro-82M".into(),
            speed: 1.0,
            style: None,
        }
    }

    #[test]
    fn kind_serialises_lowercase() {
        assert_eq!(serde_json::to_string(&ProviderKind::Inference).unwrap(), "\"inference\"");
    }

    #[tokio::test]
    async fn missing_backend_is_unavailable() {
        let set = ProviderSet::stub_only();
        let err = set.synthesize(ProviderKind::Local, &request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn backend_failure_is_execution_error() {
        let set = ProviderSet::stub_only().with_inference(Arc::new(FailingBackend));
        let err = set.synthesize(ProviderKind::Inference, &request()).await.unwrap_err();
        match err {
            ProviderError::Execution { provider, message } => {
                assert_eq!(provider, ProviderKind::Inference);
                assert!(message.contains("model crashed"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    struct PanickingBackend;

    #[async_trait]
    impl SpeechBackend for PanickingBackend {
        async fn synthesize(&self, _: &SpeechRequest) -> Result<SynthesizedAudio, BackendError> {
            panic!("onnx session exploded");
        }
    }

    #[tokio::test]
    async fn backend_panic_is_execution_error() {
        let set = ProviderSet::stub_only().with_inference(Arc::new(PanickingBackend));
        let err = set.synthesize(ProviderKind::Inference, &request()).await.unwrap_err();
        match err {
            ProviderError::Execution { provider, message } => {
                assert_eq!(provider, ProviderKind::Inference);
                assert!(message.contains("panicked"), "{message}");
                assert!(message.contains("onnx session exploded"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // The set stays usable after the panic.
        assert!(set.synthesize(ProviderKind::Stub, &request()).await.is_ok());
    }

    #[tokio::test]
    async fn stub_always_dispatches() {
        let set = ProviderSet::stub_only();
        let audio = set.synthesize(ProviderKind::Stub, &request()).await.unwrap();
        assert!(audio.duration_seconds > 0.0);
    }
}
