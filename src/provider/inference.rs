//! Hosted inference provider.
//!
//! `InferenceBackend` posts the text to `<base_url>/models/<repo>` on a
//! Hugging Face compatible inference endpoint and expects WAV bytes back.
//! All connection details come from [`ProviderConfig`]; nothing is
//! hardcoded.

use async_trait::async_trait;

use crate::config::ProviderConfig;

use super::backend::{retime_wav, BackendError, SpeechBackend, SpeechRequest, SynthesizedAudio};

/// Longest error body kept in a [`BackendError::Status`].
const MAX_ERROR_BODY: usize = 300;

pub struct InferenceBackend {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    timeout_secs: u64,
}

impl InferenceBackend {
    /// Build an `InferenceBackend` from the provider config.
    ///
    /// Returns `None` when no credential is configured: the hosted provider
    /// is only considered available with one.
    pub fn from_config(config: &ProviderConfig) -> Option<Self> {
        let token = config.credential()?.to_string();
        Some(Self::new(&config.inference_base_url, Some(token), config.timeout_secs))
    }

    pub fn new(base_url: &str, token: Option<String>, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
            timeout_secs,
        }
    }

    pub fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}", self.base_url, model)
    }
}

#[async_trait]
impl SpeechBackend for InferenceBackend {
    /// The `Authorization: Bearer …` header is attached only when a
    /// non-empty token is configured.
    async fn synthesize(&self, request: &SpeechRequest) -> Result<SynthesizedAudio, BackendError> {
        let mut body = serde_json::json!({ "inputs": request.text });
        if let Some(style) = request.style.as_deref().filter(|s| !s.is_empty()) {
            body["parameters"] = serde_json::json!({ "style": style });
        }

        let mut req = self
            .client
            .post(self.endpoint(&request.model))
            .header(reqwest::header::ACCEPT, "audio/wav")
            .json(&body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout(self.timeout_secs)
            } else {
                BackendError::from(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let mut text = response.text().await.unwrap_or_default();
            if let Some((idx, _)) = text.char_indices().nth(MAX_ERROR_BODY) {
                text.truncate(idx);
            }
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let bytes = response.bytes().await?;
        let wav = retime_wav(&bytes, request.speed)?;
        SynthesizedAudio::from_wav(wav)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn config(token: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            inference_token: token.map(str::to_string),
            inference_base_url: "http://localhost:9/".into(),
            ..ProviderConfig::default()
        }
    }

    #[test]
    fn no_credential_means_no_backend() {
        assert!(InferenceBackend::from_config(&config(None)).is_none());
        assert!(InferenceBackend::from_config(&config(Some("  "))).is_none());
    }

    #[test]
    fn endpoint_joins_model_repo() {
        let backend = InferenceBackend::from_config(&config(Some("hf_test"))).unwrap();
        assert_eq!(
            backend.endpoint("hexgrad/Kokoro-82M"),
            "http://localhost:9/models/hexgrad/Kokoro-82M"
        );
    }

    #[test]
    fn blank_token_is_dropped() {
        let backend = InferenceBackend::new("http://x", Some(String::new()), 5);
        assert!(backend.token.is_none());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let backend = InferenceBackend::new("http://127.0.0.1:9", Some("t".into()), 2);
        let request = SpeechRequest {
            text: "hello".into(),
            voice_id: "kokoro_en_us_0".into(),
            model: "hexgrad/Kokoro-82M".into(),
            speed: 1.0,
            style: None,
        };
        assert!(backend.synthesize(&request).await.is_err());
    }
}
