//! Voice preset catalogue.
//!
//! A request names a voice; the preset tells which model repo renders it.

use serde::Serialize;

/// Voice used when a request does not name one.
pub const DEFAULT_VOICE_ID: &str = "kokoro_en_us_0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoicePreset {
    pub id: &'static str,
    /// Model repo id, matching a [`crate::models::ModelSpec::repo_id`].
    pub model: &'static str,
    /// ISO-639-1 language code.
    pub language: &'static str,
    pub label: &'static str,
    pub description: Option<&'static str>,
}

pub const VOICES: &[VoicePreset] = &[
    VoicePreset {
        id: "kokoro_en_us_0",
        model: "hexgrad/Kokoro-82M",
        language: "en",
        label: "Kokoro US Neutral",
        description: Some("Fast and clear, US English"),
    },
    VoicePreset {
        id: "kokoro_en_gb_0",
        model: "hexgrad/Kokoro-82M",
        language: "en",
        label: "Kokoro UK Bright",
        description: Some("UK English, bright tone"),
    },
    VoicePreset {
        id: "kokoro_fr_0",
        model: "hexgrad/Kokoro-82M",
        language: "fr",
        label: "Kokoro French Clear",
        description: Some("French, neutral"),
    },
    VoicePreset {
        id: "parler_en_neutral",
        model: "parler-tts/parler-tts-mini-v1.1",
        language: "en",
        label: "Parler Neutral",
        description: Some("Parler-TTS, honours the style prompt"),
    },
    VoicePreset {
        id: "bark_en_0",
        model: "suno/bark-small",
        language: "en",
        label: "Bark Small EN",
        description: None,
    },
    VoicePreset {
        id: "speecht5_en_0",
        model: "microsoft/speecht5_tts",
        language: "en",
        label: "SpeechT5 EN",
        description: Some("SpeechT5 with the HiFiGAN vocoder"),
    },
    VoicePreset {
        id: "mms_en_0",
        model: "facebook/mms-tts-eng",
        language: "en",
        label: "MMS English",
        description: None,
    },
];

pub fn find_voice(id: &str) -> Option<&'static VoicePreset> {
    VOICES.iter().find(|v| v.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::find_model;
    use std::collections::HashSet;

    #[test]
    fn default_voice_exists() {
        assert!(find_voice(DEFAULT_VOICE_ID).is_some());
    }

    #[test]
    fn ids_are_unique() {
        let ids: HashSet<_> = VOICES.iter().map(|v| v.id).collect();
        assert_eq!(ids.len(), VOICES.len());
    }

    #[test]
    fn every_voice_maps_to_a_declared_model() {
        for voice in VOICES {
            assert!(find_model(voice.model).is_some(), "{} has no model", voice.id);
        }
    }
}
