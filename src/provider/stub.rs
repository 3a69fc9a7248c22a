//! Placeholder provider: a short sine tone.
//!
//! Used when neither the on-device runtime nor a hosted credential is
//! available, so the rest of the system stays exercisable.  It never fails
//! for valid input.

use std::f32::consts::PI;
use std::io::Cursor;

use async_trait::async_trait;

use super::backend::{BackendError, SpeechBackend, SpeechRequest, SynthesizedAudio};

const SAMPLE_RATE: u32 = 24_000;
const TONE_HZ: f32 = 440.0;
const AMPLITUDE: f32 = 0.2;
/// Characters of text per second of placeholder audio.
const CHARS_PER_SECOND: f32 = 20.0;
const MIN_SECONDS: f32 = 1.0;
const MAX_SECONDS: f32 = 5.0;

#[derive(Debug, Default, Clone, Copy)]
pub struct StubBackend;

impl StubBackend {
    pub fn new() -> Self {
        Self
    }

    /// Clip length for `text` at `speed`.
    pub fn duration_for(text: &str, speed: f32) -> f32 {
        let base = (text.chars().count() as f32 / CHARS_PER_SECOND).clamp(MIN_SECONDS, MAX_SECONDS);
        base / speed.max(0.1)
    }

    fn render(seconds: f32) -> Result<Vec<u8>, BackendError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let frames = (seconds * SAMPLE_RATE as f32).round() as u32;

        let mut out = Cursor::new(Vec::with_capacity(frames as usize * 2 + 44));
        {
            let mut writer = hound::WavWriter::new(&mut out, spec)?;
            for n in 0..frames {
                let t = n as f32 / SAMPLE_RATE as f32;
                let sample = (2.0 * PI * TONE_HZ * t).sin() * AMPLITUDE;
                writer.write_sample((sample * i16::MAX as f32) as i16)?;
            }
            writer.finalize()?;
        }
        Ok(out.into_inner())
    }
}

#[async_trait]
impl SpeechBackend for StubBackend {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<SynthesizedAudio, BackendError> {
        let seconds = Self::duration_for(&request.text, request.speed);
        let wav = Self::render(seconds)?;
        SynthesizedAudio::from_wav(wav)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str, speed: f32) -> SpeechRequest {
        SpeechRequest {
            text: text.into(),
            voice_id: "kokoro_en_us_0".into(),
            model: "hexgrad/Kokoro-82M".into(),
            speed,
            style: None,
        }
    }

    #[test]
    fn duration_is_clamped() {
        assert_eq!(StubBackend::duration_for("hi", 1.0), 1.0);
        assert_eq!(StubBackend::duration_for(&"x".repeat(60), 1.0), 3.0);
        assert_eq!(StubBackend::duration_for(&"x".repeat(1000), 1.0), 5.0);
        assert_eq!(StubBackend::duration_for(&"x".repeat(1000), 2.0), 2.5);
    }

    #[tokio::test]
    async fn produces_24k_mono_wav() {
        let audio = StubBackend::new()
            .synthesize(&request("hello world", 1.0))
            .await
            .unwrap();

        let reader = hound::WavReader::new(Cursor::new(&audio.wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 24_000);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.bits_per_sample, 16);
        assert!((audio.duration_seconds - 1.0).abs() < 1e-3);
    }

    #[tokio::test]
    async fn never_fails_on_odd_input() {
        let backend = StubBackend::new();
        for (text, speed) in [("", 1.0), ("ภาษาไทย", 0.5), ("a", 2.0)] {
            assert!(backend.synthesize(&request(text, speed)).await.is_ok());
        }
    }
}
