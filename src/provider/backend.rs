//! The `SpeechBackend` trait shared by every provider, and WAV helpers.
//!
//! A backend turns one [`SpeechRequest`] into WAV bytes plus the clip
//! duration.  Backends know nothing about jobs, stores or selection; they
//! are the opaque collaborators the selector dispatches to.

use std::io::Cursor;

use async_trait::async_trait;
use thiserror::Error;

// ---------------------------------------------------------------------------
// BackendError
// ---------------------------------------------------------------------------

/// Errors a backend can report from a synthesis attempt.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The hosted endpoint answered with a non-success status.
    #[error("endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The request or the runtime process did not finish in time.
    #[error("synthesis timed out after {0} s")]
    Timeout(u64),

    /// The on-device runtime could not be started or exited with an error.
    #[error("runtime failed: {0}")]
    Runtime(String),

    /// The produced bytes are not a readable WAV stream.
    #[error("invalid audio: {0}")]
    InvalidAudio(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        BackendError::Request(e.to_string())
    }
}

impl From<hound::Error> for BackendError {
    fn from(e: hound::Error) -> Self {
        BackendError::InvalidAudio(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// SpeechRequest / SynthesizedAudio
// ---------------------------------------------------------------------------

/// Everything a backend needs for one synthesis call.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub voice_id: String,
    /// Repo id of the model the voice belongs to.
    pub model: String,
    pub speed: f32,
    pub style: Option<String>,
}

/// Encoded audio returned by a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    /// A complete RIFF/WAV file.
    pub wav: Vec<u8>,
    pub duration_seconds: f64,
}

impl SynthesizedAudio {
    /// Wrap WAV bytes, reading the duration from the header.
    pub fn from_wav(wav: Vec<u8>) -> Result<Self, BackendError> {
        let duration_seconds = wav_duration(&wav)?;
        Ok(Self {
            wav,
            duration_seconds,
        })
    }
}

// ---------------------------------------------------------------------------
// SpeechBackend trait
// ---------------------------------------------------------------------------

/// Async interface every provider implements.
///
/// Implementors must be `Send + Sync` so they can be shared behind an
/// `Arc<dyn SpeechBackend>` by the worker pool.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<SynthesizedAudio, BackendError>;
}

// Compile-time assertion: Box<dyn SpeechBackend> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn SpeechBackend>) {}
};

// ---------------------------------------------------------------------------
// WAV helpers
// ---------------------------------------------------------------------------

/// Duration in seconds of a WAV stream, from its frame count.
pub fn wav_duration(wav: &[u8]) -> Result<f64, BackendError> {
    let reader = hound::WavReader::new(Cursor::new(wav))?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(BackendError::InvalidAudio("sample rate is zero".into()));
    }
    Ok(f64::from(reader.duration()) / f64::from(spec.sample_rate))
}

/// Re-time a WAV stream for `speed` by rewriting its sample rate.
///
/// Samples are copied unchanged; playing them back at `rate * speed` makes
/// the clip `speed` times faster (and shifts pitch accordingly).
pub fn retime_wav(wav: &[u8], speed: f32) -> Result<Vec<u8>, BackendError> {
    if (speed - 1.0).abs() < f32::EPSILON {
        return Ok(wav.to_vec());
    }

    let mut reader = hound::WavReader::new(Cursor::new(wav))?;
    let mut spec = reader.spec();
    let retimed = (f64::from(spec.sample_rate) * f64::from(speed)).round();
    spec.sample_rate = retimed.clamp(1.0, f64::from(u32::MAX)) as u32;

    let mut out = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut out, spec)?;
        match spec.sample_format {
            hound::SampleFormat::Float => {
                for sample in reader.samples::<f32>() {
                    writer.write_sample(sample?)?;
                }
            }
            hound::SampleFormat::Int => {
                for sample in reader.samples::<i32>() {
                    writer.write_sample(sample?)?;
                }
            }
        }
        writer.finalize()?;
    }
    Ok(out.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A mono 16-bit WAV of `frames` silent samples at `rate` Hz.
    pub(crate) fn silent_wav(rate: u32, frames: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut out = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut out, spec).unwrap();
            for _ in 0..frames {
                writer.write_sample(0i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        out.into_inner()
    }

    #[test]
    fn duration_from_frames() {
        let wav = silent_wav(16_000, 8_000);
        assert!((wav_duration(&wav).unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn garbage_is_invalid_audio() {
        let err = wav_duration(b"definitely not a wav").unwrap_err();
        assert!(matches!(err, BackendError::InvalidAudio(_)));
    }

    #[test]
    fn retime_halves_duration_at_double_speed() {
        let wav = silent_wav(24_000, 24_000);
        let fast = retime_wav(&wav, 2.0).unwrap();
        let audio = SynthesizedAudio::from_wav(fast).unwrap();
        assert!((audio.duration_seconds - 0.5).abs() < 1e-6);
    }

    #[test]
    fn retime_at_unit_speed_is_identity() {
        let wav = silent_wav(24_000, 100);
        assert_eq!(retime_wav(&wav, 1.0).unwrap(), wav);
    }
}
