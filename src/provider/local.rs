//! On-device provider backed by a piper-style command line runtime.
//!
//! # Overview
//!
//! [`LocalCommandBackend`] runs the configured runtime binary once per
//! request:
//!
//! ```text
//! <runtime> -m <model> -f <out.wav> --length_scale <1/speed>   (text on stdin)
//! ```
//!
//! The process runs on the blocking thread pool and is killed if it exceeds
//! the configured timeout.  The WAV it writes is read back and the temp file
//! removed.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::LocalConfig;
use crate::models::ModelPaths;

use super::backend::{BackendError, SpeechBackend, SpeechRequest, SynthesizedAudio};

/// Binary looked up on `PATH` when no runtime is configured.
pub const DEFAULT_RUNTIME: &str = "piper";

const POLL_INTERVAL: Duration = Duration::from_millis(25);
/// Trailing stderr kept in a [`BackendError::Runtime`].
const MAX_STDERR_CHARS: usize = 2000;

// ---------------------------------------------------------------------------
// LocalCommandBackend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LocalCommandBackend {
    runtime: PathBuf,
    models: ModelPaths,
    timeout: Duration,
}

impl LocalCommandBackend {
    pub fn new(runtime: impl Into<PathBuf>, models: ModelPaths, timeout: Duration) -> Self {
        Self {
            runtime: runtime.into(),
            models,
            timeout,
        }
    }

    /// Resolve the runtime from config, falling back to [`DEFAULT_RUNTIME`]
    /// on `PATH`.  Returns `None` when no runtime can be found.
    pub fn discover(config: &LocalConfig, models: ModelPaths) -> Option<Self> {
        let runtime = match &config.runtime_bin {
            Some(bin) => {
                let found = resolve_configured(bin);
                if found.is_none() {
                    log::warn!("local: configured runtime {} not found", bin.display());
                }
                found
            }
            None => find_on_path(DEFAULT_RUNTIME),
        }?;

        log::info!("local: using runtime {}", runtime.display());
        Some(Self::new(
            runtime,
            models,
            Duration::from_secs(config.timeout_secs),
        ))
    }

    pub fn runtime(&self) -> &Path {
        &self.runtime
    }

    /// The argument passed to `-m`: the first `.onnx` file in the model
    /// directory, or the directory itself.
    fn model_arg(&self, repo: &str) -> Result<PathBuf, BackendError> {
        let dir = self.models.repo_dir(repo);
        if !dir.is_dir() {
            return Err(BackendError::Runtime(format!(
                "model {repo} is not downloaded ({})",
                dir.display()
            )));
        }

        let onnx = std::fs::read_dir(&dir)?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("onnx"))
            .min();
        Ok(onnx.unwrap_or(dir))
    }
}

#[async_trait]
impl SpeechBackend for LocalCommandBackend {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<SynthesizedAudio, BackendError> {
        let model = self.model_arg(&request.model)?;
        let runtime = self.runtime.clone();
        let timeout = self.timeout;
        let text = request.text.clone();
        let length_scale = 1.0 / request.speed.max(0.1);
        let out = std::env::temp_dir().join(format!("speech-jobs-{}.wav", Uuid::new_v4()));

        let wav = tokio::task::spawn_blocking(move || {
            let result = run_runtime(&runtime, &model, &out, &text, length_scale, timeout)
                .and_then(|()| std::fs::read(&out).map_err(BackendError::from));
            let _ = std::fs::remove_file(&out);
            result
        })
        .await
        .map_err(|e| BackendError::Runtime(format!("runtime task panicked: {e}")))??;

        SynthesizedAudio::from_wav(wav)
    }
}

// ---------------------------------------------------------------------------
// Process helpers
// ---------------------------------------------------------------------------

fn run_runtime(
    runtime: &Path,
    model: &Path,
    out: &Path,
    text: &str,
    length_scale: f32,
    timeout: Duration,
) -> Result<(), BackendError> {
    let mut cmd = Command::new(runtime);
    cmd.arg("-m")
        .arg(model)
        .arg("-f")
        .arg(out)
        .arg("--length_scale")
        .arg(format!("{length_scale:.2}"))
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    log::debug!("local: running {cmd:?}");
    let mut child = cmd
        .spawn()
        .map_err(|e| BackendError::Runtime(format!("cannot start {}: {e}", runtime.display())))?;

    // Drain stderr while the process runs; a full pipe would stall it.
    let stderr_reader = child.stderr.take().map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    });

    if let Some(mut stdin) = child.stdin.take() {
        if let Err(e) = stdin.write_all(text.as_bytes()) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e.into());
        }
    }

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(BackendError::Timeout(timeout.as_secs()));
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let stderr = stderr_reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();
    if !status.success() {
        let stderr = String::from_utf8_lossy(&stderr);
        return Err(BackendError::Runtime(format!(
            "{} exited with {}: {}",
            runtime.display(),
            status,
            tail(stderr.trim(), MAX_STDERR_CHARS)
        )));
    }
    Ok(())
}

/// The last `max` characters of `text`.
fn tail(text: &str, max: usize) -> &str {
    let skip = text.chars().count().saturating_sub(max);
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

/// A configured runtime: an existing file, or a bare name looked up on
/// `PATH`.
fn resolve_configured(bin: &Path) -> Option<PathBuf> {
    if bin.is_file() {
        return Some(bin.to_path_buf());
    }
    if bin.components().count() == 1 {
        return find_on_path(bin.to_str()?);
    }
    None
}

/// First executable named `bin` on `PATH`.
pub fn find_on_path(bin: &str) -> Option<PathBuf> {
    if bin.contains(std::path::MAIN_SEPARATOR) {
        let p = PathBuf::from(bin);
        return p.is_file().then_some(p);
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(bin))
        .find(|candidate| candidate.is_file())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
