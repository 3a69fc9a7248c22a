//! On-disk audio artifacts.
//!
//! One WAV file per completed synthesis, named `<id>.wav` inside the audio
//! directory.  The file name is the artifact reference stored in history
//! entries.  Writes go through a temp file and a rename, so readers never
//! observe a partial artifact.  Writes and deletes of the same reference are
//! serialised; reads take no lock.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use super::StoreError;

/// Extension of every artifact written by this store.
const ARTIFACT_EXT: &str = "wav";

// ---------------------------------------------------------------------------
// StoredArtifact / ArtifactInfo
// ---------------------------------------------------------------------------

/// Result of a successful [`ArtifactStore::write`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredArtifact {
    pub audio_ref: String,
    pub path: PathBuf,
    /// Hex SHA-256 of the bytes.
    pub sha256: String,
    pub size_bytes: u64,
}

/// Directory listing entry used by maintenance.
#[derive(Debug, Clone)]
pub struct ArtifactInfo {
    pub audio_ref: String,
    pub modified: SystemTime,
    pub size_bytes: u64,
}

// ---------------------------------------------------------------------------
// ArtifactStore
// ---------------------------------------------------------------------------

pub struct ArtifactStore {
    dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ArtifactStore {
    /// Open (and create) the artifact directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Artifact reference for a job / history id.
    pub fn audio_ref_for(id: &str) -> String {
        format!("{id}.{ARTIFACT_EXT}")
    }

    /// Hex SHA-256 of `bytes`, used as the content identity.
    pub fn content_id(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    /// Full path of a reference, or `None` if the reference could escape the
    /// artifact directory.
    pub fn path_for(&self, audio_ref: &str) -> Option<PathBuf> {
        is_safe_ref(audio_ref).then(|| self.dir.join(audio_ref))
    }

    /// Store `bytes` as the artifact for `id`, replacing any previous one.
    pub fn write(&self, id: &str, bytes: &[u8]) -> Result<StoredArtifact, StoreError> {
        let audio_ref = Self::audio_ref_for(id);
        let path = self
            .path_for(&audio_ref)
            .ok_or_else(|| StoreError::InvalidRef(audio_ref.clone()))?;

        self.with_ref_lock(&audio_ref, || {
            let tmp = path.with_extension("wav.part");
            let result = (|| -> Result<(), StoreError> {
                let mut file = File::create(&tmp)?;
                file.write_all(bytes)?;
                file.sync_all()?;
                fs::rename(&tmp, &path)?;
                Ok(())
            })();
            if result.is_err() {
                let _ = fs::remove_file(&tmp);
            }
            result
        })?;

        log::debug!("artifacts: wrote {audio_ref} ({} bytes)", bytes.len());

        Ok(StoredArtifact {
            sha256: Self::content_id(bytes),
            size_bytes: bytes.len() as u64,
            audio_ref,
            path,
        })
    }

    /// Read an artifact's bytes.
    pub fn read(&self, audio_ref: &str) -> Result<Vec<u8>, StoreError> {
        let path = self
            .path_for(audio_ref)
            .ok_or_else(|| StoreError::InvalidRef(audio_ref.to_string()))?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(audio_ref.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn exists(&self, audio_ref: &str) -> bool {
        self.path_for(audio_ref).is_some_and(|p| p.is_file())
    }

    /// Delete an artifact.  Returns `false` when it was already absent.
    pub fn delete(&self, audio_ref: &str) -> Result<bool, StoreError> {
        let Some(path) = self.path_for(audio_ref) else {
            return Ok(false);
        };

        self.with_ref_lock(audio_ref, || match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        })
    }

    /// All finished artifacts in the directory (temp files excluded).
    pub fn list(&self) -> Result<Vec<ArtifactInfo>, StoreError> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ARTIFACT_EXT) {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            out.push(ArtifactInfo {
                audio_ref: name.to_string(),
                modified: meta.modified()?,
                size_bytes: meta.len(),
            });
        }
        Ok(out)
    }

    fn with_ref_lock<R>(&self, audio_ref: &str, f: impl FnOnce() -> R) -> R {
        let lock = Arc::clone(
            self.locks
                .lock()
                .entry(audio_ref.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        );

        let out = {
            let _guard = lock.lock();
            f()
        };

        // Drop the map entry once nobody else is waiting on it.
        let mut locks = self.locks.lock();
        if Arc::strong_count(&lock) == 2 {
            locks.remove(audio_ref);
        }
        out
    }
}

fn is_safe_ref(audio_ref: &str) -> bool {
    !audio_ref.is_empty()
        && audio_ref != "."
        && audio_ref != ".."
        && !audio_ref.contains(['/', '\\'])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
