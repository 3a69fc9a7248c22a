//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\speech-jobs\
//!   macOS:   ~/Library/Application Support/speech-jobs/
//!   Linux:   ~/.config/speech-jobs/
//!
//! Data dir (jobs, history, audio, models):
//!   Windows: %LOCALAPPDATA%\speech-jobs\
//!   macOS:   ~/Library/Application Support/speech-jobs/
//!   Linux:   ~/.local/share/speech-jobs/
//!
//! ```text
//! <data_dir>/
//!   outputs/jobs.json
//!   outputs/history.json
//!   outputs/audio/<job_id>.wav
//!   models/<repo_with_underscores>/
//! ```

use std::path::{Path, PathBuf};

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Root for everything the service writes at runtime.
    pub data_dir: PathBuf,
    /// One WAV per completed synthesis, keyed by job id.
    pub audio_dir: PathBuf,
    /// Job store snapshot.
    pub jobs_file: PathBuf,
    /// History store snapshot.
    pub history_file: PathBuf,
    /// Directory for downloaded model snapshots.
    pub models_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "speech-jobs";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path (should be extremely rare in practice).
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let mut paths = Self::from_data_dir(data_dir);
        paths.settings_file = config_dir.join("settings.toml");
        paths.config_dir = config_dir;
        paths
    }

    /// Lay every runtime path out under `data_dir`.
    ///
    /// The settings file is placed inside `data_dir` as well, which keeps
    /// tests fully contained in a temp directory.
    pub fn from_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let outputs = data_dir.join("outputs");

        Self {
            config_dir: data_dir.clone(),
            settings_file: data_dir.join("settings.toml"),
            audio_dir: outputs.join("audio"),
            jobs_file: outputs.join("jobs.json"),
            history_file: outputs.join("history.json"),
            models_dir: data_dir.join("models"),
            data_dir,
        }
    }

    /// Apply the directory overrides from [`StorageConfig`](super::StorageConfig).
    pub fn with_overrides(mut self, data_dir: Option<&Path>, models_dir: Option<&Path>) -> Self {
        if let Some(dir) = data_dir {
            let settings_file = std::mem::take(&mut self.settings_file);
            let config_dir = std::mem::take(&mut self.config_dir);

            self = Self::from_data_dir(dir);
            self.settings_file = settings_file;
            self.config_dir = config_dir;
        }
        if let Some(dir) = models_dir {
            self.models_dir = dir.to_path_buf();
        }
        self
    }

    /// Create the directories the stores write into.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.audio_dir)?;
        std::fs::create_dir_all(&self.models_dir)?;
        Ok(())
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_non_empty() {
        let paths = AppPaths::new();
        assert!(paths.config_dir.to_str().is_some_and(|s| !s.is_empty()));
        assert!(paths.models_dir.to_str().is_some_and(|s| !s.is_empty()));
        assert!(paths
            .settings_file
            .file_name()
            .is_some_and(|n| n == "settings.toml"));
        assert!(paths.jobs_file.file_name().is_some_and(|n| n == "jobs.json"));
    }

    #[test]
    fn data_dir_layout() {
        let paths = AppPaths::from_data_dir("/srv/speech");
        assert_eq!(paths.audio_dir, PathBuf::from("/srv/speech/outputs/audio"));
        assert_eq!(
            paths.history_file,
            PathBuf::from("/srv/speech/outputs/history.json")
        );
        assert_eq!(paths.models_dir, PathBuf::from("/srv/speech/models"));
    }

    #[test]
    fn overrides_replace_data_and_models_dirs() {
        let paths = AppPaths::from_data_dir("/a")
            .with_overrides(Some(Path::new("/b")), Some(Path::new("/m")));
        assert_eq!(paths.jobs_file, PathBuf::from("/b/outputs/jobs.json"));
        assert_eq!(paths.models_dir, PathBuf::from("/m"));
        // settings stay where they were resolved
        assert_eq!(paths.settings_file, PathBuf::from("/a/settings.toml"));
    }

    #[test]
    fn ensure_dirs_creates_audio_and_models() {
        let dir = tempfile::tempdir().expect("temp dir");
        let paths = AppPaths::from_data_dir(dir.path());
        paths.ensure_dirs().expect("create");
        assert!(paths.audio_dir.is_dir());
        assert!(paths.models_dir.is_dir());
    }
}
