//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//!
//! Settings are read once at startup; [`AppConfig::apply_env`] layers the
//! environment overrides on top of the file.  Nothing here is hot-reloaded.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// ProviderMode
// ---------------------------------------------------------------------------

/// Which synthesis provider handles requests.
///
/// | Variant   | Behaviour                                                  |
/// |-----------|------------------------------------------------------------|
/// | Auto      | local → hosted inference → stub, first one whose preconditions hold |
/// | Local     | on-device runtime only; fails if models/runtime missing    |
/// | Inference | hosted endpoint only; fails without a credential          |
/// | Stub      | placeholder tone, never fails                              |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    Auto,
    Local,
    Inference,
    Stub,
}

impl Default for ProviderMode {
    fn default() -> Self {
        Self::Auto
    }
}

impl ProviderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderMode::Auto => "auto",
            ProviderMode::Local => "local",
            ProviderMode::Inference => "inference",
            ProviderMode::Stub => "stub",
        }
    }
}

impl std::fmt::Display for ProviderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ProviderMode::Auto),
            "local" => Ok(ProviderMode::Local),
            "inference" => Ok(ProviderMode::Inference),
            "stub" => Ok(ProviderMode::Stub),
            other => Err(format!(
                "unknown provider mode '{other}' (expected auto|local|inference|stub)"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// ProviderConfig
// ---------------------------------------------------------------------------

/// Provider selection and hosted-inference settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Requested provider mode.
    pub mode: ProviderMode,
    /// Hosted inference credential; `None` disables the inference provider.
    pub inference_token: Option<String>,
    /// Base URL of the hosted inference API (no trailing slash).
    pub inference_base_url: String,
    /// Base URL of the model hub used for downloads.
    pub hub_base_url: String,
    /// Maximum seconds to wait for one hosted request.
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            mode: ProviderMode::default(),
            inference_token: None,
            inference_base_url: "https://api-inference.huggingface.co".into(),
            hub_base_url: "https://huggingface.co".into(),
            timeout_secs: 120,
        }
    }
}

impl ProviderConfig {
    /// The credential, if one is configured and non-empty.
    pub fn credential(&self) -> Option<&str> {
        self.inference_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

// ---------------------------------------------------------------------------
// LocalConfig
// ---------------------------------------------------------------------------

/// On-device runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Path (or bare name looked up on `PATH`) of the on-device runtime
    /// binary.  `None` means "look for `piper` on `PATH`".
    pub runtime_bin: Option<PathBuf>,
    /// Maximum seconds one local synthesis may take.
    pub timeout_secs: u64,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            runtime_bin: None,
            timeout_secs: 300,
        }
    }
}

// ---------------------------------------------------------------------------
// StorageConfig
// ---------------------------------------------------------------------------

/// Directory overrides.  `None` keeps the platform default from [`AppPaths`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: Option<PathBuf>,
    pub models_dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// JobsConfig / HistoryConfig / CleanupConfig
// ---------------------------------------------------------------------------

/// Job store and worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Maximum jobs retained; the oldest is evicted on overflow.
    pub max_jobs: usize,
    /// Number of concurrent asynchronous synthesis workers.
    pub workers: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_jobs: 300,
            workers: 2,
        }
    }
}

/// History store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum entries retained; eviction also deletes the artifact.
    pub max_items: usize,
    /// Characters of input text kept in `text_preview`.
    pub preview_chars: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_items: 200,
            preview_chars: 160,
        }
    }
}

/// Maintenance defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Unreferenced artifacts older than this are removed.
    pub max_age_hours: u64,
    /// History is truncated to this many entries.
    pub max_history: usize,
    /// Run a best-effort cleanup when the service starts.
    pub on_startup: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            max_age_hours: 48,
            max_history: 200,
            on_startup: true,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use speech_jobs::config::AppConfig;
///
/// // Load (returns Default when file is missing), then layer env overrides.
/// let mut config = AppConfig::load().unwrap();
/// config.apply_env();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub local: LocalConfig,
    pub storage: StorageConfig,
    pub jobs: JobsConfig,
    pub history: HistoryConfig,
    pub cleanup: CleanupConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// so callers never need to special-case a missing file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Layer process environment overrides on top of the loaded file.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (the environment in
    /// production, a map in tests).  Unparseable values are logged and
    /// ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("HF_TOKEN").or_else(|| lookup("HUGGINGFACEHUB_API_TOKEN")) {
            if !token.trim().is_empty() {
                self.provider.inference_token = Some(token);
            }
        }

        if let Some(raw) = lookup("SPEECH_JOBS_PROVIDER") {
            match raw.parse::<ProviderMode>() {
                Ok(mode) => self.provider.mode = mode,
                Err(e) => log::warn!("config: ignoring SPEECH_JOBS_PROVIDER: {e}"),
            }
        }
        if lookup("SPEECH_JOBS_STUB").as_deref() == Some("1") {
            self.provider.mode = ProviderMode::Stub;
        }

        if let Some(dir) = lookup("SPEECH_JOBS_DATA_DIR") {
            self.storage.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = lookup("SPEECH_JOBS_MODELS_DIR") {
            self.storage.models_dir = Some(PathBuf::from(dir));
        }

        parse_into(&lookup, "SPEECH_JOBS_MAX_JOBS", &mut self.jobs.max_jobs);
        parse_into(&lookup, "SPEECH_JOBS_CLEAN_MAX_HOURS", &mut self.cleanup.max_age_hours);
        parse_into(&lookup, "SPEECH_JOBS_CLEAN_MAX_HISTORY", &mut self.cleanup.max_history);
    }

    /// Resolve runtime paths, honouring the storage overrides.
    pub fn paths(&self) -> AppPaths {
        AppPaths::new().with_overrides(
            self.storage.data_dir.as_deref(),
            self.storage.models_dir.as_deref(),
        )
    }
}

fn parse_into<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => *slot = value,
            Err(_) => log::warn!("config: ignoring {key}={raw:?} (not a number)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    /// Verify that a default `AppConfig` can be serialised to TOML and
    /// deserialised back without any data loss.
    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(original.provider.mode, loaded.provider.mode);
        assert_eq!(
            original.provider.inference_base_url,
            loaded.provider.inference_base_url
        );
        assert_eq!(original.jobs.max_jobs, loaded.jobs.max_jobs);
        assert_eq!(original.jobs.workers, loaded.jobs.workers);
        assert_eq!(original.history.max_items, loaded.history.max_items);
        assert_eq!(original.cleanup.max_age_hours, loaded.cleanup.max_age_hours);
        assert_eq!(original.cleanup.on_startup, loaded.cleanup.on_startup);
    }

    /// `load_from` on a non-existent path must return `Default` without error.
    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config.provider.mode, ProviderMode::Auto);
        assert_eq!(config.jobs.max_jobs, 300);
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.provider.mode, ProviderMode::Auto);
        assert!(cfg.provider.inference_token.is_none());
        assert_eq!(cfg.jobs.max_jobs, 300);
        assert_eq!(cfg.jobs.workers, 2);
        assert_eq!(cfg.history.max_items, 200);
        assert_eq!(cfg.history.preview_chars, 160);
        assert_eq!(cfg.cleanup.max_age_hours, 48);
        assert_eq!(cfg.cleanup.max_history, 200);
        assert!(cfg.cleanup.on_startup);
    }

    /// A partial file only overrides what it names.
    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[provider]\nmode = \"stub\"\n\n[jobs]\nworkers = 4\n").unwrap();

        let cfg = AppConfig::load_from(&path).expect("load");
        assert_eq!(cfg.provider.mode, ProviderMode::Stub);
        assert_eq!(cfg.jobs.workers, 4);
        assert_eq!(cfg.jobs.max_jobs, 300);
        assert_eq!(cfg.cleanup.max_age_hours, 48);
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = AppConfig::default();
        cfg.apply_overrides(lookup_from(&[
            ("HF_TOKEN", "hf_abc"),
            ("SPEECH_JOBS_PROVIDER", "inference"),
            ("SPEECH_JOBS_MAX_JOBS", "10"),
            ("SPEECH_JOBS_CLEAN_MAX_HOURS", "6"),
            ("SPEECH_JOBS_DATA_DIR", "/tmp/sj"),
        ]));

        assert_eq!(cfg.provider.credential(), Some("hf_abc"));
        assert_eq!(cfg.provider.mode, ProviderMode::Inference);
        assert_eq!(cfg.jobs.max_jobs, 10);
        assert_eq!(cfg.cleanup.max_age_hours, 6);
        assert_eq!(cfg.storage.data_dir, Some(PathBuf::from("/tmp/sj")));
        assert_eq!(
            cfg.paths().jobs_file,
            PathBuf::from("/tmp/sj/outputs/jobs.json")
        );
    }

    #[test]
    fn stub_flag_wins_over_provider_mode() {
        let mut cfg = AppConfig::default();
        cfg.apply_overrides(lookup_from(&[
            ("SPEECH_JOBS_PROVIDER", "local"),
            ("SPEECH_JOBS_STUB", "1"),
        ]));
        assert_eq!(cfg.provider.mode, ProviderMode::Stub);
    }

    #[test]
    fn bad_values_are_ignored() {
        let mut cfg = AppConfig::default();
        cfg.apply_overrides(lookup_from(&[
            ("SPEECH_JOBS_PROVIDER", "telepathy"),
            ("SPEECH_JOBS_MAX_JOBS", "many"),
        ]));
        assert_eq!(cfg.provider.mode, ProviderMode::Auto);
        assert_eq!(cfg.jobs.max_jobs, 300);
    }

    #[test]
    fn blank_credential_is_not_a_credential() {
        let mut cfg = AppConfig::default();
        cfg.provider.inference_token = Some("   ".into());
        assert!(cfg.provider.credential().is_none());
    }

    #[test]
    fn provider_mode_parses_case_insensitively() {
        assert_eq!("AUTO".parse::<ProviderMode>(), Ok(ProviderMode::Auto));
        assert_eq!(" Stub ".parse::<ProviderMode>(), Ok(ProviderMode::Stub));
        assert!("cloud".parse::<ProviderMode>().is_err());
    }
}
