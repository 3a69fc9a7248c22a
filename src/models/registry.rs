//! Model registry, metadata and path resolution.
//!
//! [`MODELS`] declares every model the service knows about.  [`ModelPaths`]
//! resolves where a model lives on disk: one directory per repo under the
//! models directory, named after the repo id with `/` replaced by `_`.

use std::path::PathBuf;

use crate::config::AppPaths;

// ---------------------------------------------------------------------------
// ModelSpec
// ---------------------------------------------------------------------------

/// Static metadata for one declared model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSpec {
    /// Short name accepted by `ensure` (e.g. `"kokoro"`).
    pub alias: &'static str,
    /// Hugging Face repo id (e.g. `"hexgrad/Kokoro-82M"`).
    pub repo_id: &'static str,
    /// Human-readable name.
    pub display_name: &'static str,
    /// Optional models never make the service report "needs download".
    pub optional: bool,
    /// Whether the on-device runtime can execute this model at all.
    pub local_capable: bool,
}

pub const MODELS: &[ModelSpec] = &[
    ModelSpec {
        alias: "kokoro",
        repo_id: "hexgrad/Kokoro-82M",
        display_name: "Kokoro 82M",
        optional: false,
        local_capable: true,
    },
    ModelSpec {
        alias: "parler",
        repo_id: "parler-tts/parler-tts-mini-v1.1",
        display_name: "Parler-TTS Mini v1.1",
        optional: true,
        local_capable: true,
    },
    ModelSpec {
        alias: "bark",
        repo_id: "suno/bark-small",
        display_name: "Bark Small",
        optional: true,
        local_capable: false,
    },
    ModelSpec {
        alias: "speecht5",
        repo_id: "microsoft/speecht5_tts",
        display_name: "SpeechT5 TTS",
        optional: false,
        local_capable: true,
    },
    ModelSpec {
        alias: "speecht5_vocoder",
        repo_id: "microsoft/speecht5_hifigan",
        display_name: "SpeechT5 HiFiGAN vocoder",
        optional: false,
        local_capable: false,
    },
    ModelSpec {
        alias: "mms",
        repo_id: "facebook/mms-tts-eng",
        display_name: "MMS TTS English",
        optional: false,
        local_capable: true,
    },
];

/// Find a declared model by alias (case-insensitive) or exact repo id.
pub fn find_model(name: &str) -> Option<&'static ModelSpec> {
    let name = name.trim();
    MODELS
        .iter()
        .find(|m| m.alias.eq_ignore_ascii_case(name) || m.repo_id == name)
}

/// Directory name for a repo id.
///
/// ```
/// use speech_jobs::models::repo_dir_name;
///
/// assert_eq!(repo_dir_name("hexgrad/Kokoro-82M"), "hexgrad_Kokoro-82M");
/// ```
pub fn repo_dir_name(repo_id: &str) -> String {
    repo_id.replace('/', "_")
}

// ---------------------------------------------------------------------------
// ModelPaths
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub models_dir: PathBuf,
}

impl ModelPaths {
    pub fn from_app_paths(app_paths: &AppPaths) -> Self {
        Self {
            models_dir: app_paths.models_dir.clone(),
        }
    }

    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }

    pub fn repo_dir(&self, repo_id: &str) -> PathBuf {
        self.models_dir.join(repo_dir_name(repo_id))
    }

    pub fn model_dir(&self, model: &ModelSpec) -> PathBuf {
        self.repo_dir(model.repo_id)
    }

    /// Where an in-progress download is assembled before being moved into
    /// place.
    pub fn staging_dir(&self, repo_id: &str) -> PathBuf {
        self.models_dir
            .join(format!(".{}.partial", repo_dir_name(repo_id)))
    }

    /// A model is present once its directory exists.
    pub fn is_available(&self, model: &ModelSpec) -> bool {
        self.model_dir(model).is_dir()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::tempdir;

    #[test]
    fn aliases_and_repos_are_unique() {
        let aliases: HashSet<_> = MODELS.iter().map(|m| m.alias).collect();
        let repos: HashSet<_> = MODELS.iter().map(|m| m.repo_id).collect();
        assert_eq!(aliases.len(), MODELS.len());
        assert_eq!(repos.len(), MODELS.len());
    }

    #[test]
    fn find_by_alias_or_repo() {
        assert_eq!(find_model("kokoro").unwrap().repo_id, "hexgrad/Kokoro-82M");
        assert_eq!(find_model("KOKORO").unwrap().alias, "kokoro");
        assert_eq!(find_model("suno/bark-small").unwrap().alias, "bark");
        assert!(find_model("nonexistent").is_none());
    }

    #[test]
    fn optional_models_are_parler_and_bark() {
        let optional: Vec<_> = MODELS.iter().filter(|m| m.optional).map(|m| m.alias).collect();
        assert_eq!(optional, vec!["parler", "bark"]);
    }

    #[test]
    fn availability_follows_directory() {
        let dir = tempdir().unwrap();
        let paths = ModelPaths::new(dir.path());
        let kokoro = find_model("kokoro").unwrap();

        assert!(!paths.is_available(kokoro));
        std::fs::create_dir_all(paths.model_dir(kokoro)).unwrap();
        assert!(paths.is_available(kokoro));
        assert_eq!(
            paths.model_dir(kokoro),
            dir.path().join("hexgrad_Kokoro-82M")
        );
    }

    #[test]
    fn staging_dir_is_hidden_sibling() {
        let paths = ModelPaths::new("/m");
        assert_eq!(
            paths.staging_dir("suno/bark-small"),
            PathBuf::from("/m/.suno_bark-small.partial")
        );
    }
}
