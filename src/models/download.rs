//! Model downloads from a Hugging Face compatible hub.
//!
//! [`HfDownloader`] lists a repo's files through the hub API, fetches each
//! one into a hidden staging directory and renames the staging directory
//! into place once every file has arrived.  A model directory therefore
//! only exists when it is complete.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::config::ProviderConfig;

// ---------------------------------------------------------------------------
// DownloadError
// ---------------------------------------------------------------------------

/// Failure to fetch one model.  Never affects other models.
#[derive(Debug, Clone, Error)]
pub enum DownloadError {
    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("{url} returned {status}")]
    Status { url: String, status: u16 },

    /// The file listing was missing or malformed.
    #[error("cannot list repo files: {0}")]
    Listing(String),

    #[error("I/O error: {0}")]
    Io(String),

    /// The download task ended without a result (it panicked).
    #[error("download aborted: {0}")]
    Aborted(String),
}

impl From<reqwest::Error> for DownloadError {
    fn from(e: reqwest::Error) -> Self {
        DownloadError::Request(e.to_string())
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(e: std::io::Error) -> Self {
        DownloadError::Io(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// ModelDownloader trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ModelDownloader: Send + Sync {
    /// Fetch every file of `repo_id` so that `dest` exists and is complete
    /// on success.  `staging` is scratch space owned by this call.
    async fn download(&self, repo_id: &str, staging: &Path, dest: &Path)
        -> Result<(), DownloadError>;
}

// ---------------------------------------------------------------------------
// HfDownloader
// ---------------------------------------------------------------------------

pub struct HfDownloader {
    client: reqwest::Client,
    hub_base_url: String,
    token: Option<String>,
}

impl HfDownloader {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new(&config.hub_base_url, config.credential().map(str::to_string))
    }

    pub fn new(hub_base_url: &str, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            hub_base_url: hub_base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let req = self.client.get(url);
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Relative file names in the repo, from `/api/models/<repo>`.
    async fn list_files(&self, repo_id: &str) -> Result<Vec<String>, DownloadError> {
        let url = format!("{}/api/models/{}", self.hub_base_url, repo_id);
        let response = self.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(DownloadError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| DownloadError::Listing(e.to_string()))?;
        let siblings = json["siblings"]
            .as_array()
            .ok_or_else(|| DownloadError::Listing("no `siblings` array".into()))?;

        Ok(siblings
            .iter()
            .filter_map(|s| s["rfilename"].as_str())
            .filter(|name| is_safe_relative(name))
            .map(str::to_string)
            .collect())
    }

    async fn fetch_file(
        &self,
        repo_id: &str,
        file: &str,
        target: &Path,
    ) -> Result<(), DownloadError> {
        let url = format!("{}/{}/resolve/main/{}", self.hub_base_url, repo_id, file);
        let mut response = self.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(DownloadError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut out = tokio::fs::File::create(target).await?;
        while let Some(chunk) = response.chunk().await? {
            out.write_all(&chunk).await?;
        }
        out.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl ModelDownloader for HfDownloader {
    async fn download(
        &self,
        repo_id: &str,
        staging: &Path,
        dest: &Path,
    ) -> Result<(), DownloadError> {
        let files = self.list_files(repo_id).await?;
        if files.is_empty() {
            return Err(DownloadError::Listing(format!("{repo_id} has no files")));
        }

        let _ = tokio::fs::remove_dir_all(staging).await;
        tokio::fs::create_dir_all(staging).await?;

        let result = async {
            for file in &files {
                log::debug!("download: {repo_id}/{file}");
                self.fetch_file(repo_id, file, &staging.join(file)).await?;
            }
            tokio::fs::rename(staging, dest).await?;
            Ok::<(), DownloadError>(())
        }
        .await;

        if result.is_err() {
            let _ = tokio::fs::remove_dir_all(staging).await;
        }
        result
    }
}

/// Hub file names must stay inside the staging directory.
fn is_safe_relative(name: &str) -> bool {
    let path = PathBuf::from(name);
    !name.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rejects_escaping_file_names() {
        assert!(is_safe_relative("config.json"));
        assert!(is_safe_relative("voices/af.pt"));
        assert!(!is_safe_relative("../evil"));
        assert!(!is_safe_relative("/etc/passwd"));
        assert!(!is_safe_relative(""));
    }

    #[test]
    fn blank_token_is_not_sent() {
        let downloader = HfDownloader::new("https://huggingface.co/", Some(" ".into()));
        assert!(downloader.token.is_none());
        assert_eq!(downloader.hub_base_url, "https://huggingface.co");
    }

    #[tokio::test]
    async fn unreachable_hub_leaves_no_directories() {
        let dir = tempdir().unwrap();
        let staging = dir.path().join(".x.partial");
        let dest = dir.path().join("x");

        let downloader = HfDownloader::new("http://127.0.0.1:9", None);
        assert!(downloader.download("org/x", &staging, &dest).await.is_err());
        assert!(!staging.exists());
        assert!(!dest.exists());
    }
}
