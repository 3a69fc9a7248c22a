//! Model registry, availability tracking and downloads.

pub mod download;
pub mod registry;
pub mod tracker;

pub use download::{DownloadError, HfDownloader, ModelDownloader};
pub use registry::{find_model, repo_dir_name, ModelPaths, ModelSpec, MODELS};
pub use tracker::{EnsureOutcome, ModelDescriptor, ModelTracker};
