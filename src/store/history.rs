//! History store for completed, playable results.
//!
//! Entries are append-only apart from explicit deletion and cap eviction.
//! Evicting an entry also deletes its artifact; an explicit delete does so
//! only when asked.  An entry whose artifact has been purged by maintenance
//! stays listed and simply reports no audio.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::provider::ProviderKind;

use super::artifacts::ArtifactStore;
use super::snapshot::SnapshotCell;
use super::{BatchOutcome, StoreError};

// ---------------------------------------------------------------------------
// HistoryEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Same value as the id of the job that produced it.
    pub entry_id: String,
    pub text_preview: String,
    pub voice_id: String,
    pub model: String,
    /// Provider that produced the audio.
    pub source: ProviderKind,
    /// Reference into the [`ArtifactStore`]; may dangle after cleanup.
    pub audio_ref: String,
    /// Hex SHA-256 of the artifact at the time it was written.
    #[serde(default)]
    pub content_sha256: Option<String>,
    pub duration_seconds: f64,
    pub created_at: DateTime<Utc>,
}

/// Truncate `text` to at most `max_chars` characters on a char boundary.
pub fn text_preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

// ---------------------------------------------------------------------------
// HistoryStore
// ---------------------------------------------------------------------------

pub struct HistoryStore {
    cell: SnapshotCell<HistoryEntry>,
    max_items: usize,
    artifacts: Arc<ArtifactStore>,
}

impl HistoryStore {
    pub fn open(
        path: impl Into<PathBuf>,
        max_items: usize,
        artifacts: Arc<ArtifactStore>,
    ) -> Result<Self, StoreError> {
        let store = Self {
            cell: SnapshotCell::load(path),
            max_items: max_items.max(1),
            artifacts,
        };

        let unsorted = store
            .cell
            .read(|entries| entries.windows(2).any(|w| w[0].created_at > w[1].created_at));
        if unsorted {
            store.cell.mutate(|entries| {
                entries.sort_by_key(|e| e.created_at);
                Ok(())
            })?;
        }

        let overflow = store.len().saturating_sub(store.max_items);
        if overflow > 0 {
            store.truncate(store.max_items)?;
        }

        log::info!(
            "history: loaded {} entr(ies) from {}",
            store.len(),
            store.cell.path().display()
        );
        Ok(store)
    }

    pub fn artifacts(&self) -> &Arc<ArtifactStore> {
        &self.artifacts
    }

    /// Record a finished result, evicting (and purging) the oldest entries
    /// beyond the cap.  Returns the ids that were evicted.
    pub fn append(&self, entry: HistoryEntry) -> Result<Vec<String>, StoreError> {
        let max_items = self.max_items;
        let entry_id = entry.entry_id.clone();

        let evicted = self.cell.mutate(move |entries| {
            entries.retain(|e| e.entry_id != entry.entry_id);
            entries.push(entry);
            let overflow = entries.len().saturating_sub(max_items);
            Ok(entries.drain(..overflow).collect::<Vec<_>>())
        })?;

        log::debug!("history: appended {entry_id}");
        Ok(self.purge(evicted, "cap eviction"))
    }

    pub fn get(&self, entry_id: &str) -> Result<HistoryEntry, StoreError> {
        self.cell
            .read(|entries| entries.iter().find(|e| e.entry_id == entry_id).cloned())
            .ok_or_else(|| StoreError::NotFound(entry_id.to_string()))
    }

    /// Up to `limit` entries, most recent first.
    pub fn list(&self, limit: usize) -> Vec<HistoryEntry> {
        self.cell
            .read(|entries| entries.iter().rev().take(limit).cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.cell.read(|entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the entry's artifact is still on disk.
    pub fn has_audio(&self, entry: &HistoryEntry) -> bool {
        self.artifacts.exists(&entry.audio_ref)
    }

    /// Artifact references held by retained entries.
    pub fn referenced_audio(&self) -> HashSet<String> {
        self.cell
            .read(|entries| entries.iter().map(|e| e.audio_ref.clone()).collect())
    }

    pub fn delete(&self, entry_id: &str, delete_artifact: bool) -> Result<(), StoreError> {
        let removed = self.cell.mutate(|entries| {
            let idx = entries
                .iter()
                .position(|e| e.entry_id == entry_id)
                .ok_or_else(|| StoreError::NotFound(entry_id.to_string()))?;
            Ok(entries.remove(idx))
        })?;

        log::info!("history: deleted {entry_id}");
        if delete_artifact {
            self.purge(vec![removed], "delete");
        }
        Ok(())
    }

    pub fn delete_batch(
        &self,
        entry_ids: &[String],
        delete_artifact: bool,
    ) -> Result<BatchOutcome, StoreError> {
        let (outcome, removed) = self.cell.mutate(|entries| {
            let mut outcome = BatchOutcome::default();
            let mut removed = Vec::new();
            for id in entry_ids {
                match entries.iter().position(|e| &e.entry_id == id) {
                    Some(idx) => {
                        removed.push(entries.remove(idx));
                        outcome.deleted.push(id.clone());
                    }
                    None => outcome.not_found.push(id.clone()),
                }
            }
            Ok((outcome, removed))
        })?;

        if delete_artifact {
            self.purge(removed, "batch delete");
        }
        log::info!(
            "history: batch delete removed {}, {} not found",
            outcome.deleted.len(),
            outcome.not_found.len()
        );
        Ok(outcome)
    }

    /// Keep only the `max` most recent entries, purging the artifacts of the
    /// rest.  Returns the removed entries.
    pub fn truncate(&self, max: usize) -> Result<Vec<HistoryEntry>, StoreError> {
        let removed = self.cell.mutate(|entries| {
            let overflow = entries.len().saturating_sub(max);
            Ok(entries.drain(..overflow).collect::<Vec<_>>())
        })?;

        if !removed.is_empty() {
            log::info!("history: truncated {} entr(ies) to {max}", removed.len());
        }
        self.purge(removed.clone(), "truncate");
        Ok(removed)
    }

    /// Delete the artifacts of `entries`.  Failures are logged, never
    /// propagated: the entries are already gone from the snapshot.
    fn purge(&self, entries: Vec<HistoryEntry>, why: &str) -> Vec<String> {
        entries
            .into_iter()
            .map(|entry| {
                if let Err(e) = self.artifacts.delete(&entry.audio_ref) {
                    log::warn!(
                        "history: {why}: could not delete {}: {e}",
                        entry.audio_ref
                    );
                }
                entry.entry_id
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
