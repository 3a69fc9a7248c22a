//! Snapshot-backed in-memory collection shared by the job and history
//! stores.
//!
//! [`SnapshotCell`] holds a `Vec<T>` (oldest first) behind a read/write lock
//! and a separate writer mutex.  A mutation clones the collection, applies
//! the change, durably rewrites the JSON snapshot, and only then publishes
//! the new collection.  If the write fails the in-memory state is untouched.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::StoreError;

// ---------------------------------------------------------------------------
// SnapshotCell
// ---------------------------------------------------------------------------

pub struct SnapshotCell<T> {
    path: PathBuf,
    items: RwLock<Vec<T>>,
    /// Serialises writers; held for the whole clone → write → publish cycle.
    writer: Mutex<()>,
}

impl<T> SnapshotCell<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    /// Load the snapshot at `path`.
    ///
    /// A missing file yields an empty collection.  A file that is not a JSON
    /// array is logged and treated as empty; individual records that fail to
    /// decode are skipped.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let items = read_snapshot(&path);
        Self {
            path,
            items: RwLock::new(items),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` against the current collection.
    pub fn read<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        let items = self.items.read();
        f(&items)
    }

    /// Apply `f` to a copy of the collection, persist it, then publish it.
    ///
    /// `f` returning `Err` aborts without touching memory or disk.
    pub fn mutate<R>(
        &self,
        f: impl FnOnce(&mut Vec<T>) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let _writer = self.writer.lock();
        let mut next = self.items.read().clone();
        let out = f(&mut next)?;
        write_snapshot(&self.path, &next)?;
        *self.items.write() = next;
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// File helpers
// ---------------------------------------------------------------------------

fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            log::warn!("snapshot: cannot read {}: {e}", path.display());
            return Vec::new();
        }
    };

    let raw: Vec<serde_json::Value> = match serde_json::from_str(&content) {
        Ok(raw) => raw,
        Err(e) => {
            log::warn!(
                "snapshot: {} is not a JSON array ({e}); starting empty",
                path.display()
            );
            return Vec::new();
        }
    };

    let total = raw.len();
    let items: Vec<T> = raw
        .into_iter()
        .filter_map(|value| serde_json::from_value(value).ok())
        .collect();

    if items.len() < total {
        log::warn!(
            "snapshot: skipped {} undecodable record(s) in {}",
            total - items.len(),
            path.display()
        );
    }
    items
}

/// Write `items` to a sibling temp file, fsync it, then rename over `path`.
fn write_snapshot<T: Serialize>(path: &Path, items: &[T]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_vec_pretty(items)?;
    let tmp = path.with_extension("json.tmp");

    let result = (|| -> Result<(), StoreError> {
        let mut file = File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Rec {
        id: u32,
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let cell: SnapshotCell<Rec> = SnapshotCell::load(dir.path().join("none.json"));
        assert_eq!(cell.read(|v| v.len()), 0);
    }

    #[test]
    fn mutate_persists_and_reloads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recs.json");

        let cell: SnapshotCell<Rec> = SnapshotCell::load(&path);
        cell.mutate(|v| {
            v.push(Rec { id: 1 });
            v.push(Rec { id: 2 });
            Ok(())
        })
        .unwrap();

        let reloaded: SnapshotCell<Rec> = SnapshotCell::load(&path);
        assert_eq!(reloaded.read(|v| v.to_vec()), vec![Rec { id: 1 }, Rec { id: 2 }]);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn failed_mutation_leaves_state_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recs.json");
        let cell: SnapshotCell<Rec> = SnapshotCell::load(&path);

        let err = cell
            .mutate(|v| {
                v.push(Rec { id: 9 });
                Err::<(), _>(StoreError::NotFound("x".into()))
            })
            .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(cell.read(|v| v.len()), 0);
        assert!(!path.exists());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recs.json");
        std::fs::write(&path, "{not json").unwrap();

        let cell: SnapshotCell<Rec> = SnapshotCell::load(&path);
        assert_eq!(cell.read(|v| v.len()), 0);
    }

    #[test]
    fn undecodable_records_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recs.json");
        std::fs::write(&path, r#"[{"id": 1}, {"id": "nope"}, {"id": 3}]"#).unwrap();

        let cell: SnapshotCell<Rec> = SnapshotCell::load(&path);
        assert_eq!(cell.read(|v| v.to_vec()), vec![Rec { id: 1 }, Rec { id: 3 }]);
    }
}
