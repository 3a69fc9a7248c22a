//! Zip export of stored audio.
//!
//! Each requested id is resolved through its history entry, then its job,
//! then the artifact named after the id.  Ids that resolve to nothing are
//! skipped and reported; identical audio content is stored once.

use std::collections::HashSet;
use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::store::ArtifactStore;

use super::{MaintenanceError, MaintenanceService};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportArchive {
    /// The zip file.
    pub bytes: Vec<u8>,
    /// Ids whose audio is in the archive.
    pub included: Vec<String>,
    /// Ids with no resolvable audio.
    pub skipped: Vec<String>,
    /// Files written; lower than `included` when content repeats.
    pub file_count: usize,
}

impl MaintenanceService {
    pub fn export(&self, ids: &[String]) -> Result<ExportArchive, MaintenanceError> {
        let mut archive = ExportArchive::default();
        let mut seen_ids = HashSet::new();
        let mut seen_content = HashSet::new();

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        for id in ids {
            if !seen_ids.insert(id.as_str()) {
                continue;
            }

            let audio_ref = self.resolve(id);
            let bytes = match self.artifacts().read(&audio_ref) {
                Ok(bytes) => bytes,
                Err(e) if e.is_not_found() || e.is_invalid_ref() => {
                    log::info!("export: no audio for {id}; skipping");
                    archive.skipped.push(id.clone());
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            archive.included.push(id.clone());
            if !seen_content.insert(ArtifactStore::content_id(&bytes)) {
                log::debug!("export: {id} repeats earlier content");
                continue;
            }

            zip.start_file(audio_ref.as_str(), options)?;
            zip.write_all(&bytes)?;
            archive.file_count += 1;
        }

        archive.bytes = zip.finish()?.into_inner();
        log::info!(
            "export: {} of {} id(s) included, {} file(s)",
            archive.included.len(),
            seen_ids.len(),
            archive.file_count
        );
        Ok(archive)
    }

    /// Artifact reference for a job or history id.
    fn resolve(&self, id: &str) -> String {
        if let Ok(entry) = self.history.get(id) {
            return entry.audio_ref;
        }
        if let Some(audio_ref) = self.jobs.get(id).ok().and_then(|job| job.audio_ref) {
            return audio_ref;
        }
        ArtifactStore::audio_ref_for(id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maintenance::tests::{fixture, record};
    use std::io::Read;
    use zip::ZipArchive;

    fn names(bytes: &[u8]) -> Vec<String> {
        let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn mixed_ids_export_only_resolvable_subset() {
        let f = fixture();
        record(&f, "a", b"alpha");
        record(&f, "b", b"bravo");
        f.history.delete("b", true).unwrap();

        let ids = vec!["a".to_string(), "b".to_string(), "ghost".to_string()];
        let archive = f.service.export(&ids).unwrap();

        assert_eq!(archive.included, vec!["a".to_string()]);
        assert_eq!(archive.skipped, vec!["b".to_string(), "ghost".to_string()]);
        assert_eq!(names(&archive.bytes), vec!["a.wav"]);

        let mut zip = ZipArchive::new(Cursor::new(archive.bytes.as_slice())).unwrap();
        let mut content = Vec::new();
        zip.by_name("a.wav").unwrap().read_to_end(&mut content).unwrap();
        assert_eq!(content, b"alpha");
    }

    #[test]
    fn identical_content_is_stored_once() {
        let f = fixture();
        record(&f, "x", b"same bytes");
        record(&f, "y", b"same bytes");

        let archive = f
            .service
            .export(&["x".to_string(), "y".to_string(), "x".to_string()])
            .unwrap();
        assert_eq!(archive.included.len(), 2);
        assert_eq!(archive.file_count, 1);
        assert_eq!(names(&archive.bytes).len(), 1);
    }

    #[test]
    fn falls_back_to_artifact_named_after_id() {
        let f = fixture();
        f.history.artifacts().write("loose", b"raw").unwrap();
        let archive = f.service.export(&["loose".to_string()]).unwrap();
        assert_eq!(archive.included, vec!["loose".to_string()]);
    }

    #[test]
    fn escaping_ids_are_skipped() {
        let f = fixture();
        record(&f, "ok", b"fine");
        let archive = f
            .service
            .export(&["../../etc/passwd".to_string(), "ok".to_string()])
            .unwrap();
        assert_eq!(archive.included, vec!["ok".to_string()]);
        assert_eq!(archive.skipped, vec!["../../etc/passwd".to_string()]);
    }

    #[test]
    fn nothing_resolvable_yields_empty_archive() {
        let f = fixture();
        let archive = f.service.export(&["nope".to_string()]).unwrap();
        assert!(archive.included.is_empty());
        assert!(names(&archive.bytes).is_empty());
    }
}
