//! Age-based artifact cleanup and history truncation.

use std::time::{Duration, SystemTime};

use serde::Serialize;

use super::{MaintenanceError, MaintenanceService};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Unreferenced artifacts removed for being older than the cutoff.
    pub removed_files: usize,
    /// History entries dropped to respect `max_history`.
    pub removed_history: usize,
    pub remaining_history: usize,
}

impl MaintenanceService {
    /// Delete artifacts older than `max_age_hours` that no retained history
    /// entry references, then truncate history to `max_history` entries,
    /// oldest first (their artifacts go with them).
    pub fn cleanup(
        &self,
        max_age_hours: u64,
        max_history: usize,
    ) -> Result<CleanupReport, MaintenanceError> {
        let max_age = Duration::from_secs(max_age_hours.saturating_mul(3600));
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let referenced = self.history.referenced_audio();
        let mut report = CleanupReport::default();

        for artifact in self.artifacts().list()? {
            if artifact.modified >= cutoff || referenced.contains(&artifact.audio_ref) {
                continue;
            }
            match self.artifacts().delete(&artifact.audio_ref) {
                Ok(true) => report.removed_files += 1,
                Ok(false) => {}
                Err(e) => log::warn!("cleanup: cannot delete {}: {e}", artifact.audio_ref),
            }
        }

        report.removed_history = self.history.truncate(max_history)?.len();
        report.remaining_history = self.history.len();

        log::info!(
            "cleanup: removed {} file(s), {} history entr(ies), {} remaining",
            report.removed_files,
            report.removed_history,
            report.remaining_history
        );
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maintenance::tests::{fixture, record};

    fn age(f: &crate::maintenance::tests::Fixture, audio_ref: &str, hours: u64) {
        let path = f.history.artifacts().path_for(audio_ref).unwrap();
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(hours * 3600))
            .unwrap();
    }

    #[test]
    fn removes_only_old_unreferenced_files() {
        let f = fixture();
        let artifacts = f.history.artifacts();
        let kept = record(&f, "referenced", b"a");
        artifacts.write("orphan-old", b"b").unwrap();
        artifacts.write("orphan-new", b"c").unwrap();
        age(&f, &kept.audio_ref, 100);
        age(&f, "orphan-old.wav", 100);

        let report = f.service.cleanup(48, 200).unwrap();

        assert_eq!(report.removed_files, 1);
        assert!(!artifacts.exists("orphan-old.wav"));
        assert!(artifacts.exists("orphan-new.wav"));
        assert!(artifacts.exists(&kept.audio_ref));
        assert_eq!(report.remaining_history, 1);
    }

    #[test]
    fn truncates_history_with_cascade() {
        let f = fixture();
        for id in ["a", "b", "c"] {
            record(&f, id, id.as_bytes());
        }

        let report = f.service.cleanup(48, 1).unwrap();

        assert_eq!(report.removed_history, 2);
        assert_eq!(report.remaining_history, 1);
        assert!(!f.history.artifacts().exists("a.wav"));
        assert!(!f.history.artifacts().exists("b.wav"));
        assert!(f.history.artifacts().exists("c.wav"));
    }

    #[test]
    fn empty_stores_are_fine() {
        let f = fixture();
        assert_eq!(f.service.cleanup(0, 0).unwrap(), CleanupReport::default());
    }
}
