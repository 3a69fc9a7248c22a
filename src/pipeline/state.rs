//! Job lifecycle state machine.
//!
//! [`JobStatus`] is the persisted status of one synthesis request.
//! [`Transition`] is the only way to move a job forward; it carries the
//! payload that the target state requires, so a terminal job always has
//! exactly one of a result or an error.
//!
//! ```text
//! Queued ──▶ Running ──▶ Succeeded
//!   │           └──────▶ Failed
//!   └─ precondition failed (no execution) ──▶ Failed
//! ```
//!
//! Terminal states are final.

use serde::{Deserialize, Serialize};

use crate::provider::ProviderKind;

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Recorded, waiting for a worker.
    Queued,
    /// A worker is executing the provider call.
    Running,
    /// Audio was written and a history entry recorded.
    Succeeded,
    /// The job ended without audio; `error` explains why.
    Failed,
}

impl JobStatus {
    /// Returns `true` for `Succeeded` and `Failed`.
    ///
    /// ```
    /// use speech_jobs::pipeline::JobStatus;
    ///
    /// assert!(!JobStatus::Queued.is_terminal());
    /// assert!(!JobStatus::Running.is_terminal());
    /// assert!(JobStatus::Succeeded.is_terminal());
    /// assert!(JobStatus::Failed.is_terminal());
    /// ```
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Queued, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Succeeded)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

impl Default for JobStatus {
    fn default() -> Self {
        JobStatus::Queued
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// JobOutcome / Transition
// ---------------------------------------------------------------------------

/// What a successful job produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    /// History entry id (equal to the job id).
    pub result_ref: String,
    /// Artifact identifier in the artifact store.
    pub audio_ref: String,
    pub duration_seconds: f64,
    pub model: String,
    /// Provider that actually produced the audio.
    pub source: ProviderKind,
}

/// A requested state change for one job.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Running,
    Succeeded(JobOutcome),
    Failed(String),
}

impl Transition {
    pub fn target(&self) -> JobStatus {
        match self {
            Transition::Running => JobStatus::Running,
            Transition::Succeeded(_) => JobStatus::Succeeded,
            Transition::Failed(_) => JobStatus::Failed,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [JobStatus; 4] = [
        JobStatus::Queued,
        JobStatus::Running,
        JobStatus::Succeeded,
        JobStatus::Failed,
    ];

    #[test]
    fn default_status_is_queued() {
        assert_eq!(JobStatus::default(), JobStatus::Queued);
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for from in [JobStatus::Succeeded, JobStatus::Failed] {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn queued_can_start_or_fail() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Succeeded));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Queued));
    }

    #[test]
    fn running_can_only_finish() {
        assert!(JobStatus::Running.can_transition_to(JobStatus::Succeeded));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Queued));
    }

    #[test]
    fn nothing_returns_to_queued() {
        for from in ALL {
            assert!(!from.can_transition_to(JobStatus::Queued));
        }
    }

    #[test]
    fn labels_match_serde_names() {
        for status in ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.label()));
        }
    }

    #[test]
    fn transition_targets() {
        assert_eq!(Transition::Running.target(), JobStatus::Running);
        assert_eq!(
            Transition::Failed("boom".into()).target(),
            JobStatus::Failed
        );
    }
}
