//! Job states and the persisted status record.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a job.
///
/// Jobs move `QUEUED → RUNNING → {SUCCESS, FAILURE}`. `SUCCESS` and
/// `FAILURE` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Accepted and waiting for a worker.
    Queued,
    /// A worker is processing the job.
    Running,
    /// Finished with an STL result.
    Success,
    /// Finished with an error.
    Failure,
}

impl JobState {
    /// Wire name of the state.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        }
    }

    /// Whether the job is waiting or in progress.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    /// Whether the job has finished.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }

    /// Whether a record in this state may be overwritten with `next`.
    ///
    /// `RUNNING → RUNNING` carries progress updates and `QUEUED → FAILURE`
    /// covers jobs that never reached a worker.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running | Self::Failure)
                | (Self::Running, Self::Running | Self::Success | Self::Failure)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The stored record of a job, as returned by status queries.
///
/// Serialized flat: `{"state", "detail", "result", "updated_at"}`. `result`
/// is empty unless the job succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    /// Current state.
    pub state: JobState,
    /// Human-readable progress or error text.
    #[serde(default)]
    pub detail: String,
    /// Absolute path of the STL on success.
    #[serde(default)]
    pub result: String,
    /// Time of the last write.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl JobStatus {
    /// A record in `state` stamped with the current time.
    #[must_use]
    pub fn new(state: JobState, detail: impl Into<String>) -> Self {
        Self {
            state,
            detail: detail.into(),
            result: String::new(),
            updated_at: Utc::now(),
        }
    }

    /// A `QUEUED` record.
    #[must_use]
    pub fn queued(detail: impl Into<String>) -> Self {
        Self::new(JobState::Queued, detail)
    }

    /// A `RUNNING` record.
    #[must_use]
    pub fn running(detail: impl Into<String>) -> Self {
        Self::new(JobState::Running, detail)
    }

    /// A `SUCCESS` record pointing at `result`.
    #[must_use]
    pub fn success(detail: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            ..Self::new(JobState::Success, detail)
        }
    }

    /// A `FAILURE` record.
    #[must_use]
    pub fn failure(detail: impl Into<String>) -> Self {
        Self::new(JobState::Failure, detail)
    }

    /// Time since the last write, measured at `now`.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.updated_at)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const ALL: [JobState; 4] = [
        JobState::Queued,
        JobState::Running,
        JobState::Success,
        JobState::Failure,
    ];

    #[test]
    fn test_forward_transitions() {
        assert!(JobState::Queued.can_transition_to(JobState::Running));
        assert!(JobState::Queued.can_transition_to(JobState::Failure));
        assert!(JobState::Running.can_transition_to(JobState::Running));
        assert!(JobState::Running.can_transition_to(JobState::Success));
        assert!(JobState::Running.can_transition_to(JobState::Failure));
    }

    #[test]
    fn test_no_backward_transitions() {
        assert!(!JobState::Running.can_transition_to(JobState::Queued));
        assert!(!JobState::Queued.can_transition_to(JobState::Success));
        assert!(!JobState::Queued.can_transition_to(JobState::Queued));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for from in [JobState::Success, JobState::Failure] {
            assert!(from.is_terminal());
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_status_json_shape() {
        let status = JobStatus::success("Done in 1.00s", "/data/results/a.stl");
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["state"], "SUCCESS");
        assert_eq!(value["detail"], "Done in 1.00s");
        assert_eq!(value["result"], "/data/results/a.stl");
        assert!(value["updated_at"].is_string());

        let back: JobStatus = serde_json::from_value(value).unwrap();
        assert_eq!(back, status);
    }

    #[test]
    fn test_legacy_record_without_heartbeat() {
        let status: JobStatus =
            serde_json::from_str(r#"{"state":"QUEUED","detail":"Job received and queued","result":""}"#)
                .unwrap();
        assert_eq!(status.state, JobState::Queued);
        assert!(status.result.is_empty());
    }

    #[test]
    fn test_age_is_measured_from_last_write() {
        let status = JobStatus::running("Loading model");
        let later = status.updated_at + Duration::seconds(90);
        assert_eq!(status.age(later).num_seconds(), 90);
    }
}
