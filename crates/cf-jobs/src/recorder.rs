//! Guarded status writes and stale-job recovery.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::error::{JobError, JobResult};
use crate::state::{JobState, JobStatus};
use crate::store::StatusStore;

/// Detail written to jobs whose worker stopped reporting.
pub const HEARTBEAT_LOST: &str = "Worker heartbeat lost";

/// Guarded writes retried this many times before giving up.
const WRITE_ATTEMPTS: usize = 8;

/// Writes status records, refusing transitions that go backwards.
///
/// A job with no record yet accepts any first state.
#[derive(Clone)]
pub struct JobRecorder {
    store: Arc<dyn StatusStore>,
}

impl JobRecorder {
    /// Recorder writing to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn StatusStore>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn StatusStore> {
        &self.store
    }

    /// Write `status` for `job_id` if the stored state allows it.
    ///
    /// The check and the write happen against the same stored record; if
    /// another writer gets in between, the check is repeated.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::InvalidTransition`] (leaving the record untouched)
    /// if the move is not allowed, or a store error.
    pub fn transition(&self, job_id: &str, status: JobStatus) -> JobResult<()> {
        for _ in 0..WRITE_ATTEMPTS {
            let current = self.store.get(job_id)?;
            if let Some(current) = &current {
                if !current.state.can_transition_to(status.state) {
                    warn!(
                        job_id,
                        from = %current.state,
                        to = %status.state,
                        "Refusing status transition"
                    );
                    return Err(JobError::InvalidTransition {
                        job_id: job_id.to_string(),
                        from: current.state,
                        to: status.state,
                    });
                }
            }
            if self
                .store
                .compare_and_put(job_id, current.as_ref(), &status)?
            {
                return Ok(());
            }
            debug!(job_id, "Status changed during write, retrying");
        }
        Err(JobError::store(format!(
            "status of {job_id} kept changing during write"
        )))
    }

    /// Refresh `updated_at` on a `RUNNING` record, keeping its detail.
    ///
    /// Returns `false` without writing if the job is not running or its
    /// record changed meanwhile (which refreshed it anyway).
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn heartbeat(&self, job_id: &str) -> JobResult<bool> {
        let Some(current) = self.store.get(job_id)? else {
            return Ok(false);
        };
        if current.state != JobState::Running {
            return Ok(false);
        }
        let refreshed = JobStatus {
            updated_at: Utc::now(),
            ..current.clone()
        };
        self.store
            .compare_and_put(job_id, Some(&current), &refreshed)
    }

    /// Record a `RUNNING` progress step.
    ///
    /// # Errors
    ///
    /// See [`transition`](Self::transition).
    pub fn running(&self, job_id: &str, detail: impl Into<String>) -> JobResult<()> {
        self.transition(job_id, JobStatus::running(detail))
    }
}

impl std::fmt::Debug for JobRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRecorder").finish_non_exhaustive()
    }
}

fn is_stale(status: &JobStatus, now: DateTime<Utc>, max_age: Duration) -> bool {
    status.state == JobState::Running && status.age(now) > max_age
}

/// Mark `RUNNING` jobs whose last write is older than `max_age` as failed.
///
/// A running [`JobController`](crate::JobController) refreshes its job every
/// heartbeat interval, so `max_age` must be longer than that interval or
/// live jobs get swept. Each candidate is re-read and only replaced if the
/// record is unchanged, so a job that finished or reported progress after
/// the listing keeps its state.
///
/// Returns the ids that were marked, in id order.
///
/// # Errors
///
/// Returns a store error if records cannot be listed or written.
pub fn sweep_stale(store: &dyn StatusStore, max_age: Duration) -> JobResult<Vec<String>> {
    let now = Utc::now();
    let mut swept = Vec::new();
    for (job_id, listed) in store.list()? {
        if !is_stale(&listed, now, max_age) {
            continue;
        }
        let Some(current) = store.get(&job_id)? else {
            continue;
        };
        if !is_stale(&current, now, max_age) {
            debug!(job_id = %job_id, state = %current.state, "Job moved on since listing");
            continue;
        }
        let failed = JobStatus::failure(HEARTBEAT_LOST);
        if !store.compare_and_put(&job_id, Some(&current), &failed)? {
            debug!(job_id = %job_id, "Job updated during sweep");
            continue;
        }
        warn!(
            job_id = %job_id,
            last_update = %current.updated_at,
            "Job heartbeat is stale"
        );
        swept.push(job_id);
    }
    info!(swept = swept.len(), "Stale job sweep complete");
    Ok(swept)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStatusStore;

    fn recorder() -> JobRecorder {
        JobRecorder::new(Arc::new(MemoryStatusStore::new()))
    }

    #[test]
    fn test_accepts_forward_moves() {
        let rec = recorder();
        rec.transition("j", JobStatus::queued("Job received and queued")).unwrap();
        rec.running("j", "Loading model").unwrap();
        rec.running("j", "Exporting STL").unwrap();
        rec.transition("j", JobStatus::success("Done in 0.10s", "/tmp/j.stl"))
            .unwrap();

        let stored = rec.store().get("j").unwrap().unwrap();
        assert_eq!(stored.state, JobState::Success);
    }

    #[test]
    fn test_refuses_leaving_terminal_state() {
        let rec = recorder();
        rec.transition("j", JobStatus::failure("boom")).unwrap();

        let err = rec.running("j", "Loading model").unwrap_err();
        assert!(matches!(
            err,
            JobError::InvalidTransition {
                from: JobState::Failure,
                to: JobState::Running,
                ..
            }
        ));
        assert_eq!(rec.store().get("j").unwrap().unwrap().detail, "boom");
    }

    #[test]
    fn test_sweep_marks_only_stale_running_jobs() {
        let store = MemoryStatusStore::new();

        let mut stale = JobStatus::running("Poisson reconstruction depth=9");
        stale.updated_at = Utc::now() - Duration::minutes(30);
        store.put("stale", &stale).unwrap();

        let mut old_queued = JobStatus::queued("Job received and queued");
        old_queued.updated_at = Utc::now() - Duration::minutes(30);
        store.put("queued", &old_queued).unwrap();

        store.put("fresh", &JobStatus::running("Loading model")).unwrap();

        let swept = sweep_stale(&store, Duration::minutes(10)).unwrap();
        assert_eq!(swept, ["stale"]);

        let record = store.get("stale").unwrap().unwrap();
        assert_eq!(record.state, JobState::Failure);
        assert_eq!(record.detail, HEARTBEAT_LOST);
        assert_eq!(store.get("fresh").unwrap().unwrap().state, JobState::Running);
        assert_eq!(store.get("queued").unwrap().unwrap().state, JobState::Queued);
    }

    /// Store that serves an old snapshot of every record to readers while
    /// guarded writes go against the live records.
    struct LaggingStore {
        live: MemoryStatusStore,
        snapshot: Vec<(String, JobStatus)>,
        stale_reads: bool,
    }

    impl StatusStore for LaggingStore {
        fn get(&self, job_id: &str) -> JobResult<Option<JobStatus>> {
            if self.stale_reads {
                return Ok(self
                    .snapshot
                    .iter()
                    .find(|(id, _)| id == job_id)
                    .map(|(_, s)| s.clone()));
            }
            self.live.get(job_id)
        }

        fn put(&self, job_id: &str, status: &JobStatus) -> JobResult<()> {
            self.live.put(job_id, status)
        }

        fn compare_and_put(
            &self,
            job_id: &str,
            expected: Option<&JobStatus>,
            status: &JobStatus,
        ) -> JobResult<bool> {
            self.live.compare_and_put(job_id, expected, status)
        }

        fn list(&self) -> JobResult<Vec<(String, JobStatus)>> {
            Ok(self.snapshot.clone())
        }
    }

    fn finished_after_listing(stale_reads: bool) -> LaggingStore {
        let mut running = JobStatus::running("Poisson reconstruction depth=9");
        running.updated_at = Utc::now() - Duration::minutes(30);

        let live = MemoryStatusStore::new();
        live.put("job", &JobStatus::success("Done in 1.00s", "/tmp/job.stl"))
            .unwrap();
        LaggingStore {
            live,
            snapshot: vec![("job".to_string(), running)],
            stale_reads,
        }
    }

    #[test]
    fn test_sweep_rereads_before_failing_a_job() {
        let store = finished_after_listing(false);
        let swept = sweep_stale(&store, Duration::minutes(10)).unwrap();
        assert!(swept.is_empty());

        let record = store.live.get("job").unwrap().unwrap();
        assert_eq!(record.state, JobState::Success);
        assert_eq!(record.detail, "Done in 1.00s");
    }

    #[test]
    fn test_sweep_write_is_guarded_by_the_record_it_read() {
        let store = finished_after_listing(true);
        let swept = sweep_stale(&store, Duration::minutes(10)).unwrap();
        assert!(swept.is_empty());
        assert_eq!(
            store.live.get("job").unwrap().unwrap().state,
            JobState::Success
        );
    }

    #[test]
    fn test_heartbeat_refreshes_only_running_jobs() {
        let rec = recorder();
        let mut running = JobStatus::running("Running depth inference");
        running.updated_at = Utc::now() - Duration::minutes(30);
        rec.store().put("j", &running).unwrap();

        assert!(rec.heartbeat("j").unwrap());
        let refreshed = rec.store().get("j").unwrap().unwrap();
        assert_eq!(refreshed.state, JobState::Running);
        assert_eq!(refreshed.detail, "Running depth inference");
        assert!(refreshed.updated_at > running.updated_at);
        assert!(sweep_stale(rec.store().as_ref(), Duration::minutes(10))
            .unwrap()
            .is_empty());

        rec.transition("j", JobStatus::success("Done in 2.00s", "/tmp/j.stl"))
            .unwrap();
        assert!(!rec.heartbeat("j").unwrap());
        assert!(!rec.heartbeat("missing").unwrap());
        assert_eq!(rec.store().get("j").unwrap().unwrap().state, JobState::Success);
    }

    #[test]
    fn test_transition_checks_the_record_it_replaces() {
        // Readers see RUNNING but the live record is already SUCCESS, so the
        // guarded write keeps failing and the transition gives up.
        let store = finished_after_listing(true);
        let rec = JobRecorder::new(Arc::new(store));
        let err = rec.running("job", "Exporting STL").unwrap_err();
        assert!(matches!(err, JobError::Store(_)));
    }
}
