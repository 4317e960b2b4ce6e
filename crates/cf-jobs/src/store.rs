//! Job status persistence.
//!
//! A [`StatusStore`] maps job ids to their latest [`JobStatus`]. Writes
//! replace the whole record; readers poll. Writers that must not clobber a
//! newer record use [`StatusStore::compare_and_put`].

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use hashbrown::HashMap;
use tracing::debug;

use crate::error::{JobError, JobResult};
use crate::state::JobStatus;

/// Key-value storage for job status records.
pub trait StatusStore: Send + Sync {
    /// The stored record for `job_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Store`] if the backing storage fails.
    fn get(&self, job_id: &str) -> JobResult<Option<JobStatus>>;

    /// Replace the record for `job_id`.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Store`] if the backing storage fails.
    fn put(&self, job_id: &str, status: &JobStatus) -> JobResult<()>;

    /// Replace the record for `job_id` only if it still equals `expected`
    /// (`None` meaning no record yet), as one atomic step.
    ///
    /// Returns `false` and leaves the record alone if it has changed.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Store`] if the backing storage fails.
    fn compare_and_put(
        &self,
        job_id: &str,
        expected: Option<&JobStatus>,
        status: &JobStatus,
    ) -> JobResult<bool>;

    /// Every stored record, ordered by job id.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Store`] if the backing storage fails.
    fn list(&self) -> JobResult<Vec<(String, JobStatus)>>;
}

/// In-process store, lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    records: RwLock<HashMap<String, JobStatus>>,
}

impl MemoryStatusStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusStore for MemoryStatusStore {
    fn get(&self, job_id: &str) -> JobResult<Option<JobStatus>> {
        let records = self
            .records
            .read()
            .map_err(|_| JobError::store("status map lock poisoned"))?;
        Ok(records.get(job_id).cloned())
    }

    fn put(&self, job_id: &str, status: &JobStatus) -> JobResult<()> {
        let mut records = self
            .records
            .write()
            .map_err(|_| JobError::store("status map lock poisoned"))?;
        records.insert(job_id.to_string(), status.clone());
        Ok(())
    }

    fn compare_and_put(
        &self,
        job_id: &str,
        expected: Option<&JobStatus>,
        status: &JobStatus,
    ) -> JobResult<bool> {
        let mut records = self
            .records
            .write()
            .map_err(|_| JobError::store("status map lock poisoned"))?;
        if records.get(job_id) != expected {
            return Ok(false);
        }
        records.insert(job_id.to_string(), status.clone());
        Ok(true)
    }

    fn list(&self) -> JobResult<Vec<(String, JobStatus)>> {
        let records = self
            .records
            .read()
            .map_err(|_| JobError::store("status map lock poisoned"))?;
        let mut all: Vec<_> = records
            .iter()
            .map(|(id, status)| (id.clone(), status.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(all)
    }
}

/// Store that keeps one `{job_id}.json` file per job in a directory.
///
/// Each write goes to a temporary file that is then renamed over the record,
/// so readers never see a half-written record. Writes from every handle in
/// the process are serialized, which makes [`compare_and_put`] atomic within
/// one process. Separate processes sharing a directory are not coordinated.
///
/// [`compare_and_put`]: StatusStore::compare_and_put
#[derive(Debug, Clone)]
pub struct FileStatusStore {
    dir: PathBuf,
}

/// Held across every file store write.
static WRITE_LOCK: Mutex<()> = Mutex::new(());

impl FileStatusStore {
    /// Open (and create if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Store`] if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> JobResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| JobError::store(format!("cannot create {}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    /// Directory holding the records.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, job_id: &str) -> JobResult<PathBuf> {
        let valid = !job_id.is_empty()
            && job_id != "."
            && job_id != ".."
            && !job_id.contains(['/', '\\']);
        if !valid {
            return Err(JobError::store(format!("invalid job id {job_id:?}")));
        }
        Ok(self.dir.join(format!("{job_id}.json")))
    }

    fn write_record(&self, job_id: &str, status: &JobStatus) -> JobResult<()> {
        let path = self.record_path(job_id)?;
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec(status)
            .map_err(|e| JobError::store(format!("serialize {job_id}: {e}")))?;
        fs::write(&tmp, json)
            .and_then(|()| fs::rename(&tmp, &path))
            .map_err(|e| JobError::store(format!("write {}: {e}", path.display())))?;
        debug!(job_id, state = %status.state, "Status written");
        Ok(())
    }
}

fn write_guard() -> JobResult<std::sync::MutexGuard<'static, ()>> {
    WRITE_LOCK
        .lock()
        .map_err(|_| JobError::store("status file lock poisoned"))
}

impl StatusStore for FileStatusStore {
    fn get(&self, job_id: &str) -> JobResult<Option<JobStatus>> {
        let path = self.record_path(job_id)?;
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(JobError::store(format!("read {}: {e}", path.display()))),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| JobError::store(format!("parse {}: {e}", path.display())))
    }

    fn put(&self, job_id: &str, status: &JobStatus) -> JobResult<()> {
        let _guard = write_guard()?;
        self.write_record(job_id, status)
    }

    fn compare_and_put(
        &self,
        job_id: &str,
        expected: Option<&JobStatus>,
        status: &JobStatus,
    ) -> JobResult<bool> {
        let _guard = write_guard()?;
        if self.get(job_id)?.as_ref() != expected {
            return Ok(false);
        }
        self.write_record(job_id, status)?;
        Ok(true)
    }

    fn list(&self) -> JobResult<Vec<(String, JobStatus)>> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| JobError::store(format!("list {}: {e}", self.dir.display())))?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| JobError::store(e.to_string()))?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();

        let mut all = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(status) = self.get(&id)? {
                all.push((id, status));
            }
        }
        Ok(all)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::state::JobState;

    fn exercise(store: &dyn StatusStore) {
        assert!(store.get("a").unwrap().is_none());

        store.put("b", &JobStatus::queued("Job received and queued")).unwrap();
        store.put("a", &JobStatus::running("Loading model")).unwrap();
        store.put("a", &JobStatus::running("Running depth inference")).unwrap();

        let a = store.get("a").unwrap().unwrap();
        assert_eq!(a.state, JobState::Running);
        assert_eq!(a.detail, "Running depth inference");

        let ids: Vec<_> = store.list().unwrap().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, ["a", "b"]);

        // Guarded writes only land on the record they were based on.
        let done = JobStatus::success("Done in 1.00s", "/tmp/a.stl");
        assert!(!store.compare_and_put("a", None, &done).unwrap());
        assert!(store.compare_and_put("a", Some(&a), &done).unwrap());
        assert!(!store
            .compare_and_put("a", Some(&a), &JobStatus::failure("late"))
            .unwrap());
        assert_eq!(store.get("a").unwrap().unwrap(), done);

        let first = JobStatus::queued("Job received and queued");
        assert!(store.compare_and_put("c", None, &first).unwrap());
        assert!(!store.compare_and_put("c", None, &first).unwrap());
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemoryStatusStore::new());
    }

    #[test]
    fn test_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStatusStore::open(dir.path().join("status")).unwrap();
        exercise(&store);

        // Only finished records remain on disk.
        let leftovers = fs::read_dir(store.dir())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .path()
                    .to_string_lossy()
                    .ends_with(".tmp")
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_file_store_is_shared_between_handles() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FileStatusStore::open(dir.path()).unwrap();
        let reader = FileStatusStore::open(dir.path()).unwrap();

        writer.put("job", &JobStatus::failure("boom")).unwrap();
        assert_eq!(reader.get("job").unwrap().unwrap().detail, "boom");
    }

    #[test]
    fn test_file_store_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStatusStore::open(dir.path()).unwrap();
        assert!(store.get("../escape").is_err());
        assert!(store.put("", &JobStatus::queued("x")).is_err());
    }

    #[test]
    fn test_file_store_reports_corrupt_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStatusStore::open(dir.path()).unwrap();
        fs::write(dir.path().join("bad.json"), "{").unwrap();
        assert!(matches!(store.get("bad"), Err(JobError::Store(_))));
    }
}
