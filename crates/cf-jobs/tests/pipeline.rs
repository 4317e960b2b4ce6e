//! End-to-end job runs through the controller, workers and handlers.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cf_jobs::{
    ChannelQueue, DownloadError, JobController, JobError, JobQueue, JobRecorder, JobRequest,
    JobResult, JobState, JobStatus, MemoryStatusStore, PipelineConfig, STL_MEDIA_TYPE,
    StatusStore, SubmitContext, SubmitError, Submission, WorkerPool, download_result, job_status,
    submit_job,
};
use mesh_io::load_stl;
use ml_depth::{DepthEstimator, InferenceContext};
use sensor_types::{ColorImage, DepthMap};

/// Depth model returning a centered Gaussian bump at the image resolution.
#[derive(Debug)]
struct BumpEstimator;

impl DepthEstimator for BumpEstimator {
    fn name(&self) -> &str {
        "bump"
    }

    fn estimate(&self, image: &ColorImage) -> ml_depth::Result<DepthMap> {
        let (w, h) = image.dimensions();
        let cx = f64::from(w - 1) / 2.0;
        let cy = f64::from(h - 1) / 2.0;
        let sigma2 = (f64::from(w.min(h)) / 4.0).powi(2);
        let mut depths = Vec::with_capacity((w * h) as usize);
        for row in 0..h {
            for col in 0..w {
                let dx = f64::from(col) - cx;
                let dy = f64::from(row) - cy;
                depths.push((0.5 + 3.0 * (-(dx * dx + dy * dy) / (2.0 * sigma2)).exp()) as f32);
            }
        }
        DepthMap::new(w, h, depths).map_err(|e| ml_depth::ModelError::Inference(e.to_string()))
    }
}

/// Depth model that sees nothing.
#[derive(Debug)]
struct FlatZeroEstimator;

impl DepthEstimator for FlatZeroEstimator {
    fn name(&self) -> &str {
        "zero"
    }

    fn estimate(&self, image: &ColorImage) -> ml_depth::Result<DepthMap> {
        let (w, h) = image.dimensions();
        Ok(DepthMap::zeros(w, h))
    }
}

/// Depth model that panics on images narrower than 16 pixels.
#[derive(Debug)]
struct PanicsOnSmallImages;

impl DepthEstimator for PanicsOnSmallImages {
    fn name(&self) -> &str {
        "fragile"
    }

    fn estimate(&self, image: &ColorImage) -> ml_depth::Result<DepthMap> {
        let (w, _) = image.dimensions();
        assert!(w >= 16, "image too small for the model: {w}px");
        BumpEstimator.estimate(image)
    }
}

/// Bump model that takes a while.
#[derive(Debug)]
struct SlowEstimator(Duration);

impl DepthEstimator for SlowEstimator {
    fn name(&self) -> &str {
        "slow"
    }

    fn estimate(&self, image: &ColorImage) -> ml_depth::Result<DepthMap> {
        std::thread::sleep(self.0);
        BumpEstimator.estimate(image)
    }
}

/// Store that remembers every write in order.
#[derive(Default)]
struct RecordingStore {
    inner: MemoryStatusStore,
    writes: Mutex<Vec<(String, JobStatus)>>,
}

impl RecordingStore {
    fn history(&self, job_id: &str) -> Vec<JobStatus> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == job_id)
            .map(|(_, s)| s.clone())
            .collect()
    }
}

impl StatusStore for RecordingStore {
    fn get(&self, job_id: &str) -> JobResult<Option<JobStatus>> {
        self.inner.get(job_id)
    }

    fn put(&self, job_id: &str, status: &JobStatus) -> JobResult<()> {
        self.writes
            .lock()
            .unwrap()
            .push((job_id.to_string(), status.clone()));
        self.inner.put(job_id, status)
    }

    fn compare_and_put(
        &self,
        job_id: &str,
        expected: Option<&JobStatus>,
        status: &JobStatus,
    ) -> JobResult<bool> {
        let mut writes = self.writes.lock().unwrap();
        let written = self.inner.compare_and_put(job_id, expected, status)?;
        if written {
            writes.push((job_id.to_string(), status.clone()));
        }
        Ok(written)
    }

    fn list(&self) -> JobResult<Vec<(String, JobStatus)>> {
        self.inner.list()
    }
}

/// Queue that is always down.
struct BrokenQueue;

impl JobQueue for BrokenQueue {
    fn enqueue(&self, _request: JobRequest) -> JobResult<()> {
        Err(JobError::Enqueue("broker unreachable".into()))
    }
}

fn write_photo(dir: &Path, name: &str, size: u32) -> PathBuf {
    let path = dir.join(name);
    image::RgbImage::from_pixel(size, size, image::Rgb([180, 160, 140]))
        .save(&path)
        .unwrap();
    path
}

fn png_bytes(size: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    image::RgbImage::from_pixel(size, size, image::Rgb([90, 90, 90]))
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

/// Pipeline at a shallow depth so the tests stay quick.
fn quick_pipeline() -> PipelineConfig {
    PipelineConfig::default().with_octree_depth(6)
}

fn controller_with(model: Arc<dyn DepthEstimator>, store: Arc<dyn StatusStore>) -> JobController {
    JobController::new(
        Arc::new(InferenceContext::with_model(model)),
        store,
        quick_pipeline(),
    )
}

fn request(image_path: PathBuf, output_dir: &Path, job_id: &str) -> JobRequest {
    JobRequest {
        image_path,
        output_dir: output_dir.to_path_buf(),
        job_id: job_id.to_string(),
    }
}

#[test]
fn test_gaussian_bump_job_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let image = write_photo(dir.path(), "bump.png", 64);
    let out = dir.path().join("results");

    // Default settings: depth 9 over a 64x64 pixel grid.
    let store = Arc::new(RecordingStore::default());
    let controller = JobController::new(
        Arc::new(InferenceContext::with_model(Arc::new(BumpEstimator))),
        Arc::clone(&store) as Arc<dyn StatusStore>,
        PipelineConfig::default(),
    );
    let outcome = controller.run(&request(image, &out, "bump-job")).unwrap();

    assert!(outcome.stl_path.is_absolute());
    assert!(outcome.stl_path.ends_with("bump-job.stl"));
    assert!(outcome.faces > 0);
    assert_eq!(outcome.grid_depth, 9);
    assert!(outcome.warnings.is_empty());

    let mesh = load_stl(&outcome.stl_path).unwrap();
    assert_eq!(mesh.face_count(), outcome.faces);
    assert!(mesh.has_valid_indices());

    let details: Vec<_> = store
        .history("bump-job")
        .into_iter()
        .map(|s| (s.state, s.detail))
        .collect();
    // Heartbeats repeat the current step's detail.
    let mut running: Vec<_> = details
        .iter()
        .filter(|(state, _)| *state == JobState::Running)
        .map(|(_, d)| d.as_str())
        .collect();
    running.dedup();
    assert_eq!(
        running,
        [
            "Loading model",
            "Running depth inference",
            "Building orthographic point cloud",
            "Poisson reconstruction depth=9",
            "Exporting STL",
        ]
    );

    let last = store.get("bump-job").unwrap().unwrap();
    assert_eq!(last.state, JobState::Success);
    assert!(last.detail.starts_with("Done in "));
    assert!(last.detail.ends_with('s'));
    assert_eq!(PathBuf::from(&last.result), outcome.stl_path);
}

#[test]
fn test_states_never_move_backwards() {
    let dir = tempfile::tempdir().unwrap();
    let image = write_photo(dir.path(), "small.png", 24);

    let store = Arc::new(RecordingStore::default());
    let recorder = JobRecorder::new(Arc::clone(&store) as Arc<dyn StatusStore>);
    recorder
        .transition("job", JobStatus::queued("Job received and queued"))
        .unwrap();

    let controller = controller_with(
        Arc::new(BumpEstimator),
        Arc::clone(&store) as Arc<dyn StatusStore>,
    );
    controller.run(&request(image, dir.path(), "job")).unwrap();

    let history = store.history("job");
    assert_eq!(history.first().unwrap().state, JobState::Queued);
    for pair in history.windows(2) {
        assert!(
            pair[0].state.can_transition_to(pair[1].state),
            "{} -> {}",
            pair[0].state,
            pair[1].state
        );
    }

    // A finished job cannot be restarted.
    assert!(matches!(
        controller.run(&request(dir.path().join("small.png"), dir.path(), "job")),
        Err(JobError::InvalidTransition { .. })
    ));
    assert_eq!(store.get("job").unwrap().unwrap().state, JobState::Success);
}

#[test]
fn test_repeated_runs_write_identical_files() {
    let dir = tempfile::tempdir().unwrap();
    let image = write_photo(dir.path(), "twice.png", 32);

    let mut paths = Vec::new();
    for run in 0..2 {
        let out = dir.path().join(format!("run{run}"));
        let store: Arc<dyn StatusStore> = Arc::new(MemoryStatusStore::new());
        let controller = controller_with(Arc::new(BumpEstimator), store);
        paths.push(controller.run(&request(image.clone(), &out, "same")).unwrap().stl_path);
    }

    let first = std::fs::read(&paths[0]).unwrap();
    let second = std::fs::read(&paths[1]).unwrap();
    assert!(first.len() > 84);
    assert_eq!(first, second);
}

#[test]
fn test_unreadable_image_fails_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("broken.png");
    std::fs::write(&image, b"definitely not a png").unwrap();
    let out = dir.path().join("results");

    let store: Arc<dyn StatusStore> = Arc::new(MemoryStatusStore::new());
    let controller = controller_with(Arc::new(BumpEstimator), Arc::clone(&store));
    let err = controller.run(&request(image, &out, "broken")).unwrap_err();
    assert!(matches!(err, JobError::Decode(_)));

    let status = store.get("broken").unwrap().unwrap();
    assert_eq!(status.state, JobState::Failure);
    assert!(status.detail.starts_with("failed to read image: "));
    assert!(status.result.is_empty());
    assert!(!out.exists());
}

#[test]
fn test_empty_cloud_fails_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let image = write_photo(dir.path(), "dark.png", 16);
    let out = dir.path().join("results");

    let store: Arc<dyn StatusStore> = Arc::new(MemoryStatusStore::new());
    let controller = controller_with(Arc::new(FlatZeroEstimator), Arc::clone(&store));
    let err = controller.run(&request(image, &out, "empty")).unwrap_err();
    assert!(matches!(err, JobError::EmptyCloud));

    let status = store.get("empty").unwrap().unwrap();
    assert_eq!(status.state, JobState::Failure);
    assert_eq!(status.detail, "empty point cloud after cleanup");
    assert!(!out.exists());
}

#[test]
fn test_submission_handlers() {
    let dir = tempfile::tempdir().unwrap();
    let uploads = dir.path().join("uploads");
    let results = dir.path().join("results");
    let store: Arc<dyn StatusStore> = Arc::new(MemoryStatusStore::new());
    let recorder = JobRecorder::new(Arc::clone(&store));
    let queue = ChannelQueue::new();
    let ctx = SubmitContext {
        recorder: &recorder,
        queue: &queue,
        upload_dir: &uploads,
        result_dir: &results,
    };

    let rejected = submit_job(
        &Submission {
            file_name: "notes.txt".into(),
            content_type: "text/plain".into(),
            bytes: b"hello".to_vec(),
        },
        &ctx,
    )
    .unwrap_err();
    assert_eq!(rejected.status_code(), 400);
    assert!(store.list().unwrap().is_empty());

    let receipt = submit_job(
        &Submission {
            file_name: "../../photo.png".into(),
            content_type: "image/png".into(),
            bytes: png_bytes(8),
        },
        &ctx,
    )
    .unwrap();
    assert_eq!(
        receipt.image_path,
        uploads.join(format!("{}_photo.png", receipt.job_id))
    );
    assert!(receipt.image_path.is_file());

    let status = job_status(store.as_ref(), &receipt.job_id).unwrap();
    assert_eq!(status.code, 200);
    assert_eq!(status.body["state"], "QUEUED");
    assert_eq!(status.body["detail"], "Job received and queued");
    assert_eq!(status.body["result"], "");

    let queued = queue.receiver().lock().unwrap().recv().unwrap();
    assert_eq!(
        queued,
        cf_jobs::WorkerMessage::Run(JobRequest {
            image_path: receipt.image_path.clone(),
            output_dir: results,
            job_id: receipt.job_id.clone(),
        })
    );

    let unknown = job_status(store.as_ref(), "nope").unwrap();
    assert_eq!(unknown.code, 404);
    assert_eq!(
        unknown.body,
        serde_json::json!({"state": "UNKNOWN", "detail": "No such job_id"})
    );

    assert!(matches!(
        download_result(store.as_ref(), "nope"),
        Err(DownloadError::NoSuchJob)
    ));
    let not_ready = download_result(store.as_ref(), &receipt.job_id).unwrap_err();
    assert!(matches!(not_ready, DownloadError::NotReady));
    assert_eq!(not_ready.status_code(), 404);
}

#[test]
fn test_enqueue_failure_is_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn StatusStore> = Arc::new(MemoryStatusStore::new());
    let recorder = JobRecorder::new(Arc::clone(&store));
    let ctx = SubmitContext {
        recorder: &recorder,
        queue: &BrokenQueue,
        upload_dir: dir.path(),
        result_dir: dir.path(),
    };

    let err = submit_job(
        &Submission {
            file_name: "photo.png".into(),
            content_type: "image/png".into(),
            bytes: png_bytes(4),
        },
        &ctx,
    )
    .unwrap_err();
    assert!(matches!(err, SubmitError::Enqueue(_)));
    assert_eq!(err.status_code(), 500);

    let records = store.list().unwrap();
    assert_eq!(records.len(), 1);
    let (_, status) = &records[0];
    assert_eq!(status.state, JobState::Failure);
    assert_eq!(status.detail, "Failed to enqueue task: broker unreachable");
}

#[test]
fn test_worker_pool_drains_submissions_and_loads_model_once() {
    let dir = tempfile::tempdir().unwrap();
    let uploads = dir.path().join("uploads");
    let results = dir.path().join("results");
    let store: Arc<dyn StatusStore> = Arc::new(MemoryStatusStore::new());

    let loads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&loads);
    let inference = Arc::new(InferenceContext::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(BumpEstimator) as Arc<dyn DepthEstimator>)
    }));
    let controller = Arc::new(JobController::new(
        Arc::clone(&inference),
        Arc::clone(&store),
        quick_pipeline(),
    ));

    let queue = ChannelQueue::new();
    let mut pool = WorkerPool::spawn(2, &queue, controller).unwrap();

    let recorder = JobRecorder::new(Arc::clone(&store));
    let ctx = SubmitContext {
        recorder: &recorder,
        queue: &queue,
        upload_dir: &uploads,
        result_dir: &results,
    };
    let ids: Vec<String> = (0..3)
        .map(|i| {
            submit_job(
                &Submission {
                    file_name: format!("photo{i}.png"),
                    content_type: "image/png".into(),
                    bytes: png_bytes(20),
                },
                &ctx,
            )
            .unwrap()
            .job_id
        })
        .collect();

    pool.shutdown();

    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(inference.load_count(), 1);
    for id in &ids {
        let status = store.get(id).unwrap().unwrap();
        assert_eq!(status.state, JobState::Success, "{}", status.detail);

        let download = download_result(store.as_ref(), id).unwrap();
        assert_eq!(download.media_type, STL_MEDIA_TYPE);
        assert_eq!(download.file_name, format!("{id}.stl"));
        assert!(download.path.starts_with(std::path::absolute(&results).unwrap()));
    }

    std::fs::remove_file(results.join(format!("{}.stl", ids[0]))).unwrap();
    assert!(matches!(
        download_result(store.as_ref(), &ids[0]),
        Err(DownloadError::FileMissing)
    ));
}

#[test]
fn test_panicking_model_fails_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let image = write_photo(dir.path(), "tiny.png", 8);
    let out = dir.path().join("results");

    let store: Arc<dyn StatusStore> = Arc::new(MemoryStatusStore::new());
    let controller = controller_with(Arc::new(PanicsOnSmallImages), Arc::clone(&store));
    let err = controller.run(&request(image, &out, "tiny")).unwrap_err();
    assert!(matches!(err, JobError::Panic(_)));

    let status = store.get("tiny").unwrap().unwrap();
    assert_eq!(status.state, JobState::Failure);
    assert_eq!(
        status.detail,
        "pipeline panicked: image too small for the model: 8px"
    );
    assert!(status.result.is_empty());
    assert!(!out.exists());
}

#[test]
fn test_worker_survives_a_panicking_job() {
    let dir = tempfile::tempdir().unwrap();
    let small = write_photo(dir.path(), "small.png", 8);
    let large = write_photo(dir.path(), "large.png", 24);
    let out = dir.path().join("results");

    let store: Arc<dyn StatusStore> = Arc::new(MemoryStatusStore::new());
    let controller = Arc::new(controller_with(
        Arc::new(PanicsOnSmallImages),
        Arc::clone(&store),
    ));
    let queue = ChannelQueue::new();
    let mut pool = WorkerPool::spawn(1, &queue, controller).unwrap();

    queue.enqueue(request(small, &out, "first")).unwrap();
    queue.enqueue(request(large, &out, "second")).unwrap();
    pool.shutdown();

    let first = store.get("first").unwrap().unwrap();
    assert_eq!(first.state, JobState::Failure);
    assert!(first.detail.starts_with("pipeline panicked: "));

    let second = store.get("second").unwrap().unwrap();
    assert_eq!(second.state, JobState::Success, "{}", second.detail);
    assert!(out.join("second.stl").is_file());
}

#[test]
fn test_heartbeat_refreshes_long_stages() {
    let dir = tempfile::tempdir().unwrap();
    let image = write_photo(dir.path(), "slow.png", 16);

    let store = Arc::new(RecordingStore::default());
    let controller = controller_with(
        Arc::new(SlowEstimator(Duration::from_millis(400))),
        Arc::clone(&store) as Arc<dyn StatusStore>,
    )
    .with_heartbeat_interval(Duration::from_millis(20));
    controller
        .run(&request(image, dir.path(), "slow"))
        .unwrap();

    let inference: Vec<_> = store
        .history("slow")
        .into_iter()
        .filter(|s| s.state == JobState::Running && s.detail == "Running depth inference")
        .collect();
    assert!(inference.len() >= 3, "{} writes", inference.len());
    for pair in inference.windows(2) {
        assert!(pair[1].updated_at >= pair[0].updated_at);
    }
    assert_eq!(store.get("slow").unwrap().unwrap().state, JobState::Success);
}
