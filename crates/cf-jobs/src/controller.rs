//! Runs one job from uploaded image to STL, recording every step.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use mesh_io::export_stl;
use mesh_repair::{FinalizeParams, check_indices, finalize_mesh, validate_mesh};
use mesh_scan::{
    NormalEstimationParams, OrthographicParams, OutlierParams, PointCloud, PoissonParams,
    reconstruct_poisson, try_estimate_normals, try_remove_outliers,
};
use ml_depth::InferenceContext;
use sensor_types::{load_image, normalize_depth};
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::error::{JobError, JobResult};
use crate::queue::JobRequest;
use crate::recorder::JobRecorder;
use crate::state::JobStatus;
use crate::store::StatusStore;

/// How often a running job refreshes its status record by default.
///
/// A stale-job sweep must use a longer `max_age` than this.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Summary of a successful job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    /// Job identifier.
    pub job_id: String,
    /// Absolute path of the STL.
    pub stl_path: PathBuf,
    /// Points left after cleanup.
    pub points: usize,
    /// Vertices in the exported mesh.
    pub vertices: usize,
    /// Triangles in the exported mesh.
    pub faces: usize,
    /// Grid depth the reconstruction actually used.
    pub grid_depth: u32,
    /// Wall-clock seconds from start to export.
    pub elapsed_secs: f64,
    /// Recoverable stage problems, in pipeline order.
    pub warnings: Vec<String>,
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Job {}: {} vertices, {} triangles in {:.2}s -> {}",
            self.job_id,
            self.vertices,
            self.faces,
            self.elapsed_secs,
            self.stl_path.display()
        )
    }
}

/// Drives the reconstruction stages for a job and owns its status writes.
///
/// The model is loaded on first use through the shared
/// [`InferenceContext`]. Outlier removal and normal estimation degrade to
/// warnings; any other stage failure marks the job `FAILURE` and is returned.
/// A panic inside a stage is caught and recorded the same way.
///
/// While a job runs, a heartbeat thread refreshes its `RUNNING` record every
/// [`heartbeat_interval`](Self::with_heartbeat_interval).
#[derive(Debug, Clone)]
pub struct JobController {
    inference: Arc<InferenceContext>,
    recorder: JobRecorder,
    pipeline: PipelineConfig,
    heartbeat_interval: Duration,
}

impl JobController {
    /// Controller writing status to `store`.
    #[must_use]
    pub fn new(
        inference: Arc<InferenceContext>,
        store: Arc<dyn StatusStore>,
        pipeline: PipelineConfig,
    ) -> Self {
        Self {
            inference,
            recorder: JobRecorder::new(store),
            pipeline,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    /// Sets how often a running job's record is refreshed.
    #[must_use]
    pub const fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// The recorder used for status writes.
    #[must_use]
    pub const fn recorder(&self) -> &JobRecorder {
        &self.recorder
    }

    /// Reconstruction settings.
    #[must_use]
    pub const fn pipeline(&self) -> &PipelineConfig {
        &self.pipeline
    }

    /// Process `request` to completion.
    ///
    /// On success the job is `SUCCESS` with `Done in {secs}s` and the STL
    /// path. On failure it is `FAILURE` with the error text.
    ///
    /// # Errors
    ///
    /// Returns the first fatal stage error, or [`JobError::Panic`] if a stage
    /// panicked.
    pub fn run(&self, request: &JobRequest) -> JobResult<JobOutcome> {
        let job_id = request.job_id.as_str();
        let start = Instant::now();
        info!(job_id, image = %request.image_path.display(), "Job started");

        let result = thread::scope(|scope| {
            let (stop, stopped) = mpsc::channel::<()>();
            let spawned = thread::Builder::new()
                .name(format!("heartbeat-{job_id}"))
                .spawn_scoped(scope, move || self.keep_alive(job_id, &stopped));
            if let Err(e) = spawned {
                warn!(job_id, error = %e, "Could not start heartbeat thread");
            }
            let result = catch_unwind(AssertUnwindSafe(|| self.execute(request, start)));
            drop(stop);
            result
        });

        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => return Err(self.fail(job_id, e)),
            Err(payload) => {
                let e = JobError::Panic(panic_message(&*payload));
                return Err(self.fail(job_id, e));
            }
        };

        self.recorder.transition(
            job_id,
            JobStatus::success(
                format!("Done in {:.2}s", outcome.elapsed_secs),
                outcome.stl_path.display().to_string(),
            ),
        )?;
        info!(
            job_id,
            total_secs = outcome.elapsed_secs,
            stl = %outcome.stl_path.display(),
            "Job succeeded"
        );
        Ok(outcome)
    }

    fn fail(&self, job_id: &str, e: JobError) -> JobError {
        error!(job_id, error = %e, "Job failed");
        if let Err(write_err) = self
            .recorder
            .transition(job_id, JobStatus::failure(e.to_string()))
        {
            error!(job_id, error = %write_err, "Could not record failure");
        }
        e
    }

    /// Refresh the job's record until `stopped` disconnects.
    fn keep_alive(&self, job_id: &str, stopped: &Receiver<()>) {
        while let Err(RecvTimeoutError::Timeout) = stopped.recv_timeout(self.heartbeat_interval)
        {
            match self.recorder.heartbeat(job_id) {
                Ok(refreshed) => debug!(job_id, refreshed, "Heartbeat"),
                Err(e) => warn!(job_id, error = %e, "Heartbeat write failed"),
            }
        }
    }

    fn execute(&self, request: &JobRequest, start: Instant) -> JobResult<JobOutcome> {
        let job_id = request.job_id.as_str();
        let cfg = &self.pipeline;
        let mut warnings = Vec::new();

        self.recorder.running(job_id, "Loading model")?;
        let model = self.inference.get_or_load()?;
        info!(job_id, model = model.name(), "Model ready");

        let image = load_image(&request.image_path)
            .map_err(|e| JobError::Decode(e.to_string()))?
            .limit_longest_side(cfg.inference_resize_limit);

        self.recorder.running(job_id, "Running depth inference")?;
        let depth = model.estimate(&image)?;
        let color = image.resize_to(depth.width(), depth.height());
        let normalized = normalize_depth(&depth);
        debug!(
            job_id,
            width = depth.width(),
            height = depth.height(),
            "Depth inferred"
        );

        self.recorder
            .running(job_id, "Building orthographic point cloud")?;
        let ortho = OrthographicParams::new().with_scale_factor(cfg.ortho_scale_factor);
        let cloud = PointCloud::from_orthographic_depth(&normalized, &color, &ortho)?;
        debug!(job_id, points = cloud.len(), "Point cloud built");

        let outliers = OutlierParams::new()
            .with_k_neighbors(cfg.outlier_neighbors)
            .with_std_multiplier(cfg.outlier_std_ratio);
        let cleaned = try_remove_outliers(cloud, &outliers);
        warnings.extend(cleaned.warning);

        let normals = NormalEstimationParams::new().with_k_neighbors(cfg.normal_neighbors);
        let oriented = try_estimate_normals(cleaned.cloud, &normals);
        warnings.extend(oriented.warning);
        let cloud = oriented.cloud;

        info!(job_id, points = cloud.len(), "Point cloud size after cleanup");
        if cloud.is_empty() {
            return Err(JobError::EmptyCloud);
        }

        self.recorder.running(
            job_id,
            format!("Poisson reconstruction depth={}", cfg.octree_depth),
        )?;
        let poisson = PoissonParams::new()
            .with_depth(cfg.octree_depth)
            .with_max_grid_depth(cfg.max_grid_depth);
        let reconstruction = reconstruct_poisson(&cloud, &poisson)?;
        let grid_depth = reconstruction.grid_depth;
        let mut mesh = reconstruction.mesh;
        info!(
            job_id,
            vertices = mesh.vertex_count(),
            triangles = mesh.face_count(),
            "Mesh stats"
        );
        if mesh.face_count() == 0 {
            return Err(JobError::EmptyMesh);
        }
        let summary = finalize_mesh(&mut mesh, &FinalizeParams::default())?;
        debug!(
            job_id,
            welded = summary.vertices_welded,
            degenerate = summary.degenerate_removed,
            duplicates = summary.duplicates_removed,
            unreferenced = summary.unreferenced_removed,
            vertex_normals = summary.vertex_normals,
            "Mesh finalized"
        );
        check_indices(&mesh)?;
        let report = validate_mesh(&mesh);
        debug!(
            job_id,
            boundary_edges = report.boundary_edge_count,
            non_manifold_edges = report.non_manifold_edge_count,
            degenerate_faces = report.degenerate_face_count,
            "Mesh validated"
        );

        self.recorder.running(job_id, "Exporting STL")?;
        let export = export_stl(&mesh, &request.output_dir, &cfg.result_prefix, job_id)?;

        Ok(JobOutcome {
            job_id: job_id.to_string(),
            stl_path: export.path,
            points: cloud.len(),
            vertices: export.vertex_count,
            faces: export.face_count,
            grid_depth,
            elapsed_secs: start.elapsed().as_secs_f64(),
            warnings,
        })
    }
}

/// Text of a panic payload, which is a `&str` or `String` for `panic!`.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_reads_common_payloads() {
        let from_str: Box<dyn Any + Send> = Box::new("index out of bounds");
        assert_eq!(panic_message(&*from_str), "index out of bounds");

        let from_string: Box<dyn Any + Send> = Box::new(format!("bad depth {}", 3));
        assert_eq!(panic_message(&*from_string), "bad depth 3");

        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(&*other), "unknown panic payload");
    }
}
