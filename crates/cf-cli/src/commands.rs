//! Subcommand implementations.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use cf_jobs::{
    ChannelQueue, FileStatusStore, JobController, JobRequest, JobState, JobStatus,
    PipelineConfig, ProcessEnv, ServiceConfig, StatusStore, SubmitContext, Submission,
    WorkerPool, job_status, submit_job, sweep_stale,
};
use ml_depth::{BackendType, InferenceContext};
use serde_json::json;
use tracing::{error, info};

/// Configuration shared by every subcommand.
pub struct Settings {
    pipeline: PipelineConfig,
    service: ServiceConfig,
}

impl Settings {
    /// Read and validate configuration from the environment.
    pub fn load() -> Result<Self> {
        let pipeline = PipelineConfig::from_env(&ProcessEnv)?;
        let service = ServiceConfig::from_env(&ProcessEnv)?;
        pipeline.validate()?;
        service.validate()?;
        Ok(Self { pipeline, service })
    }

    fn store(&self) -> Result<Arc<FileStatusStore>> {
        let store = FileStatusStore::open(&self.service.status_dir)
            .with_context(|| format!("opening status store {}", self.service.status_dir.display()))?;
        Ok(Arc::new(store))
    }

    fn controller(&self, store: Arc<dyn StatusStore>) -> JobController {
        let inference = InferenceContext::from_config(
            self.service.depth_checkpoint.clone(),
            BackendType::from_use_gpu(self.service.use_gpu),
        );
        JobController::new(Arc::new(inference), store, self.pipeline.clone())
    }
}

pub fn process(
    mut settings: Settings,
    image: &Path,
    output_dir: Option<PathBuf>,
    job_id: Option<String>,
    depth: Option<u32>,
    json: bool,
) -> Result<ExitCode> {
    if let Some(depth) = depth {
        settings.pipeline = settings.pipeline.with_octree_depth(depth);
        settings.pipeline.validate()?;
    }

    let store = settings.store()?;
    let controller = settings.controller(store);
    let job_id = job_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    controller
        .recorder()
        .transition(&job_id, JobStatus::queued("Job received and queued"))?;
    let request = JobRequest {
        image_path: image.to_path_buf(),
        output_dir: output_dir.unwrap_or_else(|| settings.service.result_dir.clone()),
        job_id: job_id.clone(),
    };

    let outcome = controller
        .run(&request)
        .with_context(|| format!("job {job_id} failed"))?;

    if json {
        let report = json!({
            "job_id": outcome.job_id,
            "stl": outcome.stl_path,
            "points": outcome.points,
            "vertices": outcome.vertices,
            "triangles": outcome.faces,
            "grid_depth": outcome.grid_depth,
            "elapsed_secs": outcome.elapsed_secs,
            "warnings": outcome.warnings,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{outcome}");
        for warning in &outcome.warnings {
            println!("  warning: {warning}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

pub fn submit(settings: Settings, images: &[PathBuf], json: bool) -> Result<ExitCode> {
    let store = settings.store()?;
    let controller = Arc::new(settings.controller(Arc::clone(&store) as Arc<dyn StatusStore>));
    let recorder = controller.recorder().clone();

    let queue = ChannelQueue::new();
    let mut pool = WorkerPool::spawn(settings.service.workers, &queue, controller)?;

    let ctx = SubmitContext {
        recorder: &recorder,
        queue: &queue,
        upload_dir: &settings.service.upload_dir,
        result_dir: &settings.service.result_dir,
    };

    let mut job_ids = Vec::with_capacity(images.len());
    let mut rejected = 0;
    for image in images {
        let submission = read_submission(image)?;
        match submit_job(&submission, &ctx) {
            Ok(receipt) => {
                info!(job_id = %receipt.job_id, image = %image.display(), "Queued");
                job_ids.push(receipt.job_id);
            }
            Err(e) => {
                error!(image = %image.display(), code = e.status_code(), error = %e, "Submission rejected");
                rejected += 1;
            }
        }
    }

    pool.shutdown();

    let mut failed = rejected;
    let mut reports = Vec::with_capacity(job_ids.len());
    for job_id in &job_ids {
        let status = store
            .get(job_id)?
            .with_context(|| format!("job {job_id} has no status record"))?;
        if status.state != JobState::Success {
            failed += 1;
        }
        if json {
            reports.push(json!({ "job_id": job_id, "status": status }));
        } else {
            print_status_line(job_id, &status);
        }
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }

    if failed > 0 {
        bail!("{failed} of {} submission(s) did not succeed", images.len());
    }
    Ok(ExitCode::SUCCESS)
}

pub fn status(settings: &Settings, job_id: &str) -> Result<ExitCode> {
    let store = settings.store()?;
    let response = job_status(store.as_ref(), job_id)?;
    println!("{}", serde_json::to_string_pretty(&response.body)?);
    Ok(if response.code == 200 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

pub fn sweep(settings: &Settings, max_age_secs: u64, json: bool) -> Result<ExitCode> {
    let heartbeat = cf_jobs::DEFAULT_HEARTBEAT_INTERVAL.as_secs();
    if max_age_secs <= heartbeat {
        bail!("--max-age-secs must exceed the {heartbeat}s job heartbeat interval");
    }
    let store = settings.store()?;
    let max_age = chrono::Duration::seconds(
        i64::try_from(max_age_secs).context("--max-age-secs is too large")?,
    );
    let swept = sweep_stale(store.as_ref(), max_age)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&json!({ "swept": swept }))?);
    } else if swept.is_empty() {
        println!("No stale jobs");
    } else {
        for job_id in &swept {
            println!("{job_id}  FAILURE  {}", cf_jobs::HEARTBEAT_LOST);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn read_submission(path: &Path) -> Result<Submission> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Submission {
        file_name,
        content_type: content_type_for(path).to_string(),
        bytes,
    })
}

fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

fn print_status_line(job_id: &str, status: &JobStatus) {
    if status.result.is_empty() {
        println!("{job_id}  {}  {}", status.state, status.detail);
    } else {
        println!(
            "{job_id}  {}  {}  {}",
            status.state, status.detail, status.result
        );
    }
}
