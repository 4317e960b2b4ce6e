//! Job lifecycle for photo-to-STL reconstruction.
//!
//! A job is submitted with an image, queued, picked up by a worker and run
//! through the pipeline by a [`JobController`]:
//!
//! ```text
//! image → depth → normalize → point cloud → outliers → normals → Poisson → finalize → STL
//! ```
//!
//! Every step is written to a [`StatusStore`] as a [`JobStatus`], which
//! clients poll. States only move forward:
//! `QUEUED → RUNNING → {SUCCESS, FAILURE}`.
//!
//! # Pieces
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`state`] | `JobState` transitions and the status record |
//! | [`store`] | In-memory and file-backed status stores |
//! | [`recorder`] | Guarded status writes, stale job sweep |
//! | [`queue`] | Job requests and the channel queue |
//! | [`worker`] | Worker thread pool |
//! | [`controller`] | The per-job pipeline |
//! | [`boundary`] | Upload, status and download handlers |
//! | [`config`] | Environment-driven configuration |
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use cf_jobs::{
//!     JobController, JobRecorder, JobRequest, MemoryStatusStore, PipelineConfig, StatusStore,
//! };
//! use ml_depth::{BackendType, InferenceContext};
//!
//! let store: Arc<dyn StatusStore> = Arc::new(MemoryStatusStore::new());
//! let inference = Arc::new(InferenceContext::from_config(None, BackendType::Cpu));
//! let controller = JobController::new(inference, Arc::clone(&store), PipelineConfig::default());
//!
//! let request = JobRequest {
//!     image_path: "photo.png".into(),
//!     output_dir: "results".into(),
//!     job_id: "job-1".into(),
//! };
//! let outcome = controller.run(&request).unwrap();
//! println!("{outcome}");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_const_for_fn)]

pub mod boundary;
pub mod config;
pub mod controller;
pub mod error;
pub mod queue;
pub mod recorder;
pub mod state;
pub mod store;
pub mod worker;

pub use boundary::{
    Download, DownloadError, STL_MEDIA_TYPE, StatusResponse, SubmitContext, SubmitError,
    SubmitReceipt, Submission, download_result, job_status, submit_job,
};
pub use config::{EnvSource, PipelineConfig, ProcessEnv, ServiceConfig};
pub use controller::{DEFAULT_HEARTBEAT_INTERVAL, JobController, JobOutcome};
pub use error::{JobError, JobResult};
pub use queue::{ChannelQueue, JobQueue, JobRequest, WorkerMessage};
pub use recorder::{HEARTBEAT_LOST, JobRecorder, sweep_stale};
pub use state::{JobState, JobStatus};
pub use store::{FileStatusStore, MemoryStatusStore, StatusStore};
pub use worker::WorkerPool;
