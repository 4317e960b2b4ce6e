//! Upload, status and download handlers.
//!
//! These are transport-agnostic: each returns either a value or an error that
//! carries the HTTP status code a web layer should send.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::JobError;
use crate::queue::{JobQueue, JobRequest};
use crate::recorder::JobRecorder;
use crate::state::{JobState, JobStatus};
use crate::store::StatusStore;

/// Media type of a downloaded STL.
pub const STL_MEDIA_TYPE: &str = "application/sla";

/// An uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Client-supplied file name. Only its final component is used.
    pub file_name: String,
    /// Declared MIME type. Must start with `image/`.
    pub content_type: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

/// Where submissions are saved and sent.
pub struct SubmitContext<'a> {
    /// Status records.
    pub recorder: &'a JobRecorder,
    /// Work queue.
    pub queue: &'a dyn JobQueue,
    /// Directory for saved uploads.
    pub upload_dir: &'a Path,
    /// Directory results are written to.
    pub result_dir: &'a Path,
}

/// Reply to an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitReceipt {
    /// Identifier to poll with.
    pub job_id: String,
    /// Where the upload was saved.
    #[serde(skip)]
    pub image_path: PathBuf,
}

/// Why a submission was refused.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The declared content type is not an image.
    #[error("File must be an image")]
    NotAnImage {
        /// The rejected content type.
        content_type: String,
    },

    /// The upload could not be written to disk.
    #[error("Failed to save upload: {0}")]
    Save(#[source] std::io::Error),

    /// The job was recorded but could not be queued.
    #[error("Failed to enqueue task: {0}")]
    Enqueue(#[source] JobError),

    /// The status store failed.
    #[error(transparent)]
    Store(JobError),
}

impl SubmitError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotAnImage { .. } => 400,
            Self::Save(_) | Self::Enqueue(_) | Self::Store(_) => 500,
        }
    }
}

/// Save an upload, record it as `QUEUED` and queue it.
///
/// If queueing fails the job is recorded as `FAILURE` before the error is
/// returned.
///
/// # Errors
///
/// See [`SubmitError`].
pub fn submit_job(
    submission: &Submission,
    ctx: &SubmitContext<'_>,
) -> Result<SubmitReceipt, SubmitError> {
    if !submission.content_type.starts_with("image/") {
        return Err(SubmitError::NotAnImage {
            content_type: submission.content_type.clone(),
        });
    }

    let job_id = Uuid::new_v4().to_string();
    let safe_name = safe_file_name(&submission.file_name);
    let image_path = ctx.upload_dir.join(format!("{job_id}_{safe_name}"));

    fs::create_dir_all(ctx.upload_dir)
        .and_then(|()| fs::write(&image_path, &submission.bytes))
        .map_err(SubmitError::Save)?;

    ctx.recorder
        .transition(&job_id, JobStatus::queued("Job received and queued"))
        .map_err(SubmitError::Store)?;

    let request = JobRequest {
        image_path: image_path.clone(),
        output_dir: ctx.result_dir.to_path_buf(),
        job_id: job_id.clone(),
    };
    if let Err(e) = ctx.queue.enqueue(request) {
        let err = SubmitError::Enqueue(e);
        error!(job_id = %job_id, error = %err, "Enqueue failed");
        ctx.recorder
            .transition(&job_id, JobStatus::failure(err.to_string()))
            .map_err(SubmitError::Store)?;
        return Err(err);
    }

    info!(job_id = %job_id, bytes = submission.bytes.len(), "Job submitted");
    Ok(SubmitReceipt { job_id, image_path })
}

/// Final path component of a client file name.
fn safe_file_name(name: &str) -> &str {
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default();
    match last {
        "" | "." | ".." => "upload",
        other => other,
    }
}

/// A status query result.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusResponse {
    /// HTTP status.
    pub code: u16,
    /// JSON body.
    pub body: Value,
}

/// Look up a job's status.
///
/// Unknown ids get a 404 with `{"state": "UNKNOWN", "detail": "No such job_id"}`.
///
/// # Errors
///
/// Returns a store error if the lookup itself fails.
pub fn job_status(store: &dyn StatusStore, job_id: &str) -> Result<StatusResponse, JobError> {
    match store.get(job_id)? {
        Some(status) => Ok(StatusResponse {
            code: 200,
            body: serde_json::to_value(&status).map_err(|e| JobError::store(e.to_string()))?,
        }),
        None => Ok(StatusResponse {
            code: 404,
            body: json!({"state": "UNKNOWN", "detail": "No such job_id"}),
        }),
    }
}

/// A finished result ready to stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    /// STL on disk.
    pub path: PathBuf,
    /// File name to present.
    pub file_name: String,
    /// Always [`STL_MEDIA_TYPE`].
    pub media_type: &'static str,
}

/// Why a result cannot be downloaded.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// No record for the id.
    #[error("No such job")]
    NoSuchJob,

    /// The job has not succeeded.
    #[error("Result not ready")]
    NotReady,

    /// The job succeeded but its file is gone.
    #[error("Result file missing")]
    FileMissing,

    /// The status store failed.
    #[error(transparent)]
    Store(#[from] JobError),
}

impl DownloadError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NoSuchJob | Self::NotReady | Self::FileMissing => 404,
            Self::Store(_) => 500,
        }
    }
}

/// Resolve the STL for a finished job.
///
/// # Errors
///
/// See [`DownloadError`].
pub fn download_result(store: &dyn StatusStore, job_id: &str) -> Result<Download, DownloadError> {
    let status = store.get(job_id)?.ok_or(DownloadError::NoSuchJob)?;
    if status.state != JobState::Success {
        return Err(DownloadError::NotReady);
    }
    if status.result.is_empty() {
        return Err(DownloadError::FileMissing);
    }

    let path = PathBuf::from(&status.result);
    if !path.is_file() {
        return Err(DownloadError::FileMissing);
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Download {
        path,
        file_name,
        media_type: STL_MEDIA_TYPE,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_names() {
        assert_eq!(safe_file_name("photo.png"), "photo.png");
        assert_eq!(safe_file_name("../../etc/passwd"), "passwd");
        assert_eq!(safe_file_name("C:\\Users\\me\\cat.jpg"), "cat.jpg");
        assert_eq!(safe_file_name("dir/"), "upload");
        assert_eq!(safe_file_name(".."), "upload");
    }

    #[test]
    fn test_error_codes() {
        let err = SubmitError::NotAnImage {
            content_type: "text/plain".into(),
        };
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_string(), "File must be an image");

        let err = SubmitError::Enqueue(JobError::Enqueue("broker down".into()));
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.to_string(), "Failed to enqueue task: broker down");

        assert_eq!(DownloadError::NotReady.status_code(), 404);
        assert_eq!(DownloadError::NoSuchJob.to_string(), "No such job");
    }
}
