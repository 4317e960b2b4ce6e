//! Error types for the job pipeline.

use thiserror::Error;

use crate::state::JobState;

/// Errors raised while submitting, running, or tracking a job.
///
/// The `Display` text of a pipeline error is what ends up in a failed job's
/// `detail` field.
#[derive(Debug, Error)]
pub enum JobError {
    /// The upload could not be accepted or saved.
    #[error("upload rejected: {0}")]
    Upload(String),

    /// The job could not be placed on the queue.
    #[error("{0}")]
    Enqueue(String),

    /// The input image could not be read or decoded.
    #[error("failed to read image: {0}")]
    Decode(String),

    /// Loading or running the depth model failed.
    #[error("depth inference failed: {0}")]
    Inference(#[from] ml_depth::ModelError),

    /// Nothing survived point cloud cleanup.
    #[error("empty point cloud after cleanup")]
    EmptyCloud,

    /// Reconstruction or finalization left no triangles.
    #[error("reconstruction produced empty mesh")]
    EmptyMesh,

    /// Surface reconstruction failed.
    #[error("reconstruction failed: {0}")]
    Reconstruction(String),

    /// Writing the STL failed.
    #[error("failed to export STL: {0}")]
    Export(#[from] mesh_io::IoError),

    /// A pipeline stage panicked.
    #[error("pipeline panicked: {0}")]
    Panic(String),

    /// Reading or writing the status store failed.
    #[error("status store error: {0}")]
    Store(String),

    /// A status write would move a job backwards or out of a terminal state.
    #[error("invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        /// Job whose record was left unchanged.
        job_id: String,
        /// Stored state.
        from: JobState,
        /// Rejected state.
        to: JobState,
    },

    /// Configuration is missing or out of range.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl JobError {
    /// Creates a store error.
    #[must_use]
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<mesh_scan::ScanError> for JobError {
    fn from(err: mesh_scan::ScanError) -> Self {
        match err {
            mesh_scan::ScanError::EmptyPointCloud => Self::EmptyCloud,
            mesh_scan::ScanError::EmptyMesh => Self::EmptyMesh,
            other => Self::Reconstruction(other.to_string()),
        }
    }
}

impl From<mesh_repair::RepairError> for JobError {
    fn from(err: mesh_repair::RepairError) -> Self {
        match err {
            mesh_repair::RepairError::EmptyMesh => Self::EmptyMesh,
            other => Self::Reconstruction(other.to_string()),
        }
    }
}

/// Result type alias for job operations.
pub type JobResult<T> = std::result::Result<T, JobError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_messages() {
        assert_eq!(
            JobError::EmptyCloud.to_string(),
            "empty point cloud after cleanup"
        );
        assert_eq!(
            JobError::EmptyMesh.to_string(),
            "reconstruction produced empty mesh"
        );
        assert!(
            JobError::Decode("bad header".into())
                .to_string()
                .starts_with("failed to read image: ")
        );
        assert_eq!(
            JobError::Panic("attempt to divide by zero".into()).to_string(),
            "pipeline panicked: attempt to divide by zero"
        );
    }

    #[test]
    fn test_stage_errors_map_to_pipeline_errors() {
        assert!(matches!(
            JobError::from(mesh_scan::ScanError::EmptyPointCloud),
            JobError::EmptyCloud
        ));
        assert!(matches!(
            JobError::from(mesh_repair::RepairError::EmptyMesh),
            JobError::EmptyMesh
        ));
        assert!(matches!(
            JobError::from(mesh_scan::ScanError::ReconstructionFailed {
                reason: "diverged".into()
            }),
            JobError::Reconstruction(_)
        ));
    }

    #[test]
    fn test_transition_message() {
        let err = JobError::InvalidTransition {
            job_id: "abc".into(),
            from: JobState::Success,
            to: JobState::Running,
        };
        assert_eq!(
            err.to_string(),
            "invalid transition for job abc: SUCCESS -> RUNNING"
        );
    }
}
