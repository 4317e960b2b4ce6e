//! Error types for scan processing operations.

use std::fmt;

/// Result type for scan processing operations.
pub type ScanResult<T> = Result<T, ScanError>;

/// Errors that can occur during point cloud processing and reconstruction.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanError {
    /// Point cloud is empty.
    EmptyPointCloud,

    /// Not enough points for the requested operation.
    InsufficientPoints {
        /// Minimum number of points required.
        required: usize,
        /// Actual number of points provided.
        actual: usize,
    },

    /// Invalid parameter value.
    InvalidParameter {
        /// Description of why the parameter is invalid.
        reason: String,
    },

    /// Normal estimation failed, or normals required by an operation are missing.
    NormalEstimationFailed {
        /// Description of why normal estimation failed.
        reason: String,
    },

    /// Surface reconstruction failed.
    ReconstructionFailed {
        /// Description of why reconstruction failed.
        reason: String,
    },

    /// Reconstruction produced no triangles.
    EmptyMesh,
}

impl ScanError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPointCloud => write!(f, "point cloud is empty"),
            Self::InsufficientPoints { required, actual } => {
                write!(
                    f,
                    "insufficient points: need at least {required}, got {actual}"
                )
            }
            Self::InvalidParameter { reason } => write!(f, "invalid parameter: {reason}"),
            Self::NormalEstimationFailed { reason } => {
                write!(f, "normal estimation failed: {reason}")
            }
            Self::ReconstructionFailed { reason } => write!(f, "reconstruction failed: {reason}"),
            Self::EmptyMesh => write!(f, "mesh is empty"),
        }
    }
}

impl std::error::Error for ScanError {}
