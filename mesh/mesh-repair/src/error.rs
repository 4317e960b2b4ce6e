//! Error types for mesh repair operations.

use thiserror::Error;

/// Result type for repair operations.
pub type RepairResult<T> = Result<T, RepairError>;

/// Errors that can occur during mesh processing.
#[derive(Debug, Error)]
pub enum RepairError {
    /// No faces remain.
    #[error("mesh is empty")]
    EmptyMesh,

    /// A face refers to a vertex that does not exist.
    #[error("invalid vertex index {index} (mesh has {vertex_count} vertices)")]
    InvalidIndex {
        /// The invalid index.
        index: u32,
        /// Total number of vertices in the mesh.
        vertex_count: usize,
    },

    /// A face survived clean-up without a defined normal.
    #[error("face {face} has no defined normal")]
    MissingFaceNormal {
        /// Index of the face.
        face: usize,
    },
}
