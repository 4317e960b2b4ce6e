//! Error types for mesh I/O operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for mesh I/O operations.
pub type IoResult<T> = Result<T, IoError>;

/// Errors that can occur while reading or writing STL files.
#[derive(Debug, Error)]
pub enum IoError {
    /// File not found.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was not found.
        path: PathBuf,
    },

    /// Invalid file content (parse error).
    #[error("invalid file content: {message}")]
    InvalidContent {
        /// Description of what was invalid.
        message: String,
    },

    /// Binary STL body does not match the declared triangle count.
    #[error("invalid face count: header declares {declared}, body holds {found}")]
    InvalidFaceCount {
        /// Count from the header.
        declared: u32,
        /// Complete triangles present in the body.
        found: u32,
    },

    /// A face refers to a vertex that does not exist.
    #[error("face {face} references vertex {index}, mesh has {vertex_count} vertices")]
    InvalidIndex {
        /// Offending face.
        face: usize,
        /// Offending vertex index.
        index: u32,
        /// Number of vertices in the mesh.
        vertex_count: usize,
    },

    /// Binary STL stores the triangle count as `u32`.
    #[error("too many faces for binary STL: {0}")]
    TooManyFaces(usize),

    /// Refusing to write a mesh with no faces.
    #[error("mesh has no faces")]
    EmptyMesh,

    /// I/O error from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Float parsing error in ASCII STL.
    #[error("float parsing error: {0}")]
    ParseFloat(#[from] std::num::ParseFloatError),
}

impl IoError {
    /// Create an `InvalidContent` error with the given message.
    #[must_use]
    pub fn invalid_content(message: impl Into<String>) -> Self {
        Self::InvalidContent {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = IoError::InvalidFaceCount {
            declared: 10,
            found: 3,
        };
        assert_eq!(
            err.to_string(),
            "invalid face count: header declares 10, body holds 3"
        );
        assert_eq!(IoError::EmptyMesh.to_string(), "mesh has no faces");
        assert!(
            IoError::invalid_content("bad")
                .to_string()
                .contains("bad")
        );
    }
}
