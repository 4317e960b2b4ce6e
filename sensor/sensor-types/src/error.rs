//! Error types for sensor data.

use thiserror::Error;

/// Result type for sensor operations.
pub type SensorResult<T> = Result<T, SensorError>;

/// Errors that can occur when building or decoding sensor data.
#[derive(Debug, Error)]
pub enum SensorError {
    /// Buffer size does not match the declared dimensions.
    #[error("buffer size mismatch: expected {expected}, got {actual}")]
    BufferSizeMismatch {
        /// Expected buffer size.
        expected: usize,
        /// Actual buffer size.
        actual: usize,
    },

    /// Two grids that must align have different shapes.
    #[error("shape mismatch: {left:?} vs {right:?}")]
    ShapeMismatch {
        /// `(width, height)` of the first grid.
        left: (u32, u32),
        /// `(width, height)` of the second grid.
        right: (u32, u32),
    },

    /// Encoded image could not be decoded.
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),

    /// I/O error reading image data.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SensorError {
    /// Creates a buffer size mismatch error.
    #[must_use]
    pub const fn buffer_mismatch(expected: usize, actual: usize) -> Self {
        Self::BufferSizeMismatch { expected, actual }
    }

    /// Creates a shape mismatch error.
    #[must_use]
    pub const fn shape_mismatch(left: (u32, u32), right: (u32, u32)) -> Self {
        Self::ShapeMismatch { left, right }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_buffer_mismatch() {
        let msg = SensorError::buffer_mismatch(100, 50).to_string();
        assert!(msg.contains("100"));
        assert!(msg.contains("50"));
    }

    #[test]
    fn test_error_shape_mismatch() {
        let msg = SensorError::shape_mismatch((4, 3), (2, 2)).to_string();
        assert_eq!(msg, "shape mismatch: (4, 3) vs (2, 2)");
    }
}
