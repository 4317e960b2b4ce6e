//! Error types for ml-depth crate.

use thiserror::Error;

/// Errors that can occur while loading or running a depth model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Checkpoint file not found.
    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(String),

    /// Failed to load checkpoint.
    #[error("failed to load checkpoint from {path}: {reason}")]
    LoadCheckpoint {
        /// Path to the checkpoint file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Backend initialization error.
    #[error("backend initialization failed: {0}")]
    BackendInit(String),

    /// The input image cannot be processed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Inference ran but failed.
    #[error("inference failed: {0}")]
    Inference(String),

    /// A thread panicked while holding the model lock.
    #[error("inference context lock poisoned")]
    Poisoned,
}

impl ModelError {
    /// Creates a load checkpoint error.
    #[must_use]
    pub fn load_checkpoint(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LoadCheckpoint {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid input error.
    #[must_use]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// Result type alias for ml-depth operations.
pub type Result<T> = std::result::Result<T, ModelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ModelError::load_checkpoint("model.json", "bad json");
        assert_eq!(
            err.to_string(),
            "failed to load checkpoint from model.json: bad json"
        );

        let err = ModelError::CheckpointNotFound("missing.json".to_string());
        assert!(err.to_string().contains("missing.json"));

        let err = ModelError::invalid_input("image is empty");
        assert_eq!(err.to_string(), "invalid input: image is empty");
    }
}
