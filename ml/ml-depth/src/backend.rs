//! Compute backend selection.

use serde::{Deserialize, Serialize};

/// Where inference runs.
///
/// # Example
///
/// ```
/// use ml_depth::BackendType;
///
/// let backend = BackendType::from_use_gpu(false);
/// assert!(backend.is_cpu());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// CPU inference. Always available.
    #[default]
    Cpu,

    /// GPU inference, when the model supports it.
    Gpu,
}

impl BackendType {
    /// Maps a `USE_GPU`-style flag to a backend.
    #[must_use]
    pub const fn from_use_gpu(use_gpu: bool) -> Self {
        if use_gpu { Self::Gpu } else { Self::Cpu }
    }

    /// Returns `true` if this is a CPU backend.
    #[must_use]
    pub const fn is_cpu(&self) -> bool {
        matches!(self, Self::Cpu)
    }

    /// Returns `true` if this is a GPU backend.
    #[must_use]
    pub const fn is_gpu(&self) -> bool {
        matches!(self, Self::Gpu)
    }

    /// Returns the backend name as a string.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
