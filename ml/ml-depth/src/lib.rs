//! Monocular depth estimation for CortenForge.
//!
//! This crate is the seam between the reconstruction pipeline and whatever
//! model predicts depth from a photo:
//!
//! - [`DepthEstimator`] - The trait every depth model implements
//! - [`LuminanceDepthModel`] - Deterministic built-in model, configured from a JSON checkpoint
//! - [`InferenceContext`] - Loads a model once per process and hands out shared handles
//!
//! # Layer 0 Crate
//!
//! This is a Layer 0 crate with **zero Bevy dependencies**. It can be used in:
//! - Job workers
//! - CLI tools
//! - Tests, with an injected estimator
//!
//! # Example
//!
//! ```
//! use ml_depth::{BackendType, InferenceContext};
//! use sensor_types::ColorImage;
//!
//! let ctx = InferenceContext::from_config(None, BackendType::from_use_gpu(false));
//! let model = ctx.get_or_load().unwrap();
//!
//! let image = ColorImage::filled(8, 8, [120, 120, 120]);
//! let depth = model.estimate(&image).unwrap();
//! assert_eq!(depth.pixel_count(), 64);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod backend;
mod context;
mod error;
mod estimator;

// Re-export model types
pub use estimator::{DepthEstimator, LuminanceConfig, LuminanceDepthModel};

// Re-export the shared context
pub use context::InferenceContext;

// Re-export backend utilities
pub use backend::BackendType;

// Re-export error types
pub use error::{ModelError, Result};

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{
        BackendType, DepthEstimator, InferenceContext, LuminanceConfig, LuminanceDepthModel,
        ModelError,
    };
}
