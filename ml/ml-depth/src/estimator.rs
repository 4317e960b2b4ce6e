//! The depth estimation seam and its built-in model.

use std::fmt::Debug;
use std::path::Path;

use sensor_types::{ColorImage, DepthMap};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::BackendType;
use crate::error::{ModelError, Result};

/// A monocular depth model.
///
/// Implementations map an RGB image to a dense, non-negative depth map of the
/// same or a smaller resolution. Larger values are nearer to the camera.
pub trait DepthEstimator: Send + Sync + Debug {
    /// Short model name for logs.
    fn name(&self) -> &str;

    /// Predict depth for `image`.
    ///
    /// # Errors
    ///
    /// Returns an error if the image is unusable or inference fails.
    fn estimate(&self, image: &ColorImage) -> Result<DepthMap>;
}

/// Settings for [`LuminanceDepthModel`], stored as a JSON checkpoint.
///
/// Missing fields take their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LuminanceConfig {
    /// Treat dark pixels as near instead of bright ones. Default: false.
    pub invert: bool,
    /// Exponent applied to luminance. Default: 1.0.
    pub gamma: f32,
    /// Constant added to every depth. Default: 0.0.
    pub offset: f32,
}

impl Default for LuminanceConfig {
    fn default() -> Self {
        Self {
            invert: false,
            gamma: 1.0,
            offset: 0.0,
        }
    }
}

impl LuminanceConfig {
    fn validate(&self) -> std::result::Result<(), String> {
        if !(self.gamma.is_finite() && self.gamma > 0.0) {
            return Err(format!("gamma must be positive, got {}", self.gamma));
        }
        if !(self.offset.is_finite() && self.offset >= 0.0) {
            return Err(format!("offset must be non-negative, got {}", self.offset));
        }
        Ok(())
    }
}

/// Deterministic depth model driven by pixel luminance.
///
/// Bright pixels come out nearer than dark ones (or the reverse with
/// `invert`). Stands in for a learned model wherever the pipeline needs a
/// real, repeatable depth map.
///
/// # Example
///
/// ```
/// use ml_depth::{DepthEstimator, LuminanceDepthModel};
/// use sensor_types::ColorImage;
///
/// let model = LuminanceDepthModel::default();
/// let image = ColorImage::filled(4, 3, [255, 255, 255]);
/// let depth = model.estimate(&image).unwrap();
///
/// assert_eq!((depth.width(), depth.height()), (4, 3));
/// assert!((depth.get(0, 0).unwrap() - 1.0).abs() < 1e-6);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LuminanceDepthModel {
    config: LuminanceConfig,
    backend: BackendType,
}

impl LuminanceDepthModel {
    /// A model with explicit settings.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidInput`] for a non-positive gamma or a
    /// negative offset.
    pub fn new(config: LuminanceConfig, backend: BackendType) -> Result<Self> {
        config.validate().map_err(ModelError::invalid_input)?;
        Ok(Self { config, backend })
    }

    /// Load settings from a JSON checkpoint, or use defaults for `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::CheckpointNotFound`] if the file does not exist
    /// and [`ModelError::LoadCheckpoint`] if it cannot be read or parsed.
    pub fn load(checkpoint: Option<&Path>, backend: BackendType) -> Result<Self> {
        let config = match checkpoint {
            None => LuminanceConfig::default(),
            Some(path) => {
                if !path.exists() {
                    return Err(ModelError::CheckpointNotFound(path.display().to_string()));
                }
                let text = std::fs::read_to_string(path)
                    .map_err(|e| ModelError::load_checkpoint(path.display().to_string(), e.to_string()))?;
                let config: LuminanceConfig = serde_json::from_str(&text)
                    .map_err(|e| ModelError::load_checkpoint(path.display().to_string(), e.to_string()))?;
                config
                    .validate()
                    .map_err(|reason| ModelError::load_checkpoint(path.display().to_string(), reason))?;
                config
            }
        };

        info!(
            backend = %backend,
            checkpoint = ?checkpoint,
            invert = config.invert,
            gamma = config.gamma,
            "Loaded luminance depth model"
        );
        Ok(Self { config, backend })
    }

    /// The active settings.
    #[must_use]
    pub const fn config(&self) -> &LuminanceConfig {
        &self.config
    }

    /// The backend the model was loaded for.
    #[must_use]
    pub const fn backend(&self) -> BackendType {
        self.backend
    }
}

impl DepthEstimator for LuminanceDepthModel {
    fn name(&self) -> &str {
        "luminance"
    }

    fn estimate(&self, image: &ColorImage) -> Result<DepthMap> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(ModelError::invalid_input(format!(
                "image has no pixels ({width}x{height})"
            )));
        }

        let LuminanceConfig {
            invert,
            gamma,
            offset,
        } = self.config;
        let depths: Vec<f32> = image
            .luminance()
            .into_iter()
            .map(|l| {
                let l = if invert { 1.0 - l } else { l };
                l.clamp(0.0, 1.0).powf(gamma) + offset
            })
            .collect();

        debug!(width, height, backend = %self.backend, "Estimated luminance depth");
        DepthMap::new(width, height, depths).map_err(|e| ModelError::Inference(e.to_string()))
    }
}
