//! Lifting a depth map into a colored point cloud.
//!
//! The projection is orthographic: pixel `(col, row)` keeps its image
//! coordinates as `x` and `y`, and its normalized depth `d` becomes
//! `z = (d / scale_factor) * ortho_scale`. Pixels with zero depth carry no
//! surface and are skipped.
//!
//! # Example
//!
//! ```
//! use mesh_scan::pointcloud::PointCloud;
//! use mesh_scan::pointcloud::depth::OrthographicParams;
//! use sensor_types::{ColorImage, NormalizedDepth};
//!
//! let depth = NormalizedDepth::new(2, 2, vec![0, 255, 0, 51]).unwrap();
//! let color = ColorImage::filled(2, 2, [255, 0, 0]);
//!
//! let cloud = PointCloud::from_orthographic_depth(&depth, &color, &OrthographicParams::default())
//!     .unwrap();
//!
//! assert_eq!(cloud.len(), 2);
//! // Default ortho scale is half the image height.
//! assert!((cloud.points[0].position.z - 1.0).abs() < 1e-12);
//! ```

use mesh_types::VertexColor;
use nalgebra::Point3;
use sensor_types::{ColorImage, NormalizedDepth};
use tracing::debug;

use super::{CloudPoint, PointCloud};
use crate::error::{ScanError, ScanResult};

/// Parameters for [`PointCloud::from_orthographic_depth`].
#[derive(Debug, Clone, PartialEq)]
pub struct OrthographicParams {
    /// Divisor applied to the 8-bit depth. Default: 255.
    pub scale_factor: f64,

    /// Multiplier applied after dividing. `None` uses half the image height.
    pub ortho_scale: Option<f64>,
}

impl Default for OrthographicParams {
    fn default() -> Self {
        Self {
            scale_factor: 255.0,
            ortho_scale: None,
        }
    }
}

impl OrthographicParams {
    /// Creates new parameters with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the depth divisor.
    #[must_use]
    pub const fn with_scale_factor(mut self, scale_factor: f64) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    /// Sets an explicit depth multiplier.
    #[must_use]
    pub const fn with_ortho_scale(mut self, ortho_scale: f64) -> Self {
        self.ortho_scale = Some(ortho_scale);
        self
    }

    /// The multiplier used for an image of the given height.
    #[must_use]
    pub fn effective_ortho_scale(&self, height: u32) -> f64 {
        self.ortho_scale.unwrap_or(f64::from(height) / 2.0)
    }

    fn validate(&self) -> ScanResult<()> {
        if !(self.scale_factor.is_finite() && self.scale_factor > 0.0) {
            return Err(ScanError::invalid(format!(
                "scale_factor must be positive, got {}",
                self.scale_factor
            )));
        }
        if let Some(k) = self.ortho_scale {
            if !k.is_finite() {
                return Err(ScanError::invalid(format!("ortho_scale must be finite, got {k}")));
            }
        }
        Ok(())
    }
}

impl PointCloud {
    /// Build a colored cloud from a normalized depth map and an aligned
    /// color image.
    ///
    /// Points are emitted in row-major pixel order. The result has no normals
    /// and may be empty.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidParameter`] if the depth and color shapes
    /// differ or the parameters are not finite and positive.
    pub fn from_orthographic_depth(
        depth: &NormalizedDepth,
        color: &ColorImage,
        params: &OrthographicParams,
    ) -> ScanResult<Self> {
        params.validate()?;
        let (width, height) = (depth.width(), depth.height());
        if color.dimensions() != (width, height) {
            return Err(ScanError::invalid(format!(
                "depth is {width}x{height} but color is {}x{}",
                color.width(),
                color.height()
            )));
        }

        let k = params.effective_ortho_scale(height);
        let mut cloud = Self::with_capacity(depth.as_slice().len());

        let rows = depth.as_slice().chunks_exact(width.max(1) as usize);
        let color_rows = color.pixels().chunks_exact(width.max(1) as usize);
        for (row, (depth_row, color_row)) in rows.zip(color_rows).enumerate() {
            for (col, (&d, &rgb)) in depth_row.iter().zip(color_row).enumerate() {
                let z = f64::from(d) / params.scale_factor * k;
                if z == 0.0 {
                    continue;
                }
                cloud.push(
                    CloudPoint::new(Point3::new(col as f64, row as f64, z))
                        .with_color(VertexColor::from_rgb(rgb)),
                );
            }
        }

        debug!(
            width,
            height,
            points = cloud.len(),
            ortho_scale = k,
            "Built orthographic point cloud"
        );
        Ok(cloud)
    }
}
