//! Depth map types and normalization.
//!
//! A [`DepthMap`] holds the raw per-pixel output of a depth model. Values are
//! relative, not metric: larger means closer to the viewer. Before lifting to
//! 3D the map is rescaled to a [`NormalizedDepth`] in `[0, 255]`.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{SensorError, SensorResult};

/// A raw depth map.
///
/// Stored in row-major order: `depths[row * width + col]`.
///
/// # Example
///
/// ```
/// use sensor_types::DepthMap;
///
/// let depth = DepthMap::new(4, 2, vec![1.0; 8]).unwrap();
/// assert_eq!(depth.pixel_count(), 8);
/// assert_eq!(depth.get(3, 1), Some(1.0));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DepthMap {
    width: u32,
    height: u32,
    depths: Vec<f32>,
}

impl DepthMap {
    /// Create a depth map from a row-major buffer.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::BufferSizeMismatch`] if `depths.len()` is not
    /// `width * height`.
    pub fn new(width: u32, height: u32, depths: Vec<f32>) -> SensorResult<Self> {
        let expected = width as usize * height as usize;
        if depths.len() != expected {
            return Err(SensorError::buffer_mismatch(expected, depths.len()));
        }
        Ok(Self {
            width,
            height,
            depths,
        })
    }

    /// Create a depth map filled with zeros.
    #[must_use]
    pub fn zeros(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depths: vec![0.0; width as usize * height as usize],
        }
    }

    /// Image width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Total number of pixels.
    #[must_use]
    pub const fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Row-major depth values.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.depths
    }

    /// Depth at `(col, row)`, or `None` if out of bounds.
    #[must_use]
    pub fn get(&self, col: u32, row: u32) -> Option<f32> {
        if col >= self.width || row >= self.height {
            return None;
        }
        self.depths
            .get(row as usize * self.width as usize + col as usize)
            .copied()
    }

    /// Largest finite value, or `None` for an empty map or one with no
    /// finite values.
    #[must_use]
    pub fn max_value(&self) -> Option<f32> {
        self.depths
            .iter()
            .copied()
            .filter(|d| d.is_finite())
            .reduce(f32::max)
    }

    /// Min, max and mean over finite values.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn depth_stats(&self) -> Option<DepthStats> {
        let mut count = 0usize;
        let mut sum = 0.0f64;
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for &d in self.depths.iter().filter(|d| d.is_finite()) {
            count += 1;
            sum += f64::from(d);
            min = min.min(d);
            max = max.max(d);
        }
        if count == 0 {
            return None;
        }
        #[allow(clippy::cast_possible_truncation)]
        let mean = (sum / count as f64) as f32;
        Some(DepthStats { min, max, mean })
    }
}

/// Statistics over the finite values of a depth map.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DepthStats {
    /// Minimum value.
    pub min: f32,
    /// Maximum value.
    pub max: f32,
    /// Mean value.
    pub mean: f32,
}

/// A depth map rescaled to 8-bit.
///
/// Stored in row-major order like [`DepthMap`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NormalizedDepth {
    width: u32,
    height: u32,
    values: Vec<u8>,
}

impl NormalizedDepth {
    /// Create from a row-major buffer.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::BufferSizeMismatch`] if `values.len()` is not
    /// `width * height`.
    pub fn new(width: u32, height: u32, values: Vec<u8>) -> SensorResult<Self> {
        let expected = width as usize * height as usize;
        if values.len() != expected {
            return Err(SensorError::buffer_mismatch(expected, values.len()));
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    /// Image width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Row-major values.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.values
    }

    /// Value at `(col, row)`, or `None` if out of bounds.
    #[must_use]
    pub fn get(&self, col: u32, row: u32) -> Option<u8> {
        if col >= self.width || row >= self.height {
            return None;
        }
        self.values
            .get(row as usize * self.width as usize + col as usize)
            .copied()
    }

    /// Returns `true` if every value is zero.
    #[must_use]
    pub fn is_all_zero(&self) -> bool {
        self.values.iter().all(|&v| v == 0)
    }
}

/// Rescale `depth` so its maximum maps to 255.
///
/// Each value becomes `trunc(v * 255 / max)`. Negative and `NaN` values map
/// to 0. If the map is empty or its maximum is not a positive finite number,
/// the result is all zeros with the same shape.
///
/// # Example
///
/// ```
/// use sensor_types::{DepthMap, normalize_depth};
///
/// let depth = DepthMap::new(3, 1, vec![0.0, 1.0, 2.0]).unwrap();
/// let normalized = normalize_depth(&depth);
/// assert_eq!(normalized.as_slice(), &[0, 127, 255]);
/// ```
#[must_use]
pub fn normalize_depth(depth: &DepthMap) -> NormalizedDepth {
    let shape = (depth.width, depth.height);
    let max = match depth.max_value() {
        Some(m) if m > 0.0 => f64::from(m),
        _ => {
            return NormalizedDepth {
                width: shape.0,
                height: shape.1,
                values: vec![0; depth.pixel_count()],
            };
        }
    };

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let values = depth
        .depths
        .iter()
        .map(|&d| {
            // `as u8` truncates toward zero and saturates; NaN becomes 0.
            (f64::from(d) * 255.0 / max) as u8
        })
        .collect();

    NormalizedDepth {
        width: shape.0,
        height: shape.1,
        values,
    }
}
