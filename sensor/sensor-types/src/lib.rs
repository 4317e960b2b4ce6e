//! Image-space sensor data for the photomesh pipeline.
//!
//! - [`ColorImage`] - decoded 8-bit RGB photograph
//! - [`DepthMap`] - raw per-pixel depth from a depth model
//! - [`NormalizedDepth`] - depth rescaled to `[0, 255]`
//!
//! All grids are row-major with `(col, row)` accessors, so pixel `(x, y)`
//! lives at index `y * width + x`.
//!
//! # Example
//!
//! ```
//! use sensor_types::{ColorImage, DepthMap, normalize_depth};
//!
//! let color = ColorImage::filled(8, 8, [200, 180, 160]);
//! let depth = DepthMap::new(4, 4, vec![2.0; 16]).unwrap();
//!
//! // Align color to the depth resolution before lifting to 3D.
//! let color = color.resize_to(depth.width(), depth.height());
//! let normalized = normalize_depth(&depth);
//!
//! assert_eq!(color.dimensions(), (4, 4));
//! assert_eq!(normalized.get(0, 0), Some(255));
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod color;
mod depth;
mod error;

pub use color::{ColorImage, decode_image, load_image};
pub use depth::{DepthMap, DepthStats, NormalizedDepth, normalize_depth};
pub use error::{SensorError, SensorResult};
