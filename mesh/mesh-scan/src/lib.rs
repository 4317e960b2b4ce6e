//! Depth-map point clouds and surface reconstruction.
//!
//! This crate turns a normalized depth map into a triangle
//! mesh:
//!
//! - **Point Cloud** - Orthographic lifting of depth pixels, with colors
//! - **Cleanup** - Statistical outlier removal
//! - **Normals** - PCA normal estimation and orientation
//! - **Reconstruction** - Poisson surface reconstruction
//!
//! # Layer 0
//!
//! This is a Layer 0 crate with zero Bevy dependencies. All types are
//! designed for use in pure Rust computational pipelines.
//!
//! # Quick Start
//!
//! ```
//! use mesh_scan::cleanup::{try_remove_outliers, OutlierParams};
//! use mesh_scan::pointcloud::depth::OrthographicParams;
//! use mesh_scan::pointcloud::normals::{try_estimate_normals, NormalEstimationParams};
//! use mesh_scan::pointcloud::PointCloud;
//! use mesh_scan::reconstruct::{reconstruct_poisson, PoissonParams};
//! use sensor_types::{ColorImage, NormalizedDepth};
//!
//! // A 24x24 dome.
//! let size = 24u32;
//! let mut values = Vec::new();
//! for row in 0..size {
//!     for col in 0..size {
//!         let dx = f64::from(col) - 11.5;
//!         let dy = f64::from(row) - 11.5;
//!         let d = 255.0 * (-(dx * dx + dy * dy) / 60.0).exp();
//!         values.push(d.max(1.0) as u8);
//!     }
//! }
//! let depth = NormalizedDepth::new(size, size, values).unwrap();
//! let color = ColorImage::filled(size, size, [200, 180, 160]);
//!
//! let cloud = PointCloud::from_orthographic_depth(&depth, &color, &OrthographicParams::default()).unwrap();
//! let cloud = try_remove_outliers(cloud, &OutlierParams::default()).cloud;
//! let cloud = try_estimate_normals(cloud, &NormalEstimationParams::default()).cloud;
//!
//! let result = reconstruct_poisson(&cloud, &PoissonParams::new().with_depth(5)).unwrap();
//! assert!(result.mesh.face_count() > 0);
//! ```
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`pointcloud`] | Point cloud data structure, depth lifting, normals |
//! | [`cleanup`] | Outlier removal |
//! | [`reconstruct`] | Surface reconstruction from point clouds |
//! | [`spatial`] | k-nearest-neighbor queries |

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![allow(clippy::module_name_repetitions)]
// Allow certain pedantic lints that are too strict for this crate
#![allow(clippy::missing_const_for_fn)] // Not all functions benefit from const
#![allow(clippy::cast_precision_loss)] // Expected when converting counts to f64
#![allow(clippy::cast_possible_truncation)] // Grid and vertex indices fit in u32
#![allow(clippy::cast_sign_loss)] // Floors are clamped non-negative first
#![allow(clippy::needless_range_loop)] // Grid loops read better with indices
#![allow(clippy::many_single_char_names)] // Grid coordinates i, j, k, n, h

pub mod cleanup;
pub mod error;
pub mod pointcloud;
pub mod reconstruct;
pub mod spatial;

// Re-export main types at crate root for convenience
pub use cleanup::{OutlierParams, OutlierRemovalResult, try_remove_outliers};
pub use error::{ScanError, ScanResult};
pub use pointcloud::depth::OrthographicParams;
pub use pointcloud::normals::{NormalEstimationParams, try_estimate_normals};
pub use pointcloud::{CloudPoint, PointCloud, StageOutcome};
pub use reconstruct::{
    PoissonParams, PoissonReconstruction, reconstruct_poisson, trim_low_density,
};
