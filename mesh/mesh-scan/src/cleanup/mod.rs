//! Point cloud cleanup.
//!
//! Currently this is statistical outlier removal: points whose mean distance
//! to their neighbors is far above the cloud-wide average are dropped.
//!
//! # Quick Start
//!
//! ```
//! use mesh_scan::cleanup::{try_remove_outliers, OutlierParams};
//! use mesh_scan::pointcloud::PointCloud;
//! use nalgebra::Point3;
//!
//! let positions: Vec<_> = (0..8)
//!     .flat_map(|i| (0..8).map(move |j| Point3::new(f64::from(i), f64::from(j), 1.0)))
//!     .collect();
//!
//! let outcome = try_remove_outliers(PointCloud::from_positions(&positions), &OutlierParams::default());
//! assert!(outcome.warning.is_none());
//! ```

pub mod outlier;

pub use outlier::{
    OutlierParams, OutlierRemovalResult, remove_outliers, remove_outliers_with_result,
    try_remove_outliers,
};
