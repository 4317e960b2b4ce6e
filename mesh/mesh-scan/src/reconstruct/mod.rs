//! Surface reconstruction from point clouds.
//!
//! Reconstruction turns an oriented point cloud into a triangle mesh by
//! solving for an indicator function and extracting one of its level sets.
//!
//! # Quick Start
//!
//! ```
//! use mesh_scan::pointcloud::PointCloud;
//! use mesh_scan::reconstruct::{reconstruct_poisson, PoissonParams};
//! use nalgebra::{Point3, Vector3};
//!
//! // A small cube of points with outward normals.
//! let mut cloud = PointCloud::new();
//! for i in 0..=8 {
//!     for j in 0..=8 {
//!         let (u, v) = (f64::from(i) / 8.0, f64::from(j) / 8.0);
//!         cloud.add_point_with_normal(Point3::new(u, v, 0.0), -Vector3::z());
//!         cloud.add_point_with_normal(Point3::new(u, v, 1.0), Vector3::z());
//!         cloud.add_point_with_normal(Point3::new(u, 0.0, v), -Vector3::y());
//!         cloud.add_point_with_normal(Point3::new(u, 1.0, v), Vector3::y());
//!         cloud.add_point_with_normal(Point3::new(0.0, u, v), -Vector3::x());
//!         cloud.add_point_with_normal(Point3::new(1.0, u, v), Vector3::x());
//!     }
//! }
//!
//! let result = reconstruct_poisson(&cloud, &PoissonParams::new().with_depth(5)).unwrap();
//! println!("{}", result);
//! ```
//!
//! # Workflow
//!
//! 1. **Prepare Point Cloud**: Ensure every point has an oriented normal
//!    (see [`crate::pointcloud::normals`]).
//! 2. **Reconstruct**: Call [`reconstruct_poisson`].
//! 3. **Optionally trim**: [`trim_low_density`] removes vertices far from
//!    any input sample, using the returned densities.

mod band;
mod extract;
mod grid;
mod poisson;
mod solver;

pub use extract::trim_low_density;
pub use poisson::{PoissonParams, PoissonReconstruction, reconstruct_poisson};
