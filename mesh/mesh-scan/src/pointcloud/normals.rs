//! Normal estimation and orientation for point clouds.
//!
//! Normals come from PCA over each point's k nearest neighbors: the
//! eigenvector of the neighborhood covariance with the smallest eigenvalue.
//! PCA leaves the sign undetermined, so a second pass turns each normal
//! toward a reference direction.
//!
//! # Example
//!
//! ```
//! use mesh_scan::pointcloud::PointCloud;
//! use mesh_scan::pointcloud::normals::{NormalEstimationParams, try_estimate_normals};
//! use nalgebra::Point3;
//!
//! let positions: Vec<_> = (0..20)
//!     .flat_map(|i| (0..20).map(move |j| Point3::new(f64::from(i), f64::from(j), 5.0)))
//!     .collect();
//! let cloud = PointCloud::from_positions(&positions);
//!
//! let outcome = try_estimate_normals(cloud, &NormalEstimationParams::default());
//! assert!(outcome.warning.is_none());
//! assert!(outcome.cloud.points.iter().all(|p| p.normal.unwrap().z > 0.99));
//! ```

use nalgebra::{Matrix3, Point3, SymmetricEigen, Vector3};
use rayon::prelude::*;
use tracing::{debug, warn};

use super::{PointCloud, StageOutcome};
use crate::error::{ScanError, ScanResult};
use crate::spatial::NeighborIndex;

/// Parameters for normal estimation.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalEstimationParams {
    /// Number of nearest neighbors (self included) in each PCA neighborhood.
    /// Default: 30.
    pub k_neighbors: usize,

    /// Clouds smaller than this are passed through without normals.
    /// Default: 10.
    pub min_points: usize,

    /// Normals are flipped to have a non-negative dot product with this
    /// direction. Default: +Z (toward the viewer).
    pub reference: Vector3<f64>,
}

impl Default for NormalEstimationParams {
    fn default() -> Self {
        Self {
            k_neighbors: 30,
            min_points: 10,
            reference: Vector3::z(),
        }
    }
}

impl NormalEstimationParams {
    /// Creates new parameters with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the neighborhood size.
    #[must_use]
    pub const fn with_k_neighbors(mut self, k: usize) -> Self {
        self.k_neighbors = k;
        self
    }

    /// Sets the minimum cloud size for estimation.
    #[must_use]
    pub const fn with_min_points(mut self, min_points: usize) -> Self {
        self.min_points = min_points;
        self
    }

    /// Sets the orientation reference direction.
    #[must_use]
    pub const fn with_reference(mut self, reference: Vector3<f64>) -> Self {
        self.reference = reference;
        self
    }
}

impl PointCloud {
    /// Estimates normals for all points using PCA on the `k` nearest
    /// neighbors (the point itself included).
    ///
    /// Existing normals are overwritten. Signs are arbitrary; call one of the
    /// orientation methods afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the cloud has fewer than 3 points or `k < 3`.
    pub fn estimate_normals(&mut self, k: usize) -> ScanResult<()> {
        if self.points.len() < 3 {
            return Err(ScanError::InsufficientPoints {
                required: 3,
                actual: self.points.len(),
            });
        }
        if k < 3 {
            return Err(ScanError::NormalEstimationFailed {
                reason: format!("need at least 3 neighbors per point, got k = {k}"),
            });
        }

        let positions = self.positions();
        let index = NeighborIndex::build(&positions);

        let normals: Vec<Vector3<f64>> = positions
            .par_iter()
            .map(|p| {
                let hood: Vec<Point3<f64>> = index
                    .nearest(p, k)
                    .iter()
                    .map(|n| positions[n.index])
                    .collect();
                pca_normal(&hood)
            })
            .collect();

        for (point, normal) in self.points.iter_mut().zip(normals) {
            point.normal = Some(normal);
        }
        Ok(())
    }

    /// Flips every normal whose dot product with `reference` is negative.
    ///
    /// Returns the number of normals flipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the cloud is empty or any point lacks a normal.
    pub fn orient_normals_towards(&mut self, reference: &Vector3<f64>) -> ScanResult<usize> {
        self.require_normals()?;

        let mut flipped = 0;
        for normal in self.points.iter_mut().filter_map(|p| p.normal.as_mut()) {
            if normal.dot(reference) < 0.0 {
                *normal = -*normal;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    fn require_normals(&self) -> ScanResult<()> {
        if self.points.is_empty() {
            return Err(ScanError::EmptyPointCloud);
        }
        let missing = self.missing_normals();
        if missing > 0 {
            return Err(ScanError::NormalEstimationFailed {
                reason: format!("{missing} points have no normal to orient"),
            });
        }
        Ok(())
    }
}

/// Estimate and orient normals, recovering from failure.
///
/// Clouds with fewer than `params.min_points` points are returned without
/// normals and without a warning. Any estimation error is turned into a
/// warning; the cloud then proceeds without normals.
#[must_use]
pub fn try_estimate_normals(mut cloud: PointCloud, params: &NormalEstimationParams) -> StageOutcome {
    if cloud.len() < params.min_points {
        debug!(
            points = cloud.len(),
            min_points = params.min_points,
            "Skipping normal estimation for small cloud"
        );
        return StageOutcome::ok(cloud);
    }

    let result = cloud
        .estimate_normals(params.k_neighbors)
        .and_then(|()| cloud.orient_normals_towards(&params.reference));

    match result {
        Ok(flipped) => {
            debug!(
                points = cloud.len(),
                k = params.k_neighbors,
                flipped,
                "Estimated normals"
            );
            StageOutcome::ok(cloud)
        }
        Err(e) => {
            warn!(error = %e, "Normal estimation failed; continuing without normals");
            cloud.clear_normals();
            StageOutcome::degraded(cloud, format!("Normal estimation skipped: {e}"))
        }
    }
}

/// Smallest-variance direction of a neighborhood.
fn pca_normal(neighborhood: &[Point3<f64>]) -> Vector3<f64> {
    if neighborhood.len() < 3 {
        return Vector3::z();
    }

    let centroid: Vector3<f64> =
        neighborhood.iter().map(|p| p.coords).sum::<Vector3<f64>>() / neighborhood.len() as f64;

    let mut cov = Matrix3::zeros();
    for p in neighborhood {
        let d = p.coords - centroid;
        cov += d * d.transpose();
    }

    let eigen = SymmetricEigen::new(cov);
    let min_idx = eigen.eigenvalues.imin();
    let normal: Vector3<f64> = eigen.eigenvectors.column(min_idx).into_owned();

    normal.try_normalize(1e-12).unwrap_or_else(Vector3::z)
}
