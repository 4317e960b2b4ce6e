//! Statistical outlier removal for point clouds.
//!
//! Points that are statistically far from their neighbors usually come from
//! depth discontinuities or noise at the subject's silhouette.
//!
//! # Algorithm
//!
//! For each point:
//! 1. Find the k nearest neighbors (the point itself excluded)
//! 2. Compute the mean distance to those neighbors
//! 3. Compute the global mean and population standard deviation of mean distances
//! 4. Remove points where mean distance > `global_mean + std_multiplier * std_dev`
//!
//! # Example
//!
//! ```
//! use mesh_scan::cleanup::outlier::{remove_outliers, OutlierParams};
//! use mesh_scan::pointcloud::PointCloud;
//! use nalgebra::Point3;
//!
//! let mut positions: Vec<_> = (0..10)
//!     .flat_map(|i| (0..10).map(move |j| Point3::new(f64::from(i), f64::from(j), 0.0)))
//!     .collect();
//! positions.push(Point3::new(5.0, 5.0, 100.0));
//!
//! let cloud = PointCloud::from_positions(&positions);
//! let filtered = remove_outliers(&cloud, &OutlierParams::default());
//!
//! assert_eq!(filtered.len(), 100);
//! ```

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::{ScanError, ScanResult};
use crate::pointcloud::{PointCloud, StageOutcome};
use crate::spatial::NeighborIndex;

/// Parameters for statistical outlier removal.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierParams {
    /// Number of neighbors to consider. Default: 15.
    pub k_neighbors: usize,

    /// Standard deviation multiplier for outlier threshold. Default: 1.0.
    /// Points with mean distance > mean + `std_multiplier` * std are removed.
    pub std_multiplier: f64,
}

impl Default for OutlierParams {
    fn default() -> Self {
        Self {
            k_neighbors: 15,
            std_multiplier: 1.0,
        }
    }
}

impl OutlierParams {
    /// Creates new parameters with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of neighbors to consider.
    #[must_use]
    pub const fn with_k_neighbors(mut self, k: usize) -> Self {
        self.k_neighbors = k;
        self
    }

    /// Sets the standard deviation multiplier.
    #[must_use]
    pub const fn with_std_multiplier(mut self, multiplier: f64) -> Self {
        self.std_multiplier = multiplier;
        self
    }
}

/// Result of outlier removal operation.
#[derive(Debug, Clone)]
pub struct OutlierRemovalResult {
    /// The filtered point cloud with outliers removed.
    pub cloud: PointCloud,

    /// Number of points in the original cloud.
    pub original_count: usize,

    /// Number of outliers removed.
    pub outliers_removed: usize,

    /// Mean distance threshold used. Zero when the filter did not run.
    pub distance_threshold: f64,
}

impl OutlierRemovalResult {
    /// Returns the percentage of points that were outliers.
    #[must_use]
    pub fn outlier_percentage(&self) -> f64 {
        if self.original_count == 0 {
            return 0.0;
        }
        100.0 * self.outliers_removed as f64 / self.original_count as f64
    }

    fn passthrough(cloud: &PointCloud) -> Self {
        Self {
            cloud: cloud.clone(),
            original_count: cloud.len(),
            outliers_removed: 0,
            distance_threshold: 0.0,
        }
    }
}

impl std::fmt::Display for OutlierRemovalResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Outlier removal: {} → {} points ({} removed, {:.1}%)",
            self.original_count,
            self.cloud.len(),
            self.outliers_removed,
            self.outlier_percentage()
        )
    }
}

/// Removes statistical outliers from a point cloud.
///
/// Returns a copy of the input when the filter cannot run.
#[must_use]
pub fn remove_outliers(cloud: &PointCloud, params: &OutlierParams) -> PointCloud {
    remove_outliers_with_result(cloud, params).cloud
}

/// Removes statistical outliers and returns detailed results.
///
/// Normals and colors travel with their points. When the filter cannot run
/// the input is returned unchanged with `outliers_removed == 0`.
///
/// # Example
///
/// ```
/// use mesh_scan::cleanup::outlier::{remove_outliers_with_result, OutlierParams};
/// use mesh_scan::pointcloud::PointCloud;
/// use nalgebra::Point3;
///
/// let positions: Vec<_> = (0..100)
///     .map(|i| Point3::new(f64::from(i) * 0.1, 0.0, 0.0))
///     .collect();
/// let cloud = PointCloud::from_positions(&positions);
///
/// let result = remove_outliers_with_result(&cloud, &OutlierParams::default());
/// println!("{}", result);
/// ```
#[must_use]
pub fn remove_outliers_with_result(
    cloud: &PointCloud,
    params: &OutlierParams,
) -> OutlierRemovalResult {
    filter(cloud, params).unwrap_or_else(|_| OutlierRemovalResult::passthrough(cloud))
}

/// Best-effort outlier removal for the pipeline.
///
/// Never fails: if the filter cannot run the cloud passes through and the
/// outcome carries a warning.
#[must_use]
pub fn try_remove_outliers(cloud: PointCloud, params: &OutlierParams) -> StageOutcome {
    match filter(&cloud, params) {
        Ok(result) => {
            debug!(
                original = result.original_count,
                removed = result.outliers_removed,
                threshold = result.distance_threshold,
                "Removed statistical outliers"
            );
            StageOutcome::ok(result.cloud)
        }
        Err(e) => {
            warn!(error = %e, points = cloud.len(), "Outlier removal skipped");
            StageOutcome::degraded(cloud, format!("Outlier removal skipped: {e}"))
        }
    }
}

fn filter(cloud: &PointCloud, params: &OutlierParams) -> ScanResult<OutlierRemovalResult> {
    let original_count = cloud.len();
    let (keep_mask, threshold) = compute_outlier_mask(cloud, params)?;
    let filtered = cloud.select(&keep_mask);

    Ok(OutlierRemovalResult {
        outliers_removed: original_count - filtered.len(),
        cloud: filtered,
        original_count,
        distance_threshold: threshold,
    })
}

/// Computes a mask indicating which points to keep, and the threshold used.
fn compute_outlier_mask(cloud: &PointCloud, params: &OutlierParams) -> ScanResult<(Vec<bool>, f64)> {
    let k = params.k_neighbors;
    if k == 0 {
        return Err(ScanError::invalid("k_neighbors must be at least 1"));
    }
    if !params.std_multiplier.is_finite() {
        return Err(ScanError::invalid(format!(
            "std_multiplier must be finite, got {}",
            params.std_multiplier
        )));
    }
    if cloud.len() < k + 1 {
        return Err(ScanError::InsufficientPoints {
            required: k + 1,
            actual: cloud.len(),
        });
    }

    let positions = cloud.positions();
    let index = NeighborIndex::build(&positions);

    let mean_distances: Vec<f64> = positions
        .par_iter()
        .enumerate()
        .map(|(i, p)| {
            let neighbors = index.nearest_excluding_self(i, p, k);
            let sum: f64 = neighbors.iter().map(|n| n.distance).sum();
            sum / neighbors.len().max(1) as f64
        })
        .collect();

    // Sequential sums keep the threshold identical run to run.
    let n = mean_distances.len() as f64;
    let global_mean = mean_distances.iter().sum::<f64>() / n;
    let variance = mean_distances
        .iter()
        .map(|d| (d - global_mean).powi(2))
        .sum::<f64>()
        / n;

    let std_dev = variance.sqrt();
    let threshold = params.std_multiplier.mul_add(std_dev, global_mean);
    if !threshold.is_finite() {
        return Err(ScanError::ReconstructionFailed {
            reason: "non-finite neighbor distance statistics".to_string(),
        });
    }

    let keep_mask = mean_distances.iter().map(|&d| d <= threshold).collect();
    Ok((keep_mask, threshold))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mesh_types::VertexColor;
    use nalgebra::{Point3, Vector3};

    use crate::pointcloud::CloudPoint;

    fn make_grid_cloud(n: u32) -> PointCloud {
        let positions: Vec<_> = (0..n)
            .flat_map(|i| (0..n).map(move |j| Point3::new(f64::from(i), f64::from(j), 0.0)))
            .collect();
        PointCloud::from_positions(&positions)
    }

    #[test]
    fn test_outlier_params_default() {
        let params = OutlierParams::default();
        assert_eq!(params.k_neighbors, 15);
        assert_relative_eq!(params.std_multiplier, 1.0);
    }

    #[test]
    fn test_outlier_params_builder() {
        let params = OutlierParams::new()
            .with_k_neighbors(8)
            .with_std_multiplier(2.5);
        assert_eq!(params.k_neighbors, 8);
        assert_relative_eq!(params.std_multiplier, 2.5);
    }

    #[test]
    fn test_far_point_removed() {
        let mut cloud = make_grid_cloud(10);
        cloud.push(CloudPoint::from_coords(50.0, 50.0, 50.0));

        let result = remove_outliers_with_result(&cloud, &OutlierParams::default());
        assert_eq!(result.original_count, 101);
        assert_eq!(result.outliers_removed, 1);
        assert!(result.cloud.points.iter().all(|p| p.position.z == 0.0));
        assert!(result.distance_threshold > 0.0);
    }

    #[test]
    fn test_uniform_grid_keeps_interior() {
        // Distances are identical in the interior, so the interior is kept.
        let cloud = make_grid_cloud(12);
        let params = OutlierParams::new().with_k_neighbors(4).with_std_multiplier(1.0);
        let result = remove_outliers_with_result(&cloud, &params);
        assert!(result.cloud.points.contains(&CloudPoint::from_coords(5.0, 5.0, 0.0)));
        assert!(result.cloud.len() <= cloud.len());
    }

    #[test]
    fn test_attributes_filtered_in_lockstep() {
        let mut cloud = PointCloud::new();
        for i in 0..10 {
            for j in 0..10 {
                let shade = u8::try_from(i * 10 + j).unwrap();
                cloud.push(
                    CloudPoint::with_normal(
                        Point3::new(f64::from(i), f64::from(j), 0.0),
                        Vector3::z(),
                    )
                    .with_color(VertexColor::new(shade, 0, 0)),
                );
            }
        }
        cloud.push(
            CloudPoint::with_normal(Point3::new(0.0, 0.0, 80.0), -Vector3::z())
                .with_color(VertexColor::new(255, 255, 255)),
        );

        let filtered = remove_outliers(&cloud, &OutlierParams::default());
        assert_eq!(filtered.len(), 100);
        for p in &filtered.points {
            let shade = f64::from(p.color.unwrap().r);
            assert_eq!(p.position.x * 10.0 + p.position.y, shade);
            assert_eq!(p.normal.unwrap(), Vector3::z());
        }
    }

    #[test]
    fn test_too_few_points_passthrough() {
        let cloud = make_grid_cloud(3);
        let result = remove_outliers_with_result(&cloud, &OutlierParams::default());
        assert_eq!(result.cloud, cloud);
        assert_eq!(result.outliers_removed, 0);
    }

    #[test]
    fn test_try_remove_warns_when_skipped() {
        let cloud = make_grid_cloud(3);
        let outcome = try_remove_outliers(cloud.clone(), &OutlierParams::default());
        assert!(outcome.is_degraded());
        assert_eq!(outcome.cloud, cloud);

        let outcome = try_remove_outliers(cloud.clone(), &OutlierParams::new().with_k_neighbors(0));
        assert!(outcome.is_degraded());
        assert_eq!(outcome.cloud, cloud);
    }

    #[test]
    fn test_try_remove_ok() {
        let outcome = try_remove_outliers(make_grid_cloud(10), &OutlierParams::default());
        assert!(!outcome.is_degraded());
        assert!(!outcome.cloud.is_empty());
    }

    #[test]
    fn test_exactly_k_plus_one_points_runs() {
        let cloud = make_grid_cloud(4);
        let params = OutlierParams::new().with_k_neighbors(15);
        let outcome = try_remove_outliers(cloud, &params);
        assert!(!outcome.is_degraded());
    }

    #[test]
    fn test_result_display() {
        let result = OutlierRemovalResult {
            cloud: PointCloud::new(),
            original_count: 200,
            outliers_removed: 10,
            distance_threshold: 1.5,
        };
        assert_relative_eq!(result.outlier_percentage(), 5.0);
        let display = format!("{result}");
        assert!(display.contains("200"));
        assert!(display.contains("5.0%"));
    }
}
