//! Poisson surface reconstruction.
//!
//! Oriented points define a vector field `V`. The indicator function `χ`
//! whose gradient best matches `V` solves `Δχ = ∇·V`; the surface is the
//! level set of `χ` at its mean value over the input points.
//!
//! The solve is cascadic: each depth from 3 (or the dense depth, if lower)
//! up to the dense depth is solved on a full grid with conjugate gradient,
//! warm-started from the trilinear resampling of the previous depth. Depths
//! past the dense depth, up to the requested one, are solved only in a narrow
//! band of cells around the current surface.
//!
//! # Example
//!
//! ```
//! use mesh_scan::pointcloud::PointCloud;
//! use mesh_scan::reconstruct::{reconstruct_poisson, PoissonParams};
//! use nalgebra::{Point3, Vector3};
//!
//! let mut cloud = PointCloud::new();
//! let n = 600;
//! let golden = std::f64::consts::PI * (3.0 - 5.0f64.sqrt());
//! for i in 0..n {
//!     let y = 1.0 - 2.0 * (f64::from(i) + 0.5) / f64::from(n);
//!     let r = (1.0 - y * y).sqrt();
//!     let theta = golden * f64::from(i);
//!     let dir = Vector3::new(r * theta.cos(), y, r * theta.sin());
//!     cloud.add_point_with_normal(Point3::from(dir * 5.0), dir);
//! }
//!
//! let result = reconstruct_poisson(&cloud, &PoissonParams::new().with_depth(5)).unwrap();
//! assert!(result.mesh.face_count() > 0);
//! assert_eq!(result.grid_depth, 5);
//! ```

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use tracing::{debug, info};

use super::band::LevelStack;
use super::extract::{extract_band, extract_isosurface, vertex_densities};
use super::grid::CubeGrid;
use super::solver::{self, SolverConfig};
use crate::error::{ScanError, ScanResult};
use crate::pointcloud::PointCloud;
use crate::spatial::NeighborIndex;
use mesh_types::IndexedMesh;

/// Deepest octree depth accepted from callers.
const MAX_DEPTH: u32 = 12;

/// Depth the cascade starts from.
const COARSEST_DEPTH: u32 = 3;

/// Parameters for Poisson reconstruction.
#[derive(Debug, Clone, PartialEq)]
pub struct PoissonParams {
    /// Octree depth of the finest level solved. Default: 9.
    pub depth: u32,

    /// Deepest level solved on a full grid. Deeper levels are solved in a
    /// narrow band around the surface. Default: 7.
    pub max_grid_depth: u32,

    /// Bounding cube edge relative to the cloud's longest extent. Default: 1.1.
    pub scale: f64,

    /// Conjugate gradient iterations per depth. Default: 200.
    pub max_iterations: usize,

    /// Relative residual at which a solve stops. Default: 1e-6.
    pub tolerance: f64,

    /// Whether to compute per-vertex densities. Default: true.
    pub compute_density: bool,
}

impl Default for PoissonParams {
    fn default() -> Self {
        Self {
            depth: 9,
            max_grid_depth: 7,
            scale: 1.1,
            max_iterations: 200,
            tolerance: 1e-6,
            compute_density: true,
        }
    }
}

impl PoissonParams {
    /// Creates new parameters with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the octree depth.
    #[must_use]
    pub const fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Sets the deepest full-grid level.
    #[must_use]
    pub const fn with_max_grid_depth(mut self, max_grid_depth: u32) -> Self {
        self.max_grid_depth = max_grid_depth;
        self
    }

    /// Sets the bounding cube scale.
    #[must_use]
    pub const fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Sets the per-depth iteration limit.
    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the solver tolerance.
    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Enables or disables density output.
    #[must_use]
    pub const fn with_compute_density(mut self, enabled: bool) -> Self {
        self.compute_density = enabled;
        self
    }

    fn validate(&self) -> ScanResult<()> {
        if !(1..=MAX_DEPTH).contains(&self.depth) {
            return Err(ScanError::invalid(format!(
                "depth must be in 1..={MAX_DEPTH}, got {}",
                self.depth
            )));
        }
        if !(1..=MAX_DEPTH).contains(&self.max_grid_depth) {
            return Err(ScanError::invalid(format!(
                "max_grid_depth must be in 1..={MAX_DEPTH}, got {}",
                self.max_grid_depth
            )));
        }
        if !(self.scale.is_finite() && self.scale >= 1.0) {
            return Err(ScanError::invalid(format!("scale must be at least 1, got {}", self.scale)));
        }
        if self.max_iterations == 0 {
            return Err(ScanError::invalid("max_iterations must be positive"));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(ScanError::invalid(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }

    const fn solver_config(&self) -> SolverConfig {
        SolverConfig {
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
        }
    }
}

/// Output of [`reconstruct_poisson`].
#[derive(Debug, Clone)]
pub struct PoissonReconstruction {
    /// The extracted isosurface. Has no vertex normals.
    pub mesh: IndexedMesh,

    /// Per-vertex density in `[0, 1]`. Empty when density was not requested.
    pub densities: Vec<f64>,

    /// Depth of the finest level solved. Always the requested depth.
    pub grid_depth: u32,

    /// Depth of the deepest full grid; levels past it were band solves.
    pub dense_depth: u32,

    /// Level of `χ` the surface was extracted at.
    pub iso_value: f64,

    /// Conjugate gradient iterations summed over all depths.
    pub solver_iterations: usize,
}

impl std::fmt::Display for PoissonReconstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Poisson reconstruction: {} vertices, {} faces (grid depth {}, dense to {}, {} CG iterations)",
            self.mesh.vertex_count(),
            self.mesh.face_count(),
            self.grid_depth,
            self.dense_depth,
            self.solver_iterations
        )
    }
}

/// Reconstruct a surface from an oriented point cloud.
///
/// The result may have no faces; callers decide whether that is an error.
///
/// # Errors
///
/// - [`ScanError::InvalidParameter`] if `params` are out of range.
/// - [`ScanError::EmptyPointCloud`] if the cloud is empty.
/// - [`ScanError::NormalEstimationFailed`] if any point lacks a normal.
/// - [`ScanError::ReconstructionFailed`] if the solver diverges.
pub fn reconstruct_poisson(cloud: &PointCloud, params: &PoissonParams) -> ScanResult<PoissonReconstruction> {
    params.validate()?;
    let bounds = cloud.bounds().ok_or(ScanError::EmptyPointCloud)?;

    let missing = cloud.missing_normals();
    if missing > 0 {
        return Err(ScanError::NormalEstimationFailed {
            reason: format!(
                "Poisson reconstruction needs normals; {missing} of {} points have none",
                cloud.len()
            ),
        });
    }

    let positions = cloud.positions();
    let normals: Vec<Vector3<f64>> = cloud.points.iter().filter_map(|p| p.normal).collect();

    let mut edge = bounds.max_extent() * params.scale;
    if !(edge.is_finite() && edge > f64::EPSILON) {
        edge = 1.0;
    }
    let origin = bounds.center() - Vector3::repeat(edge / 2.0);

    let dense = dense_depth(&positions, edge, params);
    let config = params.solver_config();

    let mut grid = CubeGrid::new(dense.min(COARSEST_DEPTH), origin, edge);
    let mut chi = vec![0.0; grid.node_count()];
    let mut solver_iterations = solve_level(&grid, &positions, &normals, &mut chi, &config)?;

    for depth in grid.depth() + 1..=dense {
        let fine = CubeGrid::new(depth, origin, edge);
        let mut warm = fine.prolong(&grid, &chi);
        solver_iterations += solve_level(&fine, &positions, &normals, &mut warm, &config)?;
        grid = fine;
        chi = warm;
    }

    let mut levels = LevelStack::new(grid, chi);
    let mut iso_value = levels.iso_value(&positions);
    for _ in dense..params.depth {
        let stats = levels.refine(&positions, &normals, iso_value, &config)?;
        solver_iterations += stats.iterations;
        if let Some(band) = levels.finest_band() {
            debug!(
                depth = band.grid.depth(),
                cells = band.cells.len(),
                nodes = band.values.len(),
                iterations = stats.iterations,
                residual = stats.relative_residual,
                converged = stats.converged,
                "Solved Poisson band"
            );
        }
        iso_value = levels.iso_value(&positions);
    }

    let mesh = match levels.finest_band() {
        Some(band) => extract_band(&band.grid, &band.values, iso_value, &band.cells),
        None => extract_isosurface(levels.base(), levels.base_values(), iso_value),
    };
    let densities = if params.compute_density {
        vertex_densities(levels.base(), &mesh, &positions)
    } else {
        Vec::new()
    };

    info!(
        points = positions.len(),
        grid_depth = params.depth,
        dense_depth = dense,
        iso_value,
        solver_iterations,
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        "Poisson reconstruction complete"
    );

    Ok(PoissonReconstruction {
        mesh,
        densities,
        grid_depth: params.depth,
        dense_depth: dense,
        iso_value,
        solver_iterations,
    })
}

/// Depth solved on a full grid:
/// `min(depth, max_grid_depth, max(2, floor(log2(edge / spacing))))`.
///
/// Past the sample spacing a full grid only adds empty cells, so the band
/// takes over from there.
fn dense_depth(positions: &[Point3<f64>], edge: f64, params: &PoissonParams) -> u32 {
    let cap = params.depth.min(params.max_grid_depth);
    let Some(spacing) = median_spacing(positions) else {
        return cap;
    };
    let levels = (edge / spacing).log2().floor();
    if !levels.is_finite() {
        return cap;
    }
    let by_density = (levels.max(0.0) as u32).max(2);
    cap.min(by_density)
}

/// Median nearest-neighbor distance, or `None` if it is zero or undefined.
fn median_spacing(positions: &[Point3<f64>]) -> Option<f64> {
    if positions.len() < 2 {
        return None;
    }
    let index = NeighborIndex::build(positions);
    let mut distances: Vec<f64> = positions
        .par_iter()
        .enumerate()
        .filter_map(|(i, p)| index.nearest_excluding_self(i, p, 1).first().map(|n| n.distance))
        .collect();
    distances.sort_by(f64::total_cmp);
    let median = *distances.get(distances.len() / 2)?;
    (median > 0.0).then_some(median)
}

fn solve_level(
    grid: &CubeGrid,
    positions: &[Point3<f64>],
    normals: &[Vector3<f64>],
    chi: &mut [f64],
    config: &SolverConfig,
) -> ScanResult<usize> {
    let rhs = divergence_rhs(grid, positions, normals);
    let stats = solver::solve(grid, &rhs, chi, config)?;
    debug!(
        depth = grid.depth(),
        nodes = grid.node_count(),
        iterations = stats.iterations,
        residual = stats.relative_residual,
        converged = stats.converged,
        "Solved Poisson level"
    );
    Ok(stats.iterations)
}

/// Right-hand side `-(h²)·∇·V` at interior nodes.
///
/// Normals are splatted with trilinear weights and scaled by `1/h³` so the
/// indicator jump has the same height at every depth.
fn divergence_rhs(grid: &CubeGrid, positions: &[Point3<f64>], normals: &[Vector3<f64>]) -> Vec<f64> {
    let h = grid.cell_size();
    let density_scale = h.powi(3).recip();

    let mut field = vec![Vector3::zeros(); grid.node_count()];
    for (p, normal) in positions.iter().zip(normals) {
        for (idx, w) in grid.corner_weights(p) {
            field[idx] += normal * (w * density_scale);
        }
    }

    let n = grid.nodes_per_axis();
    let plane = n * n;
    let mut rhs = vec![0.0; grid.node_count()];
    rhs.par_chunks_mut(plane).enumerate().for_each(|(k, slice)| {
        for j in 0..n {
            for i in 0..n {
                if grid.is_boundary(i, j, k) {
                    continue;
                }
                let idx = i + n * j + plane * k;
                let div = (field[idx + 1].x - field[idx - 1].x)
                    + (field[idx + n].y - field[idx - n].y)
                    + (field[idx + plane].z - field[idx - plane].z);
                slice[i + n * j] = -0.5 * h * div;
            }
        }
    });
    rhs
}
