//! Narrow-band refinement past the deepest dense grid.
//!
//! A dense grid at depth `d` stores `(2^d + 1)^3` nodes, which stops being
//! affordable around depth 7. Deeper levels only store the nodes of cells
//! near the previous level's isosurface: the cells whose corners straddle the
//! iso value, plus one cell on each face. Nodes just outside the band take
//! their values from the coarser levels and act as a Dirichlet boundary for
//! the band solve, so each level only corrects the surface locally.

use hashbrown::{HashMap, HashSet};
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use super::extract::crosses;
use super::grid::CubeGrid;
use super::solver::{SolveStats, SolverConfig, conjugate_gradient};
use crate::error::ScanResult;

/// Marks a missing neighbor in the band operator.
const FIXED: u32 = u32::MAX;

/// A band level: node values for a sparse set of cells.
#[derive(Debug, Clone)]
pub(super) struct BandLevel {
    pub grid: CubeGrid,
    pub values: HashMap<usize, f64>,
    /// Band cells in `(k, j, i)` order.
    pub cells: Vec<[usize; 3]>,
}

impl BandLevel {
    /// Trilinear sample at `point`, or `None` if any corner lies outside the band.
    fn try_sample(&self, point: &Point3<f64>) -> Option<f64> {
        let mut sum = 0.0;
        for (idx, w) in self.grid.corner_weights(point) {
            sum += w * self.values.get(&idx)?;
        }
        Some(sum)
    }
}

/// The solution at every depth, coarse to fine. The first level is dense.
#[derive(Debug, Clone)]
pub(super) struct LevelStack {
    base: CubeGrid,
    base_values: Vec<f64>,
    bands: Vec<BandLevel>,
}

impl LevelStack {
    pub fn new(base: CubeGrid, base_values: Vec<f64>) -> Self {
        Self {
            base,
            base_values,
            bands: Vec::new(),
        }
    }

    /// The dense grid the stack starts from.
    pub const fn base(&self) -> &CubeGrid {
        &self.base
    }

    /// The finest band, if any level past the dense grid was solved.
    pub fn finest_band(&self) -> Option<&BandLevel> {
        self.bands.last()
    }

    /// Node values of the dense base grid.
    pub fn base_values(&self) -> &[f64] {
        &self.base_values
    }

    fn finest_grid(&self) -> &CubeGrid {
        self.bands.last().map_or(&self.base, |band| &band.grid)
    }

    /// Sample the finest level that covers `point`.
    pub fn sample(&self, point: &Point3<f64>) -> f64 {
        self.bands
            .iter()
            .rev()
            .find_map(|band| band.try_sample(point))
            .unwrap_or_else(|| self.base.sample(&self.base_values, point))
    }

    /// Mean of the finest solution over `positions`.
    pub fn iso_value(&self, positions: &[Point3<f64>]) -> f64 {
        if positions.is_empty() {
            return 0.0;
        }
        positions.iter().map(|p| self.sample(p)).sum::<f64>() / positions.len() as f64
    }

    /// Cells of the finest level whose corners straddle `iso`.
    fn crossing_cells(&self, iso: f64) -> Vec<[usize; 3]> {
        match self.bands.last() {
            Some(band) => band
                .cells
                .iter()
                .copied()
                .filter(|&cell| crosses(&band.values, &band.grid.cell_corners(cell), iso))
                .collect(),
            None => {
                let grid = &self.base;
                let cells = grid.cells();
                let mut out = Vec::new();
                for k in 0..cells {
                    for j in 0..cells {
                        for i in 0..cells {
                            let cell = [i, j, k];
                            if crosses(self.base_values.as_slice(), &grid.cell_corners(cell), iso) {
                                out.push(cell);
                            }
                        }
                    }
                }
                out
            }
        }
    }

    /// Solve one depth finer in a band around the current `iso` surface.
    pub fn refine(
        &mut self,
        positions: &[Point3<f64>],
        normals: &[Vector3<f64>],
        iso: f64,
        config: &SolverConfig,
    ) -> ScanResult<SolveStats> {
        let grid = self.finest_grid().child();
        let cells = self.band_cells(&grid, iso);

        let mut nodes: Vec<usize> = cells
            .iter()
            .flat_map(|&cell| grid.cell_corners(cell))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        nodes.sort_unstable();

        let prolonged: Vec<f64> = nodes.par_iter().map(|&n| self.sample(&grid.position_of(n))).collect();

        let unknowns: Vec<usize> = nodes
            .iter()
            .copied()
            .filter(|&n| {
                let [i, j, k] = grid.coords(n);
                !grid.is_boundary(i, j, k)
            })
            .collect();
        let slot: HashMap<usize, u32> = unknowns
            .iter()
            .enumerate()
            .map(|(s, &n)| (n, s as u32))
            .collect();

        let n = grid.nodes_per_axis();
        let offsets = [1, n, n * n];
        let field = splat_normals(&grid, positions, normals);
        let h = grid.cell_size();

        let mut neighbors = Vec::with_capacity(unknowns.len());
        let mut b = Vec::with_capacity(unknowns.len());
        for &node in &unknowns {
            let mut links = [FIXED; 6];
            let mut fixed = 0.0;
            let mut div = 0.0;
            for (axis, &step) in offsets.iter().enumerate() {
                let (lo, hi) = (node - step, node + step);
                div += field.get(&hi).map_or(0.0, |v| v[axis]) - field.get(&lo).map_or(0.0, |v| v[axis]);
                for (side, nb) in [lo, hi].into_iter().enumerate() {
                    match slot.get(&nb) {
                        Some(&s) => links[2 * axis + side] = s,
                        None => fixed += self.sample(&grid.position_of(nb)),
                    }
                }
            }
            neighbors.push(links);
            b.push((-0.5 * h).mul_add(div, fixed));
        }

        let mut x: Vec<f64> = unknowns
            .iter()
            .map(|node| nodes.binary_search(node).map_or(0.0, |i| prolonged[i]))
            .collect();
        let stats = conjugate_gradient(
            |v, out| apply_band(&neighbors, v, out),
            &b,
            &mut x,
            config,
            grid.depth(),
        )?;

        let mut values: HashMap<usize, f64> = nodes.iter().copied().zip(prolonged).collect();
        for (node, value) in unknowns.iter().zip(x) {
            values.insert(*node, value);
        }

        self.bands.push(BandLevel { grid, values, cells });
        Ok(stats)
    }

    /// Cells of `grid` (one depth below the finest level) to solve: children
    /// of crossing cells that still cross after prolongation, grown by one
    /// cell across each face.
    fn band_cells(&self, grid: &CubeGrid, iso: f64) -> Vec<[usize; 3]> {
        let mut prolonged: HashMap<usize, f64> = HashMap::new();
        let mut crossing = Vec::new();
        for [ci, cj, ck] in self.crossing_cells(iso) {
            for c in 0..8 {
                let cell = [2 * ci + (c & 1), 2 * cj + ((c >> 1) & 1), 2 * ck + ((c >> 2) & 1)];
                let corners = grid.cell_corners(cell);
                for node in corners {
                    prolonged
                        .entry(node)
                        .or_insert_with(|| self.sample(&grid.position_of(node)));
                }
                if crosses(&prolonged, &corners, iso) {
                    crossing.push(cell);
                }
            }
        }

        let last = grid.cells() - 1;
        let mut band: HashSet<[usize; 3]> = HashSet::with_capacity(crossing.len() * 3);
        for [i, j, k] in crossing {
            band.insert([i, j, k]);
            if i > 0 {
                band.insert([i - 1, j, k]);
            }
            if i < last {
                band.insert([i + 1, j, k]);
            }
            if j > 0 {
                band.insert([i, j - 1, k]);
            }
            if j < last {
                band.insert([i, j + 1, k]);
            }
            if k > 0 {
                band.insert([i, j, k - 1]);
            }
            if k < last {
                band.insert([i, j, k + 1]);
            }
        }

        let mut cells: Vec<_> = band.into_iter().collect();
        cells.sort_unstable_by_key(|&[i, j, k]| (k, j, i));
        cells
    }
}

/// Normals splatted onto the nodes of `grid`, scaled by `1/h³` like the dense
/// levels.
fn splat_normals(
    grid: &CubeGrid,
    positions: &[Point3<f64>],
    normals: &[Vector3<f64>],
) -> HashMap<usize, Vector3<f64>> {
    let density_scale = grid.cell_size().powi(3).recip();
    let mut field: HashMap<usize, Vector3<f64>> = HashMap::new();
    for (p, normal) in positions.iter().zip(normals) {
        for (idx, w) in grid.corner_weights(p) {
            *field.entry(idx).or_insert_with(Vector3::zeros) += normal * (w * density_scale);
        }
    }
    field
}

/// `out = A x` for the band: `6·x[s] − Σ x[linked neighbors]`.
fn apply_band(neighbors: &[[u32; 6]], x: &[f64], out: &mut [f64]) {
    out.par_iter_mut().enumerate().for_each(|(s, o)| {
        let sum: f64 = neighbors[s]
            .iter()
            .filter(|&&t| t != FIXED)
            .map(|&t| x[t as usize])
            .sum();
        *o = 6.0f64.mul_add(x[s], -sum);
    });
}
