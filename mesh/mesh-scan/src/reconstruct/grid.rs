//! Dense cubic node grid used by the Poisson solver.
//!
//! A grid at depth `d` divides a cube into `2^d` cells per axis and stores
//! one value per node, so there are `2^d + 1` nodes per axis. Values live in
//! plain slices indexed with `x` varying fastest; the grid only describes the
//! geometry.

use nalgebra::Point3;

/// Geometry of a cubic node grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubeGrid {
    depth: u32,
    origin: Point3<f64>,
    edge: f64,
}

impl CubeGrid {
    /// A grid with `2^depth` cells per axis covering the cube with minimum
    /// corner `origin` and side length `edge`.
    pub const fn new(depth: u32, origin: Point3<f64>, edge: f64) -> Self {
        Self {
            depth,
            origin,
            edge,
        }
    }

    /// Subdivision depth.
    pub const fn depth(&self) -> u32 {
        self.depth
    }

    /// The grid one depth finer over the same cube.
    pub const fn child(&self) -> Self {
        Self::new(self.depth + 1, self.origin, self.edge)
    }

    /// Cells per axis.
    pub const fn cells(&self) -> usize {
        1 << self.depth
    }

    /// Nodes per axis.
    pub const fn nodes_per_axis(&self) -> usize {
        self.cells() + 1
    }

    /// Total node count.
    pub const fn node_count(&self) -> usize {
        let n = self.nodes_per_axis();
        n * n * n
    }

    /// Side length of one cell.
    pub fn cell_size(&self) -> f64 {
        self.edge / self.cells() as f64
    }

    /// Linear index of node `(i, j, k)`.
    pub const fn index(&self, i: usize, j: usize, k: usize) -> usize {
        let n = self.nodes_per_axis();
        i + n * (j + n * k)
    }

    /// Node `(i, j, k)` of a linear index.
    pub const fn coords(&self, index: usize) -> [usize; 3] {
        let n = self.nodes_per_axis();
        [index % n, (index / n) % n, index / (n * n)]
    }

    /// World position of the node with linear index `index`.
    pub fn position_of(&self, index: usize) -> Point3<f64> {
        let [i, j, k] = self.coords(index);
        self.node_position(i, j, k)
    }

    /// Node indices of the eight corners of `cell`, corner `c` offset by
    /// `(c & 1, (c >> 1) & 1, (c >> 2) & 1)`.
    pub fn cell_corners(&self, [i, j, k]: [usize; 3]) -> [usize; 8] {
        std::array::from_fn(|c| self.index(i + (c & 1), j + ((c >> 1) & 1), k + ((c >> 2) & 1)))
    }

    /// World position of node `(i, j, k)`.
    pub fn node_position(&self, i: usize, j: usize, k: usize) -> Point3<f64> {
        let h = self.cell_size();
        Point3::new(
            (i as f64).mul_add(h, self.origin.x),
            (j as f64).mul_add(h, self.origin.y),
            (k as f64).mul_add(h, self.origin.z),
        )
    }

    /// Returns `true` for nodes on the faces of the cube.
    pub const fn is_boundary(&self, i: usize, j: usize, k: usize) -> bool {
        let last = self.cells();
        i == 0 || j == 0 || k == 0 || i == last || j == last || k == last
    }

    /// The cell containing `point` and the fractional position inside it.
    ///
    /// Points outside the cube are clamped onto it.
    pub fn locate(&self, point: &Point3<f64>) -> ([usize; 3], [f64; 3]) {
        let h = self.cell_size();
        let max_cell = self.cells() - 1;
        let mut cell = [0; 3];
        let mut frac = [0.0; 3];
        for axis in 0..3 {
            let u = ((point[axis] - self.origin[axis]) / h).clamp(0.0, self.cells() as f64);
            let base = (u.floor() as usize).min(max_cell);
            cell[axis] = base;
            frac[axis] = (u - base as f64).clamp(0.0, 1.0);
        }
        (cell, frac)
    }

    /// Node indices and trilinear weights of the eight corners around
    /// `point`. Corner `c` is offset by `(c & 1, (c >> 1) & 1, (c >> 2) & 1)`.
    pub fn corner_weights(&self, point: &Point3<f64>) -> [(usize, f64); 8] {
        let ([ci, cj, ck], [tx, ty, tz]) = self.locate(point);
        let mut out = [(0, 0.0); 8];
        for (c, slot) in out.iter_mut().enumerate() {
            let (dx, dy, dz) = (c & 1, (c >> 1) & 1, (c >> 2) & 1);
            let wx = if dx == 1 { tx } else { 1.0 - tx };
            let wy = if dy == 1 { ty } else { 1.0 - ty };
            let wz = if dz == 1 { tz } else { 1.0 - tz };
            *slot = (self.index(ci + dx, cj + dy, ck + dz), wx * wy * wz);
        }
        out
    }

    /// Trilinear interpolation of node `values` at `point`.
    pub fn sample(&self, values: &[f64], point: &Point3<f64>) -> f64 {
        self.corner_weights(point)
            .iter()
            .map(|&(idx, w)| w * values[idx])
            .sum()
    }

    /// Resample `values` defined on `coarse` onto this grid's nodes.
    ///
    /// Both grids must cover the same cube.
    pub fn prolong(&self, coarse: &Self, values: &[f64]) -> Vec<f64> {
        let n = self.nodes_per_axis();
        let mut out = vec![0.0; self.node_count()];
        for k in 0..n {
            for j in 0..n {
                for i in 0..n {
                    if self.is_boundary(i, j, k) {
                        continue;
                    }
                    let p = self.node_position(i, j, k);
                    out[self.index(i, j, k)] = coarse.sample(values, &p);
                }
            }
        }
        out
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_grid(depth: u32) -> CubeGrid {
        CubeGrid::new(depth, Point3::origin(), 1.0)
    }

    #[test]
    fn test_sizes() {
        let grid = unit_grid(3);
        assert_eq!(grid.cells(), 8);
        assert_eq!(grid.nodes_per_axis(), 9);
        assert_eq!(grid.node_count(), 729);
        assert_relative_eq!(grid.cell_size(), 0.125);
        assert_eq!(grid.index(1, 1, 1), 1 + 9 + 81);
    }

    #[test]
    fn test_child_halves_cells() {
        let grid = CubeGrid::new(2, Point3::new(-1.0, 0.0, 0.0), 4.0);
        let child = grid.child();
        assert_eq!(child.depth(), 3);
        assert_relative_eq!(child.cell_size(), 0.5);
        assert_eq!(child.node_position(0, 0, 0), grid.node_position(0, 0, 0));
    }

    #[test]
    fn test_linear_index_round_trip() {
        let grid = unit_grid(3);
        let idx = grid.index(2, 7, 5);
        assert_eq!(grid.coords(idx), [2, 7, 5]);
        assert_eq!(grid.position_of(idx), grid.node_position(2, 7, 5));

        let corners = grid.cell_corners([1, 2, 3]);
        assert_eq!(corners[0], grid.index(1, 2, 3));
        assert_eq!(corners[7], grid.index(2, 3, 4));
        assert_eq!(corners[5], grid.index(2, 2, 4));
    }

    #[test]
    fn test_locate_clamps_to_cube() {
        let grid = unit_grid(2);
        let (cell, frac) = grid.locate(&Point3::new(1.0, -3.0, 0.3));
        assert_eq!(cell, [3, 0, 1]);
        assert_relative_eq!(frac[0], 1.0);
        assert_relative_eq!(frac[1], 0.0);
        assert_relative_eq!(frac[2], 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_weights_sum_to_one() {
        let grid = unit_grid(4);
        let w: f64 = grid
            .corner_weights(&Point3::new(0.31, 0.77, 0.05))
            .iter()
            .map(|&(_, w)| w)
            .sum();
        assert_relative_eq!(w, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sample_reproduces_linear_field() {
        let grid = unit_grid(3);
        let n = grid.nodes_per_axis();
        let mut values = vec![0.0; grid.node_count()];
        for k in 0..n {
            for j in 0..n {
                for i in 0..n {
                    let p = grid.node_position(i, j, k);
                    values[grid.index(i, j, k)] = 2.0 * p.x - p.y + 0.5 * p.z;
                }
            }
        }
        let q = Point3::new(0.43, 0.12, 0.9);
        assert_relative_eq!(grid.sample(&values, &q), 2.0 * 0.43 - 0.12 + 0.45, epsilon = 1e-12);
    }

    #[test]
    fn test_prolong_keeps_boundary_zero() {
        let coarse = unit_grid(2);
        let fine = unit_grid(3);
        let values = vec![1.0; coarse.node_count()];
        let out = fine.prolong(&coarse, &values);
        assert_eq!(out[fine.index(0, 4, 4)], 0.0);
        assert_relative_eq!(out[fine.index(4, 4, 4)], 1.0);
    }
}
