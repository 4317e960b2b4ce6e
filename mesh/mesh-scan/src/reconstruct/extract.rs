//! Isosurface extraction and density trimming.
//!
//! Extraction uses marching tetrahedra: every grid cell is split into six
//! tetrahedra sharing the cell's main diagonal. Adjacent cells split their
//! common faces the same way, so the surface has no cracks, and the handful
//! of tetrahedron cases needs no lookup tables.

use hashbrown::HashMap;
use mesh_types::{IndexedMesh, Vertex};
use nalgebra::{Point3, Vector3};

use super::grid::CubeGrid;
use crate::error::{ScanError, ScanResult};

/// The six tetrahedra of a cell, as corner ids `dx + 2·dy + 4·dz`.
const TETRAHEDRA: [[usize; 4]; 6] = [
    [0, 1, 3, 7],
    [0, 1, 5, 7],
    [0, 2, 3, 7],
    [0, 2, 6, 7],
    [0, 4, 5, 7],
    [0, 4, 6, 7],
];

/// Node values addressed by linear node index.
pub(super) trait NodeValues {
    fn value(&self, node: usize) -> f64;
}

impl NodeValues for [f64] {
    fn value(&self, node: usize) -> f64 {
        self[node]
    }
}

impl NodeValues for HashMap<usize, f64> {
    fn value(&self, node: usize) -> f64 {
        self.get(&node).copied().unwrap_or_default()
    }
}

/// Returns `true` if the corners of a cell lie on both sides of `iso`.
pub(super) fn crosses<V: NodeValues + ?Sized>(values: &V, corners: &[usize; 8], iso: f64) -> bool {
    let below = corners.iter().filter(|&&c| values.value(c) < iso).count();
    below != 0 && below != 8
}

struct Extractor<'a, V: ?Sized> {
    grid: &'a CubeGrid,
    values: &'a V,
    iso: f64,
    mesh: IndexedMesh,
    edge_vertices: HashMap<(usize, usize), u32>,
}

impl<V: NodeValues + ?Sized> Extractor<'_, V> {
    fn node_position(&self, index: usize) -> Point3<f64> {
        self.grid.position_of(index)
    }

    /// Vertex where the isosurface crosses the edge between two nodes.
    fn edge_vertex(&mut self, a: usize, b: usize) -> u32 {
        let key = (a.min(b), a.max(b));
        if let Some(&v) = self.edge_vertices.get(&key) {
            return v;
        }

        let (lo, hi) = key;
        let (v_lo, v_hi) = (self.values.value(lo), self.values.value(hi));
        let denom = v_hi - v_lo;
        let t = if denom.abs() > f64::EPSILON {
            ((self.iso - v_lo) / denom).clamp(0.0, 1.0)
        } else {
            0.5
        };
        let p_lo = self.node_position(lo);
        let p_hi = self.node_position(hi);
        let position = p_lo + (p_hi - p_lo) * t;

        let id = self.mesh.vertices.len() as u32;
        self.mesh.vertices.push(Vertex::new(position));
        self.edge_vertices.insert(key, id);
        id
    }

    /// Emit a triangle wound so its normal points along `outward`.
    fn emit(&mut self, mut tri: [u32; 3], outward: Vector3<f64>) {
        let p = tri.map(|v| self.mesh.vertices[v as usize].position);
        let normal = (p[1] - p[0]).cross(&(p[2] - p[0]));
        if normal.dot(&outward) < 0.0 {
            tri.swap(1, 2);
        }
        self.mesh.faces.push(tri);
    }

    fn tetrahedron(&mut self, nodes: [usize; 4]) {
        let inside: Vec<usize> = nodes
            .iter()
            .copied()
            .filter(|&n| self.values.value(n) < self.iso)
            .collect();
        let outside: Vec<usize> = nodes
            .iter()
            .copied()
            .filter(|&n| self.values.value(n) >= self.iso)
            .collect();
        if inside.is_empty() || outside.is_empty() {
            return;
        }

        let centroid = |ids: &[usize]| -> Vector3<f64> {
            ids.iter()
                .map(|&id| self.node_position(id).coords)
                .sum::<Vector3<f64>>()
                / ids.len() as f64
        };
        let outward = centroid(&outside) - centroid(&inside);

        match (inside.as_slice(), outside.as_slice()) {
            ([a], [b, c, d]) | ([b, c, d], [a]) => {
                let tri = [
                    self.edge_vertex(*a, *b),
                    self.edge_vertex(*a, *c),
                    self.edge_vertex(*a, *d),
                ];
                self.emit(tri, outward);
            }
            ([a, b], [c, d]) => {
                let ac = self.edge_vertex(*a, *c);
                let ad = self.edge_vertex(*a, *d);
                let bd = self.edge_vertex(*b, *d);
                let bc = self.edge_vertex(*b, *c);
                self.emit([ac, ad, bd], outward);
                self.emit([ac, bd, bc], outward);
            }
            _ => {}
        }
    }
}

/// Extract the surface `value == iso` from node values on `grid`.
///
/// Nodes with `value < iso` are inside. Triangles face from inside to
/// outside. Vertices on shared edges are emitted once.
pub fn extract_isosurface(grid: &CubeGrid, values: &[f64], iso: f64) -> IndexedMesh {
    let cells = grid.cells();
    let all = (0..cells).flat_map(move |k| (0..cells).flat_map(move |j| (0..cells).map(move |i| [i, j, k])));
    extract_cells(grid, values, iso, all)
}

/// Extract the surface from a sparse set of `cells`, each with all eight
/// corners present in `values`.
pub(super) fn extract_band(
    grid: &CubeGrid,
    values: &HashMap<usize, f64>,
    iso: f64,
    cells: &[[usize; 3]],
) -> IndexedMesh {
    extract_cells(grid, values, iso, cells.iter().copied())
}

fn extract_cells<V, I>(grid: &CubeGrid, values: &V, iso: f64, cells: I) -> IndexedMesh
where
    V: NodeValues + ?Sized,
    I: IntoIterator<Item = [usize; 3]>,
{
    let mut ex = Extractor {
        grid,
        values,
        iso,
        mesh: IndexedMesh::new(),
        edge_vertices: HashMap::new(),
    };

    for cell in cells {
        let corners = grid.cell_corners(cell);
        if !crosses(values, &corners, iso) {
            continue;
        }
        for tet in TETRAHEDRA {
            ex.tetrahedron(tet.map(|c| corners[c]));
        }
    }

    ex.mesh
}

/// Per-vertex sample density in `[0, 1]`.
///
/// Each vertex gets the number of `samples` that fall in its grid cell,
/// divided by the largest such count.
pub fn vertex_densities(grid: &CubeGrid, mesh: &IndexedMesh, samples: &[Point3<f64>]) -> Vec<f64> {
    let cell_key = |p: &Point3<f64>| grid.locate(p).0;

    let mut counts: HashMap<[usize; 3], u32> = HashMap::new();
    for p in samples {
        *counts.entry(cell_key(p)).or_insert(0) += 1;
    }

    let raw: Vec<f64> = mesh
        .vertices
        .iter()
        .map(|v| f64::from(counts.get(&cell_key(&v.position)).copied().unwrap_or(0)))
        .collect();
    let max = raw.iter().copied().fold(0.0, f64::max);
    if max <= 0.0 {
        return vec![0.0; raw.len()];
    }
    raw.into_iter().map(|d| d / max).collect()
}

/// Remove vertices whose density is below the given quantile of all
/// densities, along with every face that uses them.
///
/// # Errors
///
/// Returns [`ScanError::InvalidParameter`] if `densities` does not have one
/// entry per vertex or `quantile` is outside `[0, 1]`.
///
/// # Example
///
/// ```
/// use mesh_scan::reconstruct::trim_low_density;
/// use mesh_types::{IndexedMesh, Vertex};
///
/// let mesh = IndexedMesh::from_parts(
///     vec![
///         Vertex::from_coords(0.0, 0.0, 0.0),
///         Vertex::from_coords(1.0, 0.0, 0.0),
///         Vertex::from_coords(0.0, 1.0, 0.0),
///         Vertex::from_coords(1.0, 1.0, 0.0),
///     ],
///     vec![[0, 1, 2], [1, 3, 2]],
/// );
/// let trimmed = trim_low_density(&mesh, &[1.0, 1.0, 1.0, 0.1], 0.5).unwrap();
/// assert_eq!(trimmed.face_count(), 1);
/// assert_eq!(trimmed.vertex_count(), 3);
/// ```
pub fn trim_low_density(mesh: &IndexedMesh, densities: &[f64], quantile: f64) -> ScanResult<IndexedMesh> {
    if densities.len() != mesh.vertices.len() {
        return Err(ScanError::invalid(format!(
            "{} densities for {} vertices",
            densities.len(),
            mesh.vertices.len()
        )));
    }
    if !(0.0..=1.0).contains(&quantile) {
        return Err(ScanError::invalid(format!("quantile must be in [0, 1], got {quantile}")));
    }
    if densities.is_empty() {
        return Ok(mesh.clone());
    }

    let mut sorted = densities.to_vec();
    sorted.sort_by(f64::total_cmp);
    let threshold = sorted[((sorted.len() - 1) as f64 * quantile).floor() as usize];

    let mut remap: Vec<Option<u32>> = vec![None; mesh.vertices.len()];
    let mut out = IndexedMesh::new();
    for (i, (vertex, &density)) in mesh.vertices.iter().zip(densities).enumerate() {
        if density >= threshold {
            remap[i] = Some(out.vertices.len() as u32);
            out.vertices.push(vertex.clone());
        }
    }
    out.faces = mesh
        .faces
        .iter()
        .filter_map(|face| {
            let a = remap.get(face[0] as usize).copied().flatten()?;
            let b = remap.get(face[1] as usize).copied().flatten()?;
            let c = remap.get(face[2] as usize).copied().flatten()?;
            Some([a, b, c])
        })
        .collect();

    // Drop vertices only referenced by removed faces.
    let mut used = vec![false; out.vertices.len()];
    for face in &out.faces {
        for &v in face {
            used[v as usize] = true;
        }
    }
    let mut compact: Vec<Option<u32>> = vec![None; out.vertices.len()];
    let mut vertices = Vec::new();
    for (i, vertex) in out.vertices.into_iter().enumerate() {
        if used[i] {
            compact[i] = Some(vertices.len() as u32);
            vertices.push(vertex);
        }
    }
    let faces = out
        .faces
        .iter()
        .filter_map(|f| Some([compact[f[0] as usize]?, compact[f[1] as usize]?, compact[f[2] as usize]?]))
        .collect();

    Ok(IndexedMesh::from_parts(vertices, faces))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mesh_repair::validate_mesh;

    fn sphere_field(grid: &CubeGrid, center: Point3<f64>) -> Vec<f64> {
        let n = grid.nodes_per_axis();
        let mut values = vec![0.0; grid.node_count()];
        for k in 0..n {
            for j in 0..n {
                for i in 0..n {
                    values[grid.index(i, j, k)] = (grid.node_position(i, j, k) - center).norm();
                }
            }
        }
        values
    }

    #[test]
    fn test_sphere_is_closed_and_outward() {
        let grid = CubeGrid::new(4, Point3::new(-1.0, -1.0, -1.0), 2.0);
        let values = sphere_field(&grid, Point3::new(0.01, 0.02, 0.03));
        let mesh = extract_isosurface(&grid, &values, 0.7);

        assert!(mesh.face_count() > 0);
        assert!(mesh.has_valid_indices());

        let report = validate_mesh(&mesh);
        assert_eq!(report.boundary_edge_count, 0);
        assert!(report.is_manifold());

        let expected = 4.0 / 3.0 * std::f64::consts::PI * 0.7f64.powi(3);
        let volume = mesh.signed_volume();
        assert!(volume > 0.0);
        assert_relative_eq!(volume, expected, max_relative = 0.1);

        for v in &mesh.vertices {
            let r = (v.position - Point3::new(0.01, 0.02, 0.03)).norm();
            assert!((r - 0.7).abs() < grid.cell_size());
        }
    }

    #[test]
    fn test_edge_vertices_are_shared() {
        let grid = CubeGrid::new(3, Point3::origin(), 1.0);
        let values = sphere_field(&grid, Point3::new(0.5, 0.5, 0.5));
        let mesh = extract_isosurface(&grid, &values, 0.3);
        // A closed triangle mesh has about twice as many faces as vertices.
        assert!(mesh.face_count() >= mesh.vertex_count());
    }

    #[test]
    fn test_constant_field_is_empty() {
        let grid = CubeGrid::new(2, Point3::origin(), 1.0);
        let values = vec![1.0; grid.node_count()];
        assert!(extract_isosurface(&grid, &values, 1.0).is_empty());
        assert!(extract_isosurface(&grid, &values, 0.5).is_empty());
    }

    #[test]
    fn test_band_matches_dense_on_the_same_cells() {
        let grid = CubeGrid::new(3, Point3::origin(), 1.0);
        let dense = sphere_field(&grid, Point3::new(0.5, 0.5, 0.5));

        let cells = grid.cells();
        let mut band_cells = Vec::new();
        let mut sparse = HashMap::new();
        for k in 0..cells {
            for j in 0..cells {
                for i in 0..cells {
                    let corners = grid.cell_corners([i, j, k]);
                    if crosses(dense.as_slice(), &corners, 0.3) {
                        band_cells.push([i, j, k]);
                        for c in corners {
                            sparse.insert(c, dense[c]);
                        }
                    }
                }
            }
        }

        let from_band = extract_band(&grid, &sparse, 0.3, &band_cells);
        let from_dense = extract_isosurface(&grid, &dense, 0.3);
        assert_eq!(from_band, from_dense);
    }

    #[test]
    fn test_densities_are_normalized() {
        let grid = CubeGrid::new(2, Point3::origin(), 4.0);
        let mesh = IndexedMesh::from_parts(
            vec![
                Vertex::from_coords(0.5, 0.5, 0.5),
                Vertex::from_coords(1.5, 0.5, 0.5),
                Vertex::from_coords(3.5, 3.5, 3.5),
            ],
            vec![[0, 1, 2]],
        );
        let samples = [
            Point3::new(0.2, 0.2, 0.2),
            Point3::new(0.7, 0.3, 0.9),
            Point3::new(1.2, 0.1, 0.1),
        ];
        let d = vertex_densities(&grid, &mesh, &samples);
        assert_eq!(d, vec![1.0, 0.5, 0.0]);
    }

    #[test]
    fn test_trim_rejects_bad_input() {
        let mesh = IndexedMesh::from_parts(vec![Vertex::from_coords(0.0, 0.0, 0.0)], vec![]);
        assert!(trim_low_density(&mesh, &[], 0.5).is_err());
        assert!(trim_low_density(&mesh, &[1.0], 1.5).is_err());
    }

    #[test]
    fn test_trim_zero_quantile_keeps_everything() {
        let grid = CubeGrid::new(3, Point3::origin(), 1.0);
        let values = sphere_field(&grid, Point3::new(0.5, 0.5, 0.5));
        let mesh = extract_isosurface(&grid, &values, 0.3);
        let densities = vec![0.5; mesh.vertex_count()];
        let trimmed = trim_low_density(&mesh, &densities, 0.0).unwrap();
        assert_eq!(trimmed, mesh);
    }
}
