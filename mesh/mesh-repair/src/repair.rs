//! Core mesh clean-up operations.
//!
//! Each operation mutates the mesh in place and returns how many elements it
//! removed or merged. All of them are deterministic: the first occurrence of a
//! vertex or face in storage order is the one that survives.

use hashbrown::{HashMap, HashSet};
use mesh_types::IndexedMesh;
use nalgebra::Point3;

/// Merge vertices whose positions are bit-for-bit identical.
///
/// `-0.0` and `0.0` are treated as equal. Faces are remapped to the surviving
/// vertex; merged vertices stay in the array until
/// [`remove_unreferenced_vertices`] compacts it.
///
/// Returns the number of vertices merged.
///
/// # Example
///
/// ```
/// use mesh_types::{IndexedMesh, Vertex};
/// use mesh_repair::weld_exact;
///
/// let mut mesh = IndexedMesh::from_parts(
///     vec![
///         Vertex::from_coords(0.0, 0.0, 0.0),
///         Vertex::from_coords(1.0, 0.0, 0.0),
///         Vertex::from_coords(0.0, 1.0, 0.0),
///         Vertex::from_coords(1.0, 0.0, 0.0),
///     ],
///     vec![[0, 1, 2], [0, 3, 2]],
/// );
///
/// assert_eq!(weld_exact(&mut mesh), 1);
/// assert_eq!(mesh.faces[1], [0, 1, 2]);
/// ```
#[allow(clippy::cast_possible_truncation)]
pub fn weld_exact(mesh: &mut IndexedMesh) -> usize {
    let mut first_seen: HashMap<[u64; 3], u32> = HashMap::with_capacity(mesh.vertices.len());
    let mut remap: Vec<u32> = Vec::with_capacity(mesh.vertices.len());
    let mut merged = 0;

    for (idx, vertex) in mesh.vertices.iter().enumerate() {
        let key = position_bits(&vertex.position);
        let target = *first_seen.entry(key).or_insert(idx as u32);
        if target != idx as u32 {
            merged += 1;
        }
        remap.push(target);
    }

    if merged > 0 {
        remap_faces(mesh, &remap);
    }
    merged
}

/// Merge vertices closer than `epsilon` using a uniform spatial hash.
///
/// Falls back to [`weld_exact`] when `epsilon <= 0`. Returns the number of
/// vertices merged.
#[allow(clippy::cast_possible_truncation)]
pub fn weld_vertices(mesh: &mut IndexedMesh, epsilon: f64) -> usize {
    if epsilon <= 0.0 || !epsilon.is_finite() {
        return weld_exact(mesh);
    }

    let mut buckets: HashMap<[i64; 3], Vec<u32>> = HashMap::new();
    let mut remap: Vec<u32> = Vec::with_capacity(mesh.vertices.len());
    let mut merged = 0;

    for (idx, vertex) in mesh.vertices.iter().enumerate() {
        let p = vertex.position;
        let cell = cell_of(&p, epsilon);
        let mut target = idx as u32;

        'search: for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let Some(candidates) = buckets.get(&[cell[0] + dx, cell[1] + dy, cell[2] + dz])
                    else {
                        continue;
                    };
                    for &other in candidates {
                        if (mesh.vertices[other as usize].position - p).norm() < epsilon {
                            target = other;
                            break 'search;
                        }
                    }
                }
            }
        }

        if target == idx as u32 {
            buckets.entry(cell).or_default().push(target);
        } else {
            merged += 1;
        }
        remap.push(target);
    }

    if merged > 0 {
        remap_faces(mesh, &remap);
    }
    merged
}

/// Remove faces that repeat a vertex index, reference a missing vertex, or
/// have area not greater than `area_threshold` (non-finite areas included).
///
/// Returns the number of faces removed.
///
/// # Example
///
/// ```
/// use mesh_types::{IndexedMesh, Vertex};
/// use mesh_repair::remove_degenerate_triangles;
///
/// let mut mesh = IndexedMesh::from_parts(
///     vec![
///         Vertex::from_coords(0.0, 0.0, 0.0),
///         Vertex::from_coords(10.0, 0.0, 0.0),
///         Vertex::from_coords(5.0, 0.0, 0.0), // collinear
///     ],
///     vec![[0, 1, 2], [0, 0, 1]],
/// );
///
/// assert_eq!(remove_degenerate_triangles(&mut mesh, 0.0), 2);
/// assert!(mesh.faces.is_empty());
/// ```
pub fn remove_degenerate_triangles(mesh: &mut IndexedMesh, area_threshold: f64) -> usize {
    let before = mesh.faces.len();
    let vertices = &mesh.vertices;

    mesh.faces.retain(|&[a, b, c]| {
        if a == b || b == c || a == c {
            return false;
        }
        let (Some(p0), Some(p1), Some(p2)) = (
            vertices.get(a as usize),
            vertices.get(b as usize),
            vertices.get(c as usize),
        ) else {
            return false;
        };
        let doubled = (p1.position - p0.position)
            .cross(&(p2.position - p0.position))
            .norm();
        // Faces too small to yield a unit normal count as degenerate.
        doubled.is_finite() && doubled > f64::EPSILON && doubled * 0.5 > area_threshold
    });

    before - mesh.faces.len()
}

/// Remove faces that use the same three vertices as an earlier face,
/// regardless of winding or starting corner.
///
/// Returns the number of faces removed.
///
/// # Example
///
/// ```
/// use mesh_types::{IndexedMesh, Vertex};
/// use mesh_repair::remove_duplicate_faces;
///
/// let mut mesh = IndexedMesh::from_parts(
///     vec![
///         Vertex::from_coords(0.0, 0.0, 0.0),
///         Vertex::from_coords(1.0, 0.0, 0.0),
///         Vertex::from_coords(0.0, 1.0, 0.0),
///     ],
///     vec![[0, 1, 2], [2, 1, 0]],
/// );
///
/// assert_eq!(remove_duplicate_faces(&mut mesh), 1);
/// ```
pub fn remove_duplicate_faces(mesh: &mut IndexedMesh) -> usize {
    let before = mesh.faces.len();
    let mut seen: HashSet<[u32; 3]> = HashSet::with_capacity(before);

    mesh.faces.retain(|face| {
        let mut key = *face;
        key.sort_unstable();
        seen.insert(key)
    });

    before - mesh.faces.len()
}

/// Drop vertices no face refers to and compact the vertex array.
///
/// Surviving vertices keep their relative order. Returns the number of
/// vertices removed.
///
/// # Example
///
/// ```
/// use mesh_types::{IndexedMesh, Vertex};
/// use mesh_repair::remove_unreferenced_vertices;
///
/// let mut mesh = IndexedMesh::from_parts(
///     vec![
///         Vertex::from_coords(9.0, 9.0, 9.0), // unreferenced
///         Vertex::from_coords(0.0, 0.0, 0.0),
///         Vertex::from_coords(1.0, 0.0, 0.0),
///         Vertex::from_coords(0.0, 1.0, 0.0),
///     ],
///     vec![[1, 2, 3]],
/// );
///
/// assert_eq!(remove_unreferenced_vertices(&mut mesh), 1);
/// assert_eq!(mesh.faces[0], [0, 1, 2]);
/// ```
#[allow(clippy::cast_possible_truncation)]
pub fn remove_unreferenced_vertices(mesh: &mut IndexedMesh) -> usize {
    let before = mesh.vertices.len();
    let mut used = vec![false; before];
    for face in &mesh.faces {
        for &i in face {
            if let Some(slot) = used.get_mut(i as usize) {
                *slot = true;
            }
        }
    }

    if used.iter().all(|&u| u) {
        return 0;
    }

    let mut remap = vec![u32::MAX; before];
    let mut next = 0u32;
    for (old, &keep) in used.iter().enumerate() {
        if keep {
            remap[old] = next;
            next += 1;
        }
    }

    let mut idx = 0;
    mesh.vertices.retain(|_| {
        let keep = used[idx];
        idx += 1;
        keep
    });
    remap_faces(mesh, &remap);

    before - mesh.vertices.len()
}

fn remap_faces(mesh: &mut IndexedMesh, remap: &[u32]) {
    for face in &mut mesh.faces {
        for index in face.iter_mut() {
            if let Some(&target) = remap.get(*index as usize) {
                *index = target;
            }
        }
    }
}

fn position_bits(p: &Point3<f64>) -> [u64; 3] {
    // Adding 0.0 folds -0.0 into +0.0.
    [
        (p.x + 0.0).to_bits(),
        (p.y + 0.0).to_bits(),
        (p.z + 0.0).to_bits(),
    ]
}

#[allow(clippy::cast_possible_truncation)]
fn cell_of(p: &Point3<f64>, size: f64) -> [i64; 3] {
    [
        (p.x / size).floor() as i64,
        (p.y / size).floor() as i64,
        (p.z / size).floor() as i64,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_types::Vertex;

    fn quad_with_seam() -> IndexedMesh {
        // Two triangles sharing an edge, but the shared corners are stored twice.
        IndexedMesh::from_parts(
            vec![
                Vertex::from_coords(0.0, 0.0, 0.0),
                Vertex::from_coords(1.0, 0.0, 0.0),
                Vertex::from_coords(1.0, 1.0, 0.0),
                Vertex::from_coords(0.0, 0.0, 0.0),
                Vertex::from_coords(1.0, 1.0, 0.0),
                Vertex::from_coords(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [3, 4, 5]],
        )
    }

    #[test]
    fn test_weld_exact_merges_seam() {
        let mut mesh = quad_with_seam();
        assert_eq!(weld_exact(&mut mesh), 2);
        assert_eq!(mesh.faces[1], [0, 2, 5]);
        assert_eq!(remove_unreferenced_vertices(&mut mesh), 2);
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.faces[1], [0, 2, 3]);
    }

    #[test]
    fn test_weld_exact_folds_negative_zero() {
        let mut mesh = IndexedMesh::from_parts(
            vec![
                Vertex::from_coords(0.0, 0.0, 0.0),
                Vertex::from_coords(-0.0, 0.0, 0.0),
            ],
            vec![],
        );
        assert_eq!(weld_exact(&mut mesh), 1);
    }

    #[test]
    fn test_weld_exact_keeps_near_duplicates() {
        let mut mesh = IndexedMesh::from_parts(
            vec![
                Vertex::from_coords(0.0, 0.0, 0.0),
                Vertex::from_coords(1e-12, 0.0, 0.0),
            ],
            vec![],
        );
        assert_eq!(weld_exact(&mut mesh), 0);
    }

    #[test]
    fn test_weld_with_epsilon_merges_near_duplicates() {
        let mut mesh = IndexedMesh::from_parts(
            vec![
                Vertex::from_coords(0.0, 0.0, 0.0),
                Vertex::from_coords(1.0, 0.0, 0.0),
                Vertex::from_coords(0.0, 1.0, 0.0),
                Vertex::from_coords(1.0001, 0.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 3, 2]],
        );
        assert_eq!(weld_vertices(&mut mesh, 0.001), 1);
        assert_eq!(mesh.faces[1], [0, 1, 2]);
    }

    #[test]
    fn test_degenerate_removal_catches_repeated_and_missing_indices() {
        let mut mesh = quad_with_seam();
        mesh.faces.push([0, 0, 1]);
        mesh.faces.push([0, 1, 42]);
        assert_eq!(remove_degenerate_triangles(&mut mesh, 0.0), 2);
        assert_eq!(mesh.faces.len(), 2);
    }

    #[test]
    fn test_duplicate_faces_any_rotation() {
        let mut mesh = quad_with_seam();
        mesh.faces.push([1, 2, 0]);
        mesh.faces.push([2, 1, 0]);
        assert_eq!(remove_duplicate_faces(&mut mesh), 2);
        assert_eq!(mesh.faces, vec![[0, 1, 2], [3, 4, 5]]);
    }

    #[test]
    fn test_unreferenced_noop_when_all_used() {
        let mut mesh = quad_with_seam();
        assert_eq!(remove_unreferenced_vertices(&mut mesh), 0);
    }
}
