//! Indexed triangle mesh.

use crate::{Aabb, Vertex};
use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An indexed triangle mesh.
///
/// Vertices and faces are stored separately, with faces referencing
/// vertices by index.
///
/// # Winding Order
///
/// Faces use **counter-clockwise (CCW) winding** when viewed from outside.
///
/// # Example
///
/// ```
/// use mesh_types::{IndexedMesh, Vertex};
///
/// let mesh = IndexedMesh::from_parts(
///     vec![
///         Vertex::from_coords(0.0, 0.0, 0.0),
///         Vertex::from_coords(1.0, 0.0, 0.0),
///         Vertex::from_coords(0.0, 1.0, 0.0),
///     ],
///     vec![[0, 1, 2]],
/// );
///
/// assert_eq!(mesh.vertex_count(), 3);
/// assert!(mesh.has_valid_indices());
/// assert!((mesh.surface_area() - 0.5).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IndexedMesh {
    /// Vertex data.
    pub vertices: Vec<Vertex>,

    /// Triangle faces as indices into the vertex array.
    /// Each face is `[v0, v1, v2]` with counter-clockwise winding.
    pub faces: Vec<[u32; 3]>,
}

impl IndexedMesh {
    /// Create a new empty mesh.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            vertices: Vec::new(),
            faces: Vec::new(),
        }
    }

    /// Create a mesh with pre-allocated capacity.
    #[inline]
    #[must_use]
    pub fn with_capacity(vertex_count: usize, face_count: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertex_count),
            faces: Vec::with_capacity(face_count),
        }
    }

    /// Create a mesh from vertices and faces.
    #[inline]
    #[must_use]
    pub const fn from_parts(vertices: Vec<Vertex>, faces: Vec<[u32; 3]>) -> Self {
        Self { vertices, faces }
    }

    /// Number of vertices.
    #[inline]
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of triangular faces.
    #[inline]
    #[must_use]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// A mesh is empty when it has no faces.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Bounding box of all vertex positions.
    #[must_use]
    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(self.vertices.iter().map(|v| &v.position))
    }

    /// Returns `true` if every face index refers to an existing vertex.
    #[must_use]
    pub fn has_valid_indices(&self) -> bool {
        let n = self.vertices.len();
        self.faces
            .iter()
            .all(|face| face.iter().all(|&i| (i as usize) < n))
    }

    /// Positions of the three corners of face `index`.
    ///
    /// Returns `None` if the face does not exist or refers to a missing vertex.
    #[must_use]
    pub fn face_positions(&self, index: usize) -> Option<[Point3<f64>; 3]> {
        let face = self.faces.get(index)?;
        let p0 = self.vertices.get(face[0] as usize)?.position;
        let p1 = self.vertices.get(face[1] as usize)?.position;
        let p2 = self.vertices.get(face[2] as usize)?.position;
        Some([p0, p1, p2])
    }

    /// Unnormalized normal of face `index` (length is twice the face area).
    #[must_use]
    pub fn face_cross(&self, index: usize) -> Option<Vector3<f64>> {
        let [p0, p1, p2] = self.face_positions(index)?;
        Some((p1 - p0).cross(&(p2 - p0)))
    }

    /// Unit normal of face `index` by the right-hand rule.
    ///
    /// Returns `None` for zero-area faces or out-of-range indices.
    #[must_use]
    pub fn face_normal(&self, index: usize) -> Option<Vector3<f64>> {
        self.face_cross(index)?.try_normalize(f64::EPSILON)
    }

    /// Unit normals of all faces, in face order.
    #[must_use]
    pub fn face_normals(&self) -> Vec<Option<Vector3<f64>>> {
        (0..self.faces.len()).map(|i| self.face_normal(i)).collect()
    }

    /// Recompute per-vertex normals as the area-weighted average of the
    /// adjacent face normals.
    ///
    /// Vertices with no adjacent non-degenerate face get `None`.
    pub fn compute_vertex_normals(&mut self) {
        let mut accum = vec![Vector3::zeros(); self.vertices.len()];

        for index in 0..self.faces.len() {
            let Some(cross) = self.face_cross(index) else {
                continue;
            };
            for &vi in &self.faces[index] {
                accum[vi as usize] += cross;
            }
        }

        for (vertex, sum) in self.vertices.iter_mut().zip(accum) {
            vertex.attributes.normal = sum.try_normalize(f64::EPSILON);
        }
    }

    /// Total surface area.
    #[must_use]
    pub fn surface_area(&self) -> f64 {
        (0..self.faces.len())
            .filter_map(|i| self.face_cross(i))
            .map(|c| c.norm() * 0.5)
            .sum()
    }

    /// Signed volume by the divergence theorem.
    ///
    /// Positive for a closed mesh with outward-facing winding.
    #[must_use]
    pub fn signed_volume(&self) -> f64 {
        let mut volume = 0.0;
        for index in 0..self.faces.len() {
            if let Some([p0, p1, p2]) = self.face_positions(index) {
                volume += p0.coords.dot(&p1.coords.cross(&p2.coords));
            }
        }
        volume / 6.0
    }

    /// Flip all faces by reversing winding order.
    pub fn flip_normals(&mut self) {
        for face in &mut self.faces {
            face.swap(1, 2);
        }
        for vertex in &mut self.vertices {
            if let Some(ref mut normal) = vertex.attributes.normal {
                *normal = -*normal;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Closed unit tetrahedron with outward winding.
    fn tetrahedron() -> IndexedMesh {
        IndexedMesh::from_parts(
            vec![
                Vertex::from_coords(0.0, 0.0, 0.0),
                Vertex::from_coords(1.0, 0.0, 0.0),
                Vertex::from_coords(0.0, 1.0, 0.0),
                Vertex::from_coords(0.0, 0.0, 1.0),
            ],
            vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]],
        )
    }

    #[test]
    fn test_empty_mesh() {
        let mesh = IndexedMesh::new();
        assert!(mesh.is_empty());
        assert!(mesh.bounds().is_empty());
        assert_eq!(mesh.surface_area(), 0.0);
    }

    #[test]
    fn test_tetrahedron_volume_positive() {
        let mesh = tetrahedron();
        assert_relative_eq!(mesh.signed_volume(), 1.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_flip_negates_volume() {
        let mut mesh = tetrahedron();
        mesh.flip_normals();
        assert_relative_eq!(mesh.signed_volume(), -1.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_face_normal_right_hand_rule() {
        let mesh = tetrahedron();
        let n = mesh.face_normal(0).unwrap();
        assert_relative_eq!(n, -Vector3::z(), epsilon = 1e-12);
        assert!(mesh.face_normal(10).is_none());
    }

    #[test]
    fn test_degenerate_face_has_no_normal() {
        let mesh = IndexedMesh::from_parts(
            vec![
                Vertex::from_coords(0.0, 0.0, 0.0),
                Vertex::from_coords(1.0, 0.0, 0.0),
                Vertex::from_coords(2.0, 0.0, 0.0),
            ],
            vec![[0, 1, 2]],
        );
        assert_eq!(mesh.face_normals(), vec![None]);
    }

    #[test]
    fn test_vertex_normals_point_outward() {
        let mut mesh = tetrahedron();
        mesh.compute_vertex_normals();
        let centroid = Point3::new(0.25, 0.25, 0.25);
        for v in &mesh.vertices {
            let n = v.normal().unwrap();
            assert_relative_eq!(n.norm(), 1.0, epsilon = 1e-12);
            assert!(n.dot(&(v.position - centroid)) > 0.0);
        }
    }

    #[test]
    fn test_invalid_indices_detected() {
        let mut mesh = tetrahedron();
        assert!(mesh.has_valid_indices());
        mesh.faces.push([0, 1, 9]);
        assert!(!mesh.has_valid_indices());
    }
}
