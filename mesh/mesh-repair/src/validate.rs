//! Mesh validation and health reporting.

use hashbrown::HashMap;
use mesh_types::IndexedMesh;

use crate::error::{RepairError, RepairResult};

/// Summary of a mesh's structural health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeshReport {
    /// Total number of vertices.
    pub vertex_count: usize,
    /// Total number of faces.
    pub face_count: usize,
    /// Faces referencing a vertex index `>= vertex_count`.
    pub invalid_index_faces: usize,
    /// Faces with a repeated index or zero area.
    pub degenerate_face_count: usize,
    /// Edges used by exactly one face.
    pub boundary_edge_count: usize,
    /// Edges used by more than two faces.
    pub non_manifold_edge_count: usize,
}

impl MeshReport {
    /// Every face index is in range and the mesh has at least one face.
    #[must_use]
    pub const fn is_valid_output(&self) -> bool {
        self.face_count > 0 && self.invalid_index_faces == 0
    }

    /// No boundary edges.
    #[must_use]
    pub const fn is_watertight(&self) -> bool {
        self.face_count > 0 && self.boundary_edge_count == 0
    }

    /// No edge shared by more than two faces.
    #[must_use]
    pub const fn is_manifold(&self) -> bool {
        self.non_manifold_edge_count == 0
    }
}

impl std::fmt::Display for MeshReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Mesh Report:")?;
        writeln!(f, "  Vertices: {}", self.vertex_count)?;
        writeln!(f, "  Faces: {}", self.face_count)?;
        writeln!(
            f,
            "  Watertight: {}",
            if self.is_watertight() { "Yes" } else { "No" }
        )?;
        writeln!(
            f,
            "  Manifold: {}",
            if self.is_manifold() { "Yes" } else { "No" }
        )?;
        if self.invalid_index_faces > 0 {
            writeln!(f, "  Invalid index faces: {}", self.invalid_index_faces)?;
        }
        if self.degenerate_face_count > 0 {
            writeln!(f, "  Degenerate faces: {}", self.degenerate_face_count)?;
        }
        Ok(())
    }
}

/// Inspect `mesh` and report its structural health.
///
/// # Example
///
/// ```
/// use mesh_types::{IndexedMesh, Vertex};
/// use mesh_repair::validate_mesh;
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
/// let report = validate_mesh(&mesh);
/// assert!(report.is_valid_output());
/// assert_eq!(report.boundary_edge_count, 3);
/// ```
#[must_use]
pub fn validate_mesh(mesh: &IndexedMesh) -> MeshReport {
    let vertex_count = mesh.vertices.len();
    let mut report = MeshReport {
        vertex_count,
        face_count: mesh.faces.len(),
        ..MeshReport::default()
    };

    let mut edge_uses: HashMap<(u32, u32), u32> = HashMap::with_capacity(mesh.faces.len() * 3 / 2);

    for (index, face) in mesh.faces.iter().enumerate() {
        if face.iter().any(|&i| i as usize >= vertex_count) {
            report.invalid_index_faces += 1;
            continue;
        }
        if mesh.face_normal(index).is_none() {
            report.degenerate_face_count += 1;
        }
        for k in 0..3 {
            let (a, b) = (face[k], face[(k + 1) % 3]);
            *edge_uses.entry((a.min(b), a.max(b))).or_insert(0) += 1;
        }
    }

    for &uses in edge_uses.values() {
        match uses {
            1 => report.boundary_edge_count += 1,
            2 => {}
            _ => report.non_manifold_edge_count += 1,
        }
    }

    report
}

/// Fail unless every face index refers to an existing vertex.
///
/// # Errors
///
/// Returns [`RepairError::InvalidIndex`] for the first out-of-range index.
pub fn check_indices(mesh: &IndexedMesh) -> RepairResult<()> {
    let vertex_count = mesh.vertices.len();
    for face in &mesh.faces {
        if let Some(&index) = face.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(RepairError::InvalidIndex {
                index,
                vertex_count,
            });
        }
    }
    Ok(())
}
