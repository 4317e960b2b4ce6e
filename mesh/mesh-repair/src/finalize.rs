//! Final mesh processing before export.
//!
//! Runs the clean-up passes in a fixed order and then computes face and
//! vertex normals:
//!
//! 1. weld (exact position match by default)
//! 2. degenerate face removal
//! 3. duplicate face removal
//! 4. unreferenced vertex compaction
//! 5. face normals, then area-weighted vertex normals

use std::fmt;

use mesh_types::{IndexedMesh, Vector3};
use tracing::{debug, info, warn};

use crate::error::{RepairError, RepairResult};
use crate::repair::{
    remove_degenerate_triangles, remove_duplicate_faces, remove_unreferenced_vertices,
    weld_vertices,
};

/// Parameters for [`finalize_mesh`].
///
/// # Example
///
/// ```
/// use mesh_repair::FinalizeParams;
///
/// let params = FinalizeParams::new().with_weld_epsilon(1e-6);
/// assert!(params.compute_vertex_normals);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizeParams {
    /// Merge distance. `0.0` merges only bit-identical positions.
    pub weld_epsilon: f64,

    /// Faces with area not greater than this are removed.
    pub degenerate_area_threshold: f64,

    /// Whether to compute area-weighted vertex normals.
    pub compute_vertex_normals: bool,
}

impl Default for FinalizeParams {
    fn default() -> Self {
        Self {
            weld_epsilon: 0.0,
            degenerate_area_threshold: 0.0,
            compute_vertex_normals: true,
        }
    }
}

impl FinalizeParams {
    /// Create parameters with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the weld distance.
    #[must_use]
    pub const fn with_weld_epsilon(mut self, epsilon: f64) -> Self {
        self.weld_epsilon = epsilon;
        self
    }

    /// Set the degenerate area threshold.
    #[must_use]
    pub const fn with_degenerate_area_threshold(mut self, threshold: f64) -> Self {
        self.degenerate_area_threshold = threshold;
        self
    }

    /// Enable or disable vertex normal computation.
    #[must_use]
    pub const fn with_vertex_normals(mut self, enabled: bool) -> Self {
        self.compute_vertex_normals = enabled;
        self
    }
}

/// What [`finalize_mesh`] changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinalizeSummary {
    /// Vertices merged into an earlier identical vertex.
    pub vertices_welded: usize,
    /// Faces removed as degenerate.
    pub degenerate_removed: usize,
    /// Faces removed as duplicates.
    pub duplicates_removed: usize,
    /// Vertices dropped because no face used them.
    pub unreferenced_removed: usize,
    /// Vertex count after processing.
    pub final_vertices: usize,
    /// Face count after processing.
    pub final_faces: usize,
    /// Unit normal of each remaining face, in face order.
    pub face_normals: Vec<Vector3<f64>>,
    /// Vertices that received a normal.
    pub vertex_normals: usize,
}

impl FinalizeSummary {
    /// Total number of elements removed or merged.
    #[must_use]
    pub const fn total_changes(&self) -> usize {
        self.vertices_welded
            + self.degenerate_removed
            + self.duplicates_removed
            + self.unreferenced_removed
    }
}

impl fmt::Display for FinalizeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Finalized: {} vertices, {} faces (welded {}, degenerate {}, duplicate {}, unreferenced {})",
            self.final_vertices,
            self.final_faces,
            self.vertices_welded,
            self.degenerate_removed,
            self.duplicates_removed,
            self.unreferenced_removed
        )
    }
}

/// Clean up `mesh` in place and compute its normals.
///
/// Vertex normals are best-effort: a vertex whose adjacent faces cancel out
/// keeps `None`.
///
/// # Errors
///
/// Returns [`RepairError::EmptyMesh`] if no faces survive, or
/// [`RepairError::MissingFaceNormal`] if a surviving face has no defined
/// normal.
///
/// # Example
///
/// ```
/// use mesh_types::{IndexedMesh, Vertex};
/// use mesh_repair::{FinalizeParams, finalize_mesh};
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
/// let summary = finalize_mesh(&mut mesh, &FinalizeParams::default()).unwrap();
/// assert_eq!(summary.final_faces, 1);
/// assert_eq!(summary.final_vertices, 3);
/// ```
pub fn finalize_mesh(
    mesh: &mut IndexedMesh,
    params: &FinalizeParams,
) -> RepairResult<FinalizeSummary> {
    let input_vertices = mesh.vertices.len();
    let input_faces = mesh.faces.len();

    let vertices_welded = weld_vertices(mesh, params.weld_epsilon);
    let degenerate_removed = remove_degenerate_triangles(mesh, params.degenerate_area_threshold);
    let duplicates_removed = remove_duplicate_faces(mesh);
    let unreferenced_removed = remove_unreferenced_vertices(mesh);

    debug!(
        input_vertices,
        input_faces,
        vertices_welded,
        degenerate_removed,
        duplicates_removed,
        unreferenced_removed,
        "Mesh clean-up passes complete"
    );

    if mesh.faces.is_empty() {
        return Err(RepairError::EmptyMesh);
    }

    let mut face_normals = Vec::with_capacity(mesh.faces.len());
    for index in 0..mesh.faces.len() {
        let normal = mesh
            .face_normal(index)
            .ok_or(RepairError::MissingFaceNormal { face: index })?;
        face_normals.push(normal);
    }

    let mut vertex_normals = 0;
    if params.compute_vertex_normals {
        mesh.compute_vertex_normals();
        vertex_normals = mesh
            .vertices
            .iter()
            .filter(|v| v.attributes.normal.is_some())
            .count();
        if vertex_normals < mesh.vertices.len() {
            warn!(
                missing = mesh.vertices.len() - vertex_normals,
                "Some vertices have no defined normal"
            );
        }
    }

    let summary = FinalizeSummary {
        vertices_welded,
        degenerate_removed,
        duplicates_removed,
        unreferenced_removed,
        final_vertices: mesh.vertices.len(),
        final_faces: mesh.faces.len(),
        face_normals,
        vertex_normals,
    };
    info!(
        vertices = summary.final_vertices,
        faces = summary.final_faces,
        changes = summary.total_changes(),
        "Mesh finalized"
    );
    Ok(summary)
}
