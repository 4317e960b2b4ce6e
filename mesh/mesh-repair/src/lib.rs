//! Mesh processing for reconstructed surfaces.
//!
//! This crate provides the clean-up pass applied to a reconstructed mesh
//! before export:
//! - Vertex welding (exact or within a distance)
//! - Degenerate and duplicate face removal
//! - Unreferenced vertex removal
//! - Face and vertex normal computation ([`finalize_mesh`])
//! - Structural validation ([`validate_mesh`])
//!
//! # Example
//!
//! ```
//! use mesh_types::{IndexedMesh, Vertex};
//! use mesh_repair::{FinalizeParams, finalize_mesh, validate_mesh};
//!
//! let mut mesh = IndexedMesh::new();
//! mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
//! mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
//! mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
//! mesh.faces.push([0, 1, 2]);
//!
//! let summary = finalize_mesh(&mut mesh, &FinalizeParams::default()).unwrap();
//! println!("{summary}");
//! assert!(validate_mesh(&mesh).is_valid_output());
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod error;
mod finalize;
mod repair;
mod validate;

pub use error::{RepairError, RepairResult};
pub use finalize::{FinalizeParams, FinalizeSummary, finalize_mesh};
pub use repair::{
    remove_degenerate_triangles, remove_duplicate_faces, remove_unreferenced_vertices,
    weld_exact, weld_vertices,
};
pub use validate::{MeshReport, check_indices, validate_mesh};
