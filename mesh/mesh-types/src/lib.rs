//! Core mesh types for the photomesh pipeline.
//!
//! This crate provides the foundational types shared by the reconstruction
//! crates:
//!
//! - [`Vertex`] - A point in 3D space with optional normal and color
//! - [`IndexedMesh`] - A triangle mesh with indexed vertices
//! - [`VertexColor`] - 8-bit RGB color with normalized float access
//! - [`Aabb`] - Axis-aligned bounding box
//!
//! # Units
//!
//! This library is **unit-agnostic**. All coordinates are `f64`. Meshes
//! reconstructed from depth maps are expressed in pixel units.
//!
//! # Coordinate System
//!
//! Uses a **right-handed coordinate system**. For meshes lifted from an
//! image, X runs along image columns, Y along image rows, and Z along depth.
//!
//! Face winding is **counter-clockwise (CCW) when viewed from outside**.
//! Normals point outward by the right-hand rule.
//!
//! # Example
//!
//! ```
//! use mesh_types::{IndexedMesh, Point3, Vertex};
//!
//! let mut mesh = IndexedMesh::new();
//! mesh.vertices.push(Vertex::new(Point3::new(0.0, 0.0, 0.0)));
//! mesh.vertices.push(Vertex::new(Point3::new(1.0, 0.0, 0.0)));
//! mesh.vertices.push(Vertex::new(Point3::new(0.5, 1.0, 0.0)));
//! mesh.faces.push([0, 1, 2]);
//!
//! assert_eq!(mesh.face_count(), 1);
//! assert!(!mesh.is_empty());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod bounds;
mod mesh;
mod vertex;

pub use bounds::Aabb;
pub use mesh::IndexedMesh;
pub use vertex::{Vertex, VertexAttributes, VertexColor};

// Re-export nalgebra types for convenience
pub use nalgebra::{Point3, Vector3};
