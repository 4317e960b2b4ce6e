//! Point cloud data structures and operations.
//!
//! This module provides the [`PointCloud`] type for 3D points lifted from a
//! depth map, together with the builder ([`depth`]) and normal estimation
//! ([`normals`]) that operate on it.
//!
//! # Example
//!
//! ```
//! use mesh_scan::pointcloud::PointCloud;
//! use nalgebra::Point3;
//!
//! let positions = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! ];
//! let cloud = PointCloud::from_positions(&positions);
//!
//! assert_eq!(cloud.len(), 3);
//! assert!(!cloud.has_normals());
//! ```

pub mod depth;
pub mod normals;

use mesh_types::{Aabb, Vertex, VertexColor};
use nalgebra::{Point3, Vector3};

/// A point in a point cloud with optional attributes.
///
/// # Example
///
/// ```
/// use mesh_scan::pointcloud::CloudPoint;
/// use mesh_types::VertexColor;
/// use nalgebra::Point3;
///
/// let p = CloudPoint::new(Point3::new(1.0, 2.0, 3.0))
///     .with_color(VertexColor::new(255, 0, 0));
///
/// assert!(p.normal.is_none());
/// assert_eq!(p.rgb(), Some([1.0, 0.0, 0.0]));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CloudPoint {
    /// The 3D position of the point.
    pub position: Point3<f64>,

    /// Optional unit normal vector at this point.
    pub normal: Option<Vector3<f64>>,

    /// Optional RGB color sampled from the source image.
    pub color: Option<VertexColor>,
}

impl CloudPoint {
    /// Creates a new point with just a position.
    #[must_use]
    pub const fn new(position: Point3<f64>) -> Self {
        Self {
            position,
            normal: None,
            color: None,
        }
    }

    /// Creates a point from x, y, z coordinates.
    #[must_use]
    pub fn from_coords(x: f64, y: f64, z: f64) -> Self {
        Self::new(Point3::new(x, y, z))
    }

    /// Creates a point with position and normal.
    #[must_use]
    pub const fn with_normal(position: Point3<f64>, normal: Vector3<f64>) -> Self {
        Self {
            position,
            normal: Some(normal),
            color: None,
        }
    }

    /// Attach a color.
    #[must_use]
    pub const fn with_color(mut self, color: VertexColor) -> Self {
        self.color = Some(color);
        self
    }

    /// Color as `[r, g, b]` in `[0, 1]`.
    #[must_use]
    pub fn rgb(&self) -> Option<[f64; 3]> {
        self.color.map(VertexColor::normalized)
    }

    /// Returns true if this point has a normal.
    #[must_use]
    pub const fn has_normal(&self) -> bool {
        self.normal.is_some()
    }

    /// Converts this cloud point to a mesh vertex, keeping normal and color.
    #[must_use]
    pub fn to_vertex(&self) -> Vertex {
        let mut vertex = Vertex::new(self.position);
        vertex.attributes.normal = self.normal;
        vertex.attributes.color = self.color;
        vertex
    }
}

/// An ordered collection of 3D points.
///
/// Normals and colors live on each [`CloudPoint`], so filtering the cloud
/// keeps them aligned with their positions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    /// The points in this cloud.
    pub points: Vec<CloudPoint>,
}

impl PointCloud {
    /// Creates an empty point cloud.
    #[must_use]
    pub const fn new() -> Self {
        Self { points: Vec::new() }
    }

    /// Creates a point cloud with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
        }
    }

    /// Creates a point cloud from a slice of 3D positions.
    #[must_use]
    pub fn from_positions(positions: &[Point3<f64>]) -> Self {
        let points = positions.iter().map(|p| CloudPoint::new(*p)).collect();
        Self { points }
    }

    /// Returns the number of points in the cloud.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the cloud has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Returns true if the cloud is non-empty and every point has a normal.
    #[must_use]
    pub fn has_normals(&self) -> bool {
        !self.points.is_empty() && self.points.iter().all(CloudPoint::has_normal)
    }

    /// Number of points without a normal.
    #[must_use]
    pub fn missing_normals(&self) -> usize {
        self.points.iter().filter(|p| p.normal.is_none()).count()
    }

    /// Adds a point to the cloud.
    pub fn push(&mut self, point: CloudPoint) {
        self.points.push(point);
    }

    /// Adds a point with position and normal.
    pub fn add_point_with_normal(&mut self, position: Point3<f64>, normal: Vector3<f64>) {
        self.points.push(CloudPoint::with_normal(position, normal));
    }

    /// Positions in storage order.
    #[must_use]
    pub fn positions(&self) -> Vec<Point3<f64>> {
        self.points.iter().map(|p| p.position).collect()
    }

    /// Drop every normal.
    pub fn clear_normals(&mut self) {
        for point in &mut self.points {
            point.normal = None;
        }
    }

    /// Keep the points whose entry in `mask` is `true`, preserving order.
    ///
    /// Points beyond the end of `mask` are dropped.
    #[must_use]
    pub fn select(&self, mask: &[bool]) -> Self {
        let points = self
            .points
            .iter()
            .zip(mask)
            .filter(|&(_, &keep)| keep)
            .map(|(p, _)| p.clone())
            .collect();
        Self { points }
    }

    /// Returns the axis-aligned bounding box, or `None` if the cloud is empty.
    ///
    /// # Example
    ///
    /// ```
    /// use mesh_scan::pointcloud::PointCloud;
    /// use nalgebra::Point3;
    ///
    /// let cloud = PointCloud::from_positions(&[
    ///     Point3::new(0.0, 0.0, 0.0),
    ///     Point3::new(2.0, 3.0, 1.0),
    /// ]);
    /// let bounds = cloud.bounds().unwrap();
    ///
    /// assert_eq!(bounds.max.y, 3.0);
    /// ```
    #[must_use]
    pub fn bounds(&self) -> Option<Aabb> {
        if self.points.is_empty() {
            return None;
        }
        Some(Aabb::from_points(self.points.iter().map(|p| &p.position)))
    }
}

/// Output of a best-effort stage.
///
/// The stage always hands back a usable cloud. When it could not do its work
/// the input passes through and `warning` says why.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    /// The cloud to feed to the next stage.
    pub cloud: PointCloud,
    /// Set when the stage was skipped or degraded.
    pub warning: Option<String>,
}

impl StageOutcome {
    /// The stage ran normally.
    #[must_use]
    pub const fn ok(cloud: PointCloud) -> Self {
        Self {
            cloud,
            warning: None,
        }
    }

    /// The stage could not run; `cloud` is passed through.
    #[must_use]
    pub fn degraded(cloud: PointCloud, warning: impl Into<String>) -> Self {
        Self {
            cloud,
            warning: Some(warning.into()),
        }
    }

    /// Returns `true` if a warning was recorded.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.warning.is_some()
    }
}
