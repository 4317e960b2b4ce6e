//! k-nearest-neighbor queries over a static point set.
//!
//! [`NeighborIndex`] wraps an immutable k-d tree. Clouds lifted from a pixel
//! grid put whole rows and columns on one axis value, so the tree must accept
//! any number of items sharing a split value; kiddo's immutable tree does
//! since 5.0, while its mutable tree overflows a bucket.

use std::num::NonZeroUsize;

use kiddo::SquaredEuclidean;
use kiddo::immutable::float::kdtree::ImmutableKdTree;
use nalgebra::Point3;

/// Bucket size of the underlying tree.
const BUCKET: usize = 32;

type Tree = ImmutableKdTree<f64, u64, 3, BUCKET>;

/// One query result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index of the point in the slice the index was built from.
    pub index: usize,
    /// Euclidean distance to the query.
    pub distance: f64,
}

/// A k-d tree over a fixed set of points.
///
/// # Example
///
/// ```
/// use mesh_scan::spatial::NeighborIndex;
/// use nalgebra::Point3;
///
/// let points: Vec<_> = (0..10).map(|i| Point3::new(f64::from(i), 0.0, 0.0)).collect();
/// let index = NeighborIndex::build(&points);
///
/// let near = index.nearest(&Point3::new(3.2, 0.0, 0.0), 2);
/// assert_eq!(near[0].index, 3);
/// assert_eq!(near[1].index, 4);
/// ```
pub struct NeighborIndex {
    tree: Option<Tree>,
    len: usize,
}

impl NeighborIndex {
    /// Build an index over `points`. Indices in results refer to this slice.
    #[must_use]
    pub fn build(points: &[Point3<f64>]) -> Self {
        if points.is_empty() {
            return Self { tree: None, len: 0 };
        }
        let coords: Vec<[f64; 3]> = points.iter().map(|p| [p.x, p.y, p.z]).collect();
        Self {
            tree: Some(Tree::new_from_slice(&coords)),
            len: points.len(),
        }
    }

    /// Number of indexed points.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no points are indexed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Up to `k` nearest points to `query`, closest first.
    #[must_use]
    pub fn nearest(&self, query: &Point3<f64>, k: usize) -> Vec<Neighbor> {
        let Some(tree) = &self.tree else {
            return Vec::new();
        };
        let Some(qty) = NonZeroUsize::new(k.min(self.len)) else {
            return Vec::new();
        };
        tree.nearest_n::<SquaredEuclidean>(&[query.x, query.y, query.z], qty)
            .into_iter()
            .map(|n| Neighbor {
                index: n.item as usize,
                distance: n.distance.max(0.0).sqrt(),
            })
            .collect()
    }

    /// Up to `k` nearest points to the indexed point `index`, excluding itself.
    ///
    /// Coincident points are still returned (at distance zero); only the entry
    /// with the same index is skipped.
    #[must_use]
    pub fn nearest_excluding_self(
        &self,
        index: usize,
        position: &Point3<f64>,
        k: usize,
    ) -> Vec<Neighbor> {
        let mut found = self.nearest(position, k + 1);
        if let Some(pos) = found.iter().position(|n| n.index == index) {
            found.remove(pos);
        }
        found.truncate(k);
        found
    }
}

impl std::fmt::Debug for NeighborIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NeighborIndex").field("len", &self.len).finish()
    }
}
