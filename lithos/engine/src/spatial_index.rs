//! Nearest-field lookup for arbitrary directions.
//!
//! Construction runs an exact kd-tree query for every sample of a lat/lon raster; queries are
//! a raster lookup followed by a short greedy walk over the grid adjacency, which fixes the
//! rare sample that lands on the wrong side of a field border. A walk that does not settle
//! falls back to the kd-tree.

use std::cmp::Ordering;
use std::f64::consts::PI;
use std::sync::Arc;

use crate::geo::{dist2, dot, from_latlon, norm, to_latlon};
use crate::grid::Grid;

/// Raster samples per field diameter along a meridian.
pub const DEFAULT_RESOLUTION: f64 = 6.0;

/// Upper bound on refinement rounds after the raster lookup before falling back to the kd-tree.
const MAX_WALK: usize = 32;

#[derive(Debug, Clone, Copy)]
struct KdNode {
    point: u32,
    axis: u8,
    left: Option<u32>,
    right: Option<u32>,
}

/// Exact 3-D kd-tree over grid field positions.
#[derive(Debug, Clone)]
pub struct KdTree {
    nodes: Vec<KdNode>,
    root: Option<u32>,
    points: Vec<[f64; 3]>,
}

impl KdTree {
    /// Build a balanced tree with median splits on alternating axes.
    pub fn new(points: &[[f64; 3]]) -> Self {
        let mut ids: Vec<u32> = (0..points.len() as u32).collect();
        let mut tree = Self { nodes: Vec::with_capacity(points.len()), root: None, points: points.to_vec() };
        tree.root = tree.build(&mut ids, 0);
        tree
    }

    fn build(&mut self, ids: &mut [u32], depth: usize) -> Option<u32> {
        if ids.is_empty() {
            return None;
        }
        let axis = depth % 3;
        let pts = &self.points;
        ids.sort_unstable_by(|&a, &b| {
            pts[a as usize][axis].partial_cmp(&pts[b as usize][axis]).unwrap_or(Ordering::Equal)
        });
        let mid = ids.len() / 2;
        let point = ids[mid];
        let node_idx = self.nodes.len() as u32;
        self.nodes.push(KdNode { point, axis: axis as u8, left: None, right: None });
        let (lo, hi) = ids.split_at_mut(mid);
        let left = self.build(lo, depth + 1);
        let right = self.build(&mut hi[1..], depth + 1);
        let node = &mut self.nodes[node_idx as usize];
        node.left = left;
        node.right = right;
        Some(node_idx)
    }

    /// Index of the point closest to `q` (Euclidean), or `None` for an empty tree.
    pub fn nearest(&self, q: [f64; 3]) -> Option<usize> {
        let mut best: Option<(u32, f64)> = None;
        self.search(self.root, q, &mut best);
        best.map(|(i, _)| i as usize)
    }

    fn search(&self, node: Option<u32>, q: [f64; 3], best: &mut Option<(u32, f64)>) {
        let Some(n) = node else { return };
        let node = self.nodes[n as usize];
        let p = self.points[node.point as usize];
        let d = dist2(p, q);
        // ties resolve to the lower field id so results are reproducible
        let better = match *best {
            None => true,
            Some((bi, bd)) => d < bd || (d == bd && node.point < bi),
        };
        if better {
            *best = Some((node.point, d));
        }
        let axis = node.axis as usize;
        let diff = q[axis] - p[axis];
        let (near, far) = if diff < 0.0 { (node.left, node.right) } else { (node.right, node.left) };
        self.search(near, q, best);
        if best.map(|(_, bd)| diff * diff <= bd).unwrap_or(true) {
            self.search(far, q, best);
        }
    }
}

/// Quantized (lat, lon) raster mapping directions to the nearest grid field.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    grid: Arc<Grid>,
    tree: KdTree,
    lat_buckets: usize,
    lon_buckets: usize,
    raster: Vec<u32>,
}

impl SpatialIndex {
    /// Build with [`DEFAULT_RESOLUTION`] samples per field diameter.
    pub fn new(grid: Arc<Grid>) -> Self {
        Self::with_resolution(grid, DEFAULT_RESOLUTION)
    }

    /// Build with `resolution` raster samples per field diameter (clamped to ≥ 1).
    pub fn with_resolution(grid: Arc<Grid>, resolution: f64) -> Self {
        let tree = KdTree::new(&grid.pos_xyz);
        let step = grid.field_diameter / resolution.max(1.0);
        let lat_buckets = ((PI / step).ceil() as usize).max(1);
        let lon_buckets = 2 * lat_buckets;
        let mut raster = Vec::with_capacity(lat_buckets * lon_buckets);
        for i in 0..lat_buckets {
            let lat = -PI / 2.0 + (i as f64 + 0.5) * PI / lat_buckets as f64;
            for j in 0..lon_buckets {
                let lon = -PI + (j as f64 + 0.5) * 2.0 * PI / lon_buckets as f64;
                let id = tree.nearest(from_latlon(lat, lon)).unwrap_or(0);
                raster.push(id as u32);
            }
        }
        log::debug!(
            "[spatial_index] raster {lat_buckets}x{lon_buckets} for {} fields",
            grid.cells
        );
        Self { grid, tree, lat_buckets, lon_buckets, raster }
    }

    /// Grid this index answers for.
    pub fn grid(&self) -> &Arc<Grid> {
        &self.grid
    }

    /// Raster dimensions as (lat buckets, lon buckets).
    pub fn raster_size(&self) -> (usize, usize) {
        (self.lat_buckets, self.lon_buckets)
    }

    /// Nearest field id for direction `v` (need not be unit length).
    ///
    /// Returns `None` for a zero or non-finite vector.
    pub fn nearest(&self, v: [f64; 3]) -> Option<usize> {
        let n = norm(v);
        if !(n.is_finite() && n > 0.0) {
            log::warn!("[spatial_index] rejected direction {v:?}");
            return None;
        }
        let u = [v[0] / n, v[1] / n, v[2] / n];
        let [lat, lon] = to_latlon(u);
        let i = (((lat + PI / 2.0) / PI) * self.lat_buckets as f64).floor();
        let j = (((lon + PI) / (2.0 * PI)) * self.lon_buckets as f64).floor();
        let i = (i.max(0.0) as usize).min(self.lat_buckets - 1);
        let j = (j.max(0.0) as usize).min(self.lon_buckets - 1);
        let start = *self.raster.get(i * self.lon_buckets + j)? as usize;
        Some(self.refine(start, u))
    }

    /// Walk from `start` towards the field closest to unit direction `u`.
    ///
    /// Each round climbs the 1-ring to a local optimum, then checks the 2-ring so a slightly
    /// non-Delaunay patch of the mesh cannot trap the walk.
    fn refine(&self, start: usize, u: [f64; 3]) -> usize {
        let grid = &self.grid;
        let mut best = start;
        let mut best_dot = dot(grid.pos_xyz[best], u);
        let consider = |id: usize, best: &mut usize, best_dot: &mut f64| -> bool {
            let d = dot(grid.pos_xyz[id], u);
            if d > *best_dot || (d == *best_dot && id < *best) {
                *best_dot = d;
                *best = id;
                true
            } else {
                false
            }
        };
        for _ in 0..MAX_WALK {
            let mut moved = false;
            for &nb in grid.neighbors(best) {
                moved |= consider(nb as usize, &mut best, &mut best_dot);
            }
            if moved {
                continue;
            }
            let centre = best;
            for &nb in grid.neighbors(centre) {
                for &nb2 in grid.neighbors(nb as usize) {
                    moved |= consider(nb2 as usize, &mut best, &mut best_dot);
                }
            }
            if !moved {
                return best;
            }
        }
        log::debug!("[spatial_index] walk did not settle, using kd-tree");
        self.tree.nearest(u).unwrap_or(best)
    }

    /// Nearest field id from the exact kd-tree (no raster).
    pub fn nearest_exact(&self, v: [f64; 3]) -> Option<usize> {
        let n = norm(v);
        if !(n.is_finite() && n > 0.0) {
            return None;
        }
        self.tree.nearest([v[0] / n, v[1] / n, v[2] / n])
    }

    /// Convenience wrapper for glam vectors.
    #[inline]
    pub fn nearest_vec(&self, v: glam::DVec3) -> Option<usize> {
        self.nearest(v.to_array())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kd_tree_finds_itself() {
        let g = Grid::new(4);
        let t = KdTree::new(&g.pos_xyz);
        for (i, p) in g.pos_xyz.iter().enumerate() {
            assert_eq!(t.nearest(*p), Some(i));
        }
    }

    #[test]
    fn zero_vector_is_rejected() {
        let idx = SpatialIndex::new(Arc::new(Grid::new(2)));
        assert_eq!(idx.nearest([0.0, 0.0, 0.0]), None);
        assert_eq!(idx.nearest([f64::NAN, 1.0, 0.0]), None);
    }
}
