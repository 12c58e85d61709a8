//! Read-only TIN connectivity consumed by the engine.
//!
//! Neighbour lists have a fixed maximum degree; unused slots hold
//! [`NO_NEIGHBOUR`] and a zero edge length. Boundary nodes occupy the index
//! range `[0, bound_pts)`.
use serde::{Deserialize, Serialize};

use crate::error::MeshError;

/// Padding value for unused neighbour slots.
pub const NO_NEIGHBOUR: i64 = -1;

/// Triangulated irregular network with finite-volume geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TinMesh {
    /// Planar node coordinates `(x, y)`.
    pub coords: Vec<[f64; 2]>,
    /// Row-major `n × max_ngbh` neighbour ids, padded with [`NO_NEIGHBOUR`].
    pub neighbours: Vec<i64>,
    /// Row-major `n × max_ngbh` distance to each neighbour.
    pub edge_length: Vec<f64>,
    /// Row-major `n × max_ngbh` length of the Voronoi face shared with each neighbour.
    pub vor_edges: Vec<f64>,
    /// Voronoi cell area of each node.
    pub control_volumes: Vec<f64>,
    pub max_ngbh: usize,
    pub bound_pts: usize,
}

/// One populated neighbour slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbour {
    pub slot: usize,
    pub node: usize,
    pub length: f64,
    pub vor: f64,
}

impl TinMesh {
    /// Assemble a mesh from raw arrays, checking that all shapes agree.
    pub fn new(
        coords: Vec<[f64; 2]>,
        neighbours: Vec<i64>,
        edge_length: Vec<f64>,
        vor_edges: Vec<f64>,
        control_volumes: Vec<f64>,
        max_ngbh: usize,
        bound_pts: usize,
    ) -> Result<Self, MeshError> {
        let n = coords.len();
        if n == 0 {
            return Err(MeshError::Empty);
        }
        let slots = n * max_ngbh;
        for (field, got) in [
            ("neighbours", neighbours.len()),
            ("edge_length", edge_length.len()),
            ("vor_edges", vor_edges.len()),
        ] {
            if got != slots {
                return Err(MeshError::Shape { field, expected: slots, got });
            }
        }
        if control_volumes.len() != n {
            return Err(MeshError::Shape {
                field: "control_volumes",
                expected: n,
                got: control_volumes.len(),
            });
        }
        if bound_pts > n {
            return Err(MeshError::BoundaryCount { bound_pts, nodes: n });
        }
        for (k, &nb) in neighbours.iter().enumerate() {
            if nb != NO_NEIGHBOUR && (nb < 0 || nb as usize >= n) {
                return Err(MeshError::NeighbourOutOfRange {
                    node: k / max_ngbh,
                    neighbour: nb,
                });
            }
        }
        Ok(Self {
            coords,
            neighbours,
            edge_length,
            vor_edges,
            control_volumes,
            max_ngbh,
            bound_pts,
        })
    }

    /// Right-triangulated regular grid of `nx × ny` nodes with spacing `dx`.
    ///
    /// The outer ring is numbered first (see [`grid_node_order`]), so
    /// `bound_pts = 2·nx + 2·ny − 4`. Each cell is split along its
    /// south-west/north-east diagonal; diagonal faces have zero Voronoi length.
    pub fn regular_grid(nx: usize, ny: usize, dx: f64) -> Result<Self, MeshError> {
        if nx < 2 || ny < 2 {
            return Err(MeshError::Empty);
        }
        const OFFSETS: [(isize, isize); 6] = [(1, 0), (0, 1), (-1, 0), (0, -1), (1, 1), (-1, -1)];
        let order = grid_node_order(nx, ny);
        let mut index = vec![0usize; nx * ny];
        for (id, &(c, r)) in order.iter().enumerate() {
            index[r * nx + c] = id;
        }

        let n = order.len();
        let max_ngbh = OFFSETS.len();
        let mut coords = Vec::with_capacity(n);
        let mut neighbours = vec![NO_NEIGHBOUR; n * max_ngbh];
        let mut edge_length = vec![0.0; n * max_ngbh];
        let mut vor_edges = vec![0.0; n * max_ngbh];
        let mut control_volumes = Vec::with_capacity(n);

        for (id, &(c, r)) in order.iter().enumerate() {
            coords.push([c as f64 * dx, r as f64 * dx]);
            let edge_c = c == 0 || c == nx - 1;
            let edge_r = r == 0 || r == ny - 1;
            let w = if edge_c { 0.5 } else { 1.0 };
            let h = if edge_r { 0.5 } else { 1.0 };
            control_volumes.push(w * h * dx * dx);

            let mut slot = 0;
            for &(dc, dr) in &OFFSETS {
                let nc = c as isize + dc;
                let nr = r as isize + dr;
                if nc < 0 || nr < 0 || nc >= nx as isize || nr >= ny as isize {
                    continue;
                }
                let k = id * max_ngbh + slot;
                neighbours[k] = index[nr as usize * nx + nc as usize] as i64;
                let diagonal = dc != 0 && dr != 0;
                edge_length[k] = if diagonal { dx * std::f64::consts::SQRT_2 } else { dx };
                // Faces along the outer ring are halved like the cells they bound.
                vor_edges[k] = match (diagonal, dc != 0) {
                    (true, _) => 0.0,
                    (false, true) => dx * h,
                    (false, false) => dx * w,
                };
                slot += 1;
            }
        }

        Self::new(
            coords,
            neighbours,
            edge_length,
            vor_edges,
            control_volumes,
            max_ngbh,
            2 * nx + 2 * ny - 4,
        )
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.coords.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    #[inline]
    pub fn is_boundary(&self, node: usize) -> bool {
        node < self.bound_pts
    }

    /// Raw neighbour slots of `node`, sentinel padding included.
    #[inline]
    pub fn neighbour_slots(&self, node: usize) -> &[i64] {
        &self.neighbours[node * self.max_ngbh..(node + 1) * self.max_ngbh]
    }

    #[inline]
    pub fn edge_lengths(&self, node: usize) -> &[f64] {
        &self.edge_length[node * self.max_ngbh..(node + 1) * self.max_ngbh]
    }

    /// Populated neighbour slots of `node`.
    pub fn neighbours(&self, node: usize) -> impl Iterator<Item = Neighbour> + '_ {
        let base = node * self.max_ngbh;
        self.neighbour_slots(node)
            .iter()
            .enumerate()
            .filter(|(_, &nb)| nb >= 0)
            .map(move |(slot, &nb)| Neighbour {
                slot,
                node: nb as usize,
                length: self.edge_length[base + slot],
                vor: self.vor_edges[base + slot],
            })
    }

    /// Indices of all non-boundary nodes, ascending.
    pub fn interior_nodes(&self) -> Vec<usize> {
        (self.bound_pts..self.len()).collect()
    }

    /// Axis-aligned extent `(min, max)` of the node coordinates.
    pub fn extent(&self) -> ([f64; 2], [f64; 2]) {
        let mut lo = [f64::INFINITY; 2];
        let mut hi = [f64::NEG_INFINITY; 2];
        for p in &self.coords {
            for k in 0..2 {
                lo[k] = lo[k].min(p[k]);
                hi[k] = hi[k].max(p[k]);
            }
        }
        (lo, hi)
    }
}

/// `(col, row)` of every node of an `nx × ny` grid in mesh index order:
/// the outer ring counter-clockwise from the origin, then the interior
/// row-major.
pub fn grid_node_order(nx: usize, ny: usize) -> Vec<(usize, usize)> {
    let mut order = Vec::with_capacity(nx * ny);
    for c in 0..nx {
        order.push((c, 0));
    }
    for r in 1..ny {
        order.push((nx - 1, r));
    }
    for c in (0..nx - 1).rev() {
        order.push((c, ny - 1));
    }
    for r in (1..ny - 1).rev() {
        order.push((0, r));
    }
    for r in 1..ny - 1 {
        for c in 1..nx - 1 {
            order.push((c, r));
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regular_grid_numbers_outer_ring_first() {
        let mesh = TinMesh::regular_grid(5, 5, 1.0).unwrap();
        assert_eq!(mesh.len(), 25);
        assert_eq!(mesh.bound_pts, 16);
        for id in 0..mesh.bound_pts {
            let [x, y] = mesh.coords[id];
            let on_ring = x == 0.0 || y == 0.0 || x == 4.0 || y == 4.0;
            assert!(on_ring, "node {id} at ({x}, {y}) is not on the outer ring");
        }
        for id in mesh.bound_pts..mesh.len() {
            let [x, y] = mesh.coords[id];
            assert!(x > 0.0 && y > 0.0 && x < 4.0 && y < 4.0, "node {id} should be interior");
        }
    }

    #[test]
    fn neighbour_relation_is_symmetric() {
        let mesh = TinMesh::regular_grid(6, 4, 2.0).unwrap();
        for i in 0..mesh.len() {
            for nb in mesh.neighbours(i) {
                assert!(
                    mesh.neighbours(nb.node).any(|back| back.node == i),
                    "{i} -> {} has no reverse edge",
                    nb.node
                );
            }
        }
    }

    #[test]
    fn control_volumes_tile_the_domain() {
        let mesh = TinMesh::regular_grid(7, 5, 10.0).unwrap();
        let total: f64 = mesh.control_volumes.iter().sum();
        assert!((total - 60.0 * 40.0).abs() < 1e-9, "total area {total}");
    }

    #[test]
    fn corner_slots_are_padded() {
        let mesh = TinMesh::regular_grid(3, 3, 1.0).unwrap();
        // Node 0 is the origin corner: east, north and north-east only.
        assert_eq!(mesh.neighbours(0).count(), 3);
        let padded = mesh.neighbour_slots(0).iter().filter(|&&nb| nb == NO_NEIGHBOUR).count();
        assert_eq!(padded, 3);
        assert!(mesh.edge_lengths(0)[3..].iter().all(|&l| l == 0.0));
    }

    #[test]
    fn new_rejects_mismatched_shapes() {
        let err = TinMesh::new(vec![[0.0, 0.0]; 2], vec![NO_NEIGHBOUR; 3], vec![0.0; 4], vec![0.0; 4], vec![1.0; 2], 2, 0)
            .unwrap_err();
        assert_eq!(err, MeshError::Shape { field: "neighbours", expected: 4, got: 3 });
    }

    #[test]
    fn new_rejects_out_of_range_neighbour() {
        let err = TinMesh::new(vec![[0.0, 0.0]; 2], vec![1, 5], vec![1.0; 2], vec![1.0; 2], vec![1.0; 2], 1, 0)
            .unwrap_err();
        assert_eq!(err, MeshError::NeighbourOutOfRange { node: 1, neighbour: 5 });
    }
}
