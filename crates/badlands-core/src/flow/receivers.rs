//! Single-flow-direction (steepest descent) receivers on a TIN.
#[cfg(feature = "threading")]
use rayon::prelude::*;

use crate::mesh::TinMesh;

/// Receiver assignment for one surface.
#[derive(Debug, Clone, Default)]
pub struct ReceiverGraph {
    /// Downstream neighbour of each node; a node is its own receiver at a base.
    pub receivers: Vec<usize>,
    /// Drop per unit length towards the receiver (0 at base nodes).
    pub slope: Vec<f64>,
    /// Edge length to the receiver (0 at base nodes).
    pub distance: Vec<f64>,
    /// Base (self-receiving) nodes, ascending.
    pub base: Vec<usize>,
}

impl ReceiverGraph {
    pub fn len(&self) -> usize {
        self.receivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receivers.is_empty()
    }
}

/// Steepest-descent receivers of `surface`. Boundary nodes are outlets.
pub fn steepest_descent(surface: &[f64], mesh: &TinMesh) -> ReceiverGraph {
    let n = surface.len();

    #[cfg(feature = "threading")]
    let picks: Vec<(usize, f64, f64)> = (0..n)
        .into_par_iter()
        .map(|i| steepest_neighbour(surface, mesh, i))
        .collect();
    #[cfg(not(feature = "threading"))]
    let picks: Vec<(usize, f64, f64)> = (0..n).map(|i| steepest_neighbour(surface, mesh, i)).collect();

    let mut graph = ReceiverGraph {
        receivers: Vec::with_capacity(n),
        slope: Vec::with_capacity(n),
        distance: Vec::with_capacity(n),
        base: Vec::new(),
    };
    for (i, (r, s, d)) in picks.into_iter().enumerate() {
        if r == i {
            graph.base.push(i);
        }
        graph.receivers.push(r);
        graph.slope.push(s);
        graph.distance.push(d);
    }
    graph
}

fn steepest_neighbour(surface: &[f64], mesh: &TinMesh, i: usize) -> (usize, f64, f64) {
    let mut best = (i, 0.0, 0.0);
    if mesh.is_boundary(i) {
        return best;
    }
    for nb in mesh.neighbours(i) {
        if nb.length <= 0.0 {
            continue;
        }
        let s = (surface[i] - surface[nb.node]) / nb.length;
        if s > best.1 {
            best = (nb.node, s, nb.length);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_drains_towards_low_edge() {
        let mesh = TinMesh::regular_grid(6, 4, 1.0).unwrap();
        let z: Vec<f64> = mesh.coords.iter().map(|&[x, _]| 10.0 * x).collect();
        let graph = steepest_descent(&z, &mesh);
        for i in mesh.bound_pts..mesh.len() {
            let r = graph.receivers[i];
            assert_eq!(mesh.coords[r][0], mesh.coords[i][0] - 1.0, "node {i} should drain west");
            assert!((graph.slope[i] - 10.0).abs() < 1e-12);
            assert_eq!(graph.distance[i], 1.0);
        }
        assert_eq!(graph.base, (0..mesh.bound_pts).collect::<Vec<_>>());
    }

    #[test]
    fn local_minimum_is_base() {
        let mesh = TinMesh::regular_grid(5, 5, 1.0).unwrap();
        let z: Vec<f64> = mesh
            .coords
            .iter()
            .map(|&[x, y]| (x - 2.0).powi(2) + (y - 2.0).powi(2))
            .collect();
        let graph = steepest_descent(&z, &mesh);
        let centre = mesh.coords.iter().position(|&p| p == [2.0, 2.0]).unwrap();
        assert!(graph.base.contains(&centre));
        assert_eq!(graph.receivers[centre], centre);
        assert_eq!(graph.slope[centre], 0.0);
    }

    #[test]
    fn diagonal_wins_when_steeper_per_unit_length() {
        let mesh = TinMesh::regular_grid(4, 4, 1.0).unwrap();
        // Plane falling towards the origin: the (-1,-1) diagonal drops 2 over √2.
        let z: Vec<f64> = mesh.coords.iter().map(|&[x, y]| x + y).collect();
        let graph = steepest_descent(&z, &mesh);
        for i in mesh.bound_pts..mesh.len() {
            let [x, y] = mesh.coords[i];
            assert_eq!(mesh.coords[graph.receivers[i]], [x - 1.0, y - 1.0]);
        }
    }
}
