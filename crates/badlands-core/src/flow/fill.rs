//! Depression filling by priority flood with an epsilon gradient.
//!
//! Produces the same surface as the Planchon–Darboux iteration: every node is
//! raised to at least `epsilon` above the lowest path to an outlet, so
//! steepest descent on the result always finds a strictly lower neighbour.
//! In partial mode the raise is capped at `fill_max` above the raw surface,
//! leaving deep pits as (shallower) depressions.
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::mesh::TinMesh;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FillParams {
    /// Maximum depth filled in partial mode (m).
    pub fill_max: f64,
    /// Minimum drop imposed across filled areas (m).
    pub epsilon: f64,
}

impl Default for FillParams {
    fn default() -> Self {
        Self { fill_max: 1.0, epsilon: 0.01 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Level(f64);

impl Eq for Level {}

impl PartialOrd for Level {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Level {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Fill depressions of `elevation`.
///
/// Outlets are boundary nodes and nodes at or below `sea_level`. With
/// `fill_all` every depression is removed; otherwise each node is raised by
/// at most `params.fill_max`.
pub fn fill_depressions(
    elevation: &[f64],
    mesh: &TinMesh,
    params: &FillParams,
    fill_all: bool,
    sea_level: f64,
) -> Vec<f64> {
    let n = elevation.len();
    let mut filled = elevation.to_vec();
    let mut closed = vec![false; n];
    let mut queue: BinaryHeap<Reverse<(Level, usize)>> = BinaryHeap::with_capacity(n);

    for i in 0..n {
        if mesh.is_boundary(i) || elevation[i] <= sea_level {
            closed[i] = true;
            queue.push(Reverse((Level(filled[i]), i)));
        }
    }
    if queue.is_empty() {
        // Closed basin without outlets: drain through the global minimum.
        if let Some((i, &z)) = elevation.iter().enumerate().min_by(|a, b| a.1.total_cmp(b.1)) {
            log::warn!("fill: no outlet on mesh, seeding from lowest node {i}");
            closed[i] = true;
            queue.push(Reverse((Level(z), i)));
        }
    }

    while let Some(Reverse((Level(z), cur))) = queue.pop() {
        for nb in mesh.neighbours(cur) {
            let j = nb.node;
            if closed[j] {
                continue;
            }
            closed[j] = true;
            let floor = z + params.epsilon;
            if elevation[j] < floor {
                filled[j] = if fill_all {
                    floor
                } else {
                    floor.min(elevation[j] + params.fill_max)
                };
            }
            queue.push(Reverse((Level(filled[j]), j)));
        }
    }

    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::receivers::steepest_descent;

    /// Bowl with a 5 m pit in the middle of a 7×7 grid, rim at 10 m.
    fn pit_mesh() -> (TinMesh, Vec<f64>) {
        let mesh = TinMesh::regular_grid(7, 7, 1.0).unwrap();
        let elev = mesh
            .coords
            .iter()
            .map(|&[x, y]| {
                let d = ((x - 3.0).powi(2) + (y - 3.0).powi(2)).sqrt();
                if d < 1.5 { 5.0 + d } else { 10.0 + x * 0.1 }
            })
            .collect();
        (mesh, elev)
    }

    #[test]
    fn filled_never_below_raw() {
        let (mesh, elev) = pit_mesh();
        for fill_all in [true, false] {
            let filled = fill_depressions(&elev, &mesh, &FillParams::default(), fill_all, -100.0);
            for (i, (&f, &z)) in filled.iter().zip(&elev).enumerate() {
                assert!(f >= z, "node {i}: filled {f} < raw {z} (fill_all={fill_all})");
            }
        }
    }

    #[test]
    fn full_fill_drains_every_node_downhill_to_an_outlet() {
        let (mesh, elev) = pit_mesh();
        let filled = fill_depressions(&elev, &mesh, &FillParams::default(), true, -100.0);
        let graph = steepest_descent(&filled, &mesh);
        assert!(
            graph.base.iter().all(|&b| mesh.is_boundary(b)),
            "full fill left interior pits: {:?}",
            graph.base.iter().filter(|&&b| !mesh.is_boundary(b)).collect::<Vec<_>>()
        );
        for start in 0..mesh.len() {
            let mut node = start;
            while graph.receivers[node] != node {
                let next = graph.receivers[node];
                assert!(filled[next] < filled[node], "path from {start} climbs at {node} -> {next}");
                node = next;
            }
        }
    }

    #[test]
    fn partial_fill_is_capped() {
        let (mesh, elev) = pit_mesh();
        let params = FillParams { fill_max: 1.0, epsilon: 0.01 };
        let filled = fill_depressions(&elev, &mesh, &params, false, -100.0);
        for (i, (&f, &z)) in filled.iter().zip(&elev).enumerate() {
            assert!(f - z <= 1.0 + 1e-12, "node {i} raised by {}", f - z);
        }
        // The pit floor is 5 m below the rim, so a 1 m cap leaves a depression.
        let graph = steepest_descent(&filled, &mesh);
        assert!(graph.base.iter().any(|&b| !mesh.is_boundary(b)));
    }

    #[test]
    fn submerged_nodes_are_outlets() {
        let (mesh, elev) = pit_mesh();
        let filled = fill_depressions(&elev, &mesh, &FillParams::default(), true, 6.0);
        for (i, &z) in elev.iter().enumerate() {
            if z <= 6.0 {
                assert_eq!(filled[i], z, "submerged node {i} should keep its elevation");
            }
        }
    }
}
