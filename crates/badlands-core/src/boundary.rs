//! Boundary-node elevation from interior neighbours.
//!
//! Three conditions:
//!   - `Wall`  → boundary raised to [`BOUNDARY_SENTINEL`] (closed edge).
//!   - `Flat`  → copy of the nearest interior neighbour.
//!   - `Slope` → linear extrapolation through the nearest interior neighbour
//!     and that neighbour's own nearest interior neighbour.
//!
//! Nodes with no usable interior neighbour are deferred and then filled from
//! their nearest already-resolved neighbour, pass after pass, until none
//! remain. A pass that resolves nothing is a configuration error.
use std::collections::VecDeque;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BoundaryError;
use crate::mesh::TinMesh;

/// Elevation marking an unresolved (or walled) boundary node.
pub const BOUNDARY_SENTINEL: f64 = 1.0e7;
/// Elevations below this are considered resolved.
const RESOLVED_BELOW: f64 = 9.0e6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryCondition {
    Wall,
    Flat,
    Slope,
}

impl FromStr for BoundaryCondition {
    type Err = BoundaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wall" => Ok(BoundaryCondition::Wall),
            "flat" => Ok(BoundaryCondition::Flat),
            "slope" => Ok(BoundaryCondition::Slope),
            other => Err(BoundaryError::UnknownType(other.to_string())),
        }
    }
}

/// Overwrite the elevation of every boundary node of `mesh` according to `condition`.
pub fn resolve_boundary_elevation(
    elevation: &mut [f64],
    mesh: &TinMesh,
    condition: BoundaryCondition,
) -> Result<(), BoundaryError> {
    let bound_pts = mesh.bound_pts;
    elevation[..bound_pts].fill(BOUNDARY_SENTINEL);
    if condition == BoundaryCondition::Wall {
        return Ok(());
    }

    // Direct pass: reads interior nodes only, so visiting order is irrelevant.
    let mut deferred = VecDeque::new();
    for id in 0..bound_pts {
        let resolved = match nearest_interior(mesh, id) {
            None => None,
            Some((n1, ln1)) => match condition {
                BoundaryCondition::Flat => Some(elevation[n1]),
                _ => nearest_interior(mesh, n1).map(|(n2, ln2)| {
                    (elevation[n1] - elevation[n2]) * (ln2 + ln1) / ln2 + elevation[n2]
                }),
            },
        };
        match resolved {
            Some(z) => elevation[id] = z,
            None => deferred.push_back(id),
        }
    }

    drain_deferred(elevation, mesh, deferred)
}

/// Nearest neighbour of `node` with index `>= bound_pts`, and its distance.
fn nearest_interior(mesh: &TinMesh, node: usize) -> Option<(usize, f64)> {
    mesh.neighbours(node)
        .filter(|nb| nb.node >= mesh.bound_pts)
        .fold(None, |best: Option<(usize, f64)>, nb| match best {
            Some((_, l)) if l <= nb.length => best,
            _ => Some((nb.node, nb.length)),
        })
}

fn drain_deferred(
    elevation: &mut [f64],
    mesh: &TinMesh,
    mut pending: VecDeque<usize>,
) -> Result<(), BoundaryError> {
    while !pending.is_empty() {
        let before = pending.len();
        for _ in 0..before {
            let Some(id) = pending.pop_front() else { break };
            let source = mesh
                .neighbours(id)
                .filter(|nb| elevation[nb.node] < RESOLVED_BELOW)
                .fold(None, |best: Option<(usize, f64)>, nb| match best {
                    Some((_, l)) if l <= nb.length => best,
                    _ => Some((nb.node, nb.length)),
                });
            match source {
                Some((nb, _)) => elevation[id] = elevation[nb],
                None => pending.push_back(id),
            }
        }
        if pending.len() == before {
            let node = pending.front().copied().unwrap_or_default();
            return Err(BoundaryError::Unresolved { node });
        }
        if !pending.is_empty() {
            log::debug!("boundary: {} nodes still deferred after pass", pending.len());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::NO_NEIGHBOUR;

    fn grid_with_interior(nx: usize, ny: usize, f: impl Fn(f64, f64) -> f64) -> (TinMesh, Vec<f64>) {
        let mesh = TinMesh::regular_grid(nx, ny, 1.0).unwrap();
        let elev = mesh.coords.iter().map(|&[x, y]| f(x, y)).collect();
        (mesh, elev)
    }

    #[test]
    fn flat_ring_takes_interior_elevation() {
        let (mesh, mut elev) = grid_with_interior(5, 5, |_, _| 10.0);
        for z in elev[..mesh.bound_pts].iter_mut() {
            *z = -3.0;
        }
        resolve_boundary_elevation(&mut elev, &mesh, BoundaryCondition::Flat).unwrap();
        for (id, &z) in elev[..16].iter().enumerate() {
            assert_eq!(z, 10.0, "boundary node {id} resolved to {z}");
        }
    }

    #[test]
    fn wall_sets_sentinel_and_leaves_interior() {
        let (mesh, mut elev) = grid_with_interior(4, 4, |x, y| x + y);
        let interior_before = elev[mesh.bound_pts..].to_vec();
        resolve_boundary_elevation(&mut elev, &mesh, BoundaryCondition::Wall).unwrap();
        assert!(elev[..mesh.bound_pts].iter().all(|&z| z == BOUNDARY_SENTINEL));
        assert_eq!(&elev[mesh.bound_pts..], interior_before.as_slice());
    }

    #[test]
    fn slope_extrapolates_planar_ramp() {
        // z = 2x: on the west edge (x = 0), the nearest interior neighbour is
        // (1, y) and its nearest interior neighbour is (2, y) (first slot wins
        // ties), so the extrapolated value is exactly 0.
        let (mesh, mut elev) = grid_with_interior(6, 6, |x, _| 2.0 * x);
        resolve_boundary_elevation(&mut elev, &mesh, BoundaryCondition::Slope).unwrap();
        for id in 0..mesh.bound_pts {
            let [x, y] = mesh.coords[id];
            if x == 0.0 && y > 0.0 && y < 5.0 {
                assert!((elev[id] - 0.0).abs() < 1e-9, "west edge node {id} = {}", elev[id]);
            }
        }
        assert!(elev[..mesh.bound_pts].iter().all(|&z| z < RESOLVED_BELOW));
    }

    #[test]
    fn resolution_is_deterministic() {
        let (mesh, elev0) = grid_with_interior(7, 5, |x, y| (x * 1.7).sin() * 30.0 + y * 4.0);
        let mut a = elev0.clone();
        let mut b = elev0.clone();
        resolve_boundary_elevation(&mut a, &mesh, BoundaryCondition::Slope).unwrap();
        resolve_boundary_elevation(&mut b, &mesh, BoundaryCondition::Slope).unwrap();
        assert_eq!(a, b);
        let mut again = a.clone();
        resolve_boundary_elevation(&mut again, &mesh, BoundaryCondition::Slope).unwrap();
        assert_eq!(a, again, "re-running on resolved output must not drift");
    }

    #[test]
    fn deferred_chain_resolves_over_several_passes() {
        // Path 0 - 1 - 2 - 3 where only node 3 is interior. Node 2 resolves
        // directly; 1 and 0 are deferred and drained in successive passes.
        let neighbours = vec![1, NO_NEIGHBOUR, 0, 2, 1, 3, 2, NO_NEIGHBOUR];
        let lengths = vec![1.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0];
        let mesh = TinMesh::new(
            vec![[0.0, 0.0], [1.0, 0.0], [2.0, 0.0], [3.0, 0.0]],
            neighbours,
            lengths.clone(),
            lengths,
            vec![1.0; 4],
            2,
            3,
        )
        .unwrap();
        let mut elev = vec![0.0, 0.0, 0.0, 42.0];
        resolve_boundary_elevation(&mut elev, &mesh, BoundaryCondition::Flat).unwrap();
        assert_eq!(elev, vec![42.0, 42.0, 42.0, 42.0]);
    }

    #[test]
    fn isolated_boundary_node_is_reported() {
        // Node 0 only touches node 1, which is also boundary and only touches 0.
        let mesh = TinMesh::new(
            vec![[0.0, 0.0], [1.0, 0.0], [5.0, 5.0]],
            vec![1, 0, NO_NEIGHBOUR],
            vec![1.0, 1.0, 0.0],
            vec![1.0, 1.0, 0.0],
            vec![1.0; 3],
            1,
            2,
        )
        .unwrap();
        let mut elev = vec![0.0, 0.0, 7.0];
        let err = resolve_boundary_elevation(&mut elev, &mesh, BoundaryCondition::Flat).unwrap_err();
        assert_eq!(err, BoundaryError::Unresolved { node: 0 });
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert_eq!("slope".parse::<BoundaryCondition>(), Ok(BoundaryCondition::Slope));
        assert_eq!(
            "open".parse::<BoundaryCondition>(),
            Err(BoundaryError::UnknownType("open".into()))
        );
    }
}
