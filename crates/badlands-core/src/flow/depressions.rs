//! Depression identification on the partially filled surface.
//!
//! A depression is a connected set of emerged nodes whose filled elevation
//! exceeds the raw elevation. Each one gets an id, the node it spills into and
//! the water volume it can store.
use std::collections::VecDeque;

use crate::mesh::TinMesh;

/// Filled depth below which a node is not considered part of a depression.
const MIN_DEPTH: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct Depression {
    pub id: usize,
    /// Lowest-filled node outside the depression adjacent to it.
    pub outlet: Option<usize>,
    /// Σ (filled − raw) · control volume.
    pub volume: f64,
    pub nodes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DepressionSet {
    /// Depression id of each node, `None` outside depressions.
    pub pit_id: Vec<Option<usize>>,
    pub pits: Vec<Depression>,
}

pub fn depression_parameters(
    filled: &[f64],
    elevation: &[f64],
    mesh: &TinMesh,
    sea_level: f64,
) -> DepressionSet {
    let n = filled.len();
    let in_pit = |i: usize| filled[i] - elevation[i] > MIN_DEPTH && elevation[i] > sea_level;

    let mut pit_id = vec![None; n];
    let mut pits = Vec::new();
    let mut queue = VecDeque::new();

    for seed in 0..n {
        if pit_id[seed].is_some() || !in_pit(seed) {
            continue;
        }
        let id = pits.len();
        let mut volume = 0.0;
        let mut count = 0;
        let mut outlet: Option<usize> = None;
        pit_id[seed] = Some(id);
        queue.push_back(seed);

        while let Some(i) = queue.pop_front() {
            volume += (filled[i] - elevation[i]) * mesh.control_volumes[i];
            count += 1;
            for nb in mesh.neighbours(i) {
                let j = nb.node;
                if in_pit(j) {
                    if pit_id[j].is_none() {
                        pit_id[j] = Some(id);
                        queue.push_back(j);
                    }
                } else if outlet.map_or(true, |o| filled[j] < filled[o]) {
                    outlet = Some(j);
                }
            }
        }

        pits.push(Depression { id, outlet, volume, nodes: count });
    }

    DepressionSet { pit_id, pits }
}
