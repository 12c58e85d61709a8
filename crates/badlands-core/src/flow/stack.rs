//! Distributed construction of the downstream-first node order ("stack").
//!
//! Base nodes are split into contiguous chunks, one per worker. Each worker
//! walks the drainage trees of its own chunk, then all workers exchange
//! lengths and gather the pieces in rank order, so every worker ends with the
//! same full stack.
use crate::comm::Communicator;
use crate::error::StackError;

/// Upstream neighbours (donors) of every node, stored compressed.
#[derive(Debug, Clone)]
pub struct DonorGraph {
    offsets: Vec<usize>,
    donors: Vec<usize>,
}

impl DonorGraph {
    pub fn from_receivers(receivers: &[usize]) -> Self {
        let n = receivers.len();
        let mut counts = vec![0usize; n + 1];
        for (i, &r) in receivers.iter().enumerate() {
            if r != i {
                counts[r + 1] += 1;
            }
        }
        for k in 0..n {
            counts[k + 1] += counts[k];
        }
        let offsets = counts;
        let mut cursor = offsets.clone();
        let mut donors = vec![0usize; offsets[n]];
        for (i, &r) in receivers.iter().enumerate() {
            if r != i {
                donors[cursor[r]] = i;
                cursor[r] += 1;
            }
        }
        Self { offsets, donors }
    }

    #[inline]
    pub fn donors(&self, node: usize) -> &[usize] {
        &self.donors[self.offsets[node]..self.offsets[node + 1]]
    }
}

/// This worker's chunk of `base`.
///
/// Chunks are contiguous and differ in size by at most one; the first
/// `base.len() % size` chunks take the extra node.
pub fn partition_base(base: &[usize], size: usize, rank: usize) -> &[usize] {
    let size = size.max(1);
    let q = base.len() / size;
    let rem = base.len() % size;
    let start = rank * q + rank.min(rem);
    let len = q + usize::from(rank < rem);
    let start = start.min(base.len());
    let end = (start + len).min(base.len());
    &base[start..end]
}

/// Depth-first, receiver-before-donor order of the trees rooted at `roots`.
pub fn local_stack(donors: &DonorGraph, roots: &[usize]) -> Vec<usize> {
    let mut order = Vec::new();
    let mut pending = Vec::new();
    for &root in roots {
        pending.push(root);
        while let Some(node) = pending.pop() {
            order.push(node);
            pending.extend(donors.donors(node).iter().rev());
        }
    }
    order
}

/// Build this worker's piece and gather the full stack on every worker.
pub fn global_stack<C: Communicator>(
    receivers: &[usize],
    base: &[usize],
    comm: &C,
) -> Result<Vec<usize>, StackError> {
    let donors = DonorGraph::from_receivers(receivers);
    let roots = partition_base(base, comm.size(), comm.rank());
    let local = local_stack(&donors, roots);

    let lens = comm.all_gather_len(local.len())?;
    let stack = comm.all_gather_varying(&local, &lens)?;
    if stack.len() != receivers.len() {
        return Err(StackError::Incomplete {
            expected: receivers.len(),
            got: stack.len(),
        });
    }
    Ok(stack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{SerialComm, ThreadComm};
    use crate::flow::receivers::steepest_descent;
    use crate::mesh::TinMesh;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::thread;

    /// Three trees: {0 ← 1 ← 2}, {4 ← 3, 4 ← 5}, {7 ← 6 ← 8}.
    fn three_trees() -> (Vec<usize>, Vec<usize>) {
        let receivers = vec![0, 0, 1, 4, 4, 4, 7, 7, 6];
        (receivers, vec![0, 4, 7])
    }

    fn assert_topological(stack: &[usize], receivers: &[usize]) {
        let mut pos = vec![usize::MAX; receivers.len()];
        for (k, &node) in stack.iter().enumerate() {
            assert_eq!(pos[node], usize::MAX, "node {node} appears twice");
            pos[node] = k;
        }
        assert!(pos.iter().all(|&p| p != usize::MAX), "stack misses nodes");
        for (n, &r) in receivers.iter().enumerate() {
            if r != n {
                assert!(pos[r] < pos[n], "receiver {r} of {n} comes after it");
            }
        }
    }

    #[test]
    fn partition_is_balanced_and_contiguous() {
        let base: Vec<usize> = (0..10).collect();
        let chunks: Vec<&[usize]> = (0..4).map(|r| partition_base(&base, 4, r)).collect();
        assert_eq!(chunks[0], &[0, 1, 2]);
        assert_eq!(chunks[1], &[3, 4, 5]);
        assert_eq!(chunks[2], &[6, 7]);
        assert_eq!(chunks[3], &[8, 9]);
        // More workers than bases: trailing workers get nothing.
        assert!(partition_base(&[1, 2], 5, 4).is_empty());
        assert_eq!(partition_base(&[1, 2], 5, 1), &[2]);
    }

    #[test]
    fn serial_stack_is_topological_and_complete() {
        let (receivers, base) = three_trees();
        let stack = global_stack(&receivers, &base, &SerialComm).unwrap();
        assert_eq!(stack.len(), 9);
        assert_topological(&stack, &receivers);
    }

    #[test]
    fn two_workers_gather_six_then_three() {
        let (receivers, base) = three_trees();
        assert_eq!(partition_base(&base, 2, 0), &[0, 4]);
        assert_eq!(partition_base(&base, 2, 1), &[7]);

        let handles: Vec<_> = ThreadComm::group(2)
            .into_iter()
            .map(|comm| {
                let receivers = receivers.clone();
                let base = base.clone();
                thread::spawn(move || {
                    let donors = DonorGraph::from_receivers(&receivers);
                    let local = local_stack(&donors, partition_base(&base, 2, comm.rank()));
                    let lens = comm.all_gather_len(local.len()).unwrap();
                    let stack = global_stack(&receivers, &base, &comm).unwrap();
                    (local, lens, stack)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let worker0 = &results[0].0;
        let worker1 = &results[1].0;
        for (local, lens, stack) in &results {
            assert_eq!(lens, &vec![6, 3]);
            assert_eq!(lens.iter().sum::<usize>(), receivers.len());
            assert_eq!(stack.len(), 9);
            assert_eq!(&stack[..6], worker0.as_slice());
            assert_eq!(&stack[6..], worker1.as_slice());
            assert_topological(stack, &receivers);
            assert!(local.len() == 6 || local.len() == 3);
        }
        assert_eq!(results[0].2, results[1].2, "replicas differ between workers");
    }

    #[test]
    fn cycle_leaves_stack_incomplete() {
        // 1 and 2 point at each other and never reach a base.
        let receivers = vec![0, 2, 1];
        let err = global_stack(&receivers, &[0], &SerialComm).unwrap_err();
        assert_eq!(err, StackError::Incomplete { expected: 3, got: 1 });
    }

    #[test]
    fn random_surfaces_give_valid_stacks_for_any_worker_count() {
        let mesh = TinMesh::regular_grid(12, 9, 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..5 {
            let z: Vec<f64> = (0..mesh.len()).map(|_| rng.gen_range(0.0..100.0)).collect();
            let graph = steepest_descent(&z, &mesh);
            for workers in [1usize, 2, 3, 5] {
                let handles: Vec<_> = ThreadComm::group(workers)
                    .into_iter()
                    .map(|comm| {
                        let g = graph.clone();
                        thread::spawn(move || global_stack(&g.receivers, &g.base, &comm).unwrap())
                    })
                    .collect();
                let stacks: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
                for s in &stacks {
                    assert_eq!(s, &stacks[0]);
                    assert_topological(s, &graph.receivers);
                }
            }
        }
    }
}
