//! Collective communication between cooperating workers.
//!
//! The engine needs exactly two collectives: an all-gather of one length per
//! worker and a variable-length all-gather of node indices concatenated in
//! rank order. Both are blocking: no worker returns before every worker has
//! contributed.
//!
//! [`SerialComm`] is the single-worker group. [`ThreadComm`] runs a group of
//! worker threads in one process, exchanging through a rank-indexed shared
//! buffer guarded by a barrier. With the `mpi` feature, `MpiComm` runs one
//! worker per MPI process.
use std::sync::{Arc, Barrier, Mutex};

use crate::error::CommError;

/// A worker's handle on its group.
pub trait Communicator {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Every worker supplies `len`; every worker receives all lengths by rank.
    fn all_gather_len(&self, len: usize) -> Result<Vec<usize>, CommError>;

    /// Every worker supplies `local` (its length must equal `counts[rank]`);
    /// every worker receives the rank-ordered concatenation.
    fn all_gather_varying(&self, local: &[usize], counts: &[usize]) -> Result<Vec<usize>, CommError>;
}

/// Single-worker group.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialComm;

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_gather_len(&self, len: usize) -> Result<Vec<usize>, CommError> {
        Ok(vec![len])
    }

    fn all_gather_varying(&self, local: &[usize], counts: &[usize]) -> Result<Vec<usize>, CommError> {
        check_counts(counts, 1)?;
        if local.len() != counts[0] {
            return Err(CommError::LengthMismatch {
                rank: 0,
                expected: counts[0],
                got: local.len(),
            });
        }
        Ok(local.to_vec())
    }
}

struct Exchange {
    barrier: Barrier,
    lens: Mutex<Vec<Option<usize>>>,
    segments: Mutex<Vec<Option<Vec<usize>>>>,
}

/// One member of an in-process worker group. Create the whole group with
/// [`ThreadComm::group`] and move one handle into each worker thread.
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
    shared: Arc<Exchange>,
}

impl ThreadComm {
    pub fn group(size: usize) -> Vec<ThreadComm> {
        let size = size.max(1);
        let shared = Arc::new(Exchange {
            barrier: Barrier::new(size),
            lens: Mutex::new(vec![None; size]),
            segments: Mutex::new(vec![None; size]),
        });
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                size,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    /// Publish, wait for everyone, read, then wait again so nobody
    /// overwrites a slot before every worker has read it.
    fn exchange<T, R>(
        &self,
        slots: &Mutex<Vec<Option<T>>>,
        value: T,
        read: impl FnOnce(&[Option<T>]) -> Result<R, CommError>,
    ) -> Result<R, CommError> {
        let published = match slots.lock() {
            Ok(mut guard) => {
                guard[self.rank] = Some(value);
                true
            }
            Err(_) => false,
        };
        self.shared.barrier.wait();
        let result = if published {
            slots.lock().map_err(|_| CommError::Poisoned).and_then(|guard| read(&guard))
        } else {
            Err(CommError::Poisoned)
        };
        self.shared.barrier.wait();
        result
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_gather_len(&self, len: usize) -> Result<Vec<usize>, CommError> {
        self.exchange(&self.shared.lens, len, |slots| {
            slots
                .iter()
                .enumerate()
                .map(|(rank, v)| v.ok_or(CommError::MissingContribution { rank }))
                .collect()
        })
    }

    fn all_gather_varying(&self, local: &[usize], counts: &[usize]) -> Result<Vec<usize>, CommError> {
        let size = self.size;
        self.exchange(&self.shared.segments, local.to_vec(), |slots| {
            check_counts(counts, size)?;
            let mut out = Vec::with_capacity(counts.iter().sum());
            for (rank, slot) in slots.iter().enumerate() {
                let segment = slot.as_ref().ok_or(CommError::MissingContribution { rank })?;
                if segment.len() != counts[rank] {
                    return Err(CommError::LengthMismatch {
                        rank,
                        expected: counts[rank],
                        got: segment.len(),
                    });
                }
                out.extend_from_slice(segment);
            }
            Ok(out)
        })
    }
}

fn check_counts(counts: &[usize], size: usize) -> Result<(), CommError> {
    if counts.len() != size {
        return Err(CommError::CountMismatch {
            expected: size,
            got: counts.len(),
        });
    }
    Ok(())
}

#[cfg(feature = "mpi")]
pub use self::mpi_backend::MpiComm;

#[cfg(feature = "mpi")]
mod mpi_backend {
    use mpi::datatype::PartitionMut;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::{Communicator as MpiCommunicator, CommunicatorCollectives};
    use mpi::Count;

    use super::{check_counts, Communicator};
    use crate::error::CommError;

    /// One MPI process of the worker group.
    pub struct MpiComm {
        comm: SimpleCommunicator,
    }

    impl MpiComm {
        /// Wrap a communicator, typically `universe.world()`.
        pub fn new(comm: SimpleCommunicator) -> Self {
            Self { comm }
        }

        fn gather_lens(&self, len: usize) -> Vec<usize> {
            let mut lens = vec![0u64; self.size()];
            self.comm.all_gather_into(&(len as u64), &mut lens[..]);
            lens.into_iter().map(|l| l as usize).collect()
        }
    }

    impl Communicator for MpiComm {
        fn rank(&self) -> usize {
            self.comm.rank() as usize
        }

        fn size(&self) -> usize {
            self.comm.size() as usize
        }

        fn all_gather_len(&self, len: usize) -> Result<Vec<usize>, CommError> {
            Ok(self.gather_lens(len))
        }

        fn all_gather_varying(&self, local: &[usize], counts: &[usize]) -> Result<Vec<usize>, CommError> {
            check_counts(counts, self.size())?;
            // Every rank checks every segment length so all ranks agree on
            // failure and nobody is left blocked in the variable gather.
            let actual = self.gather_lens(local.len());
            if let Some(rank) = (0..counts.len()).find(|&r| actual[r] != counts[r]) {
                return Err(CommError::LengthMismatch { rank, expected: counts[rank], got: actual[rank] });
            }
            let mpi_counts = counts
                .iter()
                .map(|&c| Count::try_from(c).map_err(|_| CommError::CountOverflow { count: c }))
                .collect::<Result<Vec<Count>, _>>()?;
            let mut displs = Vec::with_capacity(mpi_counts.len());
            let mut offset: Count = 0;
            for &c in &mpi_counts {
                displs.push(offset);
                offset = offset
                    .checked_add(c)
                    .ok_or(CommError::CountOverflow { count: counts.iter().sum() })?;
            }

            let send: Vec<u64> = local.iter().map(|&v| v as u64).collect();
            let mut gathered = vec![0u64; counts.iter().sum()];
            {
                let mut partition = PartitionMut::new(&mut gathered[..], mpi_counts, &displs[..]);
                self.comm.all_gather_varcount_into(&send[..], &mut partition);
            }
            Ok(gathered.into_iter().map(|v| v as usize).collect())
        }
    }

}
