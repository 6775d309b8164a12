//! Multi-process transfer and collective/independent mode arbitration.
//!
//! A [`File`](crate::File) is opened with a [`Communicator`] describing the group of processes sharing it.
//! When a transfer requests [`TransferMode::Collective`] and the group has more than one process, every process must execute the same sequence of collective operations, including processes with nothing to transfer.
//! The per-call [`ModeArbiter`] decides, chunk by chunk, whether a transfer takes part in a collective slot or proceeds independently.
//!
//! Collective operations block until every process in the group arrives.
//! A process that skips a collective operation that its peers enter deadlocks the group.

use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Barrier,
    },
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::DatasetError;

/// A communicator error.
#[derive(Clone, Debug, Error)]
#[error("{0}")]
pub struct CommunicatorError(String);

impl CommunicatorError {
    /// Create a new communicator error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A group of processes sharing a file.
pub trait Communicator: Send + Sync + Debug {
    /// Return the rank of this process in the group.
    fn rank(&self) -> usize;

    /// Return the number of processes in the group.
    fn size(&self) -> usize;

    /// Return the minimum of `value` across the group.
    ///
    /// Blocks until every process in the group has contributed.
    ///
    /// # Errors
    /// Returns a [`CommunicatorError`] if the reduction fails.
    fn all_reduce_min(&self, value: u64) -> Result<u64, CommunicatorError>;

    /// Block until every process in the group arrives.
    ///
    /// # Errors
    /// Returns a [`CommunicatorError`] if the barrier fails.
    fn barrier(&self) -> Result<(), CommunicatorError>;
}

/// A communicator for a single process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleProcess;

impl Communicator for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_reduce_min(&self, value: u64) -> Result<u64, CommunicatorError> {
        Ok(value)
    }

    fn barrier(&self) -> Result<(), CommunicatorError> {
        Ok(())
    }
}

#[derive(Debug)]
struct ThreadGroup {
    size: usize,
    alive: AtomicUsize,
    barrier: Barrier,
    values: Mutex<Vec<u64>>,
}

/// An in-process communicator where each member of the group is a thread.
///
/// Create a group with [`ThreadCommunicator::group`] and move one member to each thread.
/// Collective operations fail once any member of the group has been dropped.
#[derive(Debug)]
pub struct ThreadCommunicator {
    rank: usize,
    group: Arc<ThreadGroup>,
}

impl ThreadCommunicator {
    /// Create a group of `size` communicators, one per rank.
    ///
    /// # Panics
    /// Panics if `size` is zero.
    #[must_use]
    pub fn group(size: usize) -> Vec<Self> {
        assert!(size > 0, "a communicator group needs at least one member");
        let group = Arc::new(ThreadGroup {
            size,
            alive: AtomicUsize::new(size),
            barrier: Barrier::new(size),
            values: Mutex::new(vec![u64::MAX; size]),
        });
        (0..size)
            .map(|rank| Self {
                rank,
                group: group.clone(),
            })
            .collect()
    }

    fn check_alive(&self) -> Result<(), CommunicatorError> {
        let alive = self.group.alive.load(Ordering::Acquire);
        if alive == self.group.size {
            Ok(())
        } else {
            Err(CommunicatorError::new(format!(
                "only {alive} of {} group members remain",
                self.group.size
            )))
        }
    }
}

impl Drop for ThreadCommunicator {
    fn drop(&mut self) {
        self.group.alive.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Communicator for ThreadCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.group.size
    }

    fn all_reduce_min(&self, value: u64) -> Result<u64, CommunicatorError> {
        self.check_alive()?;
        self.group.values.lock()[self.rank] = value;
        self.group.barrier.wait();
        let min = self
            .group
            .values
            .lock()
            .iter()
            .copied()
            .min()
            .unwrap_or(value);
        // no member may overwrite its slot until every member has read the minimum
        self.group.barrier.wait();
        Ok(min)
    }

    fn barrier(&self) -> Result<(), CommunicatorError> {
        self.check_alive()?;
        self.group.barrier.wait();
        Ok(())
    }
}

/// The requested transfer mode.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    /// Each process transfers independently.
    #[default]
    Independent,
    /// Processes transfer collectively.
    Collective,
}

/// The current transfer mode of a call.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum IoMode {
    /// Collective transfer was requested and is in effect.
    CollectiveRequested,
    /// Transfer is independent for the rest of the call.
    IndependentPermanent,
    /// Transfer is independent for the current chunk only.
    IndependentTemporary,
}

/// A summary of the modes used by one call.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ModeSummary {
    /// The number of chunks transferred collectively.
    pub collective: u64,
    /// The number of chunks that took a temporary independent detour.
    pub independent_temporary: u64,
    /// The number of chunks transferred after a permanent switch to independent mode.
    pub independent_permanent: u64,
}

/// Arbitrates between collective and independent transfer for one read or write call.
///
/// The arbiter holds the mode changes of the call; the caller's transfer properties are never modified.
/// [`finish`](ModeArbiter::finish) restores the requested mode, and is also run when the arbiter is dropped on an error path.
#[derive(Debug)]
pub struct ModeArbiter<'a> {
    comm: &'a dyn Communicator,
    active: bool,
    mode: IoMode,
    changed: bool,
    min_chunks: Option<u64>,
    chunks_seen: u64,
    summary: ModeSummary,
}

impl<'a> ModeArbiter<'a> {
    /// Create a new arbiter for a call requesting `requested` over `comm`.
    ///
    /// Collective arbitration is only active if collective transfer is requested and the group has more than one process.
    #[must_use]
    pub fn new(comm: &'a dyn Communicator, requested: TransferMode) -> Self {
        let active = requested == TransferMode::Collective && comm.size() > 1;
        Self {
            comm,
            active,
            mode: if active {
                IoMode::CollectiveRequested
            } else {
                IoMode::IndependentPermanent
            },
            changed: false,
            min_chunks: None,
            chunks_seen: 0,
            summary: ModeSummary::default(),
        }
    }

    /// Returns true if collective arbitration is active.
    #[must_use]
    pub fn is_collective(&self) -> bool {
        self.active
    }

    /// Return the current mode.
    #[must_use]
    pub fn mode(&self) -> IoMode {
        self.mode
    }

    /// Take part in the consensus vote on the number of chunks each process touches.
    ///
    /// Returns the minimum chunk count across the group, or `local_chunks` if arbitration is inactive.
    ///
    /// # Errors
    /// Returns [`DatasetError::ParallelConsensus`] if the vote fails. This is not recoverable by falling back to independent mode because peers are blocked in the same vote.
    pub fn vote(&mut self, local_chunks: u64) -> Result<u64, DatasetError> {
        if !self.active {
            return Ok(local_chunks);
        }
        let min_chunks = self.comm.all_reduce_min(local_chunks)?;
        log::debug!(
            "rank {} touches {local_chunks} chunks, group minimum {min_chunks}",
            self.comm.rank()
        );
        self.min_chunks = Some(min_chunks);
        Ok(min_chunks)
    }

    /// Decide the mode for the next chunk.
    ///
    /// Chunks beyond the group minimum switch to independent mode for the rest of the call.
    /// Chunks at or below the minimum whose file view is not `monotone` take a temporary independent detour.
    pub fn begin_chunk(&mut self, monotone: bool) -> IoMode {
        if !self.active {
            return self.mode;
        }
        self.chunks_seen += 1;
        if self.mode != IoMode::IndependentPermanent
            && self.min_chunks.is_some_and(|min| self.chunks_seen > min)
        {
            log::warn!(
                "rank {} switching to independent transfer after {} collective chunks",
                self.comm.rank(),
                self.chunks_seen - 1
            );
            self.mode = IoMode::IndependentPermanent;
            self.changed = true;
        } else if self.mode == IoMode::CollectiveRequested && !monotone {
            log::debug!(
                "rank {} chunk {} takes a temporary independent detour",
                self.comm.rank(),
                self.chunks_seen
            );
            self.mode = IoMode::IndependentTemporary;
            self.changed = true;
        }
        self.mode
    }

    /// Complete the current chunk, entering its collective slot if it has one.
    ///
    /// A temporary independent detour still enters the collective slot, with an empty contribution, and then reverts to collective mode.
    ///
    /// # Errors
    /// Returns [`DatasetError::ParallelConsensus`] if the collective slot fails.
    pub fn end_chunk(&mut self) -> Result<(), DatasetError> {
        if !self.active {
            return Ok(());
        }
        match self.mode {
            IoMode::CollectiveRequested => {
                self.summary.collective += 1;
                self.comm.barrier()?;
            }
            IoMode::IndependentTemporary => {
                self.summary.independent_temporary += 1;
                self.mode = IoMode::CollectiveRequested;
                self.comm.barrier()?;
            }
            IoMode::IndependentPermanent => {
                self.summary.independent_permanent += 1;
            }
        }
        Ok(())
    }

    /// Enter the single collective slot of a transfer that is not chunked.
    ///
    /// # Errors
    /// Returns [`DatasetError::ParallelConsensus`] if the collective slot fails.
    pub fn collective_slot(&mut self) -> Result<(), DatasetError> {
        if self.active && self.mode == IoMode::CollectiveRequested {
            self.summary.collective += 1;
            self.comm.barrier()?;
        }
        Ok(())
    }

    /// Restore the requested mode and return a summary of the modes used.
    pub fn finish(&mut self) -> ModeSummary {
        if self.changed {
            self.mode = IoMode::CollectiveRequested;
            self.changed = false;
        }
        self.summary
    }
}

impl Drop for ModeArbiter<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_process_arbiter_is_inactive() {
        let comm = SingleProcess;
        let mut arbiter = ModeArbiter::new(&comm, TransferMode::Collective);
        assert!(!arbiter.is_collective());
        assert_eq!(arbiter.vote(3).unwrap(), 3);
        assert_eq!(arbiter.begin_chunk(false), IoMode::IndependentPermanent);
        arbiter.end_chunk().unwrap();
        assert_eq!(arbiter.finish(), ModeSummary::default());
    }

    #[test]
    fn thread_communicator_all_reduce_min() {
        let handles: Vec<_> = ThreadCommunicator::group(4)
            .into_iter()
            .map(|comm| {
                std::thread::spawn(move || {
                    let value = 10 + comm.rank() as u64;
                    let first = comm.all_reduce_min(value).unwrap();
                    let second = comm.all_reduce_min(100 - value).unwrap();
                    comm.barrier().unwrap();
                    (first, second)
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), (10, 87));
        }
    }

    #[test]
    fn thread_communicator_disbanded() {
        let mut group = ThreadCommunicator::group(2);
        let comm = group.remove(0);
        drop(group);
        assert!(comm.all_reduce_min(1).is_err());
        assert!(comm.barrier().is_err());
        let mut arbiter = ModeArbiter::new(&comm, TransferMode::Collective);
        assert!(matches!(
            arbiter.vote(1),
            Err(DatasetError::ParallelConsensus(_))
        ));
    }

    #[test]
    fn arbiter_switches_beyond_group_minimum() {
        // rank r touches r + 1 chunks; chunk 2 of rank 0 is not monotone
        let handles: Vec<_> = ThreadCommunicator::group(3)
            .into_iter()
            .map(|comm| {
                std::thread::spawn(move || {
                    let local = comm.rank() as u64 + 2;
                    let mut arbiter = ModeArbiter::new(&comm, TransferMode::Collective);
                    assert_eq!(arbiter.vote(local).unwrap(), 2);
                    let mut modes = Vec::new();
                    for chunk in 0..local {
                        let monotone = !(comm.rank() == 0 && chunk == 1);
                        modes.push(arbiter.begin_chunk(monotone));
                        arbiter.end_chunk().unwrap();
                    }
                    let summary = arbiter.finish();
                    assert_eq!(arbiter.mode(), IoMode::CollectiveRequested);
                    (comm.rank(), modes, summary)
                })
            })
            .collect();
        for handle in handles {
            let (rank, modes, summary) = handle.join().unwrap();
            match rank {
                0 => {
                    assert_eq!(
                        modes,
                        vec![IoMode::CollectiveRequested, IoMode::IndependentTemporary]
                    );
                    assert_eq!(summary.collective, 1);
                    assert_eq!(summary.independent_temporary, 1);
                    assert_eq!(summary.independent_permanent, 0);
                }
                _ => {
                    assert_eq!(&modes[..2], &[IoMode::CollectiveRequested; 2]);
                    assert!(modes[2..]
                        .iter()
                        .all(|mode| *mode == IoMode::IndependentPermanent));
                    assert_eq!(summary.collective, 2);
                    assert_eq!(summary.independent_permanent, rank as u64);
                }
            }
        }
    }
}
