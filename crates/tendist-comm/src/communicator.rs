//! Collective communication interface
//!
//! Every suspension point in tendist is one of the collectives below. All
//! members of a communicator must call the same collectives, the same number
//! of times, in the same order; a mismatch blocks forever or surfaces as a
//! `Transport` error on transports that can detect it.

use std::sync::atomic::{AtomicU64, Ordering};
use tendist_core::{Element, Result};

/// Handle to a group of cooperating processes
pub trait Communicator: Clone + Send + Sync {
    /// Rank of the calling process within this communicator
    fn rank(&self) -> usize;

    /// Number of processes in this communicator
    fn size(&self) -> usize;

    /// Copy `buf` on `root` into `buf` on every other rank.
    ///
    /// Every rank must pass a buffer of the same length.
    fn broadcast<T: Clone + Send + Sync + 'static>(&self, buf: &mut [T], root: usize) -> Result<()>;

    /// Element-wise sum of `buf` across all ranks, result on every rank.
    ///
    /// The reduction uses `T` itself, so no precision is lost or gained.
    fn all_reduce_sum<T: Element>(&self, buf: &mut [T]) -> Result<()>;

    /// Logical OR of a flag across all ranks
    fn all_reduce_or(&self, flag: bool) -> Result<bool>;

    /// Collect one value from every rank, in rank order
    fn all_gather<T: Clone + Send + Sync + 'static>(&self, value: T) -> Result<Vec<T>>;

    /// Personalized exchange: `send[r]` goes to rank `r`; the result holds
    /// what every rank sent to the caller, indexed by source rank.
    fn all_to_allv<T: Clone + Send + Sync + 'static>(&self, send: Vec<Vec<T>>) -> Result<Vec<Vec<T>>>;

    /// Block until every rank has arrived
    fn barrier(&self) -> Result<()>;

    /// Partition the communicator.
    ///
    /// Ranks passing the same `color` form a new communicator, ordered by
    /// `key` and then by their rank in `self`.
    fn split(&self, color: usize, key: usize) -> Result<Self>;

    /// Monotonic wall-clock time in seconds
    fn wtime(&self) -> f64;
}

/// Snapshot of collective traffic
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommStats {
    /// Broadcasts issued
    pub broadcasts: u64,
    /// All-reduces issued
    pub all_reduces: u64,
    /// All-to-all exchanges issued
    pub all_to_alls: u64,
    /// Elements moved by this rank, sent and received
    pub elements_moved: u64,
}

/// Atomic counters behind [`CommStats`]
#[derive(Debug, Default)]
pub(crate) struct CommStatsInternal {
    broadcasts: AtomicU64,
    all_reduces: AtomicU64,
    all_to_alls: AtomicU64,
    elements_moved: AtomicU64,
}

impl CommStatsInternal {
    pub(crate) fn record_broadcast(&self, elements: usize) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.elements_moved
            .fetch_add(elements as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_all_reduce(&self, elements: usize) {
        self.all_reduces.fetch_add(1, Ordering::Relaxed);
        self.elements_moved
            .fetch_add(elements as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_all_to_all(&self, elements: usize) {
        self.all_to_alls.fetch_add(1, Ordering::Relaxed);
        self.elements_moved
            .fetch_add(elements as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CommStats {
        CommStats {
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            all_reduces: self.all_reduces.load(Ordering::Relaxed),
            all_to_alls: self.all_to_alls.load(Ordering::Relaxed),
            elements_moved: self.elements_moved.load(Ordering::Relaxed),
        }
    }
}

/// Run `check` on every rank and fail everywhere if it failed anywhere.
///
/// The local error wins on ranks where `check` failed; other ranks receive
/// `on_remote_failure()`. Use this before entering a sequence of
/// collectives that a failing rank could not complete.
pub fn collective_status<C, F, E>(comm: &C, check: F, on_remote_failure: E) -> Result<()>
where
    C: Communicator,
    F: FnOnce() -> Result<()>,
    E: FnOnce() -> tendist_core::TendistError,
{
    let local = check();
    let any_failed = comm.all_reduce_or(local.is_err())?;
    match local {
        Err(e) => Err(e),
        Ok(()) if any_failed => Err(on_remote_failure()),
        Ok(()) => Ok(()),
    }
}
