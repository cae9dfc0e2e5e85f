//! In-process communicator: one rank per thread
//!
//! All ranks of a group meet at a shared rendezvous guarded by a
//! `parking_lot` mutex and condition variable. Each collective is one round:
//! every rank deposits a payload, the last arrival publishes the full set,
//! every rank reads it, and the last departure opens the next round.
//!
//! If a rank panics, the whole world is poisoned and every blocked rank
//! returns a `Transport` error instead of waiting forever.
//!
//! # Example
//!
//! ```
//! use tendist_comm::{Communicator, ThreadComm};
//!
//! let sums = ThreadComm::run(4, |comm| {
//!     let mut v = vec![comm.rank() as f64];
//!     comm.all_reduce_sum(&mut v).unwrap();
//!     v[0]
//! });
//! assert_eq!(sums, vec![6.0; 4]);
//! ```

use crate::communicator::{CommStats, CommStatsInternal, Communicator};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tendist_core::{Element, Result, TendistError};

type Payload = Arc<dyn Any + Send + Sync>;

/// State shared by every group spawned from one world
struct World {
    poisoned: AtomicBool,
    groups: Mutex<Vec<Weak<Group>>>,
    epoch: Instant,
    stats: Vec<CommStatsInternal>,
}

impl World {
    fn poison(&self) {
        self.poisoned.store(true, Ordering::SeqCst);
        for group in self.groups.lock().iter().filter_map(Weak::upgrade) {
            let _state = group.state.lock();
            group.cv.notify_all();
        }
    }

    fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct Round {
    arrived: usize,
    departed: usize,
    slots: Vec<Option<Payload>>,
    published: Option<Arc<Vec<Payload>>>,
}

/// One communicator's rendezvous
struct Group {
    size: usize,
    /// World rank of each member, by group rank
    world_ranks: Vec<usize>,
    state: Mutex<Round>,
    cv: Condvar,
    world: Arc<World>,
}

impl Group {
    fn new(world: &Arc<World>, world_ranks: Vec<usize>) -> Arc<Self> {
        let size = world_ranks.len();
        let group = Arc::new(Self {
            size,
            world_ranks,
            state: Mutex::new(Round {
                slots: vec![None; size],
                ..Round::default()
            }),
            cv: Condvar::new(),
            world: Arc::clone(world),
        });
        let mut groups = world.groups.lock();
        groups.retain(|g| g.strong_count() > 0);
        groups.push(Arc::downgrade(&group));
        group
    }

    fn poisoned_error() -> TendistError {
        TendistError::Transport("a peer rank failed during a collective".to_string())
    }

    /// Deposit `payload` and return every rank's payload in rank order
    fn exchange(&self, rank: usize, payload: Payload) -> Result<Arc<Vec<Payload>>> {
        let mut st = self.state.lock();
        while st.published.is_some() {
            if self.world.is_poisoned() {
                return Err(Self::poisoned_error());
            }
            self.cv.wait(&mut st);
        }
        st.slots[rank] = Some(payload);
        st.arrived += 1;
        if st.arrived == self.size {
            let all: Option<Vec<Payload>> = st.slots.iter_mut().map(Option::take).collect();
            let all = all.ok_or_else(|| {
                TendistError::Transport("collective round is missing a contribution".to_string())
            })?;
            st.published = Some(Arc::new(all));
            st.arrived = 0;
            self.cv.notify_all();
        } else {
            while st.published.is_none() {
                if self.world.is_poisoned() {
                    return Err(Self::poisoned_error());
                }
                self.cv.wait(&mut st);
            }
        }
        let result = st
            .published
            .clone()
            .ok_or_else(|| TendistError::Transport("collective round vanished".to_string()))?;
        st.departed += 1;
        if st.departed == self.size {
            st.departed = 0;
            st.published = None;
            self.cv.notify_all();
        }
        Ok(result)
    }
}

fn downcast<'a, T: 'static>(payload: &'a Payload, op: &str) -> Result<&'a T> {
    payload.downcast_ref::<T>().ok_or_else(|| {
        TendistError::Transport(format!("{}: peers issued a different collective", op))
    })
}

/// Thread-backed [`Communicator`]
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    group: Arc<Group>,
}

impl ThreadComm {
    /// Create the `n` rank handles of a new world
    pub fn world(n: usize) -> Vec<ThreadComm> {
        let world = Arc::new(World {
            poisoned: AtomicBool::new(false),
            groups: Mutex::new(Vec::new()),
            epoch: Instant::now(),
            stats: (0..n).map(|_| CommStatsInternal::default()).collect(),
        });
        let group = Group::new(&world, (0..n).collect());
        (0..n)
            .map(|rank| ThreadComm {
                rank,
                group: Arc::clone(&group),
            })
            .collect()
    }

    /// Run `f` on `n` ranks, one thread each, and return the results in rank
    /// order. A panic on any rank poisons the world and is re-raised here.
    pub fn run<F, R>(n: usize, f: F) -> Vec<R>
    where
        F: Fn(ThreadComm) -> R + Sync,
        R: Send,
    {
        let comms = ThreadComm::world(n);
        std::thread::scope(|scope| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    let f = &f;
                    scope.spawn(move || {
                        let _guard = PoisonOnPanic(Arc::clone(&comm.group.world));
                        f(comm)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(r) => r,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }

    /// Traffic counters of this rank's world rank
    pub fn stats(&self) -> CommStats {
        self.stats_slot().snapshot()
    }

    fn stats_slot(&self) -> &CommStatsInternal {
        &self.group.world.stats[self.group.world_ranks[self.rank]]
    }

    fn exchange<T: Send + Sync + 'static>(&self, value: T) -> Result<Arc<Vec<Payload>>> {
        self.group.exchange(self.rank, Arc::new(value))
    }
}

struct PoisonOnPanic(Arc<World>);

impl Drop for PoisonOnPanic {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.poison();
        }
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.group.size
    }

    fn broadcast<T: Clone + Send + Sync + 'static>(&self, buf: &mut [T], root: usize) -> Result<()> {
        if root >= self.size() {
            return Err(TendistError::protocol(format!(
                "broadcast root {} outside communicator of size {}",
                root,
                self.size()
            )));
        }
        let contribution: Option<Vec<T>> = (self.rank == root).then(|| buf.to_vec());
        let all = self.exchange(contribution)?;
        if self.rank != root {
            let data = downcast::<Option<Vec<T>>>(&all[root], "broadcast")?
                .as_ref()
                .ok_or_else(|| TendistError::Transport("broadcast root sent nothing".into()))?;
            if data.len() != buf.len() {
                return Err(TendistError::protocol(format!(
                    "broadcast of {} elements into a buffer of {}",
                    data.len(),
                    buf.len()
                )));
            }
            buf.clone_from_slice(data);
        }
        self.stats_slot().record_broadcast(buf.len());
        Ok(())
    }

    fn all_reduce_sum<T: Element>(&self, buf: &mut [T]) -> Result<()> {
        let all = self.exchange(buf.to_vec())?;
        let mut acc = vec![T::zero(); buf.len()];
        for payload in all.iter() {
            let part = downcast::<Vec<T>>(payload, "all_reduce_sum")?;
            if part.len() != buf.len() {
                return Err(TendistError::protocol(format!(
                    "all-reduce of {} elements against {}",
                    part.len(),
                    buf.len()
                )));
            }
            for (a, &p) in acc.iter_mut().zip(part) {
                *a += p;
            }
        }
        buf.copy_from_slice(&acc);
        self.stats_slot().record_all_reduce(buf.len());
        Ok(())
    }

    fn all_reduce_or(&self, flag: bool) -> Result<bool> {
        let all = self.exchange(flag)?;
        let mut any = false;
        for payload in all.iter() {
            any |= *downcast::<bool>(payload, "all_reduce_or")?;
        }
        Ok(any)
    }

    fn all_gather<T: Clone + Send + Sync + 'static>(&self, value: T) -> Result<Vec<T>> {
        let all = self.exchange(value)?;
        all.iter()
            .map(|p| downcast::<T>(p, "all_gather").cloned())
            .collect()
    }

    fn all_to_allv<T: Clone + Send + Sync + 'static>(&self, send: Vec<Vec<T>>) -> Result<Vec<Vec<T>>> {
        if send.len() != self.size() {
            return Err(TendistError::protocol(format!(
                "all-to-all with {} send lists on {} ranks",
                send.len(),
                self.size()
            )));
        }
        let sent: usize = send.iter().map(Vec::len).sum();
        let all = self.exchange(send)?;
        let mut recv = Vec::with_capacity(self.size());
        for payload in all.iter() {
            let lists = downcast::<Vec<Vec<T>>>(payload, "all_to_allv")?;
            recv.push(lists[self.rank].clone());
        }
        let received: usize = recv.iter().map(Vec::len).sum();
        self.stats_slot().record_all_to_all(sent + received);
        Ok(recv)
    }

    fn barrier(&self) -> Result<()> {
        let all = self.exchange(())?;
        for payload in all.iter() {
            downcast::<()>(payload, "barrier")?;
        }
        Ok(())
    }

    fn split(&self, color: usize, key: usize) -> Result<Self> {
        let world_rank = self.group.world_ranks[self.rank];
        let members = self.all_gather((color, key, world_rank))?;

        let mut mine: Vec<(usize, usize, usize)> = members
            .iter()
            .enumerate()
            .filter(|(_, m)| m.0 == color)
            .map(|(r, m)| (m.1, r, m.2))
            .collect();
        mine.sort_unstable();
        let new_rank = mine
            .iter()
            .position(|&(_, r, _)| r == self.rank)
            .ok_or_else(|| TendistError::Transport("split lost the calling rank".into()))?;
        let leader = mine[0].1;

        // The leader of each color builds the group and hands it to its members.
        let offer: Option<(usize, Arc<Group>)> = (leader == self.rank).then(|| {
            let world_ranks = mine.iter().map(|&(_, _, w)| w).collect();
            (color, Group::new(&self.group.world, world_ranks))
        });
        let offers = self.all_gather(offer)?;
        let group = offers
            .into_iter()
            .flatten()
            .find(|(c, _)| *c == color)
            .map(|(_, g)| g)
            .ok_or_else(|| TendistError::Transport("split produced no group".into()))?;

        tracing::trace!(color, key, new_rank, size = group.size, "communicator split");
        Ok(ThreadComm {
            rank: new_rank,
            group,
        })
    }

    fn wtime(&self) -> f64 {
        self.group.world.epoch.elapsed().as_secs_f64()
    }
}

impl std::fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.group.size)
            .finish()
    }
}
