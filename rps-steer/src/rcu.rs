//! Deferred reclamation of retired snapshots.
//!
//! Writers never free a published snapshot when they replace it. The old
//! snapshot is handed to a [`RetireList`], which keeps it alive until every
//! reader that loaded it has let go. Only then is it dropped.
//!
//! # How readers are tracked
//!
//! Readers load snapshots through `arc_swap`. A load normally takes a "debt"
//! instead of bumping the reference count, but swapping the pointer pays all
//! outstanding debts on the old value, turning them into real references.
//! So once `swap` has returned, `Arc::strong_count` of the old snapshot counts
//! every reader still looking at it, plus the retire list's own reference.
//! A count of one means the grace period for that snapshot is over.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, trace};

/// Spins before falling back to `yield_now` while waiting for readers.
const SPIN_LIMIT: u32 = 64;

type Retired = Arc<dyn Any + Send + Sync>;

/// Snapshots waiting for their grace period to end.
#[derive(Default)]
pub struct RetireList {
    pending: Mutex<Vec<Retired>>,
    reclaimed: AtomicU64,
}

impl RetireList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand a replaced snapshot over for deferred reclamation.
    ///
    /// Also reclaims anything whose grace period has already ended, which can
    /// run arbitrary `Drop` code. Call it after releasing any writer lock.
    pub fn retire<T: Send + Sync + 'static>(&self, old: Arc<T>) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(old);
        self.collect();
    }

    /// Drop every retired snapshot that no reader references anymore.
    ///
    /// Returns how many snapshots were reclaimed.
    pub fn collect(&self) -> usize {
        let done: Vec<Retired> = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            let (keep, done) = pending
                .drain(..)
                .partition(|r: &Retired| Arc::strong_count(r) > 1);
            *pending = keep;
            done
        };

        // Dropped outside the lock: snapshots may own handlers with their own Drop.
        let n = done.len();
        drop(done);
        if n > 0 {
            self.reclaimed.fetch_add(n as u64, Ordering::Relaxed);
            trace!(reclaimed = n, "Reclaimed retired snapshots");
        }
        n
    }

    /// Number of snapshots still inside their grace period.
    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Total number of snapshots reclaimed so far.
    pub fn reclaimed(&self) -> u64 {
        self.reclaimed.load(Ordering::Relaxed)
    }

    /// Block until every snapshot retired before this call has been reclaimed.
    ///
    /// Readers hold snapshots only for the duration of one lookup, so this
    /// returns in bounded time. Must not be called from a thread that is itself
    /// holding a snapshot guard.
    pub fn synchronize(&self) {
        let mut spins = 0u32;
        loop {
            self.collect();
            if self.pending() == 0 {
                break;
            }
            if spins < SPIN_LIMIT {
                std::hint::spin_loop();
                spins += 1;
            } else {
                std::thread::yield_now();
            }
        }
        debug!(reclaimed = self.reclaimed(), "Grace period complete");
    }
}
