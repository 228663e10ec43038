//! Address -> CPU affinity table.
//!
//! Maps a locally owned IPv4 address to the CPU that should process all of
//! its traffic. Entries are reference counted: every owner (for example each
//! service configured on the address) adds once and removes once, and the
//! entry disappears with its last owner.
//!
//! # Structure
//!
//! A fixed, power-of-two number of buckets indexed by the host-order address
//! under a mask. Each bucket holds an immutable, unordered chain of records.
//!
//! # Concurrency
//!
//! Same scheme as the handler registry:
//! - `lookup`: single atomic load of the bucket, linear scan, no lock.
//! - `add` / `remove`: serialized by a mutex; a changed bucket is rebuilt and
//!   published with one atomic swap, so a reader sees either the old chain or
//!   the new one, and records are always fully built before they are visible.
//! - An unlinked record stays alive inside the retired chain until the grace
//!   period ends.

use arc_swap::ArcSwapOption;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::error::{Error, Result};
use crate::handler::CpuId;
use crate::rcu::RetireList;

/// Default number of hash bits (256 buckets).
pub const DEFAULT_HASH_BITS: u8 = 8;

/// Largest accepted number of hash bits (65536 buckets).
pub const MAX_HASH_BITS: u8 = 16;

/// One pinned address.
#[derive(Debug)]
pub struct AffinityRecord {
    address: Ipv4Addr,
    cpu: CpuId,
    /// The one field changed on a published record: writers bump it in place
    /// under the table lock and readers never look at it. Everything a reader
    /// sees is immutable once linked.
    refcount: AtomicU32,
}

impl AffinityRecord {
    fn new(address: Ipv4Addr, cpu: CpuId) -> Self {
        Self {
            address,
            cpu,
            refcount: AtomicU32::new(1),
        }
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn cpu(&self) -> CpuId {
        self.cpu
    }

    pub fn refcount(&self) -> u32 {
        self.refcount.load(Ordering::Relaxed)
    }
}

type Chain = Vec<Arc<AffinityRecord>>;

/// Concurrent, reference-counted address -> CPU map.
pub struct AffinityTable {
    buckets: Box<[ArcSwapOption<Chain>]>,
    mask: u32,
    lock: Mutex<()>,
    retired: RetireList,
    len: AtomicUsize,
}

impl Default for AffinityTable {
    fn default() -> Self {
        Self::build(DEFAULT_HASH_BITS)
    }
}

impl AffinityTable {
    /// Create a table with the default bucket count.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table with `1 << hash_bits` buckets.
    pub fn with_hash_bits(hash_bits: u8) -> Result<Self> {
        if hash_bits == 0 || hash_bits > MAX_HASH_BITS {
            return Err(Error::InvalidConfig("affinity hash bits must be in 1..=16"));
        }
        Ok(Self::build(hash_bits))
    }

    fn build(hash_bits: u8) -> Self {
        let size = 1usize << hash_bits;
        Self {
            buckets: (0..size).map(|_| ArcSwapOption::empty()).collect(),
            mask: (size - 1) as u32,
            lock: Mutex::new(()),
            retired: RetireList::new(),
            len: AtomicUsize::new(0),
        }
    }

    #[inline(always)]
    fn bucket(&self, address: Ipv4Addr) -> &ArcSwapOption<Chain> {
        &self.buckets[(u32::from(address) & self.mask) as usize]
    }

    /// CPU pinned for `address`, if any.
    ///
    /// Lock-free: one atomic load plus a scan of a short chain.
    #[inline]
    pub fn lookup(&self, address: Ipv4Addr) -> Option<CpuId> {
        let chain = self.bucket(address).load();
        chain
            .as_deref()?
            .iter()
            .find(|r| r.address == address)
            .map(|r| r.cpu)
    }

    /// Pin `address` to `cpu`, or take another reference on an existing pin.
    ///
    /// For an address that is already present `cpu` is ignored: the first
    /// assignment stays in place until the last reference is removed.
    pub fn add(&self, address: Ipv4Addr, cpu: CpuId) -> Result<()> {
        let guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let bucket = self.bucket(address);

        let next = {
            let current = bucket.load();
            let chain = current.as_deref().map(Vec::as_slice).unwrap_or_default();

            if let Some(record) = chain.iter().find(|r| r.address == address) {
                let refcount = record.refcount.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(%address, cpu = record.cpu, refcount, "Referenced affinity record");
                return Ok(());
            }

            let mut next = Chain::new();
            next.try_reserve_exact(chain.len() + 1)?;
            next.push(Arc::new(AffinityRecord::new(address, cpu)));
            next.extend(chain.iter().cloned());
            next
        };

        let old = bucket.swap(Some(Arc::new(next)));
        self.len.fetch_add(1, Ordering::Relaxed);
        drop(guard);

        if let Some(old) = old {
            self.retired.retire(old);
        }
        debug!(%address, cpu, "Created affinity record");
        Ok(())
    }

    /// Drop one reference on `address`. No-op if the address is not present.
    ///
    /// The last reference unlinks the record immediately; its memory is
    /// released once no reader can still be looking at it.
    pub fn remove(&self, address: Ipv4Addr) {
        let guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let bucket = self.bucket(address);

        let next = {
            let current = bucket.load();
            let chain = current.as_deref().map(Vec::as_slice).unwrap_or_default();
            let Some(pos) = chain.iter().position(|r| r.address == address) else {
                return;
            };

            let record = &chain[pos];
            let refcount = record.refcount.fetch_sub(1, Ordering::Relaxed) - 1;
            if refcount > 0 {
                debug!(%address, cpu = record.cpu, refcount, "Released affinity record");
                return;
            }

            if chain.len() == 1 {
                None
            } else {
                Some(Arc::new(
                    chain
                        .iter()
                        .enumerate()
                        .filter(|&(i, _)| i != pos)
                        .map(|(_, r)| r.clone())
                        .collect::<Chain>(),
                ))
            }
        };

        let old = bucket.swap(next);
        self.len.fetch_sub(1, Ordering::Relaxed);
        drop(guard);

        if let Some(old) = old {
            self.retired.retire(old);
        }
        debug!(%address, "Unlinked affinity record");
    }

    /// Outstanding references on `address`, or `None` if it is not pinned.
    pub fn refcount(&self, address: Ipv4Addr) -> Option<u32> {
        let chain = self.bucket(address).load();
        chain
            .as_deref()?
            .iter()
            .find(|r| r.address == address)
            .map(|r| r.refcount())
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of hash buckets.
    pub fn buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Wait until every unlinked record has been reclaimed.
    pub fn synchronize(&self) {
        self.retired.synchronize();
    }

    /// Replaced chains still waiting for their grace period.
    pub fn pending_reclaims(&self) -> usize {
        self.retired.pending()
    }
}

/// Read-only access to an [`AffinityTable`].
///
/// Handed out where pins must go through an owner that keeps other state in
/// step with the table, such as [`Steering`](crate::steering::Steering).
#[derive(Clone, Copy)]
pub struct AffinityView<'a> {
    table: &'a AffinityTable,
}

impl<'a> AffinityView<'a> {
    pub fn new(table: &'a AffinityTable) -> Self {
        Self { table }
    }

    pub fn lookup(&self, address: Ipv4Addr) -> Option<CpuId> {
        self.table.lookup(address)
    }

    pub fn refcount(&self, address: Ipv4Addr) -> Option<u32> {
        self.table.refcount(address)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn buckets(&self) -> usize {
        self.table.buckets()
    }

    pub fn pending_reclaims(&self) -> usize {
        self.table.pending_reclaims()
    }
}
