//! Per-protocol registry of steering handlers.
//!
//! # Layout
//!
//! One slot per protocol id. A slot is either empty ("no list") or holds an
//! immutable, ordered handler list:
//!
//! ```text
//! [ PreferredFirst (newest .. oldest) | FallbackLast (oldest .. newest) ]
//! ```
//!
//! # Concurrency
//!
//! - `dispatch` is lock-free and allocation-free: one `arc_swap` load, then a
//!   walk over an immutable slice.
//! - `register` / `unregister` serialize on a mutex, build a replacement list
//!   and publish it with a single atomic swap. The replaced list goes to the
//!   [`RetireList`], so a reader that is halfway through it keeps a valid
//!   view until it finishes.

use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::handler::{CpuId, MAX_PROTOCOLS, Priority, ProtocolId, SteeringHandler};
use crate::packet::Packet;
use crate::rcu::RetireList;

type HandlerList = Vec<Arc<dyn SteeringHandler>>;

/// Registry of steering handlers keyed by transport protocol.
pub struct ProtocolRegistry {
    lists: Box<[ArcSwapOption<HandlerList>]>,
    /// Serializes writers. Readers never take it.
    lock: Mutex<()>,
    retired: RetireList,
    registered: AtomicUsize,
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolRegistry {
    /// Create a registry with an empty list for every protocol.
    pub fn new() -> Self {
        Self {
            lists: (0..MAX_PROTOCOLS).map(|_| ArcSwapOption::empty()).collect(),
            lock: Mutex::new(()),
            retired: RetireList::new(),
            registered: AtomicUsize::new(0),
        }
    }

    fn slot(&self, protocol: ProtocolId) -> Result<&ArcSwapOption<HandlerList>> {
        self.lists
            .get(protocol as usize)
            .ok_or(Error::InvalidProtocol(protocol))
    }

    /// Register a handler.
    ///
    /// Runs `on_register` first, outside the lock. If the hook fails the
    /// handler is never linked. If linking fails after the hook succeeded,
    /// `on_unregister` runs to undo it.
    pub fn register(&self, handler: Arc<dyn SteeringHandler>) -> Result<()> {
        let protocol = handler.protocol();
        let slot = self.slot(protocol)?;

        if let Err(source) = handler.on_register() {
            warn!(handler = handler.name(), protocol, error = %source, "Handler init failed");
            return Err(Error::HandlerInit {
                handler: handler.name().to_string(),
                source,
            });
        }

        if let Err(e) = self.link(slot, &handler) {
            warn!(handler = handler.name(), protocol, error = %e, "Failed to link handler");
            handler.on_unregister();
            return Err(e);
        }

        debug!(
            handler = handler.name(),
            protocol,
            priority = ?handler.priority(),
            "Registered steering handler"
        );
        Ok(())
    }

    fn link(
        &self,
        slot: &ArcSwapOption<HandlerList>,
        handler: &Arc<dyn SteeringHandler>,
    ) -> Result<()> {
        let guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let next = {
            let current = slot.load();
            let current = current.as_deref().map(Vec::as_slice).unwrap_or_default();
            if current.iter().any(|h| Arc::ptr_eq(h, handler)) {
                return Err(Error::AlreadyRegistered {
                    handler: handler.name().to_string(),
                    protocol: handler.protocol(),
                });
            }

            let mut next = HandlerList::new();
            next.try_reserve_exact(current.len() + 1)?;
            match handler.priority() {
                Priority::PreferredFirst => {
                    next.push(handler.clone());
                    next.extend(current.iter().cloned());
                }
                Priority::FallbackLast => {
                    next.extend(current.iter().cloned());
                    next.push(handler.clone());
                }
            }
            next
        };

        let old = slot.swap(Some(Arc::new(next)));
        self.registered.fetch_add(1, Ordering::Relaxed);
        drop(guard);

        // Reclaiming may drop handlers; their Drop must be free to use the registry.
        if let Some(old) = old {
            self.retired.retire(old);
        }
        Ok(())
    }

    /// Unregister a handler.
    ///
    /// Once this returns no new `dispatch` can observe the handler. A dispatch
    /// that started earlier may still be calling it; call
    /// [`synchronize`](Self::synchronize) to wait for those to finish.
    pub fn unregister(&self, handler: &Arc<dyn SteeringHandler>) -> Result<()> {
        let protocol = handler.protocol();
        let slot = self.slot(protocol)?;

        let old = {
            let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

            let next = {
                let current = slot.load();
                let list = current.as_deref().map(Vec::as_slice).unwrap_or_default();
                let Some(pos) = list.iter().position(|h| Arc::ptr_eq(h, handler)) else {
                    return Err(Error::NotRegistered {
                        handler: handler.name().to_string(),
                        protocol,
                    });
                };

                if list.len() == 1 {
                    None
                } else {
                    let mut next = HandlerList::new();
                    next.try_reserve_exact(list.len() - 1)?;
                    next.extend(list[..pos].iter().cloned());
                    next.extend(list[pos + 1..].iter().cloned());
                    Some(Arc::new(next))
                }
            };

            self.registered.fetch_sub(1, Ordering::Relaxed);
            slot.swap(next)
        };

        if let Some(old) = old {
            self.retired.retire(old);
        }
        handler.on_unregister();
        debug!(handler = handler.name(), protocol, "Unregistered steering handler");
        Ok(())
    }

    /// Ask the handlers for `protocol`, in list order, for a CPU.
    ///
    /// Returns the first answer. Handlers after the one that answered are not
    /// called. Unknown or empty protocols yield `None`.
    #[inline]
    pub fn dispatch(&self, protocol: ProtocolId, packet: &dyn Packet) -> Option<CpuId> {
        let list = self.lists.get(protocol as usize)?.load();
        list.as_deref()?.iter().find_map(|h| h.process(packet))
    }

    /// Snapshot of the handlers for `protocol`, in traversal order.
    pub fn handlers(&self, protocol: ProtocolId) -> Vec<Arc<dyn SteeringHandler>> {
        self.lists
            .get(protocol as usize)
            .and_then(|slot| slot.load_full())
            .map(|list| (*list).clone())
            .unwrap_or_default()
    }

    /// Number of linked handlers across all protocols.
    pub fn len(&self) -> usize {
        self.registered.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unregister every handler, running their `on_unregister` hooks.
    ///
    /// Returns how many handlers were unlinked.
    pub fn clear(&self) -> usize {
        let mut unlinked = Vec::new();
        let mut replaced = Vec::new();
        {
            let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
            for slot in self.lists.iter() {
                if let Some(old) = slot.swap(None) {
                    unlinked.extend(old.iter().cloned());
                    replaced.push(old);
                }
            }
            self.registered.store(0, Ordering::Relaxed);
        }

        for old in replaced {
            self.retired.retire(old);
        }

        for handler in &unlinked {
            handler.on_unregister();
        }
        if !unlinked.is_empty() {
            debug!(count = unlinked.len(), "Cleared steering handlers");
        }
        unlinked.len()
    }

    /// Wait until no reader can still be using a replaced handler list.
    pub fn synchronize(&self) {
        self.retired.synchronize();
    }

    /// Replaced lists still waiting for their grace period.
    pub fn pending_reclaims(&self) -> usize {
        self.retired.pending()
    }
}
