//! Local-address steering.
//!
//! Load-balanced services that own a local address want every packet for
//! that address handled on one CPU, so connection state stays hot in one
//! core's cache. The control plane pins addresses through
//! [`LocalAddrSteering::add`]; the first pinned address registers one
//! [`LocalAddrHandler`] per configured transport protocol, and removing the
//! last one unregisters them again.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

use crate::affinity::AffinityTable;
use crate::config::SteeringConfig;
use crate::error::Result;
use crate::handler::{CpuId, Priority, ProtocolId, SteeringHandler};
use crate::packet::{Packet, ipv4_destination};
use crate::registry::ProtocolRegistry;

/// Steers packets whose destination address is pinned in the affinity table.
pub struct LocalAddrHandler {
    protocol: ProtocolId,
    priority: Priority,
    table: Arc<AffinityTable>,
    name: String,
}

impl LocalAddrHandler {
    pub fn new(protocol: ProtocolId, priority: Priority, table: Arc<AffinityTable>) -> Self {
        Self {
            protocol,
            priority,
            table,
            name: format!("laddr-{protocol}"),
        }
    }
}

impl SteeringHandler for LocalAddrHandler {
    fn protocol(&self) -> ProtocolId {
        self.protocol
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    #[inline]
    fn process(&self, packet: &dyn Packet) -> Option<CpuId> {
        self.table.lookup(ipv4_destination(packet)?)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// The local-address feature: affinity table plus its handlers.
pub struct LocalAddrSteering {
    table: Arc<AffinityTable>,
    protocols: Vec<ProtocolId>,
    priority: Priority,
    /// Registered handlers; empty while the feature is inactive. The mutex
    /// also serializes add/remove so activation happens exactly once.
    active: Mutex<Vec<Arc<dyn SteeringHandler>>>,
}

impl LocalAddrSteering {
    pub fn new(config: &SteeringConfig) -> Result<Self> {
        Ok(Self {
            table: Arc::new(AffinityTable::with_hash_bits(config.affinity_hash_bits())?),
            protocols: config.local_addr_protocols().to_vec(),
            priority: config.local_addr_priority(),
            active: Mutex::new(Vec::new()),
        })
    }

    pub fn table(&self) -> &Arc<AffinityTable> {
        &self.table
    }

    /// Whether the handlers are currently registered.
    pub fn is_active(&self) -> bool {
        !self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Pin `address` to `cpu`, activating the feature if needed.
    ///
    /// If activation fails the table change is undone and the error returned.
    pub fn add(&self, registry: &ProtocolRegistry, address: Ipv4Addr, cpu: CpuId) -> Result<()> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);

        self.table.add(address, cpu)?;
        if active.is_empty()
            && let Err(e) = self.activate(registry, &mut active)
        {
            self.table.remove(address);
            return Err(e);
        }
        Ok(())
    }

    /// Release one reference on `address`. Deactivates the feature when the
    /// table becomes empty.
    pub fn remove(&self, registry: &ProtocolRegistry, address: Ipv4Addr) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);

        self.table.remove(address);
        if self.table.is_empty() && !active.is_empty() {
            Self::unregister_all(registry, &mut active);
            info!("Local address steering deactivated");
        }
    }

    /// Unregister the handlers regardless of what the table still holds.
    pub fn deactivate(&self, registry: &ProtocolRegistry) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.is_empty() {
            Self::unregister_all(registry, &mut active);
            info!(remaining = self.table.len(), "Local address steering deactivated");
        }
    }

    fn activate(
        &self,
        registry: &ProtocolRegistry,
        active: &mut Vec<Arc<dyn SteeringHandler>>,
    ) -> Result<()> {
        for &protocol in &self.protocols {
            let handler: Arc<dyn SteeringHandler> = Arc::new(LocalAddrHandler::new(
                protocol,
                self.priority,
                self.table.clone(),
            ));
            if let Err(e) = registry.register(handler.clone()) {
                warn!(protocol, error = %e, "Local address activation failed, rolling back");
                Self::unregister_all(registry, active);
                return Err(e);
            }
            active.push(handler);
        }
        info!(protocols = ?self.protocols, priority = ?self.priority, "Local address steering activated");
        Ok(())
    }

    fn unregister_all(registry: &ProtocolRegistry, active: &mut Vec<Arc<dyn SteeringHandler>>) {
        for handler in active.drain(..) {
            if let Err(e) = registry.unregister(&handler) {
                warn!(handler = handler.name(), error = %e, "Failed to unregister handler");
            }
        }
    }
}
