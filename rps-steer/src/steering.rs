//! Packet steering entrypoint.
//!
//! [`Steering`] is the single framework instance a network stack owns. The
//! receive path asks it for a CPU per packet; feature modules plug handlers
//! into it; the control plane pins local addresses through it.
//!
//! # Receive path contract
//!
//! ```text
//! if steering.is_enabled() {
//!     if let Some(cpu) = steering.decide(&pkt) { return cpu }   // strict override
//! }
//! default_hash_cpu(&pkt)                                          // fallback
//! ```
//!
//! [`Steering::steer`] packages exactly that.
//!
//! # Example
//!
//! ```
//! use rps_steer::config::SteeringConfig;
//! use rps_steer::packet::IpRx;
//! use rps_steer::steering::Steering;
//! use std::net::Ipv4Addr;
//!
//! let steering = Steering::new(SteeringConfig::builder().enabled(true).build().unwrap()).unwrap();
//! steering.add_local_address(Ipv4Addr::new(10, 0, 0, 5), 3).unwrap();
//!
//! let mut ip = [0u8; 20];
//! ip[0] = 0x45;
//! ip[3] = 20;
//! ip[9] = 6;
//! ip[16..20].copy_from_slice(&[10, 0, 0, 5]);
//! assert_eq!(steering.steer(&IpRx::new(&ip), || 0), 3);
//!
//! steering.shutdown();
//! ```

use arrayvec::ArrayVec;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, trace};

use crate::affinity::AffinityView;
use crate::config::SteeringConfig;
use crate::error::Result;
use crate::handler::{CpuId, ProtocolId, SteeringHandler};
use crate::laddr::LocalAddrSteering;
use crate::packet::{Packet, ipv4_header};
use crate::registry::ProtocolRegistry;

/// Maximum number of packets steered by one [`Steering::decide_burst`] call.
pub const RX_BURST_SIZE: usize = 64;

/// Per-packet steering decisions for one receive burst.
pub type BurstDecisions = ArrayVec<Option<CpuId>, RX_BURST_SIZE>;

/// The steering framework instance.
pub struct Steering {
    config: SteeringConfig,
    enabled: AtomicBool,
    registry: ProtocolRegistry,
    local_addr: LocalAddrSteering,
}

impl Steering {
    pub fn new(config: SteeringConfig) -> Result<Self> {
        let local_addr = LocalAddrSteering::new(&config)?;
        info!(
            enabled = config.enabled(),
            affinity_buckets = local_addr.table().buckets(),
            "Steering initialized"
        );
        Ok(Self {
            enabled: AtomicBool::new(config.enabled()),
            registry: ProtocolRegistry::new(),
            local_addr,
            config,
        })
    }

    pub fn config(&self) -> &SteeringConfig {
        &self.config
    }

    /// The enable switch consulted by the receive path.
    #[inline(always)]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        if self.enabled.swap(enabled, Ordering::Relaxed) != enabled {
            info!(enabled, "Steering switch toggled");
        }
    }

    pub fn registry(&self) -> &ProtocolRegistry {
        &self.registry
    }

    /// See [`ProtocolRegistry::register`].
    pub fn register(&self, handler: Arc<dyn SteeringHandler>) -> Result<()> {
        self.registry.register(handler)
    }

    /// See [`ProtocolRegistry::unregister`].
    pub fn unregister(&self, handler: &Arc<dyn SteeringHandler>) -> Result<()> {
        self.registry.unregister(handler)
    }

    /// Pin a local address to a CPU (refcounted; the first pin wins).
    pub fn add_local_address(&self, address: Ipv4Addr, cpu: CpuId) -> Result<()> {
        self.local_addr.add(&self.registry, address, cpu)
    }

    /// Drop one reference on a pinned local address.
    pub fn remove_local_address(&self, address: Ipv4Addr) {
        self.local_addr.remove(&self.registry, address)
    }

    /// Read-only view of the local-address table. Pins go through
    /// [`add_local_address`](Self::add_local_address) so the handlers stay
    /// in step with the table.
    pub fn affinity_table(&self) -> AffinityView<'_> {
        AffinityView::new(self.local_addr.table())
    }

    /// Pick a CPU for `packet`, or `None` to leave it to the default steering.
    ///
    /// Only IPv4 packets with a parseable header are considered. Does not look
    /// at the enable switch; see [`steer`](Self::steer).
    #[inline]
    pub fn decide(&self, packet: &dyn Packet) -> Option<CpuId> {
        let protocol = ProtocolId::from(u8::from(ipv4_header(packet)?.next_header()));
        let cpu = self.registry.dispatch(protocol, packet);
        trace!(protocol, ?cpu, "Steering decision");
        cpu
    }

    /// Steer `packet`: our decision when enabled and one exists, otherwise
    /// whatever `fallback` picks.
    #[inline]
    pub fn steer<F>(&self, packet: &dyn Packet, fallback: F) -> CpuId
    where
        F: FnOnce() -> CpuId,
    {
        if self.is_enabled()
            && let Some(cpu) = self.decide(packet)
        {
            return cpu;
        }
        fallback()
    }

    /// Decide for a whole receive burst without allocating.
    ///
    /// `out` is cleared first. At most [`RX_BURST_SIZE`] packets are steered;
    /// returns how many were.
    pub fn decide_burst<P: Packet>(&self, packets: &[P], out: &mut BurstDecisions) -> usize {
        out.clear();
        for packet in packets.iter().take(RX_BURST_SIZE) {
            out.push(self.decide(packet));
        }
        out.len()
    }

    /// Tear the framework down.
    ///
    /// Disables steering, unregisters every handler (running their hooks) and
    /// blocks until every retired handler list and affinity record has been
    /// reclaimed.
    pub fn shutdown(&self) {
        self.set_enabled(false);
        self.local_addr.deactivate(&self.registry);
        let handlers = self.registry.clear();
        self.registry.synchronize();
        self.local_addr.table().synchronize();
        info!(handlers, "Steering shut down");
    }
}
