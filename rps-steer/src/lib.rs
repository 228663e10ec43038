//! Receive-side packet steering.
//!
//! Decides, per received packet, which CPU should process it, overriding the
//! default hash-based assignment when a more specific policy applies.
//!
//! - [`registry`]: per-protocol, priority-ordered lists of pluggable
//!   [`SteeringHandler`]s, walked lock-free on every packet.
//! - [`affinity`]: concurrent, refcounted address -> CPU table.
//! - [`laddr`]: bundled handler that pins locally owned addresses to a CPU.
//! - [`steering`]: the entrypoint the receive path calls.
//! - [`rcu`]: deferred reclamation shared by the registry and the table.
//!
//! Readers never lock or allocate. Writers serialize on a per-structure mutex,
//! publish copy-on-write snapshots with `arc-swap`, and retire the replaced
//! snapshot until no reader can still see it.

pub mod affinity;
pub mod config;
pub mod error;
pub mod handler;
pub mod laddr;
pub mod packet;
pub mod rcu;
pub mod registry;
pub mod steering;

/// A boxed error type for handler hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub use affinity::{AffinityRecord, AffinityTable, AffinityView};
pub use config::{SteeringConfig, SteeringConfigBuilder};
pub use error::{Error, Result};
pub use handler::{CpuId, MAX_PROTOCOLS, Priority, ProtocolId, SteeringHandler};
pub use laddr::{LocalAddrHandler, LocalAddrSteering};
pub use packet::{EthernetRx, IpRx, Packet};
pub use registry::ProtocolRegistry;
pub use steering::{BurstDecisions, RX_BURST_SIZE, Steering};
