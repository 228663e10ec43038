//! Steering handler capability set.
//!
//! A handler is one pluggable steering policy for one transport protocol.
//! Features implement [`SteeringHandler`] and hand an `Arc` of it to the
//! registry; the registry only ever calls the methods below.

use crate::BoxError;
use crate::packet::Packet;

/// CPU a packet is steered to.
pub type CpuId = u32;

/// Transport protocol number used as the registry key.
pub type ProtocolId = u16;

/// Size of the protocol id space. Valid ids are `0..MAX_PROTOCOLS`.
pub const MAX_PROTOCOLS: usize = 256;

/// Position of a handler within its protocol's list.
///
/// The class only controls where a handler is linked. During traversal every
/// handler is treated the same: the first one that answers wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Priority {
    /// Linked at the head. The most recently registered one is tried first.
    #[default]
    PreferredFirst,
    /// Linked at the tail, after every `PreferredFirst` handler.
    FallbackLast,
}

/// A registered steering policy.
pub trait SteeringHandler: Send + Sync {
    /// Transport protocol this handler steers.
    fn protocol(&self) -> ProtocolId;

    fn priority(&self) -> Priority;

    /// Pick a CPU for `packet`, or `None` to let later handlers decide.
    ///
    /// Runs on the packet hot path: must not block or allocate.
    fn process(&self, packet: &dyn Packet) -> Option<CpuId>;

    /// Runs once before the handler is linked. An error aborts registration.
    fn on_register(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Runs once after the handler has been unlinked.
    fn on_unregister(&self) {}

    /// Label used in log records and errors.
    fn name(&self) -> &str {
        "handler"
    }
}
