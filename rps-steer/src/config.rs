//! Steering configuration.
//!
//! # Example
//!
//! ```
//! use rps_steer::config::SteeringConfig;
//! use rps_steer::handler::Priority;
//!
//! let config = SteeringConfig::builder()
//!     .enabled(true)
//!     .affinity_hash_bits(10)
//!     .local_addr_protocols([6])
//!     .local_addr_priority(Priority::FallbackLast)
//!     .build()
//!     .unwrap();
//! assert!(config.enabled());
//! ```

use crate::affinity::{DEFAULT_HASH_BITS, MAX_HASH_BITS};
use crate::error::{Error, Result};
use crate::handler::{MAX_PROTOCOLS, Priority, ProtocolId};

/// TCP protocol number.
pub const IPPROTO_TCP: ProtocolId = 6;

/// UDP protocol number.
pub const IPPROTO_UDP: ProtocolId = 17;

/// Validated steering configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SteeringConfig {
    enabled: bool,
    affinity_hash_bits: u8,
    local_addr_protocols: Vec<ProtocolId>,
    local_addr_priority: Priority,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            affinity_hash_bits: DEFAULT_HASH_BITS,
            local_addr_protocols: vec![IPPROTO_TCP, IPPROTO_UDP],
            local_addr_priority: Priority::PreferredFirst,
        }
    }
}

impl SteeringConfig {
    pub fn builder() -> SteeringConfigBuilder {
        SteeringConfigBuilder::default()
    }

    /// Initial state of the enable switch.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// The affinity table has `1 << affinity_hash_bits` buckets.
    pub fn affinity_hash_bits(&self) -> u8 {
        self.affinity_hash_bits
    }

    /// Transport protocols the local-address handlers register for.
    pub fn local_addr_protocols(&self) -> &[ProtocolId] {
        &self.local_addr_protocols
    }

    pub fn local_addr_priority(&self) -> Priority {
        self.local_addr_priority
    }
}

/// Builder for [`SteeringConfig`].
#[derive(Debug, Clone, Default)]
pub struct SteeringConfigBuilder {
    config: SteeringConfig,
}

impl SteeringConfigBuilder {
    /// Initial state of the enable switch (default: disabled).
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// Affinity table hash bits (default: 8, range 1..=16).
    pub fn affinity_hash_bits(mut self, bits: u8) -> Self {
        self.config.affinity_hash_bits = bits;
        self
    }

    /// Protocols served by the local-address handlers (default: TCP and UDP).
    pub fn local_addr_protocols(mut self, protocols: impl IntoIterator<Item = ProtocolId>) -> Self {
        self.config.local_addr_protocols = protocols.into_iter().collect();
        self
    }

    /// List position of the local-address handlers (default: preferred).
    pub fn local_addr_priority(mut self, priority: Priority) -> Self {
        self.config.local_addr_priority = priority;
        self
    }

    pub fn build(self) -> Result<SteeringConfig> {
        let mut config = self.config;

        if config.affinity_hash_bits == 0 || config.affinity_hash_bits > MAX_HASH_BITS {
            return Err(Error::InvalidConfig("affinity hash bits must be in 1..=16"));
        }
        if config.local_addr_protocols.is_empty() {
            return Err(Error::InvalidConfig("local address protocols must not be empty"));
        }
        if let Some(&p) = config
            .local_addr_protocols
            .iter()
            .find(|&&p| p as usize >= MAX_PROTOCOLS)
        {
            return Err(Error::InvalidProtocol(p));
        }

        config.local_addr_protocols.sort_unstable();
        config.local_addr_protocols.dedup();
        Ok(config)
    }
}
