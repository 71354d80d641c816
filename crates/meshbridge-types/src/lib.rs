//! Common MeshBridge types for the software bridge forwarding plane.
//!
//! This crate provides type-safe representations of the network primitives
//! used throughout the bridge core:
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`BridgeId`]: spanning-tree bridge identifiers (priority + MAC)
//! - [`PortId`]: spanning-tree port identifiers (priority + port number)
//! - [`TimeTicks`]: 1/256-second fixed-point protocol timer values

mod bridge_id;
mod mac;
mod port_id;
mod ticks;

pub use bridge_id::{BridgeId, DEFAULT_BRIDGE_PRIORITY};
pub use mac::MacAddress;
pub use port_id::{PortId, DEFAULT_PORT_PRIORITY};
pub use ticks::TimeTicks;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid bridge id format: {0}")]
    InvalidBridgeId(String),

    #[error("invalid port id format: {0}")]
    InvalidPortId(String),
}
