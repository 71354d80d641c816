//! Spanning-tree bridge identifier.

use crate::{MacAddress, ParseError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An 8-byte spanning-tree bridge identifier: a 2-byte priority followed by
/// the bridge MAC address.
///
/// Ordering is the election order: lower priority wins, MAC address breaks
/// ties. The all-ones id orders after every real id and is used as the
/// "worse than anything" initial value during root election.
///
/// # Examples
///
/// ```
/// use meshbridge_types::BridgeId;
///
/// let id: BridgeId = "8000.00:11:22:33:44:55".parse().unwrap();
/// assert_eq!(id.priority(), 0x8000);
/// assert_eq!(id.to_string(), "8000.00:11:22:33:44:55");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BridgeId {
    priority: u16,
    mac: MacAddress,
}

/// Default bridge priority per IEEE 802.1D.
pub const DEFAULT_BRIDGE_PRIORITY: u16 = 0x8000;

impl BridgeId {
    /// An id that orders after every valid id.
    pub const MAX: BridgeId = BridgeId {
        priority: u16::MAX,
        mac: MacAddress::BROADCAST,
    };

    /// Creates a bridge id from a priority and MAC address.
    pub const fn new(priority: u16, mac: MacAddress) -> Self {
        BridgeId { priority, mac }
    }

    /// Returns the priority component.
    pub const fn priority(&self) -> u16 {
        self.priority
    }

    /// Returns the MAC address component.
    pub const fn mac(&self) -> MacAddress {
        self.mac
    }

    /// Replaces the priority, keeping the MAC address.
    pub const fn with_priority(self, priority: u16) -> Self {
        BridgeId {
            priority,
            mac: self.mac,
        }
    }

    /// Replaces the MAC address, keeping the priority.
    pub const fn with_mac(self, mac: MacAddress) -> Self {
        BridgeId {
            priority: self.priority,
            mac,
        }
    }

    /// Encodes the id in its 8-byte wire form (big-endian priority + MAC).
    pub fn to_bytes(&self) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        bytes[0..2].copy_from_slice(&self.priority.to_be_bytes());
        bytes[2..8].copy_from_slice(self.mac.as_bytes());
        bytes
    }

    /// Decodes an id from its 8-byte wire form.
    pub fn from_bytes(bytes: &[u8; 8]) -> Self {
        let priority = u16::from_be_bytes([bytes[0], bytes[1]]);
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&bytes[2..8]);
        BridgeId {
            priority,
            mac: MacAddress::new(mac),
        }
    }
}

impl fmt::Display for BridgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}.{}", self.priority, self.mac)
    }
}

impl FromStr for BridgeId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prio, mac) = s
            .split_once('.')
            .ok_or_else(|| ParseError::InvalidBridgeId(s.to_string()))?;
        let priority = u16::from_str_radix(prio, 16)
            .map_err(|_| ParseError::InvalidBridgeId(s.to_string()))?;
        let mac: MacAddress = mac
            .parse()
            .map_err(|_| ParseError::InvalidBridgeId(s.to_string()))?;
        Ok(BridgeId { priority, mac })
    }
}

impl TryFrom<String> for BridgeId {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<BridgeId> for String {
    fn from(id: BridgeId) -> String {
        id.to_string()
    }
}
