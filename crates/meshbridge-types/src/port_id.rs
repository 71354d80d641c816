//! Spanning-tree port identifier.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 2-byte spanning-tree port identifier: priority in the high byte, port
/// number in the low byte.
///
/// Ordering follows the wire value, so lower priority wins and the port
/// number breaks ties — the last comparison step of BPDU precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortId(u16);

/// Default port priority per IEEE 802.1D.
pub const DEFAULT_PORT_PRIORITY: u8 = 0x80;

impl PortId {
    /// Creates a port id from a priority and port number.
    pub const fn new(priority: u8, number: u8) -> Self {
        PortId(((priority as u16) << 8) | number as u16)
    }

    /// Returns the priority byte.
    pub const fn priority(&self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Returns the port number byte.
    pub const fn number(&self) -> u8 {
        self.0 as u8
    }

    /// Returns the 2-byte wire value.
    pub const fn to_u16(&self) -> u16 {
        self.0
    }

    /// Decodes a port id from its wire value.
    pub const fn from_u16(raw: u16) -> Self {
        PortId(raw)
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}.{}", self.priority(), self.number())
    }
}

impl FromStr for PortId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prio, num) = s
            .split_once('.')
            .ok_or_else(|| ParseError::InvalidPortId(s.to_string()))?;
        let priority =
            u8::from_str_radix(prio, 16).map_err(|_| ParseError::InvalidPortId(s.to_string()))?;
        let number: u8 = num
            .parse()
            .map_err(|_| ParseError::InvalidPortId(s.to_string()))?;
        Ok(PortId::new(priority, number))
    }
}

impl TryFrom<String> for PortId {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PortId> for String {
    fn from(id: PortId) -> String {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_wire_packing() {
        let id = PortId::new(0x80, 3);
        assert_eq!(id.to_u16(), 0x8003);
        assert_eq!(id.priority(), 0x80);
        assert_eq!(id.number(), 3);
        assert_eq!(PortId::from_u16(0x8003), id);
    }

    #[test]
    fn test_priority_dominates() {
        let preferred = PortId::new(0x10, 200);
        let other = PortId::new(0x80, 1);
        assert!(preferred < other);
    }

    #[test]
    fn test_number_breaks_tie() {
        let a = PortId::new(0x80, 1);
        let b = PortId::new(0x80, 2);
        assert!(a < b);
    }

    #[test]
    fn test_parse_display_round_trip() {
        let id = PortId::new(0x80, 7);
        assert_eq!(id.to_string().parse::<PortId>().unwrap(), id);
        assert!("80".parse::<PortId>().is_err());
        assert!("80.xyz".parse::<PortId>().is_err());
    }
}
