//! FDB entry types.

use crate::ports::PortIndex;
use meshbridge_types::MacAddress;
use serde::Serialize;
use std::time::Instant;

/// Key of an FDB entry.
///
/// The VLAN id is carried for completeness but not interpreted by the
/// forwarding logic; untagged traffic uses VLAN 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FdbKey {
    pub mac: MacAddress,
    pub vlan: u16,
}

impl FdbKey {
    /// Creates a key for untagged traffic.
    pub fn untagged(mac: MacAddress) -> Self {
        Self { mac, vlan: 0 }
    }
}

/// Forwarding class of a station, derived from the configured OUI allowlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum EntryClass {
    #[default]
    Normal,
    Priority,
}

/// One forwarding database entry.
#[derive(Debug, Clone)]
pub struct FdbEntry {
    pub key: FdbKey,
    /// The port that owns this station per the spanning-tree topology.
    pub port: PortIndex,
    /// A more direct one-hop path to the station, when known.
    pub direct: Option<PortIndex>,
    /// Address belongs to the bridge itself or a directly wired station.
    pub is_local: bool,
    /// Pinned; relearning never reassigns the owning port.
    pub is_static: bool,
    pub class: EntryClass,
    pub last_seen: Instant,
}

/// Result of a lookup on the packet path: just the fields the forwarding
/// decision needs, copied out so no table lock is held while transmitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdbLookup {
    pub port: PortIndex,
    pub direct: Option<PortIndex>,
    pub is_local: bool,
    pub class: EntryClass,
}

impl From<&FdbEntry> for FdbLookup {
    fn from(entry: &FdbEntry) -> Self {
        FdbLookup {
            port: entry.port,
            direct: entry.direct,
            is_local: entry.is_local,
            class: entry.class,
        }
    }
}

/// Serializable row of the paged FDB dump.
#[derive(Debug, Clone, Serialize)]
pub struct FdbDumpEntry {
    pub mac: MacAddress,
    pub vlan: u16,
    pub port: usize,
    pub direct: Option<usize>,
    pub is_local: bool,
    pub is_static: bool,
    pub class: EntryClass,
    /// Seconds since the entry was last refreshed.
    pub idle_secs: u64,
}
