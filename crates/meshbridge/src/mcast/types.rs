//! Multicast tracking types.

use crate::ports::PortIndex;
use meshbridge_types::MacAddress;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;

/// One member station of a group on one port.
#[derive(Debug, Clone, Copy)]
pub struct MemberInfo {
    pub last_seen: Instant,
    /// Direct one-hop port toward this member, when known (tunnel ports).
    pub direct: Option<PortIndex>,
}

/// Membership of one group: per receiving port, the member stations seen
/// joining there.
#[derive(Debug, Clone, Default)]
pub struct GroupEntry {
    pub ports: HashMap<PortIndex, HashMap<MacAddress, MemberInfo>>,
}

impl GroupEntry {
    /// Total member count across ports.
    pub fn member_count(&self) -> usize {
        self.ports.values().map(|m| m.len()).sum()
    }

    /// Returns true when no port has members left.
    pub fn is_empty(&self) -> bool {
        self.ports.values().all(|m| m.is_empty())
    }
}

/// Owned copy of a group's membership for the packet path; taken so no
/// table shard lock is held while copies are transmitted.
#[derive(Debug, Clone)]
pub struct GroupSnapshot {
    pub group: MacAddress,
    pub ports: Vec<PortMembership>,
}

/// Snapshot of one port's members.
#[derive(Debug, Clone)]
pub struct PortMembership {
    pub port: PortIndex,
    /// Member MAC and its direct port, if any.
    pub members: Vec<(MacAddress, Option<PortIndex>)>,
}

/// Serializable row of the group membership query.
#[derive(Debug, Clone, Serialize)]
pub struct GroupDumpEntry {
    pub group: MacAddress,
    pub port: usize,
    pub members: Vec<MacAddress>,
}
