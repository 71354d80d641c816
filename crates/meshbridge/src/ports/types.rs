//! Port attribute types.

use meshbridge_types::MacAddress;
use serde::Serialize;
use std::fmt;

/// Stable index of a port within its bridge. Indices are reused after
/// detach; a held index is only valid while the port remains attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PortIndex(pub usize);

impl fmt::Display for PortIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port{}", self.0)
    }
}

/// Tunnel attributes of a P2P mesh port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelAttrs {
    /// Hardware address of the tunnel peer; outer destination on encode.
    pub peer: MacAddress,
    /// Leaf stations never participate in spanning tree.
    pub is_leaf: bool,
    /// This port faces the wired uplink of the mesh.
    pub is_uplink: bool,
    /// Peer handles only unicast-addressed outer frames.
    pub is_unicast: bool,
    /// Frames on this port are exchanged without tunnel framing.
    pub is_unencap: bool,
}

/// Direct-route attributes of a port.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectRoute {
    pub enabled: bool,
    /// Hardware address of the direct one-hop peer.
    pub peer: Option<MacAddress>,
}

/// Parameters for attaching a port.
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Interface name, for logs and status output.
    pub name: String,
    /// Hardware address of the underlying interface.
    pub mac: MacAddress,
    /// Spanning-tree path cost of the link.
    pub path_cost: u32,
    /// Port priority (high byte of the port id).
    pub priority: u8,
    /// Tunnel attributes; `None` for a plain wired port.
    pub tunnel: Option<TunnelAttrs>,
}

impl PortConfig {
    /// A plain wired port with default STP parameters.
    pub fn wired(name: impl Into<String>, mac: MacAddress) -> Self {
        Self {
            name: name.into(),
            mac,
            path_cost: crate::stp::DEFAULT_PATH_COST,
            priority: meshbridge_types::DEFAULT_PORT_PRIORITY,
            tunnel: None,
        }
    }

    /// A P2P tunnel port toward `peer` with default STP parameters.
    pub fn tunnel(name: impl Into<String>, mac: MacAddress, peer: MacAddress) -> Self {
        Self {
            name: name.into(),
            mac,
            path_cost: crate::stp::DEFAULT_PATH_COST,
            priority: meshbridge_types::DEFAULT_PORT_PRIORITY,
            tunnel: Some(TunnelAttrs {
                peer,
                is_leaf: false,
                is_uplink: false,
                is_unicast: false,
                is_unencap: false,
            }),
        }
    }

    /// Sets the path cost.
    pub fn with_path_cost(mut self, cost: u32) -> Self {
        self.path_cost = cost;
        self
    }

    /// Marks the tunnel as a leaf station link.
    pub fn leaf(mut self) -> Self {
        if let Some(tunnel) = self.tunnel.as_mut() {
            tunnel.is_leaf = true;
        }
        self
    }

    /// Marks the tunnel as the mesh uplink.
    pub fn uplink(mut self) -> Self {
        if let Some(tunnel) = self.tunnel.as_mut() {
            tunnel.is_uplink = true;
        }
        self
    }
}

/// Serializable per-port status for the control-plane query.
#[derive(Debug, Clone, Serialize)]
pub struct PortStatus {
    pub index: usize,
    pub name: String,
    pub mac: MacAddress,
    pub enabled: bool,
    pub stp_state: String,
    pub port_id: String,
    pub path_cost: u32,
    pub designated_root: String,
    pub designated_bridge: String,
    pub designated_cost: u32,
    pub is_p2p: bool,
    pub is_leaf: bool,
    pub is_uplink: bool,
    pub direct_enabled: bool,
    pub peer_stp_state: Option<String>,
}
