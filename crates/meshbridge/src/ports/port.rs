//! The Port struct.

use super::types::{DirectRoute, PortConfig, PortIndex, PortStatus, TunnelAttrs};
use crate::stp::{StpPort, StpPortState};
use meshbridge_types::{MacAddress, PortId};
use std::time::Instant;

/// One attachment point of the bridge.
#[derive(Debug, Clone)]
pub struct Port {
    pub index: PortIndex,
    pub name: String,
    /// Hardware address of the underlying interface; outer source for
    /// tunnel framing and seed for the bridge-id election.
    pub mac: MacAddress,
    /// Administrative/carrier state. A disabled port neither forwards nor
    /// participates in spanning tree.
    pub enabled: bool,
    pub stp: StpPort,
    pub tunnel: Option<TunnelAttrs>,
    pub direct: DirectRoute,
    /// Last spanning-tree state advertised by the tunnel peer, used to
    /// avoid delivering into a peer that is itself blocking.
    pub peer_stp_state: Option<StpPortState>,
    /// Instant of the last spanning-tree activity involving this port;
    /// direct routing holds off for a quiet period after it.
    pub last_stp_activity: Option<Instant>,
}

impl Port {
    /// Creates a port from its attach-time configuration.
    pub fn new(index: PortIndex, config: PortConfig) -> Self {
        let port_id = PortId::new(config.priority, index.0 as u8);
        Self {
            index,
            name: config.name,
            mac: config.mac,
            enabled: false,
            stp: StpPort::new(port_id, config.path_cost),
            tunnel: config.tunnel,
            direct: DirectRoute::default(),
            peer_stp_state: None,
            last_stp_activity: None,
        }
    }

    /// True for P2P tunnel ports.
    pub fn is_p2p(&self) -> bool {
        self.tunnel.is_some()
    }

    /// True for leaf station links, which never join the spanning tree.
    pub fn is_leaf(&self) -> bool {
        self.tunnel.map(|t| t.is_leaf).unwrap_or(false)
    }

    /// True for the mesh uplink port.
    pub fn is_uplink(&self) -> bool {
        self.tunnel.map(|t| t.is_uplink).unwrap_or(false)
    }

    /// True when frames to and from this port carry tunnel framing.
    pub fn encapsulates(&self) -> bool {
        self.tunnel.map(|t| !t.is_unencap).unwrap_or(false)
    }

    /// Whether this port takes part in spanning-tree election.
    pub fn runs_stp(&self) -> bool {
        !self.is_leaf()
    }

    /// Effective forwarding eligibility for data frames.
    ///
    /// Leaf ports have no STP state machine; attached and enabled means
    /// forwarding. A tunnel peer known to be blocking makes the port
    /// ineligible even when the local state forwards.
    pub fn eligible_for_data(&self) -> bool {
        if !self.enabled {
            return false;
        }
        let local_ok = if self.runs_stp() {
            self.stp.state.forwards()
        } else {
            true
        };
        let peer_ok = match self.peer_stp_state {
            Some(state) => state.forwards(),
            None => true,
        };
        local_ok && peer_ok
    }

    /// Whether the direct-route shortcut may be used through this port:
    /// enabled, a peer is set, and the quiet period since the last
    /// spanning-tree activity has elapsed.
    pub fn direct_usable(&self, now: Instant, holdoff: std::time::Duration) -> bool {
        if !self.enabled || !self.direct.enabled || self.direct.peer.is_none() {
            return false;
        }
        match self.last_stp_activity {
            Some(at) => now.saturating_duration_since(at) >= holdoff,
            None => true,
        }
    }

    /// Records spanning-tree activity on this port (BPDU handled, state
    /// transition), restarting the direct-route holdoff.
    pub fn note_stp_activity(&mut self, now: Instant) {
        self.last_stp_activity = Some(now);
    }

    /// Serializable status row.
    pub fn status(&self) -> PortStatus {
        PortStatus {
            index: self.index.0,
            name: self.name.clone(),
            mac: self.mac,
            enabled: self.enabled,
            stp_state: self.stp.state.as_str().to_string(),
            port_id: self.stp.port_id.to_string(),
            path_cost: self.stp.path_cost,
            designated_root: self.stp.designated.root.to_string(),
            designated_bridge: self.stp.designated.bridge.to_string(),
            designated_cost: self.stp.designated.cost,
            is_p2p: self.is_p2p(),
            is_leaf: self.is_leaf(),
            is_uplink: self.is_uplink(),
            direct_enabled: self.direct.enabled,
            peer_stp_state: self.peer_stp_state.map(|s| s.as_str().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn mac(s: &str) -> MacAddress {
        s.parse().unwrap()
    }

    fn wired_port(index: usize) -> Port {
        Port::new(
            PortIndex(index),
            PortConfig::wired(format!("eth{}", index), mac("00:11:22:33:44:55")),
        )
    }

    #[test]
    fn test_new_port_starts_disabled() {
        let port = wired_port(1);
        assert!(!port.enabled);
        assert_eq!(port.stp.state, StpPortState::Disabled);
        assert!(!port.eligible_for_data());
    }

    #[test]
    fn test_port_id_derives_from_index() {
        let port = wired_port(3);
        assert_eq!(port.stp.port_id.number(), 3);
    }

    #[test]
    fn test_leaf_port_skips_stp() {
        let config = PortConfig::tunnel("mesh0", mac("00:11:22:33:44:55"), mac("aa:bb:cc:dd:ee:01"))
            .leaf();
        let mut port = Port::new(PortIndex(2), config);
        port.enabled = true;

        assert!(port.is_p2p());
        assert!(port.is_leaf());
        assert!(!port.runs_stp());
        // Leaf eligibility does not wait for an STP state machine.
        assert!(port.eligible_for_data());
    }

    #[test]
    fn test_blocking_peer_vetoes_delivery() {
        let config = PortConfig::tunnel("mesh0", mac("00:11:22:33:44:55"), mac("aa:bb:cc:dd:ee:01"));
        let mut port = Port::new(PortIndex(2), config);
        port.enabled = true;
        port.stp.state = StpPortState::Forwarding;
        assert!(port.eligible_for_data());

        port.peer_stp_state = Some(StpPortState::Blocking);
        assert!(!port.eligible_for_data());

        port.peer_stp_state = Some(StpPortState::Forwarding);
        assert!(port.eligible_for_data());
    }

    #[test]
    fn test_direct_holdoff_after_stp_activity() {
        let t0 = Instant::now();
        let holdoff = Duration::from_secs(30);
        let mut port = wired_port(4);
        port.enabled = true;
        port.direct.enabled = true;
        port.direct.peer = Some(mac("aa:bb:cc:dd:ee:05"));

        assert!(port.direct_usable(t0, holdoff));

        port.note_stp_activity(t0);
        assert!(!port.direct_usable(t0 + Duration::from_secs(10), holdoff));
        assert!(port.direct_usable(t0 + Duration::from_secs(30), holdoff));
    }

    #[test]
    fn test_direct_requires_peer_and_enable() {
        let t0 = Instant::now();
        let holdoff = Duration::from_secs(30);
        let mut port = wired_port(4);
        port.enabled = true;
        assert!(!port.direct_usable(t0, holdoff));

        port.direct.enabled = true;
        assert!(!port.direct_usable(t0, holdoff), "no peer set yet");

        port.direct.peer = Some(mac("aa:bb:cc:dd:ee:05"));
        assert!(port.direct_usable(t0, holdoff));
    }
}
