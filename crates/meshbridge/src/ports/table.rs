//! Arena-backed port table with stable, reusable indices.

use super::port::Port;
use super::types::{PortConfig, PortIndex};
use crate::error::{BridgeError, BridgeResult};

/// The set of ports attached to one bridge.
///
/// Slots are reused in lowest-index-first order, so a detached index is
/// handed back to the next attach. Membership in the spanning tree
/// ("normal" ports) and the leaf set is kept as two index sequences; flood
/// iteration follows normal order then leaf order.
#[derive(Debug, Default)]
pub struct PortTable {
    slots: Vec<Option<Port>>,
    normal: Vec<PortIndex>,
    leaf: Vec<PortIndex>,
}

impl PortTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a port, reusing the lowest free slot.
    ///
    /// Fails with `InvalidArgument` if a tunnel port with the same peer
    /// address is already attached.
    pub fn attach(&mut self, config: PortConfig) -> BridgeResult<PortIndex> {
        if let Some(tunnel) = &config.tunnel {
            let duplicate = self.iter().any(|p| {
                p.tunnel
                    .map(|t| t.peer == tunnel.peer)
                    .unwrap_or(false)
            });
            if duplicate {
                return Err(BridgeError::InvalidArgument(format!(
                    "tunnel peer {} already attached",
                    tunnel.peer
                )));
            }
        }

        let slot = self
            .slots
            .iter()
            .position(|s| s.is_none())
            .unwrap_or_else(|| {
                self.slots.push(None);
                self.slots.len() - 1
            });
        let index = PortIndex(slot);
        let port = Port::new(index, config);
        if port.is_leaf() {
            self.leaf.push(index);
        } else {
            self.normal.push(index);
        }
        self.slots[slot] = Some(port);
        Ok(index)
    }

    /// Detaches a port, freeing its index for reuse.
    pub fn detach(&mut self, index: PortIndex) -> BridgeResult<Port> {
        let slot = self
            .slots
            .get_mut(index.0)
            .ok_or_else(|| BridgeError::NotFound(format!("{}", index)))?;
        let port = slot
            .take()
            .ok_or_else(|| BridgeError::NotFound(format!("{}", index)))?;
        self.normal.retain(|i| *i != index);
        self.leaf.retain(|i| *i != index);
        Ok(port)
    }

    /// Returns the port at `index`, if attached.
    pub fn get(&self, index: PortIndex) -> Option<&Port> {
        self.slots.get(index.0).and_then(|s| s.as_ref())
    }

    /// Returns the port at `index` mutably, if attached.
    pub fn get_mut(&mut self, index: PortIndex) -> Option<&mut Port> {
        self.slots.get_mut(index.0).and_then(|s| s.as_mut())
    }

    /// Iterates attached ports in flood order: normal ports in attach
    /// order, then leaf ports in attach order.
    pub fn iter(&self) -> impl Iterator<Item = &Port> {
        self.normal
            .iter()
            .chain(self.leaf.iter())
            .filter_map(move |i| self.get(*i))
    }

    /// Iterates only the spanning-tree ("normal") ports.
    pub fn iter_stp(&self) -> impl Iterator<Item = &Port> {
        self.normal.iter().filter_map(move |i| self.get(*i))
    }

    /// Indices of spanning-tree ports, for iteration under mutation.
    pub fn stp_indices(&self) -> Vec<PortIndex> {
        self.normal.clone()
    }

    /// Indices of all attached ports in flood order.
    pub fn indices(&self) -> Vec<PortIndex> {
        self.normal.iter().chain(self.leaf.iter()).copied().collect()
    }

    /// Finds the tunnel port whose peer address is `peer`.
    pub fn find_by_peer(&self, peer: meshbridge_types::MacAddress) -> Option<&Port> {
        self.iter()
            .find(|p| p.tunnel.map(|t| t.peer == peer).unwrap_or(false))
    }

    /// Number of attached ports.
    pub fn len(&self) -> usize {
        self.normal.len() + self.leaf.len()
    }

    /// Returns true when no port is attached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshbridge_types::MacAddress;
    use pretty_assertions::assert_eq;

    fn mac(s: &str) -> MacAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_attach_assigns_sequential_indices() {
        let mut table = PortTable::new();
        let a = table.attach(PortConfig::wired("eth0", mac("00:00:00:00:00:01"))).unwrap();
        let b = table.attach(PortConfig::wired("eth1", mac("00:00:00:00:00:02"))).unwrap();
        assert_eq!(a, PortIndex(0));
        assert_eq!(b, PortIndex(1));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_detached_index_is_reused() {
        let mut table = PortTable::new();
        table.attach(PortConfig::wired("eth0", mac("00:00:00:00:00:01"))).unwrap();
        let b = table.attach(PortConfig::wired("eth1", mac("00:00:00:00:00:02"))).unwrap();
        table.attach(PortConfig::wired("eth2", mac("00:00:00:00:00:03"))).unwrap();

        table.detach(b).unwrap();
        let reused = table.attach(PortConfig::wired("eth3", mac("00:00:00:00:00:04"))).unwrap();
        assert_eq!(reused, b);
    }

    #[test]
    fn test_detach_unknown_index_not_found() {
        let mut table = PortTable::new();
        assert!(matches!(
            table.detach(PortIndex(9)),
            Err(BridgeError::NotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_tunnel_peer_rejected() {
        let mut table = PortTable::new();
        let peer = mac("aa:bb:cc:dd:ee:01");
        table
            .attach(PortConfig::tunnel("mesh0", mac("00:00:00:00:00:01"), peer))
            .unwrap();
        let err = table.attach(PortConfig::tunnel("mesh1", mac("00:00:00:00:00:02"), peer));
        assert!(matches!(err, Err(BridgeError::InvalidArgument(_))));
    }

    #[test]
    fn test_flood_order_normal_then_leaf() {
        let mut table = PortTable::new();
        let leaf = table
            .attach(
                PortConfig::tunnel("mesh0", mac("00:00:00:00:00:01"), mac("aa:bb:cc:dd:ee:01"))
                    .leaf(),
            )
            .unwrap();
        let wired = table
            .attach(PortConfig::wired("eth0", mac("00:00:00:00:00:02")))
            .unwrap();

        let order: Vec<PortIndex> = table.indices();
        assert_eq!(order, vec![wired, leaf]);
        // Leaf ports never appear in the spanning-tree iteration.
        assert_eq!(table.stp_indices(), vec![wired]);
    }

    #[test]
    fn test_find_by_peer() {
        let mut table = PortTable::new();
        let peer = mac("aa:bb:cc:dd:ee:01");
        let idx = table
            .attach(PortConfig::tunnel("mesh0", mac("00:00:00:00:00:01"), peer))
            .unwrap();
        assert_eq!(table.find_by_peer(peer).map(|p| p.index), Some(idx));
        assert!(table.find_by_peer(mac("aa:bb:cc:dd:ee:02")).is_none());
    }
}
