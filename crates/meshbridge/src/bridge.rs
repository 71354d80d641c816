//! The bridge aggregate: one FDB, one multicast tracker, the spanning-tree
//! engine and the set of ports, behind the external control-plane surface.
//!
//! Locking follows the two-tier discipline: the port table and spanning-tree
//! state sit under one bridge-wide reader-writer lock (packet-path readers,
//! structural/control writers); the FDB and multicast tracker are sharded
//! and accessed lock-free from the caller's point of view. Statistics are
//! relaxed atomics. BPDUs produced under the lock are rendered to wire form
//! inside it and handed to the sink after release.

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::fdb::{Fdb, FdbDumpEntry, FdbLookup};
use crate::forward::FrameSink;
use crate::mcast::{GroupDumpEntry, MulticastTracker};
use crate::ports::{PortConfig, PortIndex, PortStatus, PortTable};
use crate::stats::{BridgeStats, StatsSnapshot};
use crate::stp::{Bpdu, BpduOut, StpBridge, StpPortState};
use crate::tunnel;
use meshbridge_types::{BridgeId, MacAddress, PortId};
use serde::Serialize;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tracing::info;

/// Bridge state protected by the bridge-wide lock.
pub(crate) struct BridgeState {
    pub(crate) config: BridgeConfig,
    pub(crate) ports: PortTable,
    pub(crate) stp: StpBridge,
    /// BPDUs produced by engine paths with no output list in scope.
    pub(crate) pending_bpdus: Vec<(PortIndex, Bpdu)>,
}

impl BridgeState {
    pub(crate) fn new(config: BridgeConfig) -> Self {
        let mac = config.static_mac.unwrap_or(MacAddress::ZERO);
        let stp = StpBridge::new(
            BridgeId::new(config.priority, mac),
            config.max_age,
            config.hello_time,
            config.forward_delay,
        );
        Self {
            config,
            ports: PortTable::new(),
            stp,
            pending_bpdus: Vec::new(),
        }
    }

    /// The address the bridge id should carry: the configured static MAC,
    /// else the lowest attached interface address.
    fn elected_mac(&self) -> MacAddress {
        if let Some(mac) = self.config.static_mac {
            return mac;
        }
        self.ports
            .iter()
            .map(|p| p.mac)
            .min()
            .unwrap_or_else(|| self.stp.bridge_id.mac())
    }

    /// Re-derives the bridge id after attach/detach or a static-MAC
    /// change; a changed id triggers a full re-election.
    pub(crate) fn refresh_bridge_id(&mut self, now: Instant) {
        let id = BridgeId::new(self.config.priority, self.elected_mac());
        self.change_bridge_id(id, now);
    }

    /// Renders BPDUs to wire frames, applying tunnel framing for
    /// encapsulating egress ports.
    pub(crate) fn render_bpdus(&self, out: BpduOut) -> Vec<(PortIndex, Vec<u8>)> {
        out.into_iter()
            .filter_map(|(idx, bpdu)| {
                let port = self.ports.get(idx)?;
                if !port.enabled {
                    return None;
                }
                let frame = bpdu.encode();
                let frame = match port.tunnel {
                    Some(attrs) if port.encapsulates() => {
                        tunnel::encap(&frame, attrs.peer, port.mac, tunnel::TunnelFraming::Learned)
                    }
                    _ => frame,
                };
                Some((idx, frame))
            })
            .collect()
    }
}

/// Serializable bridge-level status.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeStatus {
    pub bridge_id: String,
    pub designated_root: String,
    pub root_path_cost: u32,
    pub root_port: Option<usize>,
    pub stp_enabled: bool,
    pub topology_change: bool,
    pub port_count: usize,
    pub fdb_entries: usize,
    pub multicast_groups: usize,
}

/// A software Ethernet bridge for wireless mesh links.
pub struct Bridge {
    state: RwLock<BridgeState>,
    pub(crate) fdb: Fdb,
    pub(crate) mcast: MulticastTracker,
    pub(crate) stats: BridgeStats,
}

impl Bridge {
    /// Creates a bridge from a validated configuration.
    pub fn new(config: BridgeConfig) -> BridgeResult<Self> {
        config.validate()?;
        let fdb = Fdb::new(config.fdb_capacity, config.priority_ouis.clone());
        let mcast = MulticastTracker::new(config.mcast_capacity, config.mcast_ageing_time);
        Ok(Self {
            state: RwLock::new(BridgeState::new(config)),
            fdb,
            mcast,
            stats: BridgeStats::default(),
        })
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, BridgeState> {
        self.state.read().expect("bridge state lock poisoned")
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, BridgeState> {
        self.state.write().expect("bridge state lock poisoned")
    }

    pub(crate) fn dispatch(&self, frames: Vec<(PortIndex, Vec<u8>)>, sink: &dyn FrameSink) {
        for (idx, frame) in frames {
            BridgeStats::bump(&self.stats.bpdus_tx);
            sink.transmit(idx, &frame);
        }
    }

    // ------------------------------------------------------------------
    // Control plane: ports
    // ------------------------------------------------------------------

    /// Attaches a port and brings it into service.
    pub fn attach_port(
        &self,
        config: PortConfig,
        now: Instant,
        sink: &dyn FrameSink,
    ) -> BridgeResult<PortIndex> {
        if config.mac.is_multicast() || config.mac.is_zero() {
            return Err(BridgeError::InvalidArgument(format!(
                "{} is not a valid interface address",
                config.mac
            )));
        }
        if config.path_cost == 0 {
            return Err(BridgeError::InvalidArgument(
                "path cost must be at least 1".into(),
            ));
        }
        if let Some(tunnel) = &config.tunnel {
            if tunnel.peer.is_multicast() || tunnel.peer.is_zero() {
                return Err(BridgeError::InvalidArgument(format!(
                    "{} is not a valid tunnel peer address",
                    tunnel.peer
                )));
            }
        }

        let mac = config.mac;
        let (idx, frames) = {
            let mut state = self.write();
            let idx = state.ports.attach(config)?;
            if let Some(port) = state.ports.get_mut(idx) {
                port.enabled = true;
            }
            self.fdb.insert_local(mac, idx);
            state.refresh_bridge_id(now);
            state.stp_enable_port(idx, now);
            info!(port = idx.0, %mac, "port attached");
            let pending = state.drain_pending_bpdus();
            let frames = state.render_bpdus(pending);
            (idx, frames)
        };
        self.dispatch(frames, sink);
        Ok(idx)
    }

    /// Detaches a port, dropping its forwarding state.
    pub fn detach_port(
        &self,
        idx: PortIndex,
        now: Instant,
        sink: &dyn FrameSink,
    ) -> BridgeResult<()> {
        let frames = {
            let mut state = self.write();
            if state.ports.get(idx).is_none() {
                return Err(BridgeError::NotFound(format!("{}", idx)));
            }
            if state.stp.enabled
                && state.stp.root_port == Some(idx)
                && state.stp.topology_change_detected
            {
                return Err(BridgeError::Busy(format!(
                    "{} is the root port of an in-progress topology reconfiguration",
                    idx
                )));
            }
            state.stp_disable_port(idx, now);
            state.ports.detach(idx)?;
            state.refresh_bridge_id(now);
            info!(port = idx.0, "port detached");
            let pending = state.drain_pending_bpdus();
            state.render_bpdus(pending)
        };
        // Forwarding state tied to the port goes with it.
        self.fdb.delete_by_port(idx);
        self.mcast.delete_by_port(idx);
        self.dispatch(frames, sink);
        Ok(())
    }

    /// Administrative/carrier control of one port.
    pub fn set_port_enabled(
        &self,
        idx: PortIndex,
        enabled: bool,
        now: Instant,
        sink: &dyn FrameSink,
    ) -> BridgeResult<()> {
        let frames = {
            let mut state = self.write();
            let port = state
                .ports
                .get_mut(idx)
                .ok_or_else(|| BridgeError::NotFound(format!("{}", idx)))?;
            port.enabled = enabled;
            if enabled {
                state.stp_enable_port(idx, now);
            } else {
                state.stp_disable_port(idx, now);
            }
            let pending = state.drain_pending_bpdus();
            state.render_bpdus(pending)
        };
        self.dispatch(frames, sink);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Control plane: spanning tree parameters
    // ------------------------------------------------------------------

    /// Enables or disables the spanning tree bridge-wide.
    pub fn set_stp_enabled(&self, enabled: bool, now: Instant, sink: &dyn FrameSink) {
        let frames = {
            let mut state = self.write();
            let mut out = BpduOut::new();
            if enabled {
                state.stp_enable(now, &mut out);
                info!("spanning tree enabled");
            } else {
                state.stp_disable();
                info!("spanning tree disabled");
            }
            let mut pending = state.drain_pending_bpdus();
            out.append(&mut pending);
            state.render_bpdus(out)
        };
        if !enabled {
            // Membership state is only meaningful under a running tree.
            self.mcast.flush();
        }
        self.dispatch(frames, sink);
    }

    /// Sets the bridge priority; a change re-runs the election.
    pub fn set_bridge_priority(&self, priority: u16, now: Instant, sink: &dyn FrameSink) {
        let frames = {
            let mut state = self.write();
            state.config.priority = priority;
            state.refresh_bridge_id(now);
            let pending = state.drain_pending_bpdus();
            state.render_bpdus(pending)
        };
        self.dispatch(frames, sink);
    }

    /// Pins the bridge MAC, overriding the lowest-attached-address rule.
    pub fn set_static_mac(
        &self,
        mac: MacAddress,
        now: Instant,
        sink: &dyn FrameSink,
    ) -> BridgeResult<()> {
        if mac.is_multicast() || mac.is_zero() {
            return Err(BridgeError::InvalidArgument(format!(
                "{} is not a valid bridge address",
                mac
            )));
        }
        let frames = {
            let mut state = self.write();
            state.config.static_mac = Some(mac);
            state.refresh_bridge_id(now);
            let pending = state.drain_pending_bpdus();
            state.render_bpdus(pending)
        };
        self.dispatch(frames, sink);
        Ok(())
    }

    /// Sets the bridge timer parameters, validated as a set.
    pub fn set_timers(
        &self,
        hello_time: Duration,
        max_age: Duration,
        forward_delay: Duration,
    ) -> BridgeResult<()> {
        let mut state = self.write();
        let candidate = BridgeConfig {
            hello_time,
            max_age,
            forward_delay,
            ..state.config.clone()
        };
        candidate.validate()?;
        state.config = candidate;
        state.stp.bridge_hello_time = hello_time;
        state.stp.bridge_max_age = max_age;
        state.stp.bridge_forward_delay = forward_delay;
        if state.stp.is_root() {
            state.stp.hello_time = hello_time;
            state.stp.max_age = max_age;
            state.stp.forward_delay = forward_delay;
        }
        Ok(())
    }

    /// Sets the FDB ageing time.
    pub fn set_ageing_time(&self, ageing: Duration) -> BridgeResult<()> {
        if ageing < Duration::from_secs(10) || ageing > Duration::from_secs(1_000_000) {
            return Err(BridgeError::InvalidArgument(format!(
                "ageing time {:?} outside [10s, 1000000s]",
                ageing
            )));
        }
        self.write().config.ageing_time = ageing;
        Ok(())
    }

    /// Sets a port's spanning-tree priority.
    pub fn set_port_priority(
        &self,
        idx: PortIndex,
        priority: u8,
        now: Instant,
    ) -> BridgeResult<()> {
        let mut state = self.write();
        let was_designated = state.is_designated_for_self(idx);
        let port = state
            .ports
            .get_mut(idx)
            .ok_or_else(|| BridgeError::NotFound(format!("{}", idx)))?;
        port.stp.port_id = PortId::new(priority, port.stp.port_id.number());
        if was_designated {
            state.become_designated_port(idx);
        }
        state.configuration_update();
        state.port_state_selection(now);
        Ok(())
    }

    /// Sets a port's spanning-tree path cost.
    pub fn set_port_path_cost(&self, idx: PortIndex, cost: u32, now: Instant) -> BridgeResult<()> {
        if cost == 0 {
            return Err(BridgeError::InvalidArgument(
                "path cost must be at least 1".into(),
            ));
        }
        let mut state = self.write();
        let port = state
            .ports
            .get_mut(idx)
            .ok_or_else(|| BridgeError::NotFound(format!("{}", idx)))?;
        port.stp.path_cost = cost;
        state.configuration_update();
        state.port_state_selection(now);
        Ok(())
    }

    /// Enables uplink/proxy operation. Requires a static bridge MAC, which
    /// is the address presented upstream.
    pub fn set_proxy_uplink(&self, enabled: bool) -> BridgeResult<()> {
        let mut state = self.write();
        if enabled && state.config.static_mac.is_none() {
            return Err(BridgeError::InvalidArgument(
                "proxy uplink mode requires a static bridge MAC".into(),
            ));
        }
        state.config.proxy_uplink = enabled;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Control plane: tunnels and direct routing
    // ------------------------------------------------------------------

    /// Configures the direct-route shortcut on a P2P port.
    pub fn set_direct_route(
        &self,
        idx: PortIndex,
        enabled: bool,
        peer: Option<MacAddress>,
    ) -> BridgeResult<()> {
        let mut state = self.write();
        let port = state
            .ports
            .get_mut(idx)
            .ok_or_else(|| BridgeError::NotFound(format!("{}", idx)))?;
        if !port.is_p2p() {
            return Err(BridgeError::InvalidArgument(format!(
                "{} is not a P2P tunnel port",
                idx
            )));
        }
        if let Some(peer) = peer {
            if peer.is_multicast() || peer.is_zero() {
                return Err(BridgeError::InvalidArgument(format!(
                    "{} is not a valid direct peer address",
                    peer
                )));
            }
        }
        port.direct.enabled = enabled;
        port.direct.peer = peer;
        Ok(())
    }

    /// Injects the spanning-tree state advertised by a tunnel peer.
    pub fn set_peer_stp_state(
        &self,
        idx: PortIndex,
        state_of_peer: Option<StpPortState>,
    ) -> BridgeResult<()> {
        let mut state = self.write();
        let port = state
            .ports
            .get_mut(idx)
            .ok_or_else(|| BridgeError::NotFound(format!("{}", idx)))?;
        if !port.is_p2p() {
            return Err(BridgeError::InvalidArgument(format!(
                "{} is not a P2P tunnel port",
                idx
            )));
        }
        port.peer_stp_state = state_of_peer;
        Ok(())
    }

    /// Records a direct one-hop path to `mac` via `through`.
    pub fn set_direct_path(
        &self,
        mac: MacAddress,
        through: PortIndex,
        now: Instant,
    ) -> BridgeResult<()> {
        {
            let state = self.read();
            let port = state
                .ports
                .get(through)
                .ok_or_else(|| BridgeError::NotFound(format!("{}", through)))?;
            if !port.is_p2p() {
                return Err(BridgeError::InvalidArgument(format!(
                    "{} is not a P2P tunnel port",
                    through
                )));
            }
        }
        self.fdb.learn_direct(mac, through, through, now)
    }

    // ------------------------------------------------------------------
    // Control plane: multicast membership
    // ------------------------------------------------------------------

    /// Applies a membership report observed on `port`.
    pub fn report_membership(
        &self,
        port: PortIndex,
        group: MacAddress,
        member: MacAddress,
        join: bool,
        now: Instant,
    ) -> BridgeResult<()> {
        if self.read().ports.get(port).is_none() {
            return Err(BridgeError::NotFound(format!("{}", port)));
        }
        self.mcast
            .handle_membership_report(port, group, member, join, now)
    }

    /// Broadcasts a group announcement to every tunnel port, telling mesh
    /// peers about a local member.
    pub fn announce_membership(
        &self,
        group: MacAddress,
        member: MacAddress,
        join: bool,
        sink: &dyn FrameSink,
    ) -> BridgeResult<()> {
        if !group.is_multicast() || group.is_broadcast() {
            return Err(BridgeError::InvalidArgument(format!(
                "{} is not a multicast group address",
                group
            )));
        }
        let announcement = tunnel::GroupAnnouncement {
            join,
            group,
            member,
        };
        let frames: Vec<(PortIndex, Vec<u8>)> = {
            let state = self.read();
            state
                .ports
                .iter()
                .filter(|p| p.enabled && p.encapsulates())
                .filter_map(|p| {
                    p.tunnel.map(|t| {
                        (
                            p.index,
                            tunnel::encap_announcement(&announcement, t.peer, p.mac),
                        )
                    })
                })
                .collect()
        };
        for (idx, frame) in frames {
            sink.transmit(idx, &frame);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Runs spanning-tree timers and the aging sweeps against `now`.
    pub fn on_tick(&self, now: Instant, sink: &dyn FrameSink) {
        let (frames, ageing) = {
            let mut state = self.write();
            let mut out = BpduOut::new();
            state.on_stp_tick(now, &mut out);
            let mut pending = state.drain_pending_bpdus();
            out.append(&mut pending);
            // While a topology change is being flooded, stations must be
            // relearned at forward-delay pace.
            let ageing = if state.stp.topology_change {
                state.stp.forward_delay
            } else {
                state.config.ageing_time
            };
            (state.render_bpdus(out), ageing)
        };
        let aged = self.fdb.age_sweep(now, ageing);
        BridgeStats::add(&self.stats.fdb_entries_aged, aged as u64);
        let member_aged = self.mcast.age_sweep(now);
        BridgeStats::add(&self.stats.mcast_members_aged, member_aged as u64);
        self.dispatch(frames, sink);
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// One key-ordered page of the FDB.
    pub fn fdb_dump(&self, start: usize, page_size: usize, now: Instant) -> Vec<FdbDumpEntry> {
        self.fdb.dump_page(start, page_size, now)
    }

    /// FDB lookup for one address.
    pub fn fdb_lookup(&self, mac: MacAddress) -> Option<FdbLookup> {
        self.fdb.lookup(mac)
    }

    /// All tracked group memberships.
    pub fn multicast_groups(&self) -> Vec<GroupDumpEntry> {
        self.mcast.dump()
    }

    /// Status of one port.
    pub fn port_status(&self, idx: PortIndex) -> BridgeResult<PortStatus> {
        self.read()
            .ports
            .get(idx)
            .map(|p| p.status())
            .ok_or_else(|| BridgeError::NotFound(format!("{}", idx)))
    }

    /// Bridge-level status.
    pub fn status(&self) -> BridgeStatus {
        let state = self.read();
        BridgeStatus {
            bridge_id: state.stp.bridge_id.to_string(),
            designated_root: state.stp.designated_root.to_string(),
            root_path_cost: state.stp.root_path_cost,
            root_port: state.stp.root_port.map(|p| p.0),
            stp_enabled: state.stp.enabled,
            topology_change: state.stp.topology_change,
            port_count: state.ports.len(),
            fdb_entries: self.fdb.len(),
            multicast_groups: self.mcast.len(),
        }
    }

    /// Approximate counter snapshot.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("Bridge")
            .field("bridge_id", &state.stp.bridge_id.to_string())
            .field("ports", &state.ports.len())
            .field("stp_enabled", &state.stp.enabled)
            .finish()
    }
}
