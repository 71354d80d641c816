//! Frame processing pipeline.

use super::proxy;
use super::FrameSink;
use crate::bridge::Bridge;
use crate::frame::EthernetHeader;
use crate::mcast::GroupSnapshot;
use crate::ports::PortIndex;
use crate::stats::BridgeStats;
use crate::stp::{Bpdu, BpduOut};
use crate::tunnel::{self, Decapped, GroupAnnouncement, TunnelFraming};
use meshbridge_types::MacAddress;
use std::time::Instant;
use tracing::{debug, trace};

/// The closed set of delivery intents the engine can choose for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Hand the frame to the local protocol stack.
    Local,
    /// Transmit out of a port along the spanning-tree path.
    Port(PortIndex),
    /// Transmit out of a port via the direct-route shortcut.
    Direct(PortIndex),
}

/// Egress attributes of one port, copied out under the read lock so no
/// lock is held while transmitting.
#[derive(Debug, Clone, Copy)]
struct EgressInfo {
    idx: PortIndex,
    mac: MacAddress,
    tunnel_peer: Option<MacAddress>,
    direct_peer: Option<MacAddress>,
    encapsulates: bool,
    is_uplink: bool,
    eligible: bool,
    direct_ok: bool,
}

/// Bridge-level fields the delivery decision needs.
#[derive(Debug, Clone, Copy)]
struct DeliveryContext {
    bridge_mac: MacAddress,
    static_mac: Option<MacAddress>,
    proxy_uplink: bool,
}

impl Bridge {
    /// Core packet entry point: one frame arriving on `arrival`.
    ///
    /// The frame is consumed: forwarded copies go to `sink`, and a frame
    /// addressed to the bridge itself is returned for the host stack.
    /// Packet-path errors are never surfaced; the frame is dropped and a
    /// counter incremented.
    pub fn handle_frame(
        &self,
        arrival: PortIndex,
        frame: &[u8],
        now: Instant,
        sink: &dyn FrameSink,
    ) -> Option<Vec<u8>> {
        BridgeStats::bump(&self.stats.frames_in);

        let (encapsulates, learns, stp_enabled) = {
            let state = self.read();
            let Some(port) = state.ports.get(arrival) else {
                BridgeStats::bump(&self.stats.frames_dropped);
                return None;
            };
            if !port.enabled {
                BridgeStats::bump(&self.stats.frames_dropped);
                return None;
            }
            (
                port.encapsulates(),
                port.stp.state.learns(),
                state.stp.enabled,
            )
        };

        // Strip tunnel framing where the port carries it.
        let (frame, direct) = if encapsulates {
            match tunnel::decap(frame) {
                Decapped::Data { inner, direct } => (inner, direct),
                Decapped::Announcement(announcement) => {
                    self.handle_announcement(arrival, announcement, now);
                    return None;
                }
                Decapped::Malformed => {
                    trace!(port = arrival.0, "malformed tunnel frame");
                    BridgeStats::bump(&self.stats.frames_malformed);
                    return None;
                }
            }
        } else {
            (frame.to_vec(), false)
        };

        // BPDUs are control traffic, never forwarded as data.
        if stp_enabled && Bpdu::is_bpdu_frame(&frame) {
            self.handle_bpdu(arrival, &frame, now, sink);
            return None;
        }

        let Some((header, _)) = EthernetHeader::parse(&frame) else {
            BridgeStats::bump(&self.stats.frames_malformed);
            return None;
        };

        // Learn the source unless the frame took the direct shortcut —
        // a direct path bypasses the spanning tree and must not end up
        // in the FDB.
        if !direct && learns && header.src.is_unicast() && !header.src.is_zero() {
            if self.fdb.learn(header.src, arrival, now).is_err() {
                BridgeStats::bump(&self.stats.frames_dropped);
                return None;
            }
        }
        // The snoop hook sees every frame regardless of port state.
        self.mcast.snoop(arrival, header.src, header.dst, now);

        self.deliver(Some(arrival), frame, header, direct, now, sink)
    }

    /// Entry point for locally originated frames (the host stack sending
    /// through the bridge).
    pub fn send_local(
        &self,
        frame: &[u8],
        now: Instant,
        sink: &dyn FrameSink,
    ) -> Option<Vec<u8>> {
        let Some((header, _)) = EthernetHeader::parse(frame) else {
            BridgeStats::bump(&self.stats.frames_malformed);
            return None;
        };
        self.deliver(None, frame.to_vec(), header, false, now, sink)
    }

    /// The delivery decision for a frame that passed ingress processing.
    fn deliver(
        &self,
        arrival: Option<PortIndex>,
        frame: Vec<u8>,
        header: EthernetHeader,
        direct: bool,
        now: Instant,
        sink: &dyn FrameSink,
    ) -> Option<Vec<u8>> {
        let (context, candidates, arrival_satellite) = self.gather_egress(arrival, now);

        // Addressed to the bridge itself: up the local stack, nowhere else.
        if header.dst == context.bridge_mac || context.static_mac == Some(header.dst) {
            BridgeStats::bump(&self.stats.frames_delivered_local);
            return Some(frame);
        }

        let proxy_exception = context.proxy_uplink && arrival_satellite;
        let presented = context.static_mac.unwrap_or(context.bridge_mac);
        let mangle_for = |info: &EgressInfo| -> Option<MacAddress> {
            (proxy_exception && info.is_uplink).then_some(presented)
        };

        if header.dst.is_multicast() {
            match self.mcast.lookup(header.dst) {
                Some(snapshot) => {
                    self.expand_group(arrival, &snapshot, &frame, &candidates, sink);
                }
                None => {
                    self.flood(arrival, frame, &candidates, proxy_exception, presented, sink);
                }
            }
            return None;
        }

        match self.fdb.lookup(header.dst) {
            Some(hit) if hit.is_local => {
                BridgeStats::bump(&self.stats.frames_delivered_local);
                Some(frame)
            }
            Some(hit) => {
                let intent = self.choose_unicast_intent(arrival, &hit, &candidates);
                match intent {
                    Some(Delivery::Direct(via)) => {
                        if let Some(info) = candidates.iter().find(|c| c.idx == via) {
                            BridgeStats::bump(&self.stats.frames_forwarded);
                            self.transmit_one(info, frame, true, mangle_for(info), sink);
                        }
                        None
                    }
                    Some(Delivery::Port(via)) => {
                        if let Some(info) = candidates.iter().find(|c| c.idx == via) {
                            BridgeStats::bump(&self.stats.frames_forwarded);
                            self.transmit_one(info, frame, direct, mangle_for(info), sink);
                        }
                        None
                    }
                    Some(Delivery::Local) | None => {
                        // Station on the arrival segment or behind an
                        // ineligible port: filtered.
                        BridgeStats::bump(&self.stats.frames_dropped);
                        None
                    }
                }
            }
            None => {
                self.flood(arrival, frame, &candidates, proxy_exception, presented, sink);
                None
            }
        }
    }

    /// Picks the egress intent for a known unicast destination, preferring
    /// a usable direct shortcut over the spanning-tree path.
    fn choose_unicast_intent(
        &self,
        arrival: Option<PortIndex>,
        hit: &crate::fdb::FdbLookup,
        candidates: &[EgressInfo],
    ) -> Option<Delivery> {
        if let Some(via) = hit.direct {
            if Some(via) != arrival {
                let usable = candidates
                    .iter()
                    .find(|c| c.idx == via)
                    .map(|c| c.direct_ok)
                    .unwrap_or(false);
                if usable {
                    return Some(Delivery::Direct(via));
                }
            }
        }
        if Some(hit.port) == arrival {
            return None;
        }
        let eligible = candidates
            .iter()
            .find(|c| c.idx == hit.port)
            .map(|c| c.eligible)
            .unwrap_or(false);
        if eligible {
            Some(Delivery::Port(hit.port))
        } else {
            None
        }
    }

    /// Unicast expansion of a tracked group: one copy per distinct member,
    /// each copy unicast-addressed to that member.
    fn expand_group(
        &self,
        arrival: Option<PortIndex>,
        snapshot: &GroupSnapshot,
        frame: &[u8],
        candidates: &[EgressInfo],
        sink: &dyn FrameSink,
    ) {
        BridgeStats::bump(&self.stats.mcast_expansions);
        for membership in &snapshot.ports {
            for (member, member_direct) in &membership.members {
                // A locally sourced frame may take the member's direct
                // port; forwarded traffic stays on the tree path.
                let direct_via = (*member_direct).filter(|via| {
                    arrival.is_none()
                        && candidates
                            .iter()
                            .find(|c| c.idx == *via)
                            .map(|c| c.direct_ok)
                            .unwrap_or(false)
                });
                let (egress, is_direct) = match direct_via {
                    Some(via) => (via, true),
                    None => (membership.port, false),
                };
                if Some(egress) == arrival {
                    continue;
                }
                let Some(info) = candidates.iter().find(|c| c.idx == egress) else {
                    continue;
                };
                if !is_direct && !info.eligible {
                    continue;
                }
                let mut copy = frame.to_vec();
                copy[0..6].copy_from_slice(member.as_bytes());
                BridgeStats::bump(&self.stats.frames_forwarded);
                self.transmit_one(info, copy, is_direct, None, sink);
            }
        }
    }

    /// Floods to every eligible port in port-list order; the original
    /// buffer goes to the last eligible port, clones to the rest.
    fn flood(
        &self,
        arrival: Option<PortIndex>,
        frame: Vec<u8>,
        candidates: &[EgressInfo],
        proxy_exception: bool,
        presented: MacAddress,
        sink: &dyn FrameSink,
    ) {
        let targets: Vec<&EgressInfo> = candidates
            .iter()
            .filter(|c| Some(c.idx) != arrival)
            .filter(|c| c.eligible || (proxy_exception && c.is_uplink))
            .collect();
        if targets.is_empty() {
            BridgeStats::bump(&self.stats.frames_dropped);
            return;
        }
        BridgeStats::bump(&self.stats.frames_flooded);
        let last = targets.len() - 1;
        for (i, info) in targets.iter().enumerate() {
            let mangle = (proxy_exception && info.is_uplink).then_some(presented);
            if i == last {
                self.transmit_one(info, frame, false, mangle, sink);
                break;
            }
            self.transmit_one(info, frame.clone(), false, mangle, sink);
        }
    }

    /// Frames one copy for its egress port and hands it to the sink.
    fn transmit_one(
        &self,
        info: &EgressInfo,
        mut frame: Vec<u8>,
        direct: bool,
        mangle_as: Option<MacAddress>,
        sink: &dyn FrameSink,
    ) {
        if let Some(presented) = mangle_as {
            // Deep ARP/DHCP rewriting is best-effort; the source
            // substitution alone already counts as a proxy rewrite.
            let _ = proxy::apply_uplink_mangling(&mut frame, presented);
            BridgeStats::bump(&self.stats.proxy_rewrites);
        }
        let wire = if info.encapsulates {
            let outer_dst = if direct {
                info.direct_peer.or(info.tunnel_peer)
            } else {
                info.tunnel_peer
            };
            let Some(peer) = outer_dst else {
                BridgeStats::bump(&self.stats.frames_dropped);
                return;
            };
            let framing = if direct {
                TunnelFraming::Direct
            } else {
                TunnelFraming::Learned
            };
            tunnel::encap(&frame, peer, info.mac, framing)
        } else {
            frame
        };
        sink.transmit(info.idx, &wire);
    }

    /// Copies egress attributes for every port out of the read lock.
    fn gather_egress(
        &self,
        arrival: Option<PortIndex>,
        now: Instant,
    ) -> (DeliveryContext, Vec<EgressInfo>, bool) {
        let state = self.read();
        let holdoff = state.config.direct_holdoff;
        let context = DeliveryContext {
            bridge_mac: state.stp.bridge_id.mac(),
            static_mac: state.config.static_mac,
            proxy_uplink: state.config.proxy_uplink,
        };
        let candidates = state
            .ports
            .iter()
            .map(|p| EgressInfo {
                idx: p.index,
                mac: p.mac,
                tunnel_peer: p.tunnel.map(|t| t.peer),
                direct_peer: p.direct.peer,
                encapsulates: p.encapsulates(),
                is_uplink: p.is_uplink(),
                eligible: p.eligible_for_data(),
                direct_ok: p.direct_usable(now, holdoff),
            })
            .collect();
        let arrival_satellite = arrival
            .and_then(|idx| state.ports.get(idx))
            .map(|p| p.is_leaf() && !p.is_uplink())
            .unwrap_or(false);
        (context, candidates, arrival_satellite)
    }

    /// Diverts a received BPDU into the spanning-tree engine.
    fn handle_bpdu(&self, arrival: PortIndex, frame: &[u8], now: Instant, sink: &dyn FrameSink) {
        BridgeStats::bump(&self.stats.bpdus_rx);
        let bpdu = match Bpdu::decode(frame) {
            Ok(bpdu) => bpdu,
            Err(err) => {
                debug!(port = arrival.0, %err, "malformed bpdu dropped");
                BridgeStats::bump(&self.stats.bpdus_malformed);
                return;
            }
        };
        let frames = {
            let mut state = self.write();
            let mut out = BpduOut::new();
            match bpdu {
                Bpdu::Config(config) => state.received_config_bpdu(arrival, &config, now, &mut out),
                Bpdu::TopologyChangeNotification => state.received_tcn_bpdu(arrival, now, &mut out),
            }
            let mut pending = state.drain_pending_bpdus();
            out.append(&mut pending);
            state.render_bpdus(out)
        };
        self.dispatch(frames, sink);
    }

    /// Applies a group announcement received over a tunnel.
    fn handle_announcement(
        &self,
        arrival: PortIndex,
        announcement: GroupAnnouncement,
        now: Instant,
    ) {
        trace!(
            port = arrival.0,
            group = %announcement.group,
            member = %announcement.member,
            join = announcement.join,
            "group announcement"
        );
        if self
            .mcast
            .handle_membership_report(
                arrival,
                announcement.group,
                announcement.member,
                announcement.join,
                now,
            )
            .is_err()
        {
            BridgeStats::bump(&self.stats.frames_dropped);
            return;
        }
        if announcement.join {
            // A join heard on a direct-capable tunnel names the one-hop
            // path to the member.
            let direct_capable = self
                .read()
                .ports
                .get(arrival)
                .map(|p| p.direct.enabled)
                .unwrap_or(false);
            if direct_capable {
                self.mcast
                    .record_direct(announcement.group, announcement.member, arrival);
                let _ = self
                    .fdb
                    .learn_direct(announcement.member, arrival, arrival, now);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::frame::ETHERTYPE_IPV4;
    use crate::ports::PortConfig;
    use crate::tunnel::{ETHERTYPE_TUNNEL_DIRECT, ETHERTYPE_TUNNEL_LEARNED};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    struct RecordingSink {
        sent: Mutex<Vec<(PortIndex, Vec<u8>)>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
            }
        }

        fn take(&self) -> Vec<(PortIndex, Vec<u8>)> {
            std::mem::take(&mut self.sent.lock().unwrap())
        }
    }

    impl FrameSink for RecordingSink {
        fn transmit(&self, port: PortIndex, frame: &[u8]) {
            self.sent.lock().unwrap().push((port, frame.to_vec()));
        }
    }

    fn mac(s: &str) -> MacAddress {
        s.parse().unwrap()
    }

    fn data_frame(dst: MacAddress, src: MacAddress) -> Vec<u8> {
        EthernetHeader {
            dst,
            src,
            ethertype: ETHERTYPE_IPV4,
        }
        .build(&[1, 2, 3, 4])
    }

    /// Bridge with `wired` plain ports attached, STP left disabled so the
    /// ports forward immediately.
    fn bridge_with_ports(wired: usize) -> (Bridge, Vec<PortIndex>, RecordingSink) {
        let bridge = Bridge::new(BridgeConfig::default()).unwrap();
        let sink = RecordingSink::new();
        let now = Instant::now();
        let ports = (0..wired)
            .map(|i| {
                bridge
                    .attach_port(
                        PortConfig::wired(
                            format!("eth{}", i),
                            mac(&format!("02:00:00:00:00:{:02x}", i + 1)),
                        ),
                        now,
                        &sink,
                    )
                    .unwrap()
            })
            .collect();
        sink.take();
        (bridge, ports, sink)
    }

    #[test]
    fn test_known_unicast_forwarded_to_owning_port() {
        let (bridge, ports, sink) = bridge_with_ports(3);
        let now = Instant::now();
        let a = mac("00:11:22:33:44:55");
        let b = mac("00:11:22:33:44:66");

        bridge.handle_frame(ports[0], &data_frame(MacAddress::BROADCAST, a), now, &sink);
        bridge.handle_frame(ports[1], &data_frame(MacAddress::BROADCAST, b), now, &sink);
        sink.take();

        let frame = data_frame(b, a);
        bridge.handle_frame(ports[0], &frame, now, &sink);
        let sent = sink.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ports[1]);
        assert_eq!(sent[0].1, frame);
    }

    #[test]
    fn test_unknown_unicast_floods_all_but_arrival() {
        let (bridge, ports, sink) = bridge_with_ports(3);
        let now = Instant::now();

        let frame = data_frame(mac("00:11:22:33:44:99"), mac("00:11:22:33:44:55"));
        bridge.handle_frame(ports[0], &frame, now, &sink);
        let sent = sink.take();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, ports[1], "flood follows port-list order");
        assert_eq!(sent[1].0, ports[2]);
        assert!(sent.iter().all(|(_, f)| *f == frame));
    }

    #[test]
    fn test_frame_to_bridge_goes_up_only() {
        let (bridge, ports, sink) = bridge_with_ports(2);
        let now = Instant::now();

        // Lowest attached address is the bridge address.
        let frame = data_frame(mac("02:00:00:00:00:01"), mac("00:11:22:33:44:55"));
        let up = bridge.handle_frame(ports[1], &frame, now, &sink);
        assert_eq!(up, Some(frame));
        assert!(sink.take().is_empty());
    }

    #[test]
    fn test_station_on_arrival_segment_filtered() {
        let (bridge, ports, sink) = bridge_with_ports(2);
        let now = Instant::now();
        let a = mac("00:11:22:33:44:55");
        let b = mac("00:11:22:33:44:66");

        // Both stations behind port 0.
        bridge.handle_frame(ports[0], &data_frame(MacAddress::BROADCAST, a), now, &sink);
        bridge.handle_frame(ports[0], &data_frame(MacAddress::BROADCAST, b), now, &sink);
        sink.take();

        bridge.handle_frame(ports[0], &data_frame(b, a), now, &sink);
        assert!(sink.take().is_empty());
    }

    #[test]
    fn test_egress_on_tunnel_port_is_encapsulated() {
        let bridge = Bridge::new(BridgeConfig::default()).unwrap();
        let sink = RecordingSink::new();
        let now = Instant::now();
        let wired = bridge
            .attach_port(PortConfig::wired("eth0", mac("02:00:00:00:00:01")), now, &sink)
            .unwrap();
        let peer = mac("06:aa:bb:cc:dd:01");
        let tunnel_port = bridge
            .attach_port(
                PortConfig::tunnel("mesh0", mac("02:00:00:00:00:02"), peer),
                now,
                &sink,
            )
            .unwrap();
        sink.take();

        let frame = data_frame(mac("00:11:22:33:44:99"), mac("00:11:22:33:44:55"));
        bridge.handle_frame(wired, &frame, now, &sink);
        let sent = sink.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, tunnel_port);

        let (outer, inner) = EthernetHeader::parse(&sent[0].1).unwrap();
        assert_eq!(outer.dst, peer);
        assert_eq!(outer.src, mac("02:00:00:00:00:02"));
        assert_eq!(outer.ethertype, ETHERTYPE_TUNNEL_LEARNED);
        assert_eq!(inner, &frame[..]);
    }

    #[test]
    fn test_learned_tunnel_ingress_learns_inner_source() {
        let bridge = Bridge::new(BridgeConfig::default()).unwrap();
        let sink = RecordingSink::new();
        let now = Instant::now();
        let peer = mac("06:aa:bb:cc:dd:01");
        let tunnel_port = bridge
            .attach_port(
                PortConfig::tunnel("mesh0", mac("02:00:00:00:00:02"), peer),
                now,
                &sink,
            )
            .unwrap();
        sink.take();

        let station = mac("00:11:22:33:44:55");
        let inner = data_frame(mac("00:11:22:33:44:99"), station);
        let wire = tunnel::encap(&inner, mac("02:00:00:00:00:02"), peer, TunnelFraming::Learned);
        bridge.handle_frame(tunnel_port, &wire, now, &sink);

        assert_eq!(
            bridge.fdb_lookup(station).map(|hit| hit.port),
            Some(tunnel_port)
        );
    }

    #[test]
    fn test_direct_tunnel_ingress_skips_learning() {
        let bridge = Bridge::new(BridgeConfig::default()).unwrap();
        let sink = RecordingSink::new();
        let now = Instant::now();
        let peer = mac("06:aa:bb:cc:dd:01");
        let tunnel_port = bridge
            .attach_port(
                PortConfig::tunnel("mesh0", mac("02:00:00:00:00:02"), peer),
                now,
                &sink,
            )
            .unwrap();
        sink.take();

        let station = mac("00:11:22:33:44:55");
        let inner = data_frame(mac("00:11:22:33:44:99"), station);
        let wire = tunnel::encap(&inner, mac("02:00:00:00:00:02"), peer, TunnelFraming::Direct);
        bridge.handle_frame(tunnel_port, &wire, now, &sink);

        assert_eq!(bridge.fdb_lookup(station), None);
    }

    #[test]
    fn test_malformed_tunnel_protocol_dropped() {
        let bridge = Bridge::new(BridgeConfig::default()).unwrap();
        let sink = RecordingSink::new();
        let now = Instant::now();
        let peer = mac("06:aa:bb:cc:dd:01");
        let tunnel_port = bridge
            .attach_port(
                PortConfig::tunnel("mesh0", mac("02:00:00:00:00:02"), peer),
                now,
                &sink,
            )
            .unwrap();
        sink.take();

        // Plain IPv4 on an encapsulating port is not tunnel traffic.
        let frame = data_frame(mac("00:11:22:33:44:99"), mac("00:11:22:33:44:55"));
        bridge.handle_frame(tunnel_port, &frame, now, &sink);
        assert!(sink.take().is_empty());
        assert_eq!(bridge.stats().frames_malformed, 1);
    }

    #[test]
    fn test_bpdu_diverted_not_forwarded() {
        let (bridge, ports, sink) = bridge_with_ports(2);
        let now = Instant::now();
        bridge.set_stp_enabled(true, now, &sink);
        sink.take();

        let bpdu = crate::stp::Bpdu::TopologyChangeNotification.encode();
        bridge.handle_frame(ports[0], &bpdu, now, &sink);
        // A TCN on a designated port is acknowledged, never flooded as data.
        let sent = sink.take();
        assert!(sent.iter().all(|(p, _)| *p == ports[0]));
        assert_eq!(bridge.stats().bpdus_rx, 1);
    }

    #[test]
    fn test_group_announcement_updates_tracker() {
        let bridge = Bridge::new(BridgeConfig::default()).unwrap();
        let sink = RecordingSink::new();
        let now = Instant::now();
        let peer = mac("06:aa:bb:cc:dd:01");
        let tunnel_port = bridge
            .attach_port(
                PortConfig::tunnel("mesh0", mac("02:00:00:00:00:02"), peer),
                now,
                &sink,
            )
            .unwrap();
        sink.take();

        let group = mac("01:00:5e:00:00:fb");
        let member = mac("00:11:22:33:44:55");
        let wire = tunnel::encap_announcement(
            &GroupAnnouncement {
                join: true,
                group,
                member,
            },
            mac("02:00:00:00:00:02"),
            peer,
        );
        bridge.handle_frame(tunnel_port, &wire, now, &sink);

        let groups = bridge.multicast_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].group, group);
        assert_eq!(groups[0].port, tunnel_port.0);
        assert_eq!(groups[0].members, vec![member]);
    }

    #[test]
    fn test_proxy_satellite_flood_mangles_uplink_copy() {
        let static_mac = mac("02:aa:bb:cc:dd:ee");
        let config = BridgeConfig {
            static_mac: Some(static_mac),
            proxy_uplink: true,
            ..Default::default()
        };
        let bridge = Bridge::new(config).unwrap();
        let sink = RecordingSink::new();
        let now = Instant::now();

        let satellite_peer = mac("06:aa:bb:cc:dd:01");
        let uplink_peer = mac("06:aa:bb:cc:dd:02");
        let satellite = bridge
            .attach_port(
                PortConfig::tunnel("sat0", mac("02:00:00:00:00:01"), satellite_peer).leaf(),
                now,
                &sink,
            )
            .unwrap();
        let uplink = bridge
            .attach_port(
                PortConfig::tunnel("uplink0", mac("02:00:00:00:00:02"), uplink_peer)
                    .leaf()
                    .uplink(),
                now,
                &sink,
            )
            .unwrap();
        sink.take();

        let station = mac("00:11:22:33:44:55");
        let inner = data_frame(MacAddress::BROADCAST, station);
        let wire = tunnel::encap(
            &inner,
            mac("02:00:00:00:00:01"),
            satellite_peer,
            TunnelFraming::Learned,
        );
        bridge.handle_frame(satellite, &wire, now, &sink);

        let sent = sink.take();
        let uplink_copy = sent.iter().find(|(p, _)| *p == uplink).expect("uplink copy");
        let (outer, inner_sent) = EthernetHeader::parse(&uplink_copy.1).unwrap();
        assert_eq!(outer.dst, uplink_peer);
        let (inner_header, _) = EthernetHeader::parse(inner_sent).unwrap();
        assert_eq!(
            inner_header.src, static_mac,
            "satellite presented under the bridge address"
        );
        assert_eq!(bridge.stats().proxy_rewrites, 1);
    }

    #[test]
    fn test_direct_frame_egress_uses_direct_framing() {
        let bridge = Bridge::new(BridgeConfig::default()).unwrap();
        let sink = RecordingSink::new();
        let now = Instant::now();
        let peer4 = mac("06:aa:bb:cc:dd:04");
        let peer5 = mac("06:aa:bb:cc:dd:05");
        let port4 = bridge
            .attach_port(
                PortConfig::tunnel("mesh4", mac("02:00:00:00:00:04"), peer4),
                now,
                &sink,
            )
            .unwrap();
        let port5 = bridge
            .attach_port(
                PortConfig::tunnel("mesh5", mac("02:00:00:00:00:05"), peer5),
                now,
                &sink,
            )
            .unwrap();
        sink.take();

        // Station behind port 5 on the tree; port 4 knows a direct path.
        let station = mac("00:11:22:33:44:55");
        let inner = data_frame(mac("00:11:22:33:44:99"), station);
        let wire = tunnel::encap(&inner, mac("02:00:00:00:00:05"), peer5, TunnelFraming::Learned);
        bridge.handle_frame(port5, &wire, now, &sink);
        sink.take();

        bridge.set_direct_route(port4, true, Some(peer5)).unwrap();
        bridge.set_direct_path(station, port4, now).unwrap();

        let frame = data_frame(station, mac("00:11:22:33:44:aa"));
        bridge.send_local(&frame, now, &sink);
        let sent = sink.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, port4);
        let (outer, inner_sent) = EthernetHeader::parse(&sent[0].1).unwrap();
        assert_eq!(outer.ethertype, ETHERTYPE_TUNNEL_DIRECT);
        assert_eq!(outer.dst, peer5, "outer destination is the direct peer");
        assert_eq!(inner_sent, &frame[..]);
    }
}
