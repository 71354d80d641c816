//! The spanning-tree state machine.
//!
//! Election, BPDU precedence and supersession, topology-change propagation
//! and the port state progression live here, as methods on the locked
//! bridge state. BPDUs to transmit are appended to a [`BpduOut`] list; the
//! caller encodes and dispatches them after the lock is released.

use super::bpdu::{Bpdu, ConfigBpdu};
use super::types::{StpPortState, HOLD_TIME};
use crate::bridge::BridgeState;
use crate::ports::PortIndex;
use meshbridge_types::TimeTicks;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// BPDUs produced by one engine invocation, in transmission order.
pub type BpduOut = Vec<(PortIndex, Bpdu)>;

/// Added to the message age at each hop.
pub const MESSAGE_AGE_INCREMENT: Duration = Duration::from_secs(1);

impl BridgeState {
    /// True when `idx` holds the designated role for its own segment.
    pub(crate) fn is_designated_for_self(&self, idx: PortIndex) -> bool {
        match self.ports.get(idx) {
            Some(port) => {
                port.stp.designated.bridge == self.stp.bridge_id
                    && port.stp.designated.port == port.stp.port_id
            }
            None => false,
        }
    }

    /// Standard 4-tuple precedence: does `bpdu` carry information at least
    /// as good as what the port currently believes?
    pub(crate) fn supersedes_port_info(&self, idx: PortIndex, bpdu: &ConfigBpdu) -> bool {
        let Some(port) = self.ports.get(idx) else {
            return false;
        };
        let held = &port.stp.designated;
        let offered = (bpdu.root, bpdu.root_path_cost, bpdu.bridge, bpdu.port);
        let current = (held.root, held.cost, held.bridge, held.port);
        offered <= current
    }

    /// Adopts the received tuple as the port's designated information and
    /// restarts the neighbor-loss clock.
    fn record_config_information(&mut self, idx: PortIndex, bpdu: &ConfigBpdu, now: Instant) {
        if let Some(port) = self.ports.get_mut(idx) {
            port.stp.designated.root = bpdu.root;
            port.stp.designated.cost = bpdu.root_path_cost;
            port.stp.designated.bridge = bpdu.bridge;
            port.stp.designated.port = bpdu.port;
            port.stp.recorded_message_age = bpdu.message_age;
            port.stp.message_age_timer.start(now);
        }
    }

    /// Adopts the root's timer values.
    fn record_config_timeout_values(&mut self, bpdu: &ConfigBpdu) {
        self.stp.max_age = bpdu.max_age.to_duration();
        self.stp.hello_time = bpdu.hello_time.to_duration();
        self.stp.forward_delay = bpdu.forward_delay.to_duration();
        self.stp.topology_change = bpdu.topology_change;
    }

    /// Remaining lifetime of the information recorded on a port.
    pub(crate) fn message_age_budget(&self, idx: PortIndex) -> Duration {
        match self.ports.get(idx) {
            Some(port) => self
                .stp
                .max_age
                .saturating_sub(port.stp.recorded_message_age.to_duration()),
            None => Duration::ZERO,
        }
    }

    /// Sends this bridge's configuration out of `idx`, unless the per-port
    /// hold timer suppresses it (in which case the send is latched and
    /// happens when the hold timer runs out).
    pub(crate) fn transmit_config(&mut self, idx: PortIndex, now: Instant, out: &mut BpduOut) {
        let (port_id, ack) = {
            let Some(port) = self.ports.get_mut(idx) else {
                return;
            };
            if port.stp.hold_timer.is_running() && port.stp.hold_timer.elapsed(now) < HOLD_TIME {
                port.stp.config_pending = true;
                return;
            }
            (port.stp.port_id, port.stp.topology_change_ack)
        };

        let message_age = if self.stp.is_root() {
            TimeTicks::ZERO
        } else {
            match self.stp.root_port.and_then(|i| self.ports.get(i)) {
                Some(root_port) => TimeTicks::from_duration(
                    root_port.stp.recorded_message_age.to_duration()
                        + root_port.stp.message_age_timer.elapsed(now)
                        + MESSAGE_AGE_INCREMENT,
                ),
                None => TimeTicks::ZERO,
            }
        };
        // Stale information is not propagated further.
        if message_age.to_duration() >= self.stp.max_age {
            return;
        }

        let bpdu = ConfigBpdu {
            topology_change: self.stp.topology_change,
            topology_change_ack: ack,
            root: self.stp.designated_root,
            root_path_cost: self.stp.root_path_cost,
            bridge: self.stp.bridge_id,
            port: port_id,
            message_age,
            max_age: TimeTicks::from_duration(self.stp.max_age),
            hello_time: TimeTicks::from_duration(self.stp.hello_time),
            forward_delay: TimeTicks::from_duration(self.stp.forward_delay),
        };
        if let Some(port) = self.ports.get_mut(idx) {
            port.stp.topology_change_ack = false;
            port.stp.config_pending = false;
            port.stp.hold_timer.start(now);
        }
        out.push((idx, Bpdu::Config(bpdu)));
    }

    /// Sends a config BPDU from every designated port.
    pub(crate) fn config_bpdu_generation(&mut self, now: Instant, out: &mut BpduOut) {
        for idx in self.ports.stp_indices() {
            let active = self
                .ports
                .get(idx)
                .map(|p| p.enabled && p.stp.state != StpPortState::Disabled)
                .unwrap_or(false);
            if active && self.is_designated_for_self(idx) {
                self.transmit_config(idx, now, out);
            }
        }
    }

    /// Replies to an inferior BPDU on a designated port with this port's
    /// better information.
    fn reply(&mut self, idx: PortIndex, now: Instant, out: &mut BpduOut) {
        self.transmit_config(idx, now, out);
    }

    /// Sends a topology change notification toward the root.
    pub(crate) fn transmit_tcn(&mut self, out: &mut BpduOut) {
        if let Some(root_port) = self.stp.root_port {
            out.push((root_port, Bpdu::TopologyChangeNotification));
        }
    }

    /// Claims the designated role on `idx` with this bridge's current root
    /// information.
    pub(crate) fn become_designated_port(&mut self, idx: PortIndex) {
        let root = self.stp.designated_root;
        let cost = self.stp.root_path_cost;
        let bridge = self.stp.bridge_id;
        if let Some(port) = self.ports.get_mut(idx) {
            port.stp.designated.root = root;
            port.stp.designated.cost = cost;
            port.stp.designated.bridge = bridge;
            port.stp.designated.port = port.stp.port_id;
        }
    }

    fn should_become_root_port(&self, idx: PortIndex) -> bool {
        let Some(port) = self.ports.get(idx) else {
            return false;
        };
        if !port.enabled || !port.runs_stp() || port.stp.state == StpPortState::Disabled {
            return false;
        }
        if self.is_designated_for_self(idx) {
            return false;
        }
        port.stp.designated.root < self.stp.bridge_id
    }

    /// Elects the root port and this bridge's believed root.
    fn root_selection(&mut self) {
        let mut best: Option<(PortIndex, _)> = None;
        for idx in self.ports.stp_indices() {
            if !self.should_become_root_port(idx) {
                continue;
            }
            let port = match self.ports.get(idx) {
                Some(p) => p,
                None => continue,
            };
            let key = (
                port.stp.designated.root,
                port.stp.designated.cost.saturating_add(port.stp.path_cost),
                port.stp.designated.bridge,
                port.stp.designated.port,
                port.stp.port_id,
            );
            if best.as_ref().map(|(_, k)| key < *k).unwrap_or(true) {
                best = Some((idx, key));
            }
        }

        match best {
            Some((idx, _)) => {
                let port = self.ports.get(idx).map(|p| (p.stp.designated, p.stp.path_cost));
                if let Some((designated, path_cost)) = port {
                    self.stp.root_port = Some(idx);
                    self.stp.designated_root = designated.root;
                    self.stp.root_path_cost = designated.cost.saturating_add(path_cost);
                }
            }
            None => {
                self.stp.root_port = None;
                self.stp.designated_root = self.stp.bridge_id;
                self.stp.root_path_cost = 0;
            }
        }
    }

    fn should_become_designated_port(&self, idx: PortIndex) -> bool {
        let Some(port) = self.ports.get(idx) else {
            return false;
        };
        if self.is_designated_for_self(idx) {
            return true;
        }
        let held = &port.stp.designated;
        if held.root != self.stp.designated_root {
            return true;
        }
        if self.stp.root_path_cost < held.cost {
            return true;
        }
        if self.stp.root_path_cost > held.cost {
            return false;
        }
        if self.stp.bridge_id < held.bridge {
            return true;
        }
        if self.stp.bridge_id > held.bridge {
            return false;
        }
        port.stp.port_id <= held.port
    }

    /// Claims the designated role on every segment this bridge should own.
    fn designated_port_selection(&mut self) {
        for idx in self.ports.stp_indices() {
            let enabled = self.ports.get(idx).map(|p| p.enabled).unwrap_or(false);
            if enabled && self.should_become_designated_port(idx) {
                self.become_designated_port(idx);
            }
        }
    }

    /// Re-runs root and designated election after any input that can move
    /// them. A no-op while the spanning tree is disabled.
    pub(crate) fn configuration_update(&mut self) {
        if !self.stp.enabled {
            return;
        }
        self.root_selection();
        self.designated_port_selection();
    }

    /// Applies the state each port's role dictates: root and designated
    /// ports head toward forwarding, everything else blocks. A no-op while
    /// the spanning tree is disabled.
    pub(crate) fn port_state_selection(&mut self, now: Instant) {
        if !self.stp.enabled {
            return;
        }
        for idx in self.ports.stp_indices() {
            let enabled = self
                .ports
                .get(idx)
                .map(|p| p.enabled && p.stp.state != StpPortState::Disabled)
                .unwrap_or(false);
            if !enabled {
                continue;
            }
            if Some(idx) == self.stp.root_port || self.is_designated_for_self(idx) {
                self.make_forwarding(idx, now);
            } else {
                self.make_blocking(idx, now);
            }
        }
    }

    /// Starts the Listening → Learning → Forwarding progression.
    fn make_forwarding(&mut self, idx: PortIndex, now: Instant) {
        if let Some(port) = self.ports.get_mut(idx) {
            if port.stp.state == StpPortState::Blocking {
                debug!(port = %port.index, "entering listening");
                port.stp.state = StpPortState::Listening;
                port.stp.forward_delay_timer.start(now);
                port.note_stp_activity(now);
            }
        }
    }

    /// Immediately blocks a port that lost its role.
    fn make_blocking(&mut self, idx: PortIndex, now: Instant) {
        let mut detect = false;
        if let Some(port) = self.ports.get_mut(idx) {
            match port.stp.state {
                StpPortState::Blocking | StpPortState::Disabled => {}
                state => {
                    debug!(port = %port.index, from = state.as_str(), "entering blocking");
                    // Losing a forwarding or learning port changes the
                    // active topology.
                    if matches!(state, StpPortState::Forwarding | StpPortState::Learning) {
                        detect = true;
                    }
                    port.stp.state = StpPortState::Blocking;
                    port.stp.forward_delay_timer.stop();
                    port.stp.topology_change_ack = false;
                    port.stp.config_pending = false;
                    port.note_stp_activity(now);
                }
            }
        }
        if detect {
            let mut out = BpduOut::new();
            self.topology_change_detection(now, &mut out);
            self.pending_bpdus.append(&mut out);
        }
    }

    /// Registers a topology change: the root starts flooding the change
    /// flag, a non-root bridge notifies toward the root.
    pub(crate) fn topology_change_detection(&mut self, now: Instant, out: &mut BpduOut) {
        info!(root = %self.stp.designated_root, "topology change detected");
        if self.stp.is_root() {
            self.stp.topology_change = true;
            self.stp.topology_change_timer.start(now);
        } else if !self.stp.topology_change_detected {
            self.transmit_tcn(out);
            self.stp.tcn_timer.start(now);
        }
        self.stp.topology_change_detected = true;
    }

    /// The root acknowledged our notification; stop repeating it.
    fn topology_change_acknowledged(&mut self) {
        self.stp.topology_change_detected = false;
        self.stp.tcn_timer.stop();
    }

    /// Acknowledges a notification received on a designated port.
    fn acknowledge_topology_change(&mut self, idx: PortIndex, now: Instant, out: &mut BpduOut) {
        if let Some(port) = self.ports.get_mut(idx) {
            port.stp.topology_change_ack = true;
        }
        self.transmit_config(idx, now, out);
    }

    /// Handles a received configuration BPDU on `idx`.
    pub(crate) fn received_config_bpdu(
        &mut self,
        idx: PortIndex,
        bpdu: &ConfigBpdu,
        now: Instant,
        out: &mut BpduOut,
    ) {
        let usable = self
            .ports
            .get(idx)
            .map(|p| p.enabled && p.runs_stp() && p.stp.state != StpPortState::Disabled)
            .unwrap_or(false);
        if !usable {
            return;
        }
        if let Some(port) = self.ports.get_mut(idx) {
            port.note_stp_activity(now);
        }

        let was_root = self.stp.is_root();
        if self.supersedes_port_info(idx, bpdu) {
            self.record_config_information(idx, bpdu, now);
            self.configuration_update();
            self.port_state_selection(now);

            if !self.stp.is_root() && was_root {
                // Just lost the root role to a better bridge.
                self.stp.hello_timer.stop();
                if self.stp.topology_change_detected {
                    self.stp.topology_change_timer.stop();
                    self.transmit_tcn(out);
                    self.stp.tcn_timer.start(now);
                }
            }

            if Some(idx) == self.stp.root_port {
                self.record_config_timeout_values(bpdu);
                self.config_bpdu_generation(now, out);
                if bpdu.topology_change_ack {
                    self.topology_change_acknowledged();
                }
            }
        } else if self.is_designated_for_self(idx) {
            // Inferior information on our segment: supersede it.
            self.reply(idx, now, out);
        }
    }

    /// Handles a received topology change notification on `idx`.
    pub(crate) fn received_tcn_bpdu(&mut self, idx: PortIndex, now: Instant, out: &mut BpduOut) {
        let usable = self
            .ports
            .get(idx)
            .map(|p| p.enabled && p.runs_stp() && p.stp.state != StpPortState::Disabled)
            .unwrap_or(false);
        if !usable || !self.is_designated_for_self(idx) {
            return;
        }
        if let Some(port) = self.ports.get_mut(idx) {
            port.note_stp_activity(now);
        }
        self.topology_change_detection(now, out);
        self.acknowledge_topology_change(idx, now, out);
    }

    /// Brings a port into the spanning tree after enable/carrier-up.
    pub(crate) fn stp_enable_port(&mut self, idx: PortIndex, now: Instant) {
        let runs_stp = self.ports.get(idx).map(|p| p.runs_stp()).unwrap_or(false);
        if !runs_stp || !self.stp.enabled {
            // Leaf ports and STP-disabled bridges forward outright.
            if let Some(port) = self.ports.get_mut(idx) {
                port.stp.state = StpPortState::Forwarding;
            }
            return;
        }
        if let Some(port) = self.ports.get_mut(idx) {
            port.stp.state = StpPortState::Blocking;
            port.stp.topology_change_ack = false;
            port.stp.config_pending = false;
            port.stp.message_age_timer.stop();
            port.stp.forward_delay_timer.stop();
            port.stp.hold_timer.stop();
        }
        self.become_designated_port(idx);
        self.configuration_update();
        self.port_state_selection(now);
    }

    /// Takes a port out of the spanning tree (admin down or carrier loss).
    pub(crate) fn stp_disable_port(&mut self, idx: PortIndex, now: Instant) {
        let was_root = self.stp.is_root();
        if let Some(port) = self.ports.get_mut(idx) {
            port.stp.state = StpPortState::Disabled;
            port.stp.topology_change_ack = false;
            port.stp.config_pending = false;
            port.stp.message_age_timer.stop();
            port.stp.forward_delay_timer.stop();
            port.stp.hold_timer.stop();
        }
        self.become_designated_port(idx);
        self.configuration_update();
        self.port_state_selection(now);

        if self.stp.is_root() && !was_root {
            self.take_over_root_duties(now);
        }
    }

    /// Starts generating this bridge's own BPDUs after winning (or
    /// defaulting into) the root role.
    pub(crate) fn take_over_root_duties(&mut self, now: Instant) {
        self.stp.max_age = self.stp.bridge_max_age;
        self.stp.hello_time = self.stp.bridge_hello_time;
        self.stp.forward_delay = self.stp.bridge_forward_delay;
        let mut out = BpduOut::new();
        self.topology_change_detection(now, &mut out);
        self.stp.tcn_timer.stop();
        self.config_bpdu_generation(now, &mut out);
        self.stp.hello_timer.start(now);
        self.pending_bpdus.append(&mut out);
    }

    /// Enables the spanning tree on the whole bridge.
    pub(crate) fn stp_enable(&mut self, now: Instant, out: &mut BpduOut) {
        self.stp.enabled = true;
        self.stp.designated_root = self.stp.bridge_id;
        self.stp.root_path_cost = 0;
        self.stp.root_port = None;
        for idx in self.ports.stp_indices() {
            let enabled = self.ports.get(idx).map(|p| p.enabled).unwrap_or(false);
            if enabled {
                if let Some(port) = self.ports.get_mut(idx) {
                    port.stp.state = StpPortState::Blocking;
                }
                self.become_designated_port(idx);
            }
        }
        self.configuration_update();
        self.port_state_selection(now);
        self.stp.hello_timer.start(now);
        self.config_bpdu_generation(now, out);
    }

    /// Disables the spanning tree: every enabled port forwards, change
    /// state is cleared.
    pub(crate) fn stp_disable(&mut self) {
        self.stp.enabled = false;
        self.stp.designated_root = self.stp.bridge_id;
        self.stp.root_path_cost = 0;
        self.stp.root_port = None;
        self.stp.topology_change = false;
        self.stp.topology_change_detected = false;
        self.stp.hello_timer.stop();
        self.stp.tcn_timer.stop();
        self.stp.topology_change_timer.stop();
        for idx in self.ports.indices() {
            if let Some(port) = self.ports.get_mut(idx) {
                port.stp.state = if port.enabled {
                    StpPortState::Forwarding
                } else {
                    StpPortState::Disabled
                };
                port.stp.message_age_timer.stop();
                port.stp.forward_delay_timer.stop();
                port.stp.hold_timer.stop();
            }
        }
    }

    /// Applies a changed bridge id (priority change, static MAC, or the
    /// lowest attached MAC moving) and re-runs the election.
    pub(crate) fn change_bridge_id(&mut self, new_id: meshbridge_types::BridgeId, now: Instant) {
        let old_id = self.stp.bridge_id;
        if new_id == old_id {
            return;
        }
        let was_root = self.stp.is_root();
        self.stp.bridge_id = new_id;
        if self.stp.designated_root == old_id {
            self.stp.designated_root = new_id;
        }
        for idx in self.ports.stp_indices() {
            if let Some(port) = self.ports.get_mut(idx) {
                if port.stp.designated.bridge == old_id {
                    port.stp.designated.bridge = new_id;
                }
                if port.stp.designated.root == old_id {
                    port.stp.designated.root = new_id;
                }
            }
        }
        self.configuration_update();
        self.port_state_selection(now);
        if self.stp.is_root() && !was_root {
            self.take_over_root_duties(now);
        }
    }
}
