//! Spanning-tree timer expiry handling.
//!
//! The bridge owns every timer as explicit armed-at state; an external
//! maintenance tick drives expiry. A tick that finds a port disabled is a
//! no-op for that port's timers.

use super::bpdu::Bpdu;
use super::engine::BpduOut;
use super::types::{StpPortState, HOLD_TIME};
use crate::bridge::BridgeState;
use crate::ports::PortIndex;
use std::time::Instant;
use tracing::debug;

impl BridgeState {
    /// Runs all spanning-tree timers against `now`.
    pub(crate) fn on_stp_tick(&mut self, now: Instant, out: &mut BpduOut) {
        if !self.stp.enabled {
            return;
        }

        if self.stp.hello_timer.expired(now, self.stp.bridge_hello_time) {
            if self.stp.is_root() {
                self.config_bpdu_generation(now, out);
            }
            self.stp.hello_timer.start(now);
        }

        // An unacknowledged change notification repeats every hello.
        if self.stp.tcn_timer.expired(now, self.stp.bridge_hello_time) {
            self.transmit_tcn(out);
            self.stp.tcn_timer.start(now);
        }

        // The root floods the change flag until twice the forward delay
        // has passed since the last detected change.
        if self
            .stp
            .topology_change_timer
            .expired(now, self.stp.bridge_forward_delay * 2)
        {
            debug!("topology change flooding window over");
            self.stp.topology_change = false;
            self.stp.topology_change_detected = false;
        }

        for idx in self.ports.stp_indices() {
            let active = self
                .ports
                .get(idx)
                .map(|p| p.enabled && p.stp.state != StpPortState::Disabled)
                .unwrap_or(false);
            if !active {
                continue;
            }

            let budget = self.message_age_budget(idx);
            let message_age_fired = self
                .ports
                .get_mut(idx)
                .map(|p| p.stp.message_age_timer.expired(now, budget))
                .unwrap_or(false);
            if message_age_fired {
                self.message_age_expired(idx, now);
            }

            let delay = self.stp.forward_delay;
            let forward_delay_fired = self
                .ports
                .get_mut(idx)
                .map(|p| p.stp.forward_delay_timer.expired(now, delay))
                .unwrap_or(false);
            if forward_delay_fired {
                self.forward_delay_expired(idx, now);
            }

            let hold_fired = self
                .ports
                .get_mut(idx)
                .map(|p| p.stp.hold_timer.expired(now, HOLD_TIME) && p.stp.config_pending)
                .unwrap_or(false);
            if hold_fired {
                self.transmit_config(idx, now, out);
            }
        }

        out.append(&mut self.pending_bpdus);
    }

    /// The neighbor on `idx` went silent past max age: reclaim the segment
    /// and re-run the election; the bridge may inherit the root role.
    fn message_age_expired(&mut self, idx: PortIndex, now: Instant) {
        debug!(port = idx.0, "message age expired, neighbor presumed lost");
        let was_root = self.stp.is_root();
        self.become_designated_port(idx);
        self.configuration_update();
        self.port_state_selection(now);
        if self.stp.is_root() && !was_root {
            self.take_over_root_duties(now);
        }
    }

    /// Advances the Listening → Learning → Forwarding progression.
    fn forward_delay_expired(&mut self, idx: PortIndex, now: Instant) {
        let state = match self.ports.get(idx) {
            Some(p) => p.stp.state,
            None => return,
        };
        match state {
            StpPortState::Listening => {
                if let Some(port) = self.ports.get_mut(idx) {
                    debug!(port = %port.index, "entering learning");
                    port.stp.state = StpPortState::Learning;
                    port.stp.forward_delay_timer.start(now);
                    port.note_stp_activity(now);
                }
            }
            StpPortState::Learning => {
                if let Some(port) = self.ports.get_mut(idx) {
                    debug!(port = %port.index, "entering forwarding");
                    port.stp.state = StpPortState::Forwarding;
                    port.note_stp_activity(now);
                }
                // A new forwarding port changes the active topology when
                // this bridge also owns another segment.
                let other_designated = self
                    .ports
                    .stp_indices()
                    .into_iter()
                    .any(|other| other != idx && self.is_designated_for_self(other));
                if other_designated {
                    let mut extra = BpduOut::new();
                    self.topology_change_detection(now, &mut extra);
                    self.pending_bpdus.append(&mut extra);
                }
            }
            _ => {}
        }
    }

    /// Drains BPDUs produced by engine paths that had no output list in
    /// scope (blocking transitions, root takeover).
    pub(crate) fn drain_pending_bpdus(&mut self) -> Vec<(PortIndex, Bpdu)> {
        std::mem::take(&mut self.pending_bpdus)
    }
}
