//! Spanning-tree state types and timers.

use meshbridge_types::{BridgeId, PortId, TimeTicks};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Spanning-tree port state, ordered from most to least restrictive.
///
/// `Disabled` is reachable from every state (administrative action or
/// carrier loss) and is left only by re-enabling the port, which restarts
/// the machine at `Blocking`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum StpPortState {
    Disabled = 0,
    Blocking = 1,
    Listening = 2,
    Learning = 3,
    Forwarding = 4,
}

impl StpPortState {
    /// Parses a state from its wire/display form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "0" | "disabled" => Some(Self::Disabled),
            "1" | "blocking" => Some(Self::Blocking),
            "2" | "listening" => Some(Self::Listening),
            "3" | "learning" => Some(Self::Learning),
            "4" | "forwarding" => Some(Self::Forwarding),
            _ => None,
        }
    }

    /// String form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Blocking => "blocking",
            Self::Listening => "listening",
            Self::Learning => "learning",
            Self::Forwarding => "forwarding",
        }
    }

    /// True in states where source addresses are learned.
    pub fn learns(&self) -> bool {
        matches!(self, Self::Learning | Self::Forwarding)
    }

    /// True in the one state where data frames are forwarded.
    pub fn forwards(&self) -> bool {
        matches!(self, Self::Forwarding)
    }
}

/// The designated tuple a port currently believes, compared against
/// received BPDUs with the standard 4-tuple precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesignatedInfo {
    pub root: BridgeId,
    pub cost: u32,
    pub bridge: BridgeId,
    pub port: PortId,
}

impl DesignatedInfo {
    /// The "worse than anything" initial tuple.
    pub fn worst() -> Self {
        Self {
            root: BridgeId::MAX,
            cost: u32::MAX,
            bridge: BridgeId::MAX,
            port: PortId::from_u16(u16::MAX),
        }
    }
}

/// A one-shot protocol timer: armed at an instant, fired when the deadline
/// has passed on a tick.
///
/// Deadlines are computed with saturating `Duration` arithmetic from the
/// armed instant, so a coarse tick can never observe a negative remainder.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timer {
    since: Option<Instant>,
}

impl Timer {
    /// Arms (or re-arms) the timer at `now`.
    pub fn start(&mut self, now: Instant) {
        self.since = Some(now);
    }

    /// Disarms the timer.
    pub fn stop(&mut self) {
        self.since = None;
    }

    /// Returns true if the timer is armed.
    pub fn is_running(&self) -> bool {
        self.since.is_some()
    }

    /// Fires and disarms if `duration` has elapsed since arming.
    pub fn expired(&mut self, now: Instant, duration: Duration) -> bool {
        match self.since {
            Some(since) if now.saturating_duration_since(since) >= duration => {
                self.since = None;
                true
            }
            _ => false,
        }
    }

    /// Elapsed time since arming, zero when disarmed.
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.since
            .map(|s| now.saturating_duration_since(s))
            .unwrap_or_default()
    }
}

/// Per-port spanning-tree state.
#[derive(Debug, Clone)]
pub struct StpPort {
    pub port_id: PortId,
    pub path_cost: u32,
    pub state: StpPortState,
    pub designated: DesignatedInfo,
    /// Set while a topology-change acknowledge is owed on the next config
    /// BPDU out of this port.
    pub topology_change_ack: bool,
    /// Set when a config BPDU transmission was suppressed by the hold
    /// timer and must go out when it expires.
    pub config_pending: bool,
    /// Message age carried by the last recorded config BPDU; the neighbor
    /// is presumed lost once `max_age - recorded_message_age` elapses.
    pub recorded_message_age: TimeTicks,
    pub message_age_timer: Timer,
    pub forward_delay_timer: Timer,
    pub hold_timer: Timer,
}

/// Default path cost for a port when none is configured.
pub const DEFAULT_PATH_COST: u32 = 100;

/// Minimum interval between config BPDU transmissions on one port.
pub const HOLD_TIME: Duration = Duration::from_secs(1);

impl StpPort {
    /// Creates the STP sub-state for a new port.
    pub fn new(port_id: PortId, path_cost: u32) -> Self {
        Self {
            port_id,
            path_cost,
            state: StpPortState::Disabled,
            designated: DesignatedInfo::worst(),
            topology_change_ack: false,
            config_pending: false,
            recorded_message_age: TimeTicks::ZERO,
            message_age_timer: Timer::default(),
            forward_delay_timer: Timer::default(),
            hold_timer: Timer::default(),
        }
    }
}

/// Bridge-wide spanning-tree state.
#[derive(Debug, Clone)]
pub struct StpBridge {
    pub enabled: bool,
    pub bridge_id: BridgeId,
    pub designated_root: BridgeId,
    pub root_path_cost: u32,
    /// Index of the root port in the port table, `None` when this bridge
    /// is the root.
    pub root_port: Option<crate::ports::PortIndex>,
    /// Currently-active timer values (the root's while not root).
    pub max_age: Duration,
    pub hello_time: Duration,
    pub forward_delay: Duration,
    /// Locally configured values, adopted when this bridge is root.
    pub bridge_max_age: Duration,
    pub bridge_hello_time: Duration,
    pub bridge_forward_delay: Duration,
    pub topology_change: bool,
    pub topology_change_detected: bool,
    pub hello_timer: Timer,
    pub tcn_timer: Timer,
    pub topology_change_timer: Timer,
}

impl StpBridge {
    /// Creates bridge STP state from configured parameters.
    pub fn new(
        bridge_id: BridgeId,
        max_age: Duration,
        hello_time: Duration,
        forward_delay: Duration,
    ) -> Self {
        Self {
            enabled: false,
            bridge_id,
            designated_root: bridge_id,
            root_path_cost: 0,
            root_port: None,
            max_age,
            hello_time,
            forward_delay,
            bridge_max_age: max_age,
            bridge_hello_time: hello_time,
            bridge_forward_delay: forward_delay,
            topology_change: false,
            topology_change_detected: false,
            hello_timer: Timer::default(),
            tcn_timer: Timer::default(),
            topology_change_timer: Timer::default(),
        }
    }

    /// True when this bridge believes itself the root.
    pub fn is_root(&self) -> bool {
        self.designated_root == self.bridge_id
    }

    /// Max age as protocol ticks for BPDU encoding.
    pub fn max_age_ticks(&self) -> TimeTicks {
        TimeTicks::from_duration(self.max_age)
    }
}
