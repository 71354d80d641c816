//! Spanning-tree protocol engine.
//!
//! An IEEE 802.1D-style state machine: root and designated election by
//! 4-tuple BPDU precedence, the Blocking → Listening → Learning →
//! Forwarding progression paced by the forward delay, neighbor-loss
//! detection by message age, and topology-change propagation with
//! acknowledgement. Timers are explicit values owned by the bridge and
//! port structs, driven by external maintenance ticks.

mod bpdu;
mod engine;
mod timers;
mod types;

pub use bpdu::{
    Bpdu, ConfigBpdu, BPDU_HEADER_LEN, CONFIG_BODY_LEN, FLAG_TOPOLOGY_CHANGE,
    FLAG_TOPOLOGY_CHANGE_ACK, TCN_BODY_LEN, TYPE_CONFIG, TYPE_TCN,
};
pub use engine::{BpduOut, MESSAGE_AGE_INCREMENT};
pub use types::{
    DesignatedInfo, StpBridge, StpPort, StpPortState, Timer, DEFAULT_PATH_COST, HOLD_TIME,
};
