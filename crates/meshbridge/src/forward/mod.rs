//! The per-frame forwarding engine.
//!
//! Ties the FDB, multicast tracker, port table and spanning-tree state
//! together: decapsulate, divert control traffic, learn, then deliver —
//! locally, to one port, via the direct-route shortcut, by unicast
//! expansion of a tracked group, or by flooding.

mod engine;
mod proxy;

pub use engine::Delivery;
pub use proxy::apply_uplink_mangling;

use crate::ports::PortIndex;

/// Capability interface for frame egress.
///
/// The engine owns the decision, the sink owns the wire: every frame or
/// BPDU leaving the bridge goes through `transmit`, already framed for the
/// egress port.
pub trait FrameSink: Send + Sync {
    /// Transmits a fully framed packet out of `port`.
    fn transmit(&self, port: PortIndex, frame: &[u8]);
}
