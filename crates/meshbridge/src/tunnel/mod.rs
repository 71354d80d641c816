//! P2P tunnel framing for mesh links.
//!
//! Frames between mesh endpoints travel inside an outer Ethernet header
//! addressed to the tunnel peer. Two data framings exist: the learned
//! framing for ordinary STP-forwarded traffic (the inner source is learned
//! on decap) and the direct framing for the direct-route shortcut (the
//! inner source is deliberately not learned — it would record a path that
//! bypasses the spanning tree). A third framing wraps multicast group
//! announcements, broadcast to every tunnel port.

mod codec;
mod types;

pub use codec::{decap, encap, encap_announcement, Decapped};
pub use types::{
    GroupAnnouncement, TunnelFraming, ETHERTYPE_GROUP_ANNOUNCE, ETHERTYPE_TUNNEL_DIRECT,
    ETHERTYPE_TUNNEL_LEARNED,
};
