//! Tunnel encapsulation and decapsulation.

use super::types::{
    GroupAnnouncement, TunnelFraming, ETHERTYPE_GROUP_ANNOUNCE, ETHERTYPE_TUNNEL_DIRECT,
    ETHERTYPE_TUNNEL_LEARNED,
};
use crate::frame::EthernetHeader;
use meshbridge_types::MacAddress;

/// Result of decapsulating a frame that arrived on an encapsulating port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decapped {
    /// A data frame; `direct` distinguishes the unlearned framing.
    Data { inner: Vec<u8>, direct: bool },
    /// A multicast group-announcement control frame.
    Announcement(GroupAnnouncement),
    /// Neither recognized tunnel protocol number: drop as malformed.
    Malformed,
}

/// Wraps `inner` for transmission to `peer` from the local egress address.
pub fn encap(
    inner: &[u8],
    peer: MacAddress,
    local: MacAddress,
    framing: TunnelFraming,
) -> Vec<u8> {
    EthernetHeader {
        dst: peer,
        src: local,
        ethertype: framing.ethertype(),
    }
    .build(inner)
}

/// Wraps a group announcement for broadcast to every tunnel port.
pub fn encap_announcement(
    announcement: &GroupAnnouncement,
    peer: MacAddress,
    local: MacAddress,
) -> Vec<u8> {
    EthernetHeader {
        dst: peer,
        src: local,
        ethertype: ETHERTYPE_GROUP_ANNOUNCE,
    }
    .build(&announcement.encode())
}

/// Strips the outer header of a frame received on an encapsulating port.
///
/// Any frame bearing neither recognized protocol number is malformed: an
/// encapsulating port carries only tunnel traffic.
pub fn decap(frame: &[u8]) -> Decapped {
    let Some((header, payload)) = EthernetHeader::parse(frame) else {
        return Decapped::Malformed;
    };
    match header.ethertype {
        ETHERTYPE_TUNNEL_LEARNED => Decapped::Data {
            inner: payload.to_vec(),
            direct: false,
        },
        ETHERTYPE_TUNNEL_DIRECT => Decapped::Data {
            inner: payload.to_vec(),
            direct: true,
        },
        ETHERTYPE_GROUP_ANNOUNCE => match GroupAnnouncement::decode(payload) {
            Ok(announcement) => Decapped::Announcement(announcement),
            Err(_) => Decapped::Malformed,
        },
        _ => Decapped::Malformed,
    }
}
