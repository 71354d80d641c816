//! Tunnel framing types.

use crate::error::{BridgeError, BridgeResult};
use meshbridge_types::MacAddress;

/// EtherType of the learned tunnel framing (IEEE local-experimental).
pub const ETHERTYPE_TUNNEL_LEARNED: u16 = 0x88b5;

/// EtherType of the direct/unlearned tunnel framing (IEEE local-experimental).
pub const ETHERTYPE_TUNNEL_DIRECT: u16 = 0x88b6;

/// EtherType wrapping multicast group-announcement control payloads.
pub const ETHERTYPE_GROUP_ANNOUNCE: u16 = 0xb4b5;

/// Which data framing a tunnel frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelFraming {
    /// Ordinary STP-forwarded traffic; inner source is learned.
    Learned,
    /// Direct-route shortcut; inner source is not learned.
    Direct,
}

impl TunnelFraming {
    /// The EtherType carried on the outer header.
    pub fn ethertype(&self) -> u16 {
        match self {
            TunnelFraming::Learned => ETHERTYPE_TUNNEL_LEARNED,
            TunnelFraming::Direct => ETHERTYPE_TUNNEL_DIRECT,
        }
    }

    /// True for the direct framing.
    pub fn is_direct(&self) -> bool {
        matches!(self, TunnelFraming::Direct)
    }
}

const ANNOUNCEMENT_VERSION: u8 = 1;
const ANNOUNCEMENT_LEN: usize = 14;

/// A multicast group-announcement control payload: one station joining or
/// leaving one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupAnnouncement {
    pub join: bool,
    pub group: MacAddress,
    pub member: MacAddress,
}

impl GroupAnnouncement {
    /// Encodes the control payload: version, join flag, group, member.
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(ANNOUNCEMENT_LEN);
        payload.push(ANNOUNCEMENT_VERSION);
        payload.push(if self.join { 1 } else { 0 });
        payload.extend_from_slice(self.group.as_bytes());
        payload.extend_from_slice(self.member.as_bytes());
        payload
    }

    /// Decodes a control payload.
    pub fn decode(payload: &[u8]) -> BridgeResult<Self> {
        if payload.len() < ANNOUNCEMENT_LEN {
            return Err(BridgeError::ProtocolError(
                "truncated group announcement".into(),
            ));
        }
        if payload[0] != ANNOUNCEMENT_VERSION {
            return Err(BridgeError::ProtocolError(format!(
                "unknown group announcement version {}",
                payload[0]
            )));
        }
        let mut group = [0u8; 6];
        group.copy_from_slice(&payload[2..8]);
        let mut member = [0u8; 6];
        member.copy_from_slice(&payload[8..14]);
        Ok(Self {
            join: payload[1] != 0,
            group: MacAddress::new(group),
            member: MacAddress::new(member),
        })
    }
}
