//! BPDU wire codec.
//!
//! BPDUs travel in 802.3-style control frames: a fixed 8-byte header (the
//! 6-byte bridge group address followed by a 2-byte big-endian body length)
//! and then the BPDU body. The source is implied by the arrival port; these
//! frames never leave the link they were sent on.
//!
//! The config body is bit-exact 802.1D: protocol id (2), version (1),
//! type (1), flags (1), root id (8), root path cost (4), bridge id (8),
//! port id (2), message age (2), max age (2), hello time (2), forward
//! delay (2) — 35 bytes, timer fields in 1/256-second ticks. A topology
//! change notification body carries only protocol id, version and type.

use crate::error::{BridgeError, BridgeResult};
use byteorder::{BigEndian, ByteOrder};
use meshbridge_types::{BridgeId, MacAddress, PortId, TimeTicks};

/// Length of the bridge-group frame header.
pub const BPDU_HEADER_LEN: usize = 8;

/// Length of a config BPDU body.
pub const CONFIG_BODY_LEN: usize = 35;

/// Length of a topology-change-notification body.
pub const TCN_BODY_LEN: usize = 4;

const PROTOCOL_ID: u16 = 0x0000;
const PROTOCOL_VERSION: u8 = 0x00;

/// BPDU type byte: configuration.
pub const TYPE_CONFIG: u8 = 0x00;

/// BPDU type byte: topology change notification.
pub const TYPE_TCN: u8 = 0x80;

/// Config flags bit 0: topology change.
pub const FLAG_TOPOLOGY_CHANGE: u8 = 0x01;

/// Config flags bit 7: topology change acknowledgement.
pub const FLAG_TOPOLOGY_CHANGE_ACK: u8 = 0x80;

/// A configuration BPDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigBpdu {
    pub topology_change: bool,
    pub topology_change_ack: bool,
    pub root: BridgeId,
    pub root_path_cost: u32,
    pub bridge: BridgeId,
    pub port: PortId,
    pub message_age: TimeTicks,
    pub max_age: TimeTicks,
    pub hello_time: TimeTicks,
    pub forward_delay: TimeTicks,
}

/// A decoded BPDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bpdu {
    Config(ConfigBpdu),
    TopologyChangeNotification,
}

impl Bpdu {
    /// True if `frame` is addressed to the bridge group.
    pub fn is_bpdu_frame(frame: &[u8]) -> bool {
        frame.len() >= 6 && frame[0..6] == *MacAddress::BRIDGE_GROUP.as_bytes()
    }

    /// Encodes this BPDU as a complete bridge-group frame.
    pub fn encode(&self) -> Vec<u8> {
        let body_len = match self {
            Bpdu::Config(_) => CONFIG_BODY_LEN,
            Bpdu::TopologyChangeNotification => TCN_BODY_LEN,
        };
        let mut frame = vec![0u8; BPDU_HEADER_LEN + body_len];
        frame[0..6].copy_from_slice(MacAddress::BRIDGE_GROUP.as_bytes());
        BigEndian::write_u16(&mut frame[6..8], body_len as u16);

        let body = &mut frame[BPDU_HEADER_LEN..];
        BigEndian::write_u16(&mut body[0..2], PROTOCOL_ID);
        body[2] = PROTOCOL_VERSION;
        match self {
            Bpdu::TopologyChangeNotification => {
                body[3] = TYPE_TCN;
            }
            Bpdu::Config(config) => {
                body[3] = TYPE_CONFIG;
                let mut flags = 0u8;
                if config.topology_change {
                    flags |= FLAG_TOPOLOGY_CHANGE;
                }
                if config.topology_change_ack {
                    flags |= FLAG_TOPOLOGY_CHANGE_ACK;
                }
                body[4] = flags;
                body[5..13].copy_from_slice(&config.root.to_bytes());
                BigEndian::write_u32(&mut body[13..17], config.root_path_cost);
                body[17..25].copy_from_slice(&config.bridge.to_bytes());
                BigEndian::write_u16(&mut body[25..27], config.port.to_u16());
                BigEndian::write_u16(&mut body[27..29], config.message_age.to_u16());
                BigEndian::write_u16(&mut body[29..31], config.max_age.to_u16());
                BigEndian::write_u16(&mut body[31..33], config.hello_time.to_u16());
                BigEndian::write_u16(&mut body[33..35], config.forward_delay.to_u16());
            }
        }
        frame
    }

    /// Decodes a bridge-group frame.
    ///
    /// Wrong group address, inconsistent length, unknown protocol tag or
    /// revision, and truncated bodies are all protocol errors; the caller
    /// drops the frame with no state change.
    pub fn decode(frame: &[u8]) -> BridgeResult<Bpdu> {
        if frame.len() < BPDU_HEADER_LEN {
            return Err(BridgeError::ProtocolError("truncated bpdu header".into()));
        }
        if !Self::is_bpdu_frame(frame) {
            return Err(BridgeError::ProtocolError(
                "not a bridge group frame".into(),
            ));
        }
        let declared = BigEndian::read_u16(&frame[6..8]) as usize;
        let body = &frame[BPDU_HEADER_LEN..];
        if body.len() < declared || declared < TCN_BODY_LEN {
            return Err(BridgeError::ProtocolError(format!(
                "bpdu body length {} does not match declared {}",
                body.len(),
                declared
            )));
        }
        if BigEndian::read_u16(&body[0..2]) != PROTOCOL_ID || body[2] != PROTOCOL_VERSION {
            return Err(BridgeError::ProtocolError(
                "unknown protocol tag or revision".into(),
            ));
        }
        match body[3] {
            TYPE_TCN => Ok(Bpdu::TopologyChangeNotification),
            TYPE_CONFIG => {
                if declared < CONFIG_BODY_LEN {
                    return Err(BridgeError::ProtocolError(
                        "truncated config bpdu".into(),
                    ));
                }
                let flags = body[4];
                let mut root = [0u8; 8];
                root.copy_from_slice(&body[5..13]);
                let mut bridge = [0u8; 8];
                bridge.copy_from_slice(&body[17..25]);
                Ok(Bpdu::Config(ConfigBpdu {
                    topology_change: flags & FLAG_TOPOLOGY_CHANGE != 0,
                    topology_change_ack: flags & FLAG_TOPOLOGY_CHANGE_ACK != 0,
                    root: BridgeId::from_bytes(&root),
                    root_path_cost: BigEndian::read_u32(&body[13..17]),
                    bridge: BridgeId::from_bytes(&bridge),
                    port: PortId::from_u16(BigEndian::read_u16(&body[25..27])),
                    message_age: TimeTicks::from_u16(BigEndian::read_u16(&body[27..29])),
                    max_age: TimeTicks::from_u16(BigEndian::read_u16(&body[29..31])),
                    hello_time: TimeTicks::from_u16(BigEndian::read_u16(&body[31..33])),
                    forward_delay: TimeTicks::from_u16(BigEndian::read_u16(&body[33..35])),
                }))
            }
            other => Err(BridgeError::ProtocolError(format!(
                "unknown bpdu type 0x{:02x}",
                other
            ))),
        }
    }
}
