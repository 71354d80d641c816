//! Ethernet frame header parsing and construction.

use byteorder::{BigEndian, ByteOrder};
use meshbridge_types::MacAddress;

/// Length of an Ethernet header (no 802.1Q tag).
pub const ETH_HEADER_LEN: usize = 14;

/// Minimum frame length the bridge will process (header only; runts with a
/// shorter header are malformed).
pub const MIN_FRAME_LEN: usize = ETH_HEADER_LEN;

/// EtherType for ARP.
pub const ETHERTYPE_ARP: u16 = 0x0806;

/// EtherType for IPv4.
pub const ETHERTYPE_IPV4: u16 = 0x0800;

/// Parsed view of an Ethernet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    pub dst: MacAddress,
    pub src: MacAddress,
    pub ethertype: u16,
}

impl EthernetHeader {
    /// Parses the header of `frame`, returning the header and the payload
    /// slice. Returns `None` for runt frames.
    pub fn parse(frame: &[u8]) -> Option<(EthernetHeader, &[u8])> {
        if frame.len() < ETH_HEADER_LEN {
            return None;
        }
        let mut dst = [0u8; 6];
        let mut src = [0u8; 6];
        dst.copy_from_slice(&frame[0..6]);
        src.copy_from_slice(&frame[6..12]);
        let ethertype = BigEndian::read_u16(&frame[12..14]);
        Some((
            EthernetHeader {
                dst: MacAddress::new(dst),
                src: MacAddress::new(src),
                ethertype,
            },
            &frame[ETH_HEADER_LEN..],
        ))
    }

    /// Builds a frame from this header and a payload.
    pub fn build(&self, payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(ETH_HEADER_LEN + payload.len());
        frame.extend_from_slice(self.dst.as_bytes());
        frame.extend_from_slice(self.src.as_bytes());
        frame.extend_from_slice(&self.ethertype.to_be_bytes());
        frame.extend_from_slice(payload);
        frame
    }
}

/// Overwrites the source address of a frame in place.
///
/// The caller must have validated the frame length already.
pub fn rewrite_source(frame: &mut [u8], src: MacAddress) {
    frame[6..12].copy_from_slice(src.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mac(s: &str) -> MacAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_build_round_trip() {
        let header = EthernetHeader {
            dst: mac("ff:ff:ff:ff:ff:ff"),
            src: mac("00:11:22:33:44:55"),
            ethertype: ETHERTYPE_IPV4,
        };
        let frame = header.build(&[1, 2, 3, 4]);
        let (parsed, payload) = EthernetHeader::parse(&frame).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(payload, &[1, 2, 3, 4]);
    }

    #[test]
    fn test_runt_frame_rejected() {
        assert!(EthernetHeader::parse(&[0u8; 13]).is_none());
    }

    #[test]
    fn test_rewrite_source() {
        let header = EthernetHeader {
            dst: mac("ff:ff:ff:ff:ff:ff"),
            src: mac("00:11:22:33:44:55"),
            ethertype: ETHERTYPE_ARP,
        };
        let mut frame = header.build(&[]);
        rewrite_source(&mut frame, mac("aa:bb:cc:dd:ee:ff"));
        let (parsed, _) = EthernetHeader::parse(&frame).unwrap();
        assert_eq!(parsed.src, mac("aa:bb:cc:dd:ee:ff"));
        assert_eq!(parsed.dst, mac("ff:ff:ff:ff:ff:ff"));
    }
}
