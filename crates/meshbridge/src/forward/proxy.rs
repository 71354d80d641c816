//! Uplink/proxy frame mangling.
//!
//! In uplink/proxy operation the bridge presents one shared address
//! upstream on behalf of all satellite stations: the Ethernet source is
//! substituted with the bridge's address, ARP sender hardware addresses
//! are rewritten to match, and DHCP discover/request payloads get the
//! broadcast flag forced so the upstream server replies via broadcast
//! (a unicast reply to the substituted address would never reach the
//! satellite).

use crate::frame::{rewrite_source, EthernetHeader, ETHERTYPE_ARP, ETHERTYPE_IPV4};
use byteorder::{BigEndian, ByteOrder};
use meshbridge_types::MacAddress;
use tracing::trace;

const ARP_SENDER_HW_OFFSET: usize = 8;
const ARP_MIN_LEN: usize = 28;

const IPV4_PROTO_UDP: u8 = 17;
const DHCP_SERVER_PORT: u16 = 67;
const BOOTP_OP_REQUEST: u8 = 1;
const BOOTP_FLAGS_OFFSET: usize = 10;
const BOOTP_FLAG_BROADCAST: u16 = 0x8000;
const BOOTP_OPTIONS_OFFSET: usize = 236;
const DHCP_MAGIC: [u8; 4] = [0x63, 0x82, 0x53, 0x63];
const DHCP_OPT_MESSAGE_TYPE: u8 = 53;
const DHCP_OPT_PAD: u8 = 0;
const DHCP_OPT_END: u8 = 255;
const DHCP_DISCOVER: u8 = 1;
const DHCP_REQUEST: u8 = 3;

/// Rewrites a satellite frame for presentation on the uplink. Returns true
/// if any field beyond the Ethernet source was touched.
pub fn apply_uplink_mangling(frame: &mut [u8], bridge_mac: MacAddress) -> bool {
    let Some((header, _)) = EthernetHeader::parse(frame) else {
        return false;
    };
    rewrite_source(frame, bridge_mac);

    match header.ethertype {
        ETHERTYPE_ARP => mangle_arp(frame, bridge_mac),
        ETHERTYPE_IPV4 => mangle_dhcp(frame),
        _ => false,
    }
}

/// Rewrites the ARP sender hardware address to the bridge's.
fn mangle_arp(frame: &mut [u8], bridge_mac: MacAddress) -> bool {
    let arp_start = crate::frame::ETH_HEADER_LEN;
    if frame.len() < arp_start + ARP_MIN_LEN {
        return false;
    }
    let sha = arp_start + ARP_SENDER_HW_OFFSET;
    frame[sha..sha + 6].copy_from_slice(bridge_mac.as_bytes());
    trace!(%bridge_mac, "arp sender rewritten for uplink");
    true
}

/// Forces the broadcast flag on DHCP discover/request payloads.
///
/// The UDP checksum is cleared rather than recomputed; a zero checksum is
/// valid for UDP over IPv4.
fn mangle_dhcp(frame: &mut [u8]) -> bool {
    let ip_start = crate::frame::ETH_HEADER_LEN;
    if frame.len() < ip_start + 20 {
        return false;
    }
    let ihl = (frame[ip_start] & 0x0f) as usize * 4;
    if ihl < 20 || frame[ip_start + 9] != IPV4_PROTO_UDP {
        return false;
    }
    let udp_start = ip_start + ihl;
    if frame.len() < udp_start + 8 {
        return false;
    }
    if BigEndian::read_u16(&frame[udp_start + 2..udp_start + 4]) != DHCP_SERVER_PORT {
        return false;
    }

    let bootp_start = udp_start + 8;
    let options_start = bootp_start + BOOTP_OPTIONS_OFFSET;
    if frame.len() < options_start + 4 || frame[bootp_start] != BOOTP_OP_REQUEST {
        return false;
    }
    if frame[options_start..options_start + 4] != DHCP_MAGIC {
        return false;
    }
    if !is_discover_or_request(&frame[options_start + 4..]) {
        return false;
    }

    let flags_at = bootp_start + BOOTP_FLAGS_OFFSET;
    let flags = BigEndian::read_u16(&frame[flags_at..flags_at + 2]);
    BigEndian::write_u16(
        &mut frame[flags_at..flags_at + 2],
        flags | BOOTP_FLAG_BROADCAST,
    );
    // UDP checksum covered the flags field.
    BigEndian::write_u16(&mut frame[udp_start + 6..udp_start + 8], 0);
    trace!("dhcp broadcast flag forced for uplink");
    true
}

fn is_discover_or_request(mut options: &[u8]) -> bool {
    while let Some(&code) = options.first() {
        match code {
            DHCP_OPT_PAD => options = &options[1..],
            DHCP_OPT_END => return false,
            _ => {
                let Some(&len) = options.get(1) else {
                    return false;
                };
                let len = len as usize;
                if options.len() < 2 + len {
                    return false;
                }
                if code == DHCP_OPT_MESSAGE_TYPE && len == 1 {
                    return matches!(options[2], DHCP_DISCOVER | DHCP_REQUEST);
                }
                options = &options[2 + len..];
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mac(s: &str) -> MacAddress {
        s.parse().unwrap()
    }

    fn arp_request(sender: MacAddress) -> Vec<u8> {
        let mut arp = vec![0u8; ARP_MIN_LEN];
        arp[0..2].copy_from_slice(&1u16.to_be_bytes()); // htype ethernet
        arp[2..4].copy_from_slice(&0x0800u16.to_be_bytes()); // ptype ipv4
        arp[4] = 6;
        arp[5] = 4;
        arp[6..8].copy_from_slice(&1u16.to_be_bytes()); // request
        arp[8..14].copy_from_slice(sender.as_bytes());
        EthernetHeader {
            dst: MacAddress::BROADCAST,
            src: sender,
            ethertype: ETHERTYPE_ARP,
        }
        .build(&arp)
    }

    fn dhcp_discover(client: MacAddress) -> Vec<u8> {
        let mut bootp = vec![0u8; BOOTP_OPTIONS_OFFSET + 4 + 3 + 1];
        bootp[0] = BOOTP_OP_REQUEST;
        bootp[1] = 1; // htype ethernet
        bootp[2] = 6; // hlen
        bootp[28..34].copy_from_slice(client.as_bytes());
        bootp[BOOTP_OPTIONS_OFFSET..BOOTP_OPTIONS_OFFSET + 4].copy_from_slice(&DHCP_MAGIC);
        bootp[BOOTP_OPTIONS_OFFSET + 4] = DHCP_OPT_MESSAGE_TYPE;
        bootp[BOOTP_OPTIONS_OFFSET + 5] = 1;
        bootp[BOOTP_OPTIONS_OFFSET + 6] = DHCP_DISCOVER;
        bootp[BOOTP_OPTIONS_OFFSET + 7] = DHCP_OPT_END;

        let mut udp = vec![0u8; 8];
        BigEndian::write_u16(&mut udp[0..2], 68);
        BigEndian::write_u16(&mut udp[2..4], DHCP_SERVER_PORT);
        BigEndian::write_u16(&mut udp[4..6], (8 + bootp.len()) as u16);
        BigEndian::write_u16(&mut udp[6..8], 0xbeef);
        udp.extend_from_slice(&bootp);

        let mut ip = vec![0u8; 20];
        ip[0] = 0x45;
        ip[9] = IPV4_PROTO_UDP;
        ip.extend_from_slice(&udp);

        EthernetHeader {
            dst: MacAddress::BROADCAST,
            src: client,
            ethertype: ETHERTYPE_IPV4,
        }
        .build(&ip)
    }

    #[test]
    fn test_source_substitution() {
        let bridge = mac("02:aa:bb:cc:dd:ee");
        let mut frame = EthernetHeader {
            dst: mac("00:11:22:33:44:99"),
            src: mac("00:11:22:33:44:55"),
            ethertype: 0x86dd,
        }
        .build(&[0; 8]);

        apply_uplink_mangling(&mut frame, bridge);
        let (header, _) = EthernetHeader::parse(&frame).unwrap();
        assert_eq!(header.src, bridge);
        assert_eq!(header.dst, mac("00:11:22:33:44:99"));
    }

    #[test]
    fn test_arp_sender_rewritten() {
        let bridge = mac("02:aa:bb:cc:dd:ee");
        let satellite = mac("00:11:22:33:44:55");
        let mut frame = arp_request(satellite);

        assert!(apply_uplink_mangling(&mut frame, bridge));
        let sha = crate::frame::ETH_HEADER_LEN + ARP_SENDER_HW_OFFSET;
        assert_eq!(&frame[sha..sha + 6], bridge.as_bytes());
        // Target fields untouched.
        let tha = crate::frame::ETH_HEADER_LEN + 18;
        assert_eq!(&frame[tha..tha + 6], &[0u8; 6]);
    }

    #[test]
    fn test_dhcp_discover_broadcast_flag_forced() {
        let bridge = mac("02:aa:bb:cc:dd:ee");
        let client = mac("00:11:22:33:44:55");
        let mut frame = dhcp_discover(client);

        assert!(apply_uplink_mangling(&mut frame, bridge));
        let flags_at = crate::frame::ETH_HEADER_LEN + 20 + 8 + BOOTP_FLAGS_OFFSET;
        assert_eq!(
            BigEndian::read_u16(&frame[flags_at..flags_at + 2]) & BOOTP_FLAG_BROADCAST,
            BOOTP_FLAG_BROADCAST
        );
        // UDP checksum cleared after the mutation.
        let udp_csum_at = crate::frame::ETH_HEADER_LEN + 20 + 6;
        assert_eq!(BigEndian::read_u16(&frame[udp_csum_at..udp_csum_at + 2]), 0);
    }

    #[test]
    fn test_dhcp_reply_direction_untouched() {
        let bridge = mac("02:aa:bb:cc:dd:ee");
        let client = mac("00:11:22:33:44:55");
        let mut frame = dhcp_discover(client);
        // Point the UDP destination at the client port instead.
        let udp_start = crate::frame::ETH_HEADER_LEN + 20;
        BigEndian::write_u16(&mut frame[udp_start + 2..udp_start + 4], 68);

        assert!(!apply_uplink_mangling(&mut frame, bridge));
    }

    #[test]
    fn test_plain_ipv4_only_gets_source_substitution() {
        let bridge = mac("02:aa:bb:cc:dd:ee");
        let mut ip = vec![0u8; 20];
        ip[0] = 0x45;
        ip[9] = 6; // tcp
        let mut frame = EthernetHeader {
            dst: mac("00:11:22:33:44:99"),
            src: mac("00:11:22:33:44:55"),
            ethertype: ETHERTYPE_IPV4,
        }
        .build(&ip);

        assert!(!apply_uplink_mangling(&mut frame, bridge));
        let (header, _) = EthernetHeader::parse(&frame).unwrap();
        assert_eq!(header.src, bridge);
    }
}
