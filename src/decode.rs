//! # Frame Decoding
//!
//! Pure, stateless decoding of raw link-layer frames into typed header
//! records: Ethernet → IPv4 → TCP/UDP. Each decoder is a total function of
//! its input bytes — no I/O, no shared state, and no panics on malformed
//! input. Anything the decoder cannot make sense of comes back as a
//! [`DecodeError`] for the caller to drop or count.
//!
//! Only ether-type 0x0800 (IPv4) is decoded past the Ethernet layer. IP
//! protocols other than TCP (6) and UDP (17) yield
//! [`TransportHeader::None`] with the full IP payload attached.

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Ether-type for IPv4.
pub const ETHERTYPE_IPV4: u16 = 0x0800;

/// IP protocol numbers this decoder understands.
pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;

/// TCP flag bit masks (RFC 793 flag byte at offset 13).
pub const TCP_FIN: u8 = 0x01;
pub const TCP_SYN: u8 = 0x02;
pub const TCP_RST: u8 = 0x04;
pub const TCP_PSH: u8 = 0x08;
pub const TCP_ACK: u8 = 0x10;
pub const TCP_URG: u8 = 0x20;

const ETHERNET_HEADER_LEN: usize = 14;
const IPV4_MIN_HEADER_LEN: usize = 20;
const TCP_MIN_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The protocol layer at which decoding gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Ethernet,
    Ip,
    Tcp,
    Udp,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Layer::Ethernet => "ethernet",
            Layer::Ip => "ip",
            Layer::Tcp => "tcp",
            Layer::Udp => "udp",
        };
        write!(f, "{s}")
    }
}

/// Errors produced while decoding a raw frame.
///
/// `UnsupportedEtherType` is not a fault: callers are expected to skip
/// non-IPv4 frames silently. The remaining variants indicate truncated or
/// malformed traffic and are droppable-per-frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("{layer} header truncated: need {needed} bytes, got {got}")]
    TooShort {
        layer: Layer,
        needed: usize,
        got: usize,
    },

    #[error("unsupported ether-type 0x{0:04x}")]
    UnsupportedEtherType(u16),

    #[error("unsupported IP version {0}")]
    UnsupportedIpVersion(u8),

    #[error("IP header length {claimed} exceeds remaining {available} bytes")]
    MalformedIp { claimed: usize, available: usize },

    #[error("TCP data offset claims {claimed} bytes but {available} remain")]
    MalformedTransport { claimed: usize, available: usize },
}

// ---------------------------------------------------------------------------
// Header types
// ---------------------------------------------------------------------------

/// Decoded Ethernet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthernetHeader {
    pub dst_mac: [u8; 6],
    pub src_mac: [u8; 6],
    pub ether_type: u16,
}

impl EthernetHeader {
    /// Render a MAC address as lowercase colon-separated hex.
    pub fn format_mac(mac: &[u8; 6]) -> String {
        format!(
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
        )
    }
}

/// Decoded IPv4 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpHeader {
    /// IP version from the high nibble of the first byte. Always 4 here.
    pub version: u8,
    /// Header length in bytes (IHL × 4, between 20 and 60).
    pub header_len: usize,
    pub ttl: u8,
    /// IP protocol number (6 = TCP, 17 = UDP, 1 = ICMP, ...).
    pub protocol: u8,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
}

/// TCP flag set, one bool per RFC 793 flag bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpFlags {
    pub urg: bool,
    pub ack: bool,
    pub psh: bool,
    pub rst: bool,
    pub syn: bool,
    pub fin: bool,
}

impl TcpFlags {
    /// Unpack the flag byte at TCP header offset 13.
    pub fn from_byte(b: u8) -> Self {
        Self {
            urg: b & TCP_URG != 0,
            ack: b & TCP_ACK != 0,
            psh: b & TCP_PSH != 0,
            rst: b & TCP_RST != 0,
            syn: b & TCP_SYN != 0,
            fin: b & TCP_FIN != 0,
        }
    }
}

/// Decoded TCP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpHeader {
    pub source_port: u16,
    pub dest_port: u16,
    pub sequence: u32,
    pub acknowledgement: u32,
    /// Header length in 32-bit words (4-bit field, 5..=15).
    pub data_offset: u8,
    pub flags: TcpFlags,
}

/// Decoded UDP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdpHeader {
    pub source_port: u16,
    pub dest_port: u16,
    pub length: u16,
    pub checksum: u16,
}

/// Transport-layer header variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportHeader {
    Tcp(TcpHeader),
    Udp(UdpHeader),
    /// IP protocol was neither TCP nor UDP; the payload is the rest of the
    /// IP packet.
    None,
}

impl TransportHeader {
    /// Destination port, or 0 when there is no transport header.
    pub fn dest_port(&self) -> u16 {
        match self {
            TransportHeader::Tcp(tcp) => tcp.dest_port,
            TransportHeader::Udp(udp) => udp.dest_port,
            TransportHeader::None => 0,
        }
    }

    /// Source port, or 0 when there is no transport header.
    pub fn source_port(&self) -> u16 {
        match self {
            TransportHeader::Tcp(tcp) => tcp.source_port,
            TransportHeader::Udp(udp) => udp.source_port,
            TransportHeader::None => 0,
        }
    }

    /// TCP flags, default-empty for UDP and transportless packets.
    pub fn flags(&self) -> TcpFlags {
        match self {
            TransportHeader::Tcp(tcp) => tcp.flags,
            _ => TcpFlags::default(),
        }
    }

    /// Wire-protocol label used in packet records.
    pub fn label(&self) -> &'static str {
        match self {
            TransportHeader::Tcp(_) => "TCP",
            TransportHeader::Udp(_) => "UDP",
            TransportHeader::None => "OTHER",
        }
    }
}

/// A fully decoded frame: all three header layers plus the application
/// payload, borrowed from the input buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedFrame<'a> {
    pub ethernet: EthernetHeader,
    pub ip: IpHeader,
    pub transport: TransportHeader,
    pub payload: &'a [u8],
}

// ---------------------------------------------------------------------------
// Decoders
// ---------------------------------------------------------------------------

/// Decode a raw link-layer frame down to the application payload.
///
/// Returns [`DecodeError::UnsupportedEtherType`] for anything that is not
/// IPv4; callers treat that as "skip this frame", not as a fault.
pub fn decode_frame(frame: &[u8]) -> Result<DecodedFrame<'_>, DecodeError> {
    let (ethernet, ip_packet) = decode_ethernet(frame)?;

    if ethernet.ether_type != ETHERTYPE_IPV4 {
        return Err(DecodeError::UnsupportedEtherType(ethernet.ether_type));
    }

    let (ip, transport_packet) = decode_ipv4(ip_packet)?;

    let (transport, payload) = match ip.protocol {
        IPPROTO_TCP => {
            let (tcp, payload) = decode_tcp(transport_packet)?;
            (TransportHeader::Tcp(tcp), payload)
        }
        IPPROTO_UDP => {
            let (udp, payload) = decode_udp(transport_packet)?;
            (TransportHeader::Udp(udp), payload)
        }
        _ => (TransportHeader::None, transport_packet),
    };

    Ok(DecodedFrame {
        ethernet,
        ip,
        transport,
        payload,
    })
}

/// Decode the 14-byte Ethernet header, returning it and the remainder.
pub fn decode_ethernet(frame: &[u8]) -> Result<(EthernetHeader, &[u8]), DecodeError> {
    if frame.len() < ETHERNET_HEADER_LEN {
        return Err(DecodeError::TooShort {
            layer: Layer::Ethernet,
            needed: ETHERNET_HEADER_LEN,
            got: frame.len(),
        });
    }

    let mut dst_mac = [0u8; 6];
    let mut src_mac = [0u8; 6];
    dst_mac.copy_from_slice(&frame[0..6]);
    src_mac.copy_from_slice(&frame[6..12]);
    let ether_type = u16::from_be_bytes([frame[12], frame[13]]);

    Ok((
        EthernetHeader {
            dst_mac,
            src_mac,
            ether_type,
        },
        &frame[ETHERNET_HEADER_LEN..],
    ))
}

/// Decode an IPv4 header, returning it and the transport-layer remainder.
///
/// The header length comes from the IHL nibble; a claimed length past the
/// end of the captured bytes is [`DecodeError::MalformedIp`], never a
/// panic.
pub fn decode_ipv4(packet: &[u8]) -> Result<(IpHeader, &[u8]), DecodeError> {
    if packet.len() < IPV4_MIN_HEADER_LEN {
        return Err(DecodeError::TooShort {
            layer: Layer::Ip,
            needed: IPV4_MIN_HEADER_LEN,
            got: packet.len(),
        });
    }

    let version = packet[0] >> 4;
    if version != 4 {
        return Err(DecodeError::UnsupportedIpVersion(version));
    }

    let header_len = ((packet[0] & 0x0f) as usize) * 4;
    if header_len < IPV4_MIN_HEADER_LEN || header_len > packet.len() {
        return Err(DecodeError::MalformedIp {
            claimed: header_len,
            available: packet.len(),
        });
    }

    let ip = IpHeader {
        version,
        header_len,
        ttl: packet[8],
        protocol: packet[9],
        source: Ipv4Addr::new(packet[12], packet[13], packet[14], packet[15]),
        destination: Ipv4Addr::new(packet[16], packet[17], packet[18], packet[19]),
    };

    Ok((ip, &packet[header_len..]))
}

/// Decode a TCP header; the payload begins at `data_offset × 4`.
pub fn decode_tcp(packet: &[u8]) -> Result<(TcpHeader, &[u8]), DecodeError> {
    if packet.len() < TCP_MIN_HEADER_LEN {
        return Err(DecodeError::TooShort {
            layer: Layer::Tcp,
            needed: TCP_MIN_HEADER_LEN,
            got: packet.len(),
        });
    }

    let data_offset = packet[12] >> 4;
    let header_len = data_offset as usize * 4;
    if header_len < TCP_MIN_HEADER_LEN || header_len > packet.len() {
        return Err(DecodeError::MalformedTransport {
            claimed: header_len,
            available: packet.len(),
        });
    }

    let tcp = TcpHeader {
        source_port: u16::from_be_bytes([packet[0], packet[1]]),
        dest_port: u16::from_be_bytes([packet[2], packet[3]]),
        sequence: u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]),
        acknowledgement: u32::from_be_bytes([packet[8], packet[9], packet[10], packet[11]]),
        data_offset,
        flags: TcpFlags::from_byte(packet[13]),
    };

    Ok((tcp, &packet[header_len..]))
}

/// Decode the fixed 8-byte UDP header.
pub fn decode_udp(packet: &[u8]) -> Result<(UdpHeader, &[u8]), DecodeError> {
    if packet.len() < UDP_HEADER_LEN {
        return Err(DecodeError::TooShort {
            layer: Layer::Udp,
            needed: UDP_HEADER_LEN,
            got: packet.len(),
        });
    }

    let udp = UdpHeader {
        source_port: u16::from_be_bytes([packet[0], packet[1]]),
        dest_port: u16::from_be_bytes([packet[2], packet[3]]),
        length: u16::from_be_bytes([packet[4], packet[5]]),
        checksum: u16::from_be_bytes([packet[6], packet[7]]),
    };

    Ok((udp, &packet[UDP_HEADER_LEN..]))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ethernet_prefix(ether_type: u16) -> Vec<u8> {
        let mut frame = vec![0u8; ETHERNET_HEADER_LEN];
        frame[0..6].copy_from_slice(&[0xaa, 0xbb, 0xcc, 0x00, 0x01, 0x02]);
        frame[6..12].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]);
        frame[12..14].copy_from_slice(&ether_type.to_be_bytes());
        frame
    }

    fn ipv4_header(protocol: u8, ihl: u8) -> Vec<u8> {
        let mut hdr = vec![0u8; ihl as usize * 4];
        hdr[0] = 0x40 | ihl;
        hdr[8] = 64; // ttl
        hdr[9] = protocol;
        hdr[12..16].copy_from_slice(&[192, 168, 1, 10]);
        hdr[16..20].copy_from_slice(&[10, 0, 0, 1]);
        hdr
    }

    fn tcp_header(src: u16, dst: u16, flags: u8, data_offset: u8) -> Vec<u8> {
        let mut hdr = vec![0u8; data_offset as usize * 4];
        hdr[0..2].copy_from_slice(&src.to_be_bytes());
        hdr[2..4].copy_from_slice(&dst.to_be_bytes());
        hdr[4..8].copy_from_slice(&1000u32.to_be_bytes());
        hdr[8..12].copy_from_slice(&2000u32.to_be_bytes());
        hdr[12] = data_offset << 4;
        hdr[13] = flags;
        hdr
    }

    fn tcp_frame(src: u16, dst: u16, flags: u8, payload: &[u8]) -> Vec<u8> {
        let mut frame = ethernet_prefix(ETHERTYPE_IPV4);
        frame.extend(ipv4_header(IPPROTO_TCP, 5));
        frame.extend(tcp_header(src, dst, flags, 5));
        frame.extend_from_slice(payload);
        frame
    }

    #[test]
    fn test_decode_tcp_frame() {
        let frame = tcp_frame(12345, 80, TCP_SYN | TCP_ACK, b"hello");
        let decoded = decode_frame(&frame).unwrap();

        assert_eq!(decoded.ethernet.ether_type, ETHERTYPE_IPV4);
        assert_eq!(decoded.ip.version, 4);
        assert_eq!(decoded.ip.header_len, 20);
        assert_eq!(decoded.ip.protocol, IPPROTO_TCP);
        assert_eq!(decoded.ip.source, Ipv4Addr::new(192, 168, 1, 10));
        assert_eq!(decoded.ip.destination, Ipv4Addr::new(10, 0, 0, 1));

        match decoded.transport {
            TransportHeader::Tcp(tcp) => {
                assert_eq!(tcp.source_port, 12345);
                assert_eq!(tcp.dest_port, 80);
                assert_eq!(tcp.data_offset, 5);
                assert!(tcp.flags.syn);
                assert!(tcp.flags.ack);
                assert!(!tcp.flags.rst);
            }
            other => panic!("expected TCP, got {other:?}"),
        }
        assert_eq!(decoded.payload, b"hello");
    }

    #[test]
    fn test_decode_udp_frame() {
        let mut frame = ethernet_prefix(ETHERTYPE_IPV4);
        frame.extend(ipv4_header(IPPROTO_UDP, 5));
        let mut udp = vec![0u8; 8];
        udp[0..2].copy_from_slice(&5353u16.to_be_bytes());
        udp[2..4].copy_from_slice(&53u16.to_be_bytes());
        udp[4..6].copy_from_slice(&12u16.to_be_bytes());
        frame.extend(udp);
        frame.extend_from_slice(b"quad");

        let decoded = decode_frame(&frame).unwrap();
        match decoded.transport {
            TransportHeader::Udp(udp) => {
                assert_eq!(udp.source_port, 5353);
                assert_eq!(udp.dest_port, 53);
                assert_eq!(udp.length, 12);
            }
            other => panic!("expected UDP, got {other:?}"),
        }
        assert_eq!(decoded.payload, b"quad");
    }

    #[test]
    fn test_decode_icmp_has_no_transport() {
        let mut frame = ethernet_prefix(ETHERTYPE_IPV4);
        frame.extend(ipv4_header(IPPROTO_ICMP, 5));
        frame.extend_from_slice(&[0x08, 0x00, 0x12, 0x34]);

        let decoded = decode_frame(&frame).unwrap();
        assert_eq!(decoded.transport, TransportHeader::None);
        assert_eq!(decoded.transport.dest_port(), 0);
        assert_eq!(decoded.transport.label(), "OTHER");
        assert_eq!(decoded.payload, &[0x08, 0x00, 0x12, 0x34]);
    }

    #[test]
    fn test_non_ipv4_ethertype_is_skipped() {
        let mut frame = ethernet_prefix(0x0806); // ARP
        frame.extend_from_slice(&[0u8; 28]);
        assert_eq!(
            decode_frame(&frame),
            Err(DecodeError::UnsupportedEtherType(0x0806))
        );
    }

    #[test]
    fn test_truncated_at_each_layer() {
        // Under 14 bytes: Ethernet.
        let err = decode_frame(&[0u8; 10]).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::TooShort {
                layer: Layer::Ethernet,
                ..
            }
        ));

        // Ethernet but under 20 IP bytes.
        let mut frame = ethernet_prefix(ETHERTYPE_IPV4);
        frame.extend_from_slice(&[0x45, 0, 0, 0]);
        let err = decode_frame(&frame).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::TooShort {
                layer: Layer::Ip,
                ..
            }
        ));

        // Full IP header claiming TCP but under 20 TCP bytes.
        let mut frame = ethernet_prefix(ETHERTYPE_IPV4);
        frame.extend(ipv4_header(IPPROTO_TCP, 5));
        frame.extend_from_slice(&[0u8; 8]);
        let err = decode_frame(&frame).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::TooShort {
                layer: Layer::Tcp,
                ..
            }
        ));
    }

    #[test]
    fn test_ip_header_length_out_of_bounds() {
        let mut frame = ethernet_prefix(ETHERTYPE_IPV4);
        let mut hdr = ipv4_header(IPPROTO_TCP, 5);
        hdr[0] = 0x4f; // IHL 15 -> claims 60 bytes, only 20 present
        frame.extend(hdr);

        assert_eq!(
            decode_frame(&frame),
            Err(DecodeError::MalformedIp {
                claimed: 60,
                available: 20
            })
        );
    }

    #[test]
    fn test_ip_version_must_be_4() {
        let mut frame = ethernet_prefix(ETHERTYPE_IPV4);
        let mut hdr = ipv4_header(IPPROTO_TCP, 5);
        hdr[0] = 0x65; // version 6
        frame.extend(hdr);

        assert_eq!(decode_frame(&frame), Err(DecodeError::UnsupportedIpVersion(6)));
    }

    #[test]
    fn test_tcp_data_offset_out_of_bounds() {
        let mut frame = ethernet_prefix(ETHERTYPE_IPV4);
        frame.extend(ipv4_header(IPPROTO_TCP, 5));
        let mut tcp = tcp_header(1, 2, 0, 5);
        tcp[12] = 0xf0; // claims 60-byte header, only 20 present
        frame.extend(tcp);

        assert_eq!(
            decode_frame(&frame),
            Err(DecodeError::MalformedTransport {
                claimed: 60,
                available: 20
            })
        );
    }

    #[test]
    fn test_declared_lengths_match_decoded_lengths() {
        // IHL 6 (24-byte IP header with options), data offset 8 (32-byte TCP).
        let mut frame = ethernet_prefix(ETHERTYPE_IPV4);
        frame.extend(ipv4_header(IPPROTO_TCP, 6));
        frame.extend(tcp_header(4000, 443, TCP_ACK, 8));
        frame.extend_from_slice(b"data");

        let decoded = decode_frame(&frame).unwrap();
        assert_eq!(decoded.ip.header_len, 24);
        match decoded.transport {
            TransportHeader::Tcp(tcp) => assert_eq!(tcp.data_offset, 8),
            other => panic!("expected TCP, got {other:?}"),
        }
        assert_eq!(decoded.payload, b"data");
    }

    #[test]
    fn test_format_mac() {
        let mac = [0xde, 0xad, 0xbe, 0xef, 0x00, 0x01];
        assert_eq!(EthernetHeader::format_mac(&mac), "de:ad:be:ef:00:01");
    }
}
