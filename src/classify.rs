//! # Application Protocol Classification
//!
//! Maps transport-layer information to an application-protocol label using
//! a fixed well-known-port table. This is a heuristic by destination port
//! only — no payload inspection — and a total function: every packet gets
//! some label.

use crate::decode::{TransportHeader, IPPROTO_ICMP};

/// Well-known destination ports and their protocol labels.
const WELL_KNOWN_PORTS: &[(u16, &str)] = &[
    (20, "FTP-DATA"),
    (21, "FTP"),
    (22, "SSH"),
    (23, "TELNET"),
    (25, "SMTP"),
    (53, "DNS"),
    (67, "DHCP"),
    (68, "DHCP"),
    (80, "HTTP"),
    (110, "POP3"),
    (143, "IMAP"),
    (443, "HTTPS"),
    (993, "IMAPS"),
    (995, "POP3S"),
];

/// Classify a packet's application protocol.
///
/// Packets without a transport header are labeled `ICMP` when the IP
/// protocol is 1, otherwise `IP/<protocol-number>`. TCP and UDP packets
/// whose destination port is not in the well-known table fall back to
/// `TCP/<port>` / `UDP/<port>`.
pub fn classify(ip_protocol: u8, transport: &TransportHeader) -> String {
    let port = match transport {
        TransportHeader::Tcp(tcp) => tcp.dest_port,
        TransportHeader::Udp(udp) => udp.dest_port,
        TransportHeader::None => {
            return if ip_protocol == IPPROTO_ICMP {
                "ICMP".to_string()
            } else {
                format!("IP/{ip_protocol}")
            };
        }
    };

    if let Some((_, label)) = WELL_KNOWN_PORTS.iter().find(|(p, _)| *p == port) {
        return (*label).to_string();
    }

    match transport {
        TransportHeader::Tcp(_) => format!("TCP/{port}"),
        _ => format!("UDP/{port}"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
