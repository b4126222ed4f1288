//! # Threat Evaluation
//!
//! Applies a fixed, compile-time signature table to packet payloads and
//! structural header checks to transport flags and ports. Every signature
//! is evaluated on every packet — detections are independent and not
//! short-circuited, so one packet can (and regularly does) carry several
//! findings of the same kind.
//!
//! Content signatures are regex alternations compiled once into a single
//! case-insensitive [`RegexSet`] and run against the lossy-UTF-8 decoding
//! of the bounded payload preview, never against unbounded input.

use std::fmt;

use regex::RegexSet;
use serde::{Deserialize, Serialize};

use crate::decode::TransportHeader;
use crate::record::PAYLOAD_PREVIEW_LEN;

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Ordered threat severity. The absence of findings is represented by
/// `Option<Severity>` = `None` on the packet record, which serializes as
/// the literal string `"None"`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Findings
// ---------------------------------------------------------------------------

/// The closed set of detection kinds this evaluator can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatKind {
    PortScan,
    DosAttack,
    SuspiciousDns,
    UnencryptedFtp,
    MalwareC2,
    BackdoorPort,
}

/// A single detection against one packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatFinding {
    #[serde(rename = "type")]
    pub kind: ThreatKind,
    pub description: String,
    pub severity: Severity,
}

/// Derive the maximum severity across findings, `None` when empty.
///
/// `Severity` is totally ordered, so this is a stable max: equal-severity
/// findings cannot change the result regardless of their order.
pub fn max_severity(findings: &[ThreatFinding]) -> Option<Severity> {
    findings.iter().map(|f| f.severity).max()
}

// ---------------------------------------------------------------------------
// Signature table
// ---------------------------------------------------------------------------

/// Destination ports commonly used by backdoors and C2 implants.
pub const BACKDOOR_PORTS: [u16; 4] = [1337, 31337, 4444, 5555];

struct SignatureDef {
    kind: ThreatKind,
    pattern: &'static str,
    description: &'static str,
    severity: Severity,
}

/// The built-in content signature table. Order is evaluation order and is
/// part of the observable contract (findings keep it).
const SIGNATURES: &[SignatureDef] = &[
    SignatureDef {
        kind: ThreatKind::PortScan,
        pattern: r"SYN.*RST|SYN.*FIN",
        description: "Port scan attempt detected",
        severity: Severity::High,
    },
    SignatureDef {
        kind: ThreatKind::DosAttack,
        pattern: r"ICMP.*flood|UDP.*flood",
        description: "Potential DoS attack",
        severity: Severity::High,
    },
    SignatureDef {
        kind: ThreatKind::SuspiciousDns,
        pattern: r"DNS.*[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}",
        description: "Suspicious DNS query to IP address",
        severity: Severity::Medium,
    },
    SignatureDef {
        kind: ThreatKind::UnencryptedFtp,
        pattern: r"FTP.*USER|FTP.*PASS",
        description: "Unencrypted FTP credentials",
        severity: Severity::Medium,
    },
    SignatureDef {
        kind: ThreatKind::MalwareC2,
        pattern: r"POST.*/[a-f0-9]{32}|GET.*/[a-f0-9]{32}",
        description: "Potential malware C2 communication",
        severity: Severity::High,
    },
];

// ---------------------------------------------------------------------------
// SignatureSet
// ---------------------------------------------------------------------------

/// Compiled signature set plus the structural detections.
///
/// Compile once at startup, evaluate per packet. The regex pass and the
/// structural passes are independent: a SYN+RST packet whose payload also
/// spells out "SYN ... RST" yields two `PortScan` findings, and that
/// duplication is intentional (distinct detection paths, not deduplicated).
pub struct SignatureSet {
    set: RegexSet,
}

impl SignatureSet {
    /// Compile the built-in signature table.
    pub fn builtin() -> Self {
        let set = regex::RegexSetBuilder::new(SIGNATURES.iter().map(|s| s.pattern))
            .case_insensitive(true)
            .build()
            .expect("built-in signature table must compile");
        Self { set }
    }

    /// Evaluate one packet: content signatures against the payload, then
    /// the SYN+RST structural check, then the backdoor-port check.
    ///
    /// Returns findings in evaluation order, possibly empty. Never fails —
    /// invalid UTF-8 in the payload is replaced, not rejected.
    pub fn evaluate(&self, transport: &TransportHeader, payload: &[u8]) -> Vec<ThreatFinding> {
        let mut findings = Vec::new();

        // Content signatures, bounded to the preview window.
        let bounded = &payload[..payload.len().min(PAYLOAD_PREVIEW_LEN)];
        let text = String::from_utf8_lossy(bounded);
        for idx in self.set.matches(&text) {
            let sig = &SIGNATURES[idx];
            findings.push(ThreatFinding {
                kind: sig.kind,
                description: sig.description.to_string(),
                severity: sig.severity,
            });
        }

        // Structural check: simultaneous SYN+RST is a scan fingerprint on
        // its own, independent of payload text.
        if let TransportHeader::Tcp(tcp) = transport {
            if tcp.flags.syn && tcp.flags.rst {
                findings.push(ThreatFinding {
                    kind: ThreatKind::PortScan,
                    description: "SYN-RST pattern indicates port scanning".to_string(),
                    severity: Severity::High,
                });
            }
        }

        // Backdoor-port check.
        let dest_port = transport.dest_port();
        if BACKDOOR_PORTS.contains(&dest_port) {
            findings.push(ThreatFinding {
                kind: ThreatKind::BackdoorPort,
                description: format!("Connection to suspicious port {dest_port}"),
                severity: Severity::High,
            });
        }

        findings
    }
}

impl Default for SignatureSet {
    fn default() -> Self {
        Self::builtin()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{TcpFlags, TcpHeader, UdpHeader};

    fn tcp_transport(dest_port: u16, flags: TcpFlags) -> TransportHeader {
        TransportHeader::Tcp(TcpHeader {
            source_port: 40000,
            dest_port,
            sequence: 0,
            acknowledgement: 0,
            data_offset: 5,
            flags,
        })
    }

    #[test]
    fn test_clean_payload_has_no_findings() {
        let set = SignatureSet::builtin();
        let findings = set.evaluate(
            &tcp_transport(80, TcpFlags::default()),
            b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n",
        );
        assert!(findings.is_empty());
        assert_eq!(max_severity(&findings), None);
    }

    #[test]
    fn test_syn_rst_flags_always_flag_port_scan() {
        let set = SignatureSet::builtin();
        let flags = TcpFlags {
            syn: true,
            rst: true,
            ..TcpFlags::default()
        };
        let findings = set.evaluate(&tcp_transport(8080, flags), b"");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, ThreatKind::PortScan);
        assert_eq!(findings[0].severity, Severity::High);
    }

    #[test]
    fn test_syn_rst_text_and_flags_both_fire() {
        // The textual signature and the structural check are independent
        // paths; both findings are kept.
        let set = SignatureSet::builtin();
        let flags = TcpFlags {
            syn: true,
            rst: true,
            ..TcpFlags::default()
        };
        let findings = set.evaluate(&tcp_transport(8080, flags), b"observed SYN then RST here");
        let scans = findings
            .iter()
            .filter(|f| f.kind == ThreatKind::PortScan)
            .count();
        assert_eq!(scans, 2);
    }

    #[test]
    fn test_backdoor_ports() {
        let set = SignatureSet::builtin();
        for port in BACKDOOR_PORTS {
            let findings = set.evaluate(&tcp_transport(port, TcpFlags::default()), b"");
            assert_eq!(findings.len(), 1, "port {port}");
            assert_eq!(findings[0].kind, ThreatKind::BackdoorPort);
            assert!(findings[0].description.contains(&port.to_string()));
        }

        // Applies to UDP destinations too.
        let udp = TransportHeader::Udp(UdpHeader {
            source_port: 1,
            dest_port: 31337,
            length: 8,
            checksum: 0,
        });
        assert_eq!(set.evaluate(&udp, b"").len(), 1);
    }

    #[test]
    fn test_malware_c2_hex_token_path() {
        let set = SignatureSet::builtin();
        let payload = b"GET /d41d8cd98f00b204e9800998ecf8427e HTTP/1.1";
        let findings = set.evaluate(&tcp_transport(80, TcpFlags::default()), payload);
        assert!(findings.iter().any(|f| f.kind == ThreatKind::MalwareC2));

        // 31 hex chars is not a token.
        let short = b"GET /d41d8cd98f00b204e9800998ecf8427 HTTP/1.1";
        let findings = set.evaluate(&tcp_transport(80, TcpFlags::default()), short);
        assert!(!findings.iter().any(|f| f.kind == ThreatKind::MalwareC2));
    }

    #[test]
    fn test_ftp_credentials_case_insensitive() {
        let set = SignatureSet::builtin();
        let findings = set.evaluate(&tcp_transport(21, TcpFlags::default()), b"ftp session user alice");
        assert!(findings.iter().any(|f| f.kind == ThreatKind::UnencryptedFtp));
        assert_eq!(max_severity(&findings), Some(Severity::Medium));
    }

    #[test]
    fn test_suspicious_dns_dotted_quad() {
        let set = SignatureSet::builtin();
        let findings = set.evaluate(
            &tcp_transport(53, TcpFlags::default()),
            b"DNS query for 10.1.2.3",
        );
        assert!(findings.iter().any(|f| f.kind == ThreatKind::SuspiciousDns));
    }

    #[test]
    fn test_matching_is_bounded_to_preview() {
        // A signature entirely past the preview window must not match.
        let set = SignatureSet::builtin();
        let mut payload = vec![b'x'; PAYLOAD_PREVIEW_LEN];
        payload.extend_from_slice(b"FTP USER root");
        let findings = set.evaluate(&tcp_transport(21, TcpFlags::default()), &payload);
        assert!(findings.is_empty());
    }

    #[test]
    fn test_invalid_utf8_never_fails() {
        let set = SignatureSet::builtin();
        let payload = [0xff, 0xfe, 0x80, b'S', b'Y', b'N', 0xff];
        let findings = set.evaluate(&tcp_transport(9000, TcpFlags::default()), &payload);
        assert!(findings.is_empty());
    }

    #[test]
    fn test_max_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);

        let findings = vec![
            ThreatFinding {
                kind: ThreatKind::UnencryptedFtp,
                description: String::new(),
                severity: Severity::Medium,
            },
            ThreatFinding {
                kind: ThreatKind::PortScan,
                description: String::new(),
                severity: Severity::High,
            },
        ];
        assert_eq!(max_severity(&findings), Some(Severity::High));
    }
}
