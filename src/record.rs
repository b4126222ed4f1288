//! # Packet Records
//!
//! The immutable, serializable record produced for every successfully
//! decoded packet, and the builder that stamps records with process-wide
//! monotonic sequence ids and capture timestamps. Records are built once
//! and never mutated afterwards.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::decode::{DecodedFrame, TcpFlags};
use crate::threat::{max_severity, Severity, ThreatFinding};

/// Number of payload bytes carried in the record's hex preview. Signature
/// matching is bounded to the same window.
pub const PAYLOAD_PREVIEW_LEN: usize = 100;

/// Current Unix time as fractional seconds.
pub(crate) fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs_f64()
}

// ---------------------------------------------------------------------------
// PacketRecord
// ---------------------------------------------------------------------------

/// One analyzed packet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketRecord {
    /// Strictly increasing per process lifetime.
    pub id: u64,
    /// Capture timestamp, Unix epoch seconds.
    pub ts: f64,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    /// Application-protocol label from the classifier.
    pub protocol: String,
    /// "TCP", "UDP", or "OTHER".
    pub transport_protocol: String,
    /// Total frame size in bytes as captured.
    pub size: usize,
    pub threats: Vec<ThreatFinding>,
    /// Maximum severity across `threats`; serialized as `"None"` when the
    /// list is empty.
    #[serde(with = "severity_opt")]
    pub threat_level: Option<Severity>,
    pub source_port: u16,
    pub dest_port: u16,
    /// TCP flag set; all-false for non-TCP packets.
    pub flags: TcpFlags,
    /// Lowercase hex of the first [`PAYLOAD_PREVIEW_LEN`] payload bytes.
    pub payload_preview: String,
}

impl PacketRecord {
    /// True if the evaluator flagged anything on this packet.
    pub fn has_threats(&self) -> bool {
        !self.threats.is_empty()
    }

    /// The `"source:port"` connection key used for per-source counting.
    pub fn connection_key(&self) -> String {
        format!("{}:{}", self.source, self.source_port)
    }
}

/// Serialize `Option<Severity>` with the absent case spelled `"None"`,
/// matching the export format consumers already parse.
mod severity_opt {
    use super::Severity;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<Severity>, ser: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(severity) => severity.serialize(ser),
            None => "None".serialize(ser),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Severity>, D::Error> {
        let s = String::deserialize(de)?;
        match s.as_str() {
            "None" => Ok(None),
            "Low" => Ok(Some(Severity::Low)),
            "Medium" => Ok(Some(Severity::Medium)),
            "High" => Ok(Some(Severity::High)),
            "Critical" => Ok(Some(Severity::Critical)),
            other => Err(serde::de::Error::custom(format!(
                "unknown severity {other:?}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordBuilder
// ---------------------------------------------------------------------------

/// Assembles decoder, classifier, and evaluator outputs into records.
///
/// Owns the sequence counter; ids stay monotonic even if a future caller
/// builds records from more than one thread.
#[derive(Debug)]
pub struct RecordBuilder {
    next_id: AtomicU64,
}

impl RecordBuilder {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }

    /// Build a record. Sequence id and timestamp are captured here, exactly
    /// once per packet.
    pub fn build(
        &self,
        frame_len: usize,
        decoded: &DecodedFrame<'_>,
        protocol: String,
        threats: Vec<ThreatFinding>,
    ) -> PacketRecord {
        let threat_level = max_severity(&threats);

        PacketRecord {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            ts: unix_now(),
            source: decoded.ip.source,
            destination: decoded.ip.destination,
            protocol,
            transport_protocol: decoded.transport.label().to_string(),
            size: frame_len,
            threats,
            threat_level,
            source_port: decoded.transport.source_port(),
            dest_port: decoded.transport.dest_port(),
            flags: decoded.transport.flags(),
            payload_preview: hex_preview(decoded.payload),
        }
    }
}

impl Default for RecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn hex_preview(payload: &[u8]) -> String {
    payload
        .iter()
        .take(PAYLOAD_PREVIEW_LEN)
        .map(|b| format!("{b:02x}"))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
