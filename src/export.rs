//! # Capture Export
//!
//! The serializable structure handed to export collaborators: capture
//! metadata, a statistics snapshot, and the retained packet records in
//! arrival order. Field naming and file handling are the consumer's
//! concern; this module only builds the structure and offers a JSON
//! convenience.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregator, StatsSnapshot};
use crate::record::PacketRecord;

/// Metadata block at the head of a report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureInfo {
    /// RFC 3339 wall-clock time the report was generated.
    pub generated_at: String,
    /// Number of records in this report (the retained window, not the
    /// session-lifetime packet counter — that lives in `statistics`).
    pub total_packets: usize,
    pub statistics: StatsSnapshot,
}

/// A complete on-demand export of the current session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureReport {
    pub capture_info: CaptureInfo,
    pub packets: Vec<PacketRecord>,
}

impl CaptureReport {
    /// Build a report from the aggregator's current state.
    pub fn from_aggregator(aggregator: &Aggregator) -> Self {
        let packets = aggregator.retained();
        Self {
            capture_info: CaptureInfo {
                generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                total_packets: packets.len(),
                statistics: aggregator.snapshot(),
            },
            packets,
        }
    }

    /// Serialize to indented JSON.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
