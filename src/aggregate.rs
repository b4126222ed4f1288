//! # Rolling Aggregation
//!
//! Thread-safe aggregate state for a capture session: cumulative counters,
//! protocol and per-source connection counts, a time-windowed bandwidth
//! sample sequence, and a fixed-capacity ring of the most recent packet
//! records.
//!
//! One [`Mutex`] guards the whole state. The capture loop is the only
//! writer; snapshot readers take the same lock just long enough to copy
//! out a consistent view, so `ingest` is never blocked for longer than a
//! copy. Both retention windows are sliding evictions: the ring evicts
//! FIFO past 1000 records, bandwidth samples expire 60 seconds after
//! capture and are pruned lazily on ingest and on snapshot.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::record::{unix_now, PacketRecord};

/// Retained packet records (FIFO eviction past this).
pub const RING_CAPACITY: usize = 1000;

/// Bandwidth sample retention window in seconds.
pub const BANDWIDTH_WINDOW_SECS: f64 = 60.0;

/// Record count served by [`Aggregator::recent`] when the caller passes 0.
pub const DEFAULT_RECENT_COUNT: usize = 50;

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// A point-in-time, internally consistent copy of the aggregate counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total_packets: u64,
    pub total_bytes: u64,
    /// Packets that carried at least one finding (per packet, not per
    /// finding).
    pub threats_detected: u64,
    /// Frames dropped on decode errors. Non-IPv4 frames are skipped
    /// without counting and do not appear here.
    pub frames_dropped: u64,
    /// Distinct `"source:port"` keys observed.
    pub active_connections: usize,
    /// Bytes per second over the trailing window: retained sample bytes
    /// divided by the full window length.
    pub bandwidth_bps: f64,
    /// Top 10 protocols by descending count; ties keep first-seen order.
    pub top_protocols: Vec<(String, u64)>,
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ProtocolCount {
    count: u64,
    /// Insertion index, used as the tie-break when sorting by count.
    first_seen: u64,
}

#[derive(Debug)]
struct AggregateState {
    total_packets: u64,
    total_bytes: u64,
    threats_detected: u64,
    frames_dropped: u64,
    protocols: HashMap<String, ProtocolCount>,
    next_protocol_index: u64,
    connections: HashMap<String, u64>,
    /// (timestamp, frame bytes) samples inside the trailing window.
    bandwidth: VecDeque<(f64, u64)>,
    ring: VecDeque<PacketRecord>,
}

impl AggregateState {
    fn new(ring_capacity: usize) -> Self {
        Self {
            total_packets: 0,
            total_bytes: 0,
            threats_detected: 0,
            frames_dropped: 0,
            protocols: HashMap::new(),
            next_protocol_index: 0,
            connections: HashMap::new(),
            bandwidth: VecDeque::new(),
            ring: VecDeque::with_capacity(ring_capacity),
        }
    }

    /// Drop bandwidth samples older than the window, measured from `now`.
    fn prune_bandwidth(&mut self, now: f64, window: f64) {
        while let Some(&(ts, _)) = self.bandwidth.front() {
            if now - ts > window {
                self.bandwidth.pop_front();
            } else {
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// Mutex-guarded aggregate state shared between the capture loop and any
/// number of snapshot readers.
pub struct Aggregator {
    state: Mutex<AggregateState>,
    ring_capacity: usize,
    window_secs: f64,
}

impl Aggregator {
    /// Create an aggregator with the standard retention bounds
    /// (1000 records, 60 second bandwidth window).
    pub fn new() -> Self {
        Self::with_bounds(RING_CAPACITY, BANDWIDTH_WINDOW_SECS)
    }

    /// Create an aggregator with custom retention bounds. Mostly useful in
    /// tests; production sessions use [`Aggregator::new`].
    pub fn with_bounds(ring_capacity: usize, window_secs: f64) -> Self {
        Self {
            state: Mutex::new(AggregateState::new(ring_capacity)),
            ring_capacity,
            window_secs,
        }
    }

    /// Consume one packet record into the aggregate state.
    ///
    /// The record's own capture timestamp is the bandwidth sample time, so
    /// ingestion is deterministic with respect to the record stream.
    pub fn ingest(&self, record: PacketRecord) {
        let mut state = self.state.lock().unwrap();

        state.total_packets += 1;
        state.total_bytes += record.size as u64;
        if record.has_threats() {
            state.threats_detected += 1;
        }

        if !state.protocols.contains_key(&record.protocol) {
            let first_seen = state.next_protocol_index;
            state.next_protocol_index += 1;
            state
                .protocols
                .insert(record.protocol.clone(), ProtocolCount { count: 0, first_seen });
        }
        if let Some(entry) = state.protocols.get_mut(&record.protocol) {
            entry.count += 1;
        }

        *state.connections.entry(record.connection_key()).or_insert(0) += 1;

        state.bandwidth.push_back((record.ts, record.size as u64));
        state.prune_bandwidth(record.ts, self.window_secs);

        if state.ring.len() >= self.ring_capacity {
            state.ring.pop_front();
        }
        state.ring.push_back(record);
    }

    /// Count a frame dropped on a decode error.
    pub fn record_dropped_frame(&self) {
        self.state.lock().unwrap().frames_dropped += 1;
    }

    /// Snapshot at the current wall clock.
    pub fn snapshot(&self) -> StatsSnapshot {
        self.snapshot_at(unix_now())
    }

    /// Snapshot at an explicit time. Samples older than the window
    /// relative to `now` are pruned before the bandwidth figure is
    /// computed.
    pub fn snapshot_at(&self, now: f64) -> StatsSnapshot {
        let mut state = self.state.lock().unwrap();
        state.prune_bandwidth(now, self.window_secs);

        let retained: u64 = state.bandwidth.iter().map(|(_, bytes)| bytes).sum();
        let bandwidth_bps = retained as f64 / self.window_secs;

        let mut protocols: Vec<(&String, &ProtocolCount)> = state.protocols.iter().collect();
        protocols.sort_by(|a, b| {
            b.1.count
                .cmp(&a.1.count)
                .then(a.1.first_seen.cmp(&b.1.first_seen))
        });
        let top_protocols = protocols
            .into_iter()
            .take(10)
            .map(|(label, pc)| (label.clone(), pc.count))
            .collect();

        StatsSnapshot {
            total_packets: state.total_packets,
            total_bytes: state.total_bytes,
            threats_detected: state.threats_detected,
            frames_dropped: state.frames_dropped,
            active_connections: state.connections.len(),
            bandwidth_bps,
            top_protocols,
        }
    }

    /// The most recent `count` records in arrival order.
    ///
    /// `count` = 0 is clamped to the default of 50; anything above the
    /// ring capacity is clamped down to it. Never fails.
    pub fn recent(&self, count: usize) -> Vec<PacketRecord> {
        let count = if count == 0 {
            DEFAULT_RECENT_COUNT
        } else {
            count.min(self.ring_capacity)
        };

        let state = self.state.lock().unwrap();
        let skip = state.ring.len().saturating_sub(count);
        state.ring.iter().skip(skip).cloned().collect()
    }

    /// All retained records in arrival order (export path).
    pub fn retained(&self) -> Vec<PacketRecord> {
        self.state.lock().unwrap().ring.iter().cloned().collect()
    }

    /// Number of records currently in the ring.
    pub fn retained_len(&self) -> usize {
        self.state.lock().unwrap().ring.len()
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
