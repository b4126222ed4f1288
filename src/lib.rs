//! # packetscope
//!
//! Passive network traffic analyzer: captures raw link-layer frames,
//! decodes them layer by layer (Ethernet → IPv4 → TCP/UDP), classifies the
//! application protocol, evaluates each packet against a fixed threat
//! signature set, and maintains rolling statistics over bounded retention
//! windows.
//!
//! ## Architecture
//!
//! Data flows one direction through the pipeline:
//!
//! ```text
//! raw frame -> decode -> classify -> threat eval -> PacketRecord -> aggregate
//!                                                                      |
//!                                        snapshot / recent / export <--+
//! ```
//!
//! - **decode**: pure header decoding, no I/O
//! - **classify**: well-known-port protocol labeling
//! - **threat**: content signatures plus structural flag/port checks
//! - **record**: immutable per-packet records with monotonic ids
//! - **aggregate**: mutex-guarded counters, 60 s bandwidth window,
//!   1000-record ring
//! - **capture**: the blocking receive loop and its start/stop state
//!   machine
//! - **export**: the serializable report handed to export collaborators
//!
//! The [`Analyzer`] wires these together: exactly one capture loop writes
//! into the aggregator while any number of readers poll
//! [`Analyzer::statistics`] and [`Analyzer::recent_packets`] concurrently.
//!
//! ## Example
//!
//! ```no_run
//! use packetscope::Analyzer;
//! use std::time::Duration;
//!
//! let analyzer = Analyzer::new();
//! let session = analyzer.start_capture("eth0", Some(Duration::from_secs(30)))?;
//!
//! let stats = analyzer.statistics();
//! println!("{} packets, {} threats", stats.total_packets, stats.threats_detected);
//!
//! analyzer.stop();
//! session.join().expect("capture thread panicked");
//! # Ok::<(), packetscope::CaptureError>(())
//! ```

pub mod aggregate;
pub mod capture;
pub mod classify;
pub mod decode;
pub mod export;
pub mod record;
pub mod threat;

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub use aggregate::{Aggregator, StatsSnapshot};
pub use capture::{CaptureError, CaptureState, PacketSource, PcapSource};
pub use decode::DecodeError;
pub use export::CaptureReport;
pub use record::PacketRecord;
pub use threat::{Severity, ThreatFinding, ThreatKind};

use capture::CaptureLoop;
use classify::classify;
use decode::decode_frame;
use record::RecordBuilder;
use threat::SignatureSet;

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// The analyzer facade: one signature set, one record builder, one
/// aggregator, one capture loop.
///
/// Construct once and share; every method takes `&self`. The capture loop
/// runs on a dedicated thread and is the sole writer into the aggregator,
/// while readers snapshot on their own cadence.
pub struct Analyzer {
    signatures: Arc<SignatureSet>,
    builder: Arc<RecordBuilder>,
    aggregator: Arc<Aggregator>,
    capture: Arc<CaptureLoop>,
}

impl Analyzer {
    /// Create an analyzer with the built-in signature set and standard
    /// retention bounds.
    pub fn new() -> Self {
        Self {
            signatures: Arc::new(SignatureSet::builtin()),
            builder: Arc::new(RecordBuilder::new()),
            aggregator: Arc::new(Aggregator::new()),
            capture: Arc::new(CaptureLoop::new()),
        }
    }

    /// Run one frame through the full pipeline.
    ///
    /// Returns the built record, or `None` when the frame was skipped
    /// (non-IPv4) or dropped (decode failure, counted in the statistics).
    /// The record is also ingested into the aggregate state.
    pub fn process_frame(&self, frame: &[u8]) -> Option<PacketRecord> {
        run_pipeline(&self.signatures, &self.builder, &self.aggregator, frame)
    }

    /// Open a live capture on `interface` and start the loop on a
    /// dedicated thread.
    ///
    /// Fails with [`CaptureError::PermissionDenied`] or
    /// [`CaptureError::SourceUnavailable`] when the source cannot be
    /// opened, and [`CaptureError::AlreadyRunning`] when a session is
    /// active; in every failure case no session state is created. With a
    /// `duration`, the session self-terminates after the bound; `stop()`
    /// still works at any time.
    pub fn start_capture(
        &self,
        interface: &str,
        duration: Option<Duration>,
    ) -> Result<JoinHandle<()>, CaptureError> {
        self.capture.begin()?;
        let source = match PcapSource::open(interface) {
            Ok(source) => source,
            Err(e) => {
                self.capture.release();
                return Err(e);
            }
        };
        tracing::info!(interface, "capture session starting");
        Ok(self.spawn_claimed(source, duration))
    }

    /// Start the loop over a caller-supplied [`PacketSource`]. Used by
    /// tests and replay-style sources.
    pub fn start_capture_with_source<S: PacketSource + 'static>(
        &self,
        source: S,
        duration: Option<Duration>,
    ) -> Result<JoinHandle<()>, CaptureError> {
        self.capture.begin()?;
        Ok(self.spawn_claimed(source, duration))
    }

    fn spawn_claimed<S: PacketSource + 'static>(
        &self,
        source: S,
        duration: Option<Duration>,
    ) -> JoinHandle<()> {
        let signatures = Arc::clone(&self.signatures);
        let builder = Arc::clone(&self.builder);
        let aggregator = Arc::clone(&self.aggregator);
        self.capture.spawn(source, duration, move |frame| {
            run_pipeline(&signatures, &builder, &aggregator, frame);
        })
    }

    /// Request the running capture loop to stop. No-op when idle.
    pub fn stop(&self) {
        self.capture.stop();
    }

    /// True while a capture session is active.
    pub fn is_capturing(&self) -> bool {
        self.capture.is_running()
    }

    /// Point-in-time statistics snapshot. Safe to call from any thread
    /// while the capture loop runs.
    pub fn statistics(&self) -> StatsSnapshot {
        self.aggregator.snapshot()
    }

    /// The most recent `count` records (0 = default of 50, capped at the
    /// ring capacity).
    pub fn recent_packets(&self, count: usize) -> Vec<PacketRecord> {
        self.aggregator.recent(count)
    }

    /// Build the on-demand export structure.
    pub fn export(&self) -> CaptureReport {
        CaptureReport::from_aggregator(&self.aggregator)
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// The decode → classify → evaluate → build → ingest pipeline for one
/// frame. Free function so the capture thread's sink can run it without
/// borrowing the `Analyzer` itself.
fn run_pipeline(
    signatures: &SignatureSet,
    builder: &RecordBuilder,
    aggregator: &Aggregator,
    frame: &[u8],
) -> Option<PacketRecord> {
    let decoded = match decode_frame(frame) {
        Ok(decoded) => decoded,
        // Non-IPv4 traffic is out of scope: skip silently, uncounted.
        Err(DecodeError::UnsupportedEtherType(_)) => return None,
        Err(e) => {
            tracing::debug!(error = %e, len = frame.len(), "dropping undecodable frame");
            aggregator.record_dropped_frame();
            return None;
        }
    };

    let protocol = classify(decoded.ip.protocol, &decoded.transport);
    let threats = signatures.evaluate(&decoded.transport, decoded.payload);
    let record = builder.build(frame.len(), &decoded, protocol, threats);
    aggregator.ingest(record.clone());
    Some(record)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
