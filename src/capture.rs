//! # Packet Capture
//!
//! The capture source seam and the capture loop state machine.
//!
//! [`PacketSource`] abstracts "something that hands us raw frames" so the
//! loop can be driven by a live [`PcapSource`] in production and by
//! scripted sources in tests. The loop itself is deliberately dumb: pull a
//! frame, hand it to the pipeline sink, check the stop flag and the
//! optional duration bound, repeat. Receive timeouts just loop, which is
//! also what bounds stop latency — the loop re-checks its state at least
//! once per timeout interval.
//!
//! State machine: `Idle → Running → Stopping → Idle`. `stop()` may be
//! called from any thread and is a no-op when idle.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use pcap::{Active, Capture, Device};

/// Read timeout handed to the capture handle, in milliseconds. This is the
/// worst-case latency for a `stop()` request to take effect.
pub const RECV_TIMEOUT_MS: i32 = 1000;

const SNAPLEN: i32 = 65535;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Session-level capture failures. All of these are terminal for the
/// invocation that produced them; none are retried automatically.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("permission denied opening capture source {0:?} (need root or CAP_NET_RAW)")]
    PermissionDenied(String),

    #[error("capture source {0:?} unavailable: {1}")]
    SourceUnavailable(String, String),

    #[error("capture loop is already running")]
    AlreadyRunning,
}

/// A non-fatal receive failure. The loop logs these and keeps going.
#[derive(Debug, thiserror::Error)]
#[error("capture source error: {0}")]
pub struct SourceError(pub String);

// ---------------------------------------------------------------------------
// PacketSource
// ---------------------------------------------------------------------------

/// One receive attempt's outcome.
#[derive(Debug)]
pub enum Recv {
    /// A raw link-layer frame.
    Frame(Vec<u8>),
    /// The read timeout elapsed with no traffic. Not an error.
    Timeout,
}

/// A source of raw frames.
///
/// `recv` blocks up to the source's read timeout. Errors are per-attempt
/// and recoverable; a source that can fail terminally should surface that
/// at open time instead.
pub trait PacketSource: Send {
    fn recv(&mut self) -> Result<Recv, SourceError>;
}

// ---------------------------------------------------------------------------
// PcapSource
// ---------------------------------------------------------------------------

/// Live capture handle on a network interface, promiscuous, with a bounded
/// read timeout.
pub struct PcapSource {
    capture: Capture<Active>,
}

impl PcapSource {
    /// Open a live capture on the named interface.
    ///
    /// Failures map onto the two session-level causes the caller can act
    /// on: missing privileges vs. an unusable source.
    pub fn open(interface: &str) -> Result<Self, CaptureError> {
        let capture = Capture::from_device(interface)
            .and_then(|d| {
                d.promisc(true)
                    .snaplen(SNAPLEN)
                    .timeout(RECV_TIMEOUT_MS)
                    .open()
            })
            .map_err(|e| open_error(interface, e))?;

        Ok(Self { capture })
    }
}

impl PacketSource for PcapSource {
    fn recv(&mut self) -> Result<Recv, SourceError> {
        match self.capture.next_packet() {
            Ok(packet) => Ok(Recv::Frame(packet.data.to_vec())),
            Err(pcap::Error::TimeoutExpired) => Ok(Recv::Timeout),
            Err(e) => Err(SourceError(e.to_string())),
        }
    }
}

fn open_error(interface: &str, err: pcap::Error) -> CaptureError {
    if let pcap::Error::IoError(kind) = err {
        if kind == std::io::ErrorKind::PermissionDenied {
            return CaptureError::PermissionDenied(interface.to_string());
        }
    }
    let msg = err.to_string();
    if msg.to_lowercase().contains("permission") {
        CaptureError::PermissionDenied(interface.to_string())
    } else {
        CaptureError::SourceUnavailable(interface.to_string(), msg)
    }
}

/// Names of capture-capable interfaces on this host.
pub fn available_interfaces() -> Vec<String> {
    Device::list()
        .unwrap_or_default()
        .into_iter()
        .map(|d| d.name)
        .collect()
}

// ---------------------------------------------------------------------------
// CaptureLoop
// ---------------------------------------------------------------------------

const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOPPING: u8 = 2;

/// Externally observable loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Running,
    Stopping,
}

/// The capture loop's shared control block.
///
/// The loop body runs on whichever thread calls [`CaptureLoop::run`] (or
/// the thread spawned by [`CaptureLoop::spawn`]); `stop()` flips the state
/// from any other thread and is observed before the next receive.
pub struct CaptureLoop {
    state: AtomicU8,
}

impl CaptureLoop {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_IDLE),
        }
    }

    pub fn state(&self) -> CaptureState {
        match self.state.load(Ordering::SeqCst) {
            STATE_RUNNING => CaptureState::Running,
            STATE_STOPPING => CaptureState::Stopping,
            _ => CaptureState::Idle,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == CaptureState::Running
    }

    /// Claim the loop: `Idle → Running`. Fails if a session is active.
    ///
    /// Callers claim before opening the source so that a failed open can
    /// release the claim without ever having started a session.
    pub fn begin(&self) -> Result<(), CaptureError> {
        self.state
            .compare_exchange(STATE_IDLE, STATE_RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| CaptureError::AlreadyRunning)?;
        Ok(())
    }

    /// Release a claim made with [`begin`](Self::begin) without running
    /// (open failed). No-op when idle.
    pub fn release(&self) {
        self.state.store(STATE_IDLE, Ordering::SeqCst);
    }

    /// Request `Running → Stopping`. The loop observes the request after
    /// finishing its current frame (or its current receive timeout).
    /// Calling this while idle is a no-op.
    pub fn stop(&self) {
        let _ = self.state.compare_exchange(
            STATE_RUNNING,
            STATE_STOPPING,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Claim the loop and drive it to completion on the current thread.
    pub fn run<S: PacketSource>(
        &self,
        source: S,
        duration: Option<Duration>,
        sink: impl FnMut(&[u8]),
    ) -> Result<(), CaptureError> {
        self.begin()?;
        self.run_claimed(source, duration, sink);
        Ok(())
    }

    /// Drive an already-claimed loop to completion. Per-frame and
    /// per-receive failures never terminate the session; the loop ends on
    /// `stop()` or on the duration bound, then returns to `Idle`.
    pub fn run_claimed<S: PacketSource>(
        &self,
        mut source: S,
        duration: Option<Duration>,
        mut sink: impl FnMut(&[u8]),
    ) {
        tracing::info!(?duration, "capture loop started");
        let started = Instant::now();
        let mut frames: u64 = 0;

        loop {
            if self.state.load(Ordering::SeqCst) != STATE_RUNNING {
                break;
            }
            if let Some(limit) = duration {
                if started.elapsed() >= limit {
                    break;
                }
            }

            match source.recv() {
                Ok(Recv::Frame(frame)) => {
                    frames += 1;
                    sink(&frame);
                }
                Ok(Recv::Timeout) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "receive failed, continuing");
                    continue;
                }
            }
        }

        self.state.store(STATE_IDLE, Ordering::SeqCst);
        tracing::info!(frames, "capture loop stopped");
    }

    /// Run the loop on a dedicated thread. The returned handle joins once
    /// the session ends via `stop()` or the duration bound.
    pub fn spawn<S: PacketSource + 'static>(
        self: &Arc<Self>,
        source: S,
        duration: Option<Duration>,
        sink: impl FnMut(&[u8]) + Send + 'static,
    ) -> JoinHandle<()> {
        let ctrl = Arc::clone(self);
        std::thread::spawn(move || ctrl.run_claimed(source, duration, sink))
    }
}

impl Default for CaptureLoop {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
