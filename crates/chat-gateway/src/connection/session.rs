//! Per-connection session state
//!
//! A `Session` is created for every connection attempt and replaced, never
//! reused, on reconnect. A resuming replacement inherits the session id and
//! last sequence number of the one it replaces.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Longest heartbeat interval accepted from Hello
pub const MAX_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(600);

/// Resume and heartbeat state for one connection
#[derive(Debug, Default)]
pub struct Session {
    /// Issued by READY; required for Resume
    session_id: RwLock<Option<String>>,

    /// Last dispatch sequence number received
    sequence: Mutex<Option<u64>>,

    /// Heartbeat interval from Hello, in milliseconds
    heartbeat_interval: AtomicU64,

    /// Set when a heartbeat is sent, cleared by its ACK
    awaiting_ack: AtomicBool,

    /// When the last heartbeat went out
    last_beat: Mutex<Option<Instant>>,

    /// Round trip of the last acknowledged heartbeat
    latency: Mutex<Option<Duration>>,
}

impl Session {
    /// A fresh session that will Identify
    pub fn new() -> Self {
        Self::default()
    }

    /// A replacement session that resumes `previous`
    pub fn resuming(previous: &Session) -> Self {
        Self {
            session_id: RwLock::new(previous.session_id()),
            sequence: Mutex::new(previous.sequence()),
            ..Self::default()
        }
    }

    /// Session id issued by the server
    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().clone()
    }

    pub fn set_session_id(&self, session_id: impl Into<String>) {
        *self.session_id.write() = Some(session_id.into());
    }

    /// Whether this session holds enough state to Resume
    pub fn can_resume(&self) -> bool {
        self.session_id.read().is_some()
    }

    /// Drop resume state so the next handshake identifies from scratch
    pub fn reset(&self) {
        *self.session_id.write() = None;
        *self.sequence.lock() = None;
    }

    /// Last sequence number received
    pub fn sequence(&self) -> Option<u64> {
        *self.sequence.lock()
    }

    /// Record a dispatch sequence number
    ///
    /// Sequence numbers only move forward; an older one is ignored and
    /// `false` is returned.
    pub fn update_sequence(&self, seq: u64) -> bool {
        let mut current = self.sequence.lock();
        match *current {
            Some(last) if seq <= last => false,
            _ => {
                *current = Some(seq);
                true
            }
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval.load(Ordering::Acquire))
    }

    /// Store the interval from Hello, capped at `MAX_HEARTBEAT_INTERVAL`
    pub fn set_heartbeat_interval(&self, interval_ms: u64) {
        let capped = interval_ms.min(MAX_HEARTBEAT_INTERVAL.as_millis() as u64);
        self.heartbeat_interval.store(capped, Ordering::Release);
    }

    /// Whether the last heartbeat is still unacknowledged
    pub fn is_awaiting_ack(&self) -> bool {
        self.awaiting_ack.load(Ordering::Acquire)
    }

    /// Record that a heartbeat was just sent
    pub fn mark_beat(&self) {
        *self.last_beat.lock() = Some(Instant::now());
        self.awaiting_ack.store(true, Ordering::Release);
    }

    /// Record a heartbeat ACK, returning the measured round trip
    pub fn ack(&self) -> Option<Duration> {
        self.awaiting_ack.store(false, Ordering::Release);
        let latency = self.last_beat.lock().map(|sent| sent.elapsed());
        if latency.is_some() {
            *self.latency.lock() = latency;
        }
        latency
    }

    /// Round trip of the last acknowledged heartbeat
    pub fn latency(&self) -> Option<Duration> {
        *self.latency.lock()
    }
}
