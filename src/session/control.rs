//! Shared session state and the controlling handle
//!
//! The pump thread owns every resource; the controlling thread only sees
//! the state, the stop flag and the counters kept here.

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::session::SessionState;

/// Counters updated by the pump
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub chunks_read: AtomicU64,
    pub chunks_submitted: AtomicU64,
    pub submit_retries: AtomicU64,
    pub units_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
}

impl Counters {
    fn reset(&self) {
        for counter in [
            &self.chunks_read,
            &self.chunks_submitted,
            &self.submit_retries,
            &self.units_sent,
            &self.bytes_sent,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Snapshot of the running (or last) session
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// State when the snapshot was taken
    pub state: SessionState,
    /// When the session entered `Streaming`
    pub started_at: Option<DateTime<Utc>>,
    /// Chunks read from the capture source
    pub chunks_read: u64,
    /// Chunks accepted by the encoder
    pub chunks_submitted: u64,
    /// Submissions retried after the encoder refused them
    pub submit_retries: u64,
    /// ADTS frames written to the server
    pub units_sent: u64,
    /// Bytes written after the handshake
    pub bytes_sent: u64,
}

pub(crate) struct Shared {
    state: Mutex<SessionState>,
    idle: Condvar,
    running: AtomicBool,
    started_at: Mutex<Option<DateTime<Utc>>>,
    pub counters: Counters,
}

impl Shared {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::Idle),
            idle: Condvar::new(),
            running: AtomicBool::new(false),
            started_at: Mutex::new(None),
            counters: Counters::default(),
        }
    }

    /// Claim the single session slot: `Idle → Connecting`
    pub fn begin(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.is_active() {
            return Err(Error::SessionActive);
        }
        *state = SessionState::Connecting;
        self.running.store(true, Ordering::Release);
        self.counters.reset();
        *self.started_at.lock() = None;
        Ok(())
    }

    pub fn transition(&self, next: SessionState) {
        let mut state = self.state.lock();
        tracing::debug!("Session {} -> {}", *state, next);
        *state = next;
        if next == SessionState::Streaming {
            *self.started_at.lock() = Some(Utc::now());
        }
    }

    /// Back to `Idle`; wakes every `stop()` waiting on teardown
    pub fn finish(&self) {
        let mut state = self.state.lock();
        *state = SessionState::Idle;
        self.running.store(false, Ordering::Release);
        self.idle.notify_all();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }
}

/// Cloneable handle for observing and stopping a session from another thread
#[derive(Clone)]
pub struct SessionControl {
    pub(crate) shared: Arc<Shared>,
}

impl SessionControl {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Whether a session is between start and teardown
    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Ask the pump to stop without waiting.
    ///
    /// Safe to call from inside a collaborator running on the pump thread.
    pub fn request_stop(&self) {
        self.shared.running.store(false, Ordering::Release);
    }

    /// Stop the session and wait until teardown has completed.
    ///
    /// Idempotent; returns immediately when no session is active. Must not be
    /// called on the pump thread itself (use [`request_stop`](Self::request_stop)).
    pub fn stop(&self) {
        let mut state = self.shared.state.lock();
        if !state.is_active() {
            return;
        }

        tracing::info!("Stop requested while {}", *state);
        self.shared.running.store(false, Ordering::Release);
        while state.is_active() {
            self.shared.idle.wait(&mut state);
        }
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> SessionStats {
        let counters = &self.shared.counters;
        SessionStats {
            state: self.state(),
            started_at: *self.shared.started_at.lock(),
            chunks_read: counters.chunks_read.load(Ordering::Relaxed),
            chunks_submitted: counters.chunks_submitted.load(Ordering::Relaxed),
            submit_retries: counters.submit_retries.load(Ordering::Relaxed),
            units_sent: counters.units_sent.load(Ordering::Relaxed),
            bytes_sent: counters.bytes_sent.load(Ordering::Relaxed),
        }
    }
}
