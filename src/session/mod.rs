//! Streaming session: lifecycle, control handle and the pump loop
//!
//! ```text
//!  Idle ──start──▶ Connecting ──▶ Handshaking ──▶ Streaming
//!   ▲                  │               │              │
//!   │                  └──── error ────┴── stop/error ┘
//!   │                                  ▼
//!   └────────── teardown ──────── Stopping
//! ```

pub mod control;
pub mod streaming;
pub mod target;

#[cfg(test)]
mod testing;

pub use control::{SessionControl, SessionStats};
pub use streaming::{SessionHandle, SessionSettings, StreamingSession};
pub use target::ServerTarget;

use std::fmt;

/// Lifecycle state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session; `start` may be called
    Idle,
    /// Opening the TCP connection
    Connecting,
    /// Sending the source request
    Handshaking,
    /// Pumping audio
    Streaming,
    /// Tearing down capture, encoder and connection
    Stopping,
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        *self != SessionState::Idle
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Handshaking => "handshaking",
            SessionState::Streaming => "streaming",
            SessionState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}
