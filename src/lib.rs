//! # Icecast AAC Streamer
//!
//! Live microphone streaming to Icecast/Shoutcast servers as ADTS-framed AAC-LC.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                     StreamingSession (session)                       │
//! │                                                                      │
//! │  Idle → Connecting → Handshaking → Streaming → Stopping → Idle       │
//! │                                                                      │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐   ┌──────────┐  │
//! │  │ AudioSource │──▶│ AacEncoder  │──▶│ AdtsFramer  │──▶│   TCP    │  │
//! │  │  (audio)    │   │  (codec)    │   │ (codec)     │   │(network) │  │
//! │  └─────────────┘   └─────────────┘   └─────────────┘   └────┬─────┘  │
//! │   PCM s16 stereo    raw access       7-byte header          │        │
//! │                     units + pts      + payload              │        │
//! └─────────────────────────────────────────────────────────────┼────────┘
//!                                                               │
//!              PUT /<mount> HTTP/1.0 + [ADTS][AAC] [ADTS][AAC] ...
//!                                                               ▼
//!                                                 Icecast / Shoutcast
//! ```
//!
//! The pump runs on one dedicated worker thread. Start and stop are issued
//! through [`session::SessionControl`] from any other thread.

pub mod audio;
pub mod codec;
pub mod config;
pub mod error;
pub mod network;
pub mod session;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default capture sample rate
    pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

    /// Default channel count (stereo)
    pub const DEFAULT_CHANNELS: u16 = 2;

    /// Default AAC bitrate in bits per second
    pub const DEFAULT_BITRATE: u32 = 128_000;

    /// Samples per channel in one AAC-LC access unit
    pub const AAC_FRAME_SAMPLES: usize = 1024;

    /// Default capture chunk size in interleaved samples (one AAC frame of stereo)
    pub const DEFAULT_CHUNK_SAMPLES: usize = AAC_FRAME_SAMPLES * DEFAULT_CHANNELS as usize;

    /// Size of an ADTS header without CRC
    pub const ADTS_HEADER_LEN: usize = 7;

    /// Default Icecast source port
    pub const DEFAULT_SERVER_PORT: u16 = 8000;

    /// Encoder output poll timeout; bounds how quickly a stop request is observed
    pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 2;

    /// Default TCP connect timeout
    pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

    /// Default value of the `Ice-Name` header
    pub const DEFAULT_ICE_NAME: &str = "aac-live";

    /// Capture ring buffer capacity (in chunks)
    pub const RING_BUFFER_CAPACITY: usize = 64;

    /// Encoder input queue depth (in chunks) before submissions are rejected
    pub const ENCODER_INPUT_QUEUE: usize = 8;

    /// Encoder output queue depth (in access units)
    pub const ENCODER_OUTPUT_QUEUE: usize = 64;
}
