//! AAC encoder capability
//!
//! The session drives any encoder through these traits. Submission is
//! non-blocking: a full input queue is reported as [`SubmitStatus::Rejected`]
//! and the caller retries the same chunk later.

use bytes::Bytes;
use std::time::Duration;

use crate::constants::{DEFAULT_BITRATE, DEFAULT_CHANNELS, DEFAULT_SAMPLE_RATE};
use crate::error::EncoderError;

/// AAC profile. Only Low Complexity is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AacProfile {
    #[default]
    Lc,
}

impl AacProfile {
    /// MPEG-4 audio object type
    pub fn object_type(&self) -> u8 {
        match self {
            AacProfile::Lc => 2,
        }
    }
}

/// Encoder configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderConfig {
    /// Input sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved input channels
    pub channels: u16,
    /// Target bitrate in bits per second
    pub bitrate: u32,
    /// AAC object type
    pub profile: AacProfile,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            bitrate: DEFAULT_BITRATE,
            profile: AacProfile::Lc,
        }
    }
}

/// One raw AAC access unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedUnit {
    /// Header-less access unit
    pub data: Bytes,
    /// Presentation timestamp in microseconds
    pub pts_us: u64,
}

impl EncodedUnit {
    /// Wrap an access unit and its presentation time
    pub fn new(data: impl Into<Bytes>, pts_us: u64) -> Self {
        Self {
            data: data.into(),
            pts_us,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Outcome of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStatus {
    /// Chunk queued; hand over the next one
    Accepted,
    /// Input queue full; retry the same chunk on a later pass
    Rejected,
}

/// A running AAC encoder.
///
/// Units must be raw access units of at most
/// [`MAX_PAYLOAD_LEN`](crate::codec::adts::MAX_PAYLOAD_LEN) bytes; larger ones
/// cannot be framed and end the session with a send error.
pub trait AacEncoder: Send {
    /// Queue interleaved PCM for encoding. The samples are copied.
    fn submit(&mut self, pcm: &[i16], pts_us: u64) -> Result<SubmitStatus, EncoderError>;

    /// Collect whatever units are ready, waiting at most `timeout` for the first
    fn poll_output(&mut self, timeout: Duration) -> Result<Vec<EncodedUnit>, EncoderError>;

    /// Release the encoder. Called exactly once by the session.
    fn close(&mut self) -> Result<(), EncoderError>;
}

/// Opens encoders for a session
pub trait EncoderOpener {
    type Encoder: AacEncoder;

    fn open(&self, config: &EncoderConfig) -> Result<Self::Encoder, EncoderError>;
}

/// Encoder statistics
#[derive(Debug, Clone, Default)]
pub struct EncoderStats {
    /// Chunks taken by the encoder
    pub chunks_submitted: u64,
    /// Submissions refused because the input queue was full
    pub chunks_rejected: u64,
    /// Access units produced
    pub units_produced: u64,
    /// Payload bytes produced
    pub bytes_produced: u64,
}

impl EncoderStats {
    /// Average access unit size in bytes
    pub fn average_unit_size(&self) -> f32 {
        if self.units_produced > 0 {
            self.bytes_produced as f32 / self.units_produced as f32
        } else {
            0.0
        }
    }
}
