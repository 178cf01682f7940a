//! Audio capture subsystem
//!
//! Sources deliver interleaved signed 16-bit PCM. A read returning `0` means
//! "nothing this tick"; a live source has no end of stream.

pub mod buffer;
#[cfg(feature = "capture")]
pub mod capture;
#[cfg(feature = "capture")]
pub mod device;
pub mod tone;

pub use buffer::{PcmChunk, RingBuffer, SharedRingBuffer};
#[cfg(feature = "capture")]
pub use capture::{CpalOpener, CpalSource};
#[cfg(feature = "capture")]
pub use device::{list_input_devices, InputDeviceInfo};
pub use tone::{ToneOpener, ToneSource};

use crate::error::DeviceError;

/// PCM layout requested from a capture device. Samples are always `i16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    /// Samples per second per channel
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
}

impl PcmFormat {
    /// Create a format descriptor
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Duration of `samples` interleaved samples in microseconds
    pub fn duration_us(&self, samples: usize) -> u64 {
        let frames = samples as u64 / self.channels.max(1) as u64;
        frames * 1_000_000 / self.sample_rate.max(1) as u64
    }
}

/// An open capture device
pub trait AudioSource: Send {
    /// Copy available samples into `buf`, returning how many were written
    fn read_into(&mut self, buf: &mut [i16]) -> Result<usize, DeviceError>;

    /// Release the device. Called exactly once by the session.
    fn close(&mut self) -> Result<(), DeviceError>;
}

/// Opens capture devices for a session
pub trait SourceOpener {
    type Source: AudioSource;

    fn open(&self, format: &PcmFormat) -> Result<Self::Source, DeviceError>;
}
