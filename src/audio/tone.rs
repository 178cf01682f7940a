//! Synthetic sine source
//!
//! Produces a test tone at the pace of a real device, so the rest of the
//! pipeline sees realistic timing without a microphone.

use std::f32::consts::PI;
use std::thread;
use std::time::{Duration, Instant};

use crate::audio::{AudioSource, PcmFormat, SourceOpener};
use crate::error::DeviceError;

/// Longest a single read will sleep waiting for the next chunk to be due
const MAX_READ_WAIT: Duration = Duration::from_millis(5);

#[derive(Debug, Clone)]
pub struct ToneOpener {
    /// Tone frequency in Hz
    pub frequency: f32,
    /// Peak amplitude, 0.0..=1.0
    pub amplitude: f32,
}

impl ToneOpener {
    /// Tone at `frequency` Hz and a moderate level
    pub fn new(frequency: f32) -> Self {
        Self {
            frequency,
            amplitude: 0.3,
        }
    }
}

impl SourceOpener for ToneOpener {
    type Source = ToneSource;

    fn open(&self, format: &PcmFormat) -> Result<ToneSource, DeviceError> {
        if format.sample_rate == 0 || format.channels == 0 {
            return Err(DeviceError::UnsupportedFormat(format!("{:?}", format)));
        }
        tracing::info!(
            "Tone source opened: {:.1}Hz at {}Hz, {} channels",
            self.frequency,
            format.sample_rate,
            format.channels
        );
        Ok(ToneSource::new(*format, self.frequency, self.amplitude))
    }
}

/// Sine generator paced at the configured sample rate
pub struct ToneSource {
    format: PcmFormat,
    frequency: f32,
    amplitude: f32,
    /// Frames generated so far; drives both phase and pacing
    frames_generated: u64,
    start: Instant,
    closed: bool,
}

impl ToneSource {
    /// Create a source producing `frequency` Hz at `amplitude` peak
    pub fn new(format: PcmFormat, frequency: f32, amplitude: f32) -> Self {
        Self {
            format,
            frequency,
            amplitude: amplitude.clamp(0.0, 1.0),
            frames_generated: 0,
            start: Instant::now(),
            closed: false,
        }
    }

    /// Wall time at which the frames generated so far are due
    fn due(&self) -> Duration {
        Duration::from_micros(self.frames_generated * 1_000_000 / self.format.sample_rate as u64)
    }

    fn sample_at(&self, frame: u64) -> i16 {
        let t = frame as f32 / self.format.sample_rate as f32;
        let value = (2.0 * PI * self.frequency * t).sin() * self.amplitude;
        (value * i16::MAX as f32) as i16
    }
}

impl AudioSource for ToneSource {
    fn read_into(&mut self, buf: &mut [i16]) -> Result<usize, DeviceError> {
        if self.closed {
            return Err(DeviceError::ReadFailed("source closed".into()));
        }

        let elapsed = self.start.elapsed();
        let due = self.due();
        if due > elapsed {
            let wait = due - elapsed;
            if wait > MAX_READ_WAIT {
                thread::sleep(MAX_READ_WAIT);
                return Ok(0);
            }
            thread::sleep(wait);
        }

        let channels = self.format.channels as usize;
        let frames = buf.len() / channels;
        for (i, frame) in buf.chunks_exact_mut(channels).enumerate() {
            frame.fill(self.sample_at(self.frames_generated + i as u64));
        }
        self.frames_generated += frames as u64;
        Ok(frames * channels)
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.closed = true;
        Ok(())
    }
}
