//! Microphone capture through cpal
//!
//! The cpal stream lives on its own thread (streams are not `Send` on every
//! host). The device callback converts to `i16` and pushes chunks into a
//! lock-free ring that the session drains through [`AudioSource::read_into`].

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::buffer::{create_shared_buffer, ChunkReader, PcmChunk, SharedRingBuffer};
use crate::audio::device::find_input_device;
use crate::audio::{AudioSource, PcmFormat, SourceOpener};
use crate::constants::RING_BUFFER_CAPACITY;
use crate::error::DeviceError;

/// How long `read_into` parks when no samples are queued
const IDLE_WAIT: Duration = Duration::from_millis(1);

/// Opens the named (or default) input device
#[derive(Debug, Clone, Default)]
pub struct CpalOpener {
    /// Device name; `None` selects the host default
    pub device: Option<String>,
    /// Requested device buffer size in frames; `None` keeps the host default
    pub buffer_frames: Option<u32>,
}

impl SourceOpener for CpalOpener {
    type Source = CpalSource;

    fn open(&self, format: &PcmFormat) -> Result<CpalSource, DeviceError> {
        CpalSource::open(self.device.clone(), *format, self.buffer_frames)
    }
}

/// A running capture stream
pub struct CpalSource {
    running: Arc<AtomicBool>,
    reader: ChunkReader,
    thread_handle: Option<JoinHandle<()>>,
    error_rx: Receiver<DeviceError>,
}

impl CpalSource {
    fn open(
        device_name: Option<String>,
        format: PcmFormat,
        buffer_frames: Option<u32>,
    ) -> Result<Self, DeviceError> {
        let ring = create_shared_buffer(RING_BUFFER_CAPACITY);
        let running = Arc::new(AtomicBool::new(true));
        let (error_tx, error_rx) = bounded::<DeviceError>(16);
        let (ready_tx, ready_rx) = bounded::<Result<(), DeviceError>>(1);

        let config = StreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: match buffer_frames {
                Some(size) => cpal::BufferSize::Fixed(size),
                None => cpal::BufferSize::Default,
            },
        };

        let thread_ring = ring.clone();
        let thread_running = running.clone();
        let handle = thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let stream = match find_input_device(device_name.as_deref())
                    .and_then(|device| build_stream(&device, &config, thread_ring, thread_running.clone(), error_tx))
                {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(DeviceError::StreamError(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                while thread_running.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }
                // Stream is dropped here, stopping capture
            })
            .map_err(|e| DeviceError::StreamError(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(DeviceError::StreamError("capture thread exited".into()));
            }
        }

        tracing::info!(
            "Audio capture started: {}Hz, {} channels",
            format.sample_rate,
            format.channels
        );

        Ok(Self {
            running,
            reader: ChunkReader::new(ring),
            thread_handle: Some(handle),
            error_rx,
        })
    }

    /// Chunks dropped because the pump fell behind the device
    pub fn overflow_count(&self) -> usize {
        self.reader.ring().overflow_count()
    }
}

fn build_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    ring: SharedRingBuffer,
    running: Arc<AtomicBool>,
    error_tx: Sender<DeviceError>,
) -> Result<cpal::Stream, DeviceError> {
    let sample_format = device
        .default_input_config()
        .map_err(|e| DeviceError::NotFound(e.to_string()))?
        .sample_format();

    match sample_format {
        cpal::SampleFormat::I16 => build_typed::<i16>(device, config, ring, running, error_tx),
        cpal::SampleFormat::F32 => build_typed::<f32>(device, config, ring, running, error_tx),
        cpal::SampleFormat::I32 => build_typed::<i32>(device, config, ring, running, error_tx),
        other => Err(DeviceError::UnsupportedFormat(format!("{:?}", other))),
    }
}

fn build_typed<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    ring: SharedRingBuffer,
    running: Arc<AtomicBool>,
    error_tx: Sender<DeviceError>,
) -> Result<cpal::Stream, DeviceError>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    let start_time = Instant::now();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                let samples: Vec<i16> = data.iter().map(|s| s.to_sample::<i16>()).collect();
                let timestamp = start_time.elapsed().as_micros() as u64;

                // Push may fail on overflow; the ring counts it
                let _ = ring.push(PcmChunk::new(samples, timestamp));
            },
            move |err| {
                let _ = error_tx.try_send(DeviceError::StreamError(err.to_string()));
            },
            None,
        )
        .map_err(|e| DeviceError::StreamError(e.to_string()))
}

impl AudioSource for CpalSource {
    fn read_into(&mut self, buf: &mut [i16]) -> Result<usize, DeviceError> {
        if let Ok(err) = self.error_rx.try_recv() {
            return Err(err);
        }

        let n = self.reader.read_into(buf);
        if n == 0 {
            thread::sleep(IDLE_WAIT);
        }
        Ok(n)
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            handle
                .join()
                .map_err(|_| DeviceError::CloseFailed("capture thread panicked".into()))?;
        }

        let overflows = self.overflow_count();
        if overflows > 0 {
            tracing::warn!("Capture dropped {} chunks while the pump was behind", overflows);
        }
        Ok(())
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
