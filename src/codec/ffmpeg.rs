//! AAC-LC encoding through an external ffmpeg process
//!
//! PCM goes to ffmpeg's stdin on a dedicated writer thread; ADTS frames come
//! back on stdout and a reader thread strips their headers so the session can
//! reframe them. Both directions are bounded queues, so a stalled encoder
//! shows up as rejected submissions instead of growing memory.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::codec::adts;
use crate::codec::encoder::{
    AacEncoder, AacProfile, EncodedUnit, EncoderConfig, EncoderOpener, EncoderStats, SubmitStatus,
};
use crate::config::EncoderSettings;
use crate::constants::{AAC_FRAME_SAMPLES, ENCODER_INPUT_QUEUE, ENCODER_OUTPUT_QUEUE};
use crate::error::EncoderError;

/// Spawns one ffmpeg encoder per session
#[derive(Debug, Clone)]
pub struct FfmpegOpener {
    program: PathBuf,
    input_queue: usize,
    output_queue: usize,
}

impl FfmpegOpener {
    /// Use `program` with the default queue sizes
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            input_queue: ENCODER_INPUT_QUEUE,
            output_queue: ENCODER_OUTPUT_QUEUE,
        }
    }

    /// Program path and queue sizes from the `[encoder]` config section
    pub fn from_settings(settings: &EncoderSettings) -> Self {
        Self {
            program: settings.ffmpeg_path.clone(),
            input_queue: settings.input_queue,
            output_queue: settings.output_queue,
        }
    }
}

impl EncoderOpener for FfmpegOpener {
    type Encoder = FfmpegEncoder;

    fn open(&self, config: &EncoderConfig) -> Result<FfmpegEncoder, EncoderError> {
        let mut command = Command::new(&self.program);
        command.args(ffmpeg_args(config));
        FfmpegEncoder::spawn(command, config, self.input_queue, self.output_queue)
    }
}

/// Command-line arguments for a raw PCM in, ADTS out encode
pub fn ffmpeg_args(config: &EncoderConfig) -> Vec<String> {
    let profile = match config.profile {
        AacProfile::Lc => "aac_low",
    };
    let sample_rate = config.sample_rate.to_string();
    let channels = config.channels.to_string();
    let bitrate = config.bitrate.to_string();

    [
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "s16le",
        "-ar",
        sample_rate.as_str(),
        "-ac",
        channels.as_str(),
        "-i",
        "pipe:0",
        "-c:a",
        "aac",
        "-profile:a",
        profile,
        "-b:a",
        bitrate.as_str(),
        "-flush_packets",
        "1",
        "-f",
        "adts",
        "pipe:1",
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect()
}

/// Encoder backed by a child ffmpeg process
pub struct FfmpegEncoder {
    child: Option<Child>,
    input_tx: Option<Sender<Vec<i16>>>,
    output_rx: Receiver<adts::AdtsFrame>,
    error_rx: Receiver<EncoderError>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
    sample_rate: u32,
    /// Timestamp of the first submitted chunk; output pts count up from it
    base_pts: Option<u64>,
    stats: EncoderStats,
}

impl FfmpegEncoder {
    /// Start `command` as the encoder process. Its stdin takes s16le PCM and
    /// its stdout must produce ADTS.
    fn spawn(
        mut command: Command,
        config: &EncoderConfig,
        input_queue: usize,
        output_queue: usize,
    ) -> Result<Self, EncoderError> {
        // Validates the rate/channel pair the same way the framer will
        adts::AdtsFramer::new(config.sample_rate, config.channels)?;

        let program = command.get_program().to_string_lossy().into_owned();
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| EncoderError::Init(format!("{}: {}", program, e)))?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(EncoderError::Init("ffmpeg pipes unavailable".into()));
            }
        };

        let (input_tx, input_rx) = bounded::<Vec<i16>>(input_queue);
        let (output_tx, output_rx) = bounded::<adts::AdtsFrame>(output_queue);
        let (error_tx, error_rx) = bounded::<EncoderError>(4);

        let writer = spawn_writer(stdin, input_rx, error_tx.clone());
        let reader = spawn_reader(stdout, output_tx, error_tx);

        let (writer, reader) = match (writer, reader) {
            (Ok(writer), Ok(reader)) => (writer, reader),
            (writer, reader) => {
                let _ = child.kill();
                let _ = child.wait();
                let err = writer.err().or(reader.err()).map(|e| e.to_string());
                return Err(EncoderError::Init(err.unwrap_or_default()));
            }
        };

        tracing::info!(
            "ffmpeg AAC encoder started: {}Hz, {} channels, {} bps",
            config.sample_rate,
            config.channels,
            config.bitrate
        );

        Ok(Self {
            child: Some(child),
            input_tx: Some(input_tx),
            output_rx,
            error_rx,
            writer: Some(writer),
            reader: Some(reader),
            sample_rate: config.sample_rate,
            base_pts: None,
            stats: EncoderStats::default(),
        })
    }

    fn next_pts(&self) -> u64 {
        let base = self.base_pts.unwrap_or(0);
        base + self.stats.units_produced * AAC_FRAME_SAMPLES as u64 * 1_000_000
            / self.sample_rate as u64
    }

    fn take_unit(&mut self, frame: adts::AdtsFrame) -> EncodedUnit {
        let unit = EncodedUnit::new(frame.payload, self.next_pts());
        self.stats.units_produced += 1;
        self.stats.bytes_produced += unit.len() as u64;
        unit
    }

    /// Running totals for this encoder
    pub fn stats(&self) -> &EncoderStats {
        &self.stats
    }
}

fn spawn_writer(
    mut stdin: ChildStdin,
    input_rx: Receiver<Vec<i16>>,
    error_tx: Sender<EncoderError>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("aac-encoder-input".into())
        .spawn(move || {
            let mut bytes = Vec::new();
            for chunk in input_rx {
                bytes.clear();
                bytes.extend(chunk.iter().flat_map(|s| s.to_le_bytes()));
                if let Err(e) = stdin.write_all(&bytes) {
                    let _ = error_tx.try_send(EncoderError::Submit(e.to_string()));
                    return;
                }
            }
            // Dropping stdin lets ffmpeg flush and exit
        })
}

fn spawn_reader(
    mut stdout: ChildStdout,
    output_tx: Sender<adts::AdtsFrame>,
    error_tx: Sender<EncoderError>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("aac-encoder-output".into())
        .spawn(move || loop {
            match adts::read_frame(&mut stdout) {
                Ok(Some(frame)) => {
                    if output_tx.send(frame).is_err() {
                        return;
                    }
                }
                Ok(None) => {
                    tracing::debug!("ffmpeg output closed");
                    return;
                }
                Err(e) => {
                    let _ = error_tx.try_send(EncoderError::Output(e.to_string()));
                    return;
                }
            }
        })
}

impl AacEncoder for FfmpegEncoder {
    fn submit(&mut self, pcm: &[i16], pts_us: u64) -> Result<SubmitStatus, EncoderError> {
        if let Ok(err) = self.error_rx.try_recv() {
            return Err(err);
        }

        let input_tx = self.input_tx.as_ref().ok_or(EncoderError::Closed)?;
        match input_tx.try_send(pcm.to_vec()) {
            Ok(()) => {
                self.base_pts.get_or_insert(pts_us);
                self.stats.chunks_submitted += 1;
                Ok(SubmitStatus::Accepted)
            }
            Err(TrySendError::Full(_)) => {
                self.stats.chunks_rejected += 1;
                Ok(SubmitStatus::Rejected)
            }
            Err(TrySendError::Disconnected(_)) => Err(self
                .error_rx
                .try_recv()
                .unwrap_or_else(|_| EncoderError::Submit("encoder input closed".into()))),
        }
    }

    fn poll_output(&mut self, timeout: Duration) -> Result<Vec<EncodedUnit>, EncoderError> {
        if let Ok(err) = self.error_rx.try_recv() {
            return Err(err);
        }

        let first = match self.output_rx.recv_timeout(timeout) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => return Ok(Vec::new()),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(self
                    .error_rx
                    .try_recv()
                    .unwrap_or_else(|_| EncoderError::Output("encoder exited".into())))
            }
        };

        let mut units = vec![self.take_unit(first)];
        while let Ok(frame) = self.output_rx.try_recv() {
            units.push(self.take_unit(frame));
        }
        Ok(units)
    }

    fn close(&mut self) -> Result<(), EncoderError> {
        // Closing the input queue ends the writer thread and ffmpeg's stdin
        self.input_tx.take();

        let mut result = Ok(());
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                if e.kind() != std::io::ErrorKind::InvalidInput {
                    result = Err(EncoderError::Output(format!("failed to stop ffmpeg: {}", e)));
                }
            }
            if let Err(e) = child.wait() {
                result = Err(EncoderError::Output(format!("failed to reap ffmpeg: {}", e)));
            }
        }

        if let Some(handle) = self.writer.take() {
            let _ = handle.join();
        }
        // The reader may be parked on a full output queue; dropping the
        // receiver fails its send
        drop(std::mem::replace(&mut self.output_rx, crossbeam_channel::never()));
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }

        tracing::debug!(
            "ffmpeg encoder closed: {} chunks in, {} units out, avg {:.0} bytes",
            self.stats.chunks_submitted,
            self.stats.units_produced,
            self.stats.average_unit_size()
        );
        result
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if self.child.is_some() {
            let _ = self.close();
        }
    }
}
