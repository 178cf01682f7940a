//! The streaming session and its pump loop

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::{AudioSource, PcmFormat, SourceOpener};
use crate::codec::adts::AdtsFramer;
use crate::codec::encoder::{AacEncoder, AacProfile, EncoderConfig, EncoderOpener, SubmitStatus};
use crate::config::AppConfig;
use crate::constants::*;
use crate::error::Result;
use crate::network::{AdtsSender, Connection, Connector, IcecastHandshake};
use crate::session::control::{SessionControl, Shared};
use crate::session::{SessionState, ServerTarget};
use std::sync::atomic::Ordering;

/// Fixed parameters of every session started from one [`StreamingSession`]
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Capture format, shared by the encoder and the ADTS header
    pub format: PcmFormat,
    /// Encoder bitrate in bits per second
    pub bitrate: u32,
    /// Capture buffer size in interleaved samples
    pub chunk_samples: usize,
    /// Encoder poll timeout; the stop-responsiveness budget of the pump
    pub poll_timeout: Duration,
    /// Source request sent after connecting
    pub handshake: IcecastHandshake,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            format: PcmFormat::new(DEFAULT_SAMPLE_RATE, DEFAULT_CHANNELS),
            bitrate: DEFAULT_BITRATE,
            chunk_samples: DEFAULT_CHUNK_SAMPLES,
            poll_timeout: Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS),
            handshake: IcecastHandshake::new(DEFAULT_ICE_NAME),
        }
    }
}

impl SessionSettings {
    /// Settings from a loaded application config
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            format: PcmFormat::new(config.audio.sample_rate, config.audio.channels),
            bitrate: config.encoder.bitrate,
            chunk_samples: config.audio.chunk_samples,
            poll_timeout: config.stream.poll_timeout(),
            handshake: IcecastHandshake::new(config.stream.ice_name.clone())
                .verify_response(config.stream.verify_response),
        }
    }

    /// Encoder parameters for these settings
    pub fn encoder_config(&self) -> EncoderConfig {
        EncoderConfig {
            sample_rate: self.format.sample_rate,
            channels: self.format.channels,
            bitrate: self.bitrate,
            profile: AacProfile::Lc,
        }
    }
}

/// Resources owned by one run, released in capture → encoder → connection order
struct Resources<A: AudioSource, E: AacEncoder, C: Connection> {
    source: Option<A>,
    encoder: Option<E>,
    conn: Option<C>,
}

impl<A: AudioSource, E: AacEncoder, C: Connection> Resources<A, E, C> {
    fn new() -> Self {
        Self {
            source: None,
            encoder: None,
            conn: None,
        }
    }

    /// Close whatever was opened. Failures are logged, never returned.
    fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            if let Err(e) = source.close() {
                tracing::warn!("Failed to release capture device: {}", e);
            }
        }
        if let Some(mut encoder) = self.encoder.take() {
            if let Err(e) = encoder.close() {
                tracing::warn!("Failed to release encoder: {}", e);
            }
        }
        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = conn.close() {
                tracing::warn!("Failed to close connection: {}", e);
            }
        }
    }
}

impl<A: AudioSource, E: AacEncoder, C: Connection> Drop for Resources<A, E, C> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Returns the session to `Idle` however the run ends, unwinding included
struct FinishGuard<'a>(&'a Shared);

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// Orchestrates capture, encoding and delivery for one session at a time
pub struct StreamingSession<S, E, C> {
    shared: Arc<Shared>,
    sources: S,
    encoders: E,
    connector: C,
    settings: SessionSettings,
}

impl<S, E, C> StreamingSession<S, E, C>
where
    S: SourceOpener,
    E: EncoderOpener,
    C: Connector,
{
    /// Create an idle session around the given collaborators
    pub fn new(settings: SessionSettings, sources: S, encoders: E, connector: C) -> Self {
        Self {
            shared: Arc::new(Shared::new()),
            sources,
            encoders,
            connector,
            settings,
        }
    }

    /// Handle for stopping and observing this session from other threads
    pub fn control(&self) -> SessionControl {
        SessionControl::new(self.shared.clone())
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Settings every run uses
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Validate the target and stream to it until stopped or a collaborator fails.
    ///
    /// Blocks the calling thread, which becomes the pump.
    pub fn start(&self, host: &str, port: u16, mount: &str, password: &str) -> Result<()> {
        let target = ServerTarget::new(host, port, mount, password)?;
        self.run(&target)
    }

    /// Stop the active session, if any, and wait for teardown
    pub fn stop(&self) {
        self.control().stop();
    }

    /// Stream to an already validated target. Blocks until the session ends.
    pub fn run(&self, target: &ServerTarget) -> Result<()> {
        self.shared.begin()?;
        let _finish = FinishGuard(&self.shared);

        let session_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("session", id = %session_id);
        let _enter = span.enter();

        let mut resources = Resources::new();
        let result = self.establish_and_pump(target, &mut resources);

        match &result {
            Ok(()) => tracing::info!("Session to {} stopped", target),
            Err(e) => tracing::error!("Session to {} failed: {}", target, e),
        }

        self.shared.transition(SessionState::Stopping);
        resources.release();
        result
    }

    fn establish_and_pump(
        &self,
        target: &ServerTarget,
        res: &mut Resources<<S as SourceOpener>::Source, <E as EncoderOpener>::Encoder, C::Conn>,
    ) -> Result<()> {
        tracing::info!("Connecting to {}:{}", target.host, target.port);
        let conn = res.conn.insert(self.connector.connect(&target.host, target.port)?);

        self.shared.transition(SessionState::Handshaking);
        self.settings
            .handshake
            .send(conn, &target.mount, &target.password)?;
        tracing::info!("Source request sent for /{}", target.mount);

        if !self.shared.is_running() {
            return Ok(());
        }

        let format = self.settings.format;
        let framer = AdtsFramer::new(format.sample_rate, format.channels)?;
        let encoder = res.encoder.insert(self.encoders.open(&self.settings.encoder_config())?);
        let source = res.source.insert(self.sources.open(&format)?);

        self.shared.transition(SessionState::Streaming);
        tracing::info!(
            "Streaming {}Hz, {} channels, {} bps AAC-LC",
            format.sample_rate,
            format.channels,
            self.settings.bitrate
        );

        self.pump(source, encoder, conn, AdtsSender::new(framer))
    }

    /// Read → submit → drain, one chunk per pass, until stop or error
    fn pump<A: AudioSource, Enc: AacEncoder, Conn: Connection>(
        &self,
        source: &mut A,
        encoder: &mut Enc,
        conn: &mut Conn,
        mut sender: AdtsSender,
    ) -> Result<()> {
        let counters = &self.shared.counters;
        let mut buf = vec![0i16; self.settings.chunk_samples];
        // Chunk waiting in `buf` for the encoder to accept it: (samples, pts)
        let mut pending: Option<(usize, u64)> = None;
        let stream_start = Instant::now();

        while self.shared.is_running() {
            if pending.is_none() {
                let n = source.read_into(&mut buf)?.min(buf.len());
                if n > 0 {
                    counters.chunks_read.fetch_add(1, Ordering::Relaxed);
                    pending = Some((n, stream_start.elapsed().as_micros() as u64));
                }
            }

            if let Some((n, pts)) = pending {
                match encoder.submit(&buf[..n], pts)? {
                    SubmitStatus::Accepted => {
                        counters.chunks_submitted.fetch_add(1, Ordering::Relaxed);
                        pending = None;
                    }
                    SubmitStatus::Rejected => {
                        counters.submit_retries.fetch_add(1, Ordering::Relaxed);
                        tracing::trace!("Encoder input full, retrying chunk at {}us", pts);
                    }
                }
            }

            for unit in encoder.poll_output(self.settings.poll_timeout)? {
                let written = sender.send(conn, &unit)?;
                counters.units_sent.fetch_add(1, Ordering::Relaxed);
                counters.bytes_sent.fetch_add(written as u64, Ordering::Relaxed);
            }
        }

        tracing::info!(
            "Pump stopped: {} units, {:.1} KB sent",
            sender.units_sent(),
            sender.bytes_sent() as f64 / 1024.0
        );
        Ok(())
    }
}

/// A session running on its own pump thread
pub struct SessionHandle {
    control: SessionControl,
    join: JoinHandle<Result<()>>,
}

impl SessionHandle {
    /// Handle for observing or stopping the session
    pub fn control(&self) -> &SessionControl {
        &self.control
    }

    /// Stop the session and return how it ended
    pub fn stop(self) -> Result<()> {
        self.control.stop();
        self.join()
    }

    /// Wait for the session to end on its own
    pub fn join(self) -> Result<()> {
        match self.join.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Whether the pump thread has exited
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl<S, E, C> StreamingSession<S, E, C>
where
    S: SourceOpener + Send + Sync + 'static,
    E: EncoderOpener + Send + Sync + 'static,
    C: Connector + Send + Sync + 'static,
{
    /// Run the session on a dedicated `stream-pump` thread
    pub fn spawn(self: Arc<Self>, target: ServerTarget) -> std::io::Result<SessionHandle> {
        let control = self.control();
        let join = thread::Builder::new()
            .name("stream-pump".into())
            .spawn(move || self.run(&target))?;
        Ok(SessionHandle { control, join })
    }
}
