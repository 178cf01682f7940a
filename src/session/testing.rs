//! Scripted collaborators for session tests
//!
//! Every fake reports into a shared [`Ledger`] so tests can check open/close
//! balance, teardown order and exactly what reached the wire.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::audio::{AudioSource, PcmFormat, SourceOpener};
use crate::codec::encoder::{AacEncoder, EncodedUnit, EncoderConfig, EncoderOpener, SubmitStatus};
use crate::error::{ConnectionError, DeviceError, EncoderError};
use crate::network::{Connection, Connector};
use crate::session::SessionControl;

#[derive(Default)]
pub struct Ledger {
    source_opens: AtomicUsize,
    source_closes: AtomicUsize,
    encoder_opens: AtomicUsize,
    encoder_closes: AtomicUsize,
    conn_opens: AtomicUsize,
    conn_closes: AtomicUsize,
    close_order: Mutex<Vec<&'static str>>,
    writes: Mutex<Vec<Vec<u8>>>,
    accepted: Mutex<Vec<Vec<i16>>>,
    submitted_pts: Mutex<Vec<u64>>,
    stop_hook: Mutex<Option<SessionControl>>,
    stop_after_accepted: Mutex<Option<usize>>,
    fail_connect: AtomicBool,
    fail_writes_after: Mutex<Option<usize>>,
    fail_closes: AtomicBool,
}

impl Ledger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_stop_hook(&self, control: SessionControl) {
        *self.stop_hook.lock() = Some(control);
    }

    fn request_stop(&self) {
        if let Some(control) = self.stop_hook.lock().as_ref() {
            control.request_stop();
        }
    }

    pub fn stop_after_accepted(&self, chunks: usize) {
        *self.stop_after_accepted.lock() = Some(chunks);
    }

    pub fn fail_connect(&self) {
        self.fail_connect.store(true, Ordering::SeqCst);
    }

    /// Let `writes` write calls succeed, fail every one after
    pub fn fail_writes_after(&self, writes: usize) {
        *self.fail_writes_after.lock() = Some(writes);
    }

    pub fn fail_closes(&self) {
        self.fail_closes.store(true, Ordering::SeqCst);
    }

    pub fn source_opens(&self) -> usize {
        self.source_opens.load(Ordering::SeqCst)
    }

    pub fn encoder_opens(&self) -> usize {
        self.encoder_opens.load(Ordering::SeqCst)
    }

    pub fn conn_opens(&self) -> usize {
        self.conn_opens.load(Ordering::SeqCst)
    }

    pub fn assert_balanced(&self) {
        assert_eq!(
            self.source_opens(),
            self.source_closes.load(Ordering::SeqCst),
            "capture opens/closes"
        );
        assert_eq!(
            self.encoder_opens(),
            self.encoder_closes.load(Ordering::SeqCst),
            "encoder opens/closes"
        );
        assert_eq!(
            self.conn_opens(),
            self.conn_closes.load(Ordering::SeqCst),
            "connection opens/closes"
        );
    }

    pub fn close_order(&self) -> Vec<&'static str> {
        self.close_order.lock().clone()
    }

    /// Every successful write call, in order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().clone()
    }

    /// All bytes that reached the connection
    pub fn wire(&self) -> Vec<u8> {
        self.writes.lock().concat()
    }

    pub fn accepted_chunks(&self) -> Vec<Vec<i16>> {
        self.accepted.lock().clone()
    }

    pub fn submitted_pts(&self) -> Vec<u64> {
        self.submitted_pts.lock().clone()
    }

    fn record_close(&self, what: &'static str, counter: &AtomicUsize) -> bool {
        counter.fetch_add(1, Ordering::SeqCst);
        self.close_order.lock().push(what);
        self.fail_closes.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy)]
enum Pattern {
    Silence,
    /// Chunk `i` is filled with the value `i`
    Counting,
}

#[derive(Clone)]
pub struct FakeSourceOpener {
    ledger: Arc<Ledger>,
    chunks: usize,
    pattern: Pattern,
    stop_when_exhausted: bool,
    fail_when_exhausted: bool,
    fail_open: bool,
    pace: Option<Duration>,
}

impl FakeSourceOpener {
    pub fn silence(ledger: &Arc<Ledger>, chunks: usize) -> Self {
        Self {
            ledger: ledger.clone(),
            chunks,
            pattern: Pattern::Silence,
            stop_when_exhausted: false,
            fail_when_exhausted: false,
            fail_open: false,
            pace: None,
        }
    }

    pub fn counting(ledger: &Arc<Ledger>, chunks: usize) -> Self {
        Self {
            pattern: Pattern::Counting,
            ..Self::silence(ledger, chunks)
        }
    }

    /// Request a stop as the last chunk is handed out
    pub fn stop_when_exhausted(mut self) -> Self {
        self.stop_when_exhausted = true;
        self
    }

    /// Fail the read after the last chunk
    pub fn fail_when_exhausted(mut self) -> Self {
        self.fail_when_exhausted = true;
        self
    }

    pub fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn paced(mut self, interval: Duration) -> Self {
        self.pace = Some(interval);
        self
    }
}

impl SourceOpener for FakeSourceOpener {
    type Source = FakeSource;

    fn open(&self, _format: &PcmFormat) -> Result<FakeSource, DeviceError> {
        if self.fail_open {
            return Err(DeviceError::NotFound("fake microphone".into()));
        }
        self.ledger.source_opens.fetch_add(1, Ordering::SeqCst);
        Ok(FakeSource {
            script: self.clone(),
            served: 0,
        })
    }
}

pub struct FakeSource {
    script: FakeSourceOpener,
    served: usize,
}

impl AudioSource for FakeSource {
    fn read_into(&mut self, buf: &mut [i16]) -> Result<usize, DeviceError> {
        if let Some(pace) = self.script.pace {
            thread::sleep(pace);
        }

        if self.served == self.script.chunks {
            if self.script.fail_when_exhausted {
                return Err(DeviceError::ReadFailed("fake device unplugged".into()));
            }
            return Ok(0);
        }

        let value = match self.script.pattern {
            Pattern::Silence => 0,
            Pattern::Counting => self.served as i16,
        };
        buf.fill(value);
        self.served += 1;

        if self.served == self.script.chunks && self.script.stop_when_exhausted {
            self.script.ledger.request_stop();
        }
        Ok(buf.len())
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        let ledger = &self.script.ledger;
        if ledger.record_close("source", &ledger.source_closes) {
            return Err(DeviceError::CloseFailed("fake release failure".into()));
        }
        Ok(())
    }
}

/// Emits `units_per_chunk` units of `unit_len` bytes for every accepted chunk.
/// Unit `n` is filled with the byte `n`.
#[derive(Clone)]
pub struct FakeEncoderOpener {
    ledger: Arc<Ledger>,
    unit_len: usize,
    units_per_chunk: usize,
    reject_every_other: bool,
    fail_open: bool,
}

impl FakeEncoderOpener {
    pub fn echo(ledger: &Arc<Ledger>, unit_len: usize) -> Self {
        Self {
            ledger: ledger.clone(),
            unit_len,
            units_per_chunk: 1,
            reject_every_other: false,
            fail_open: false,
        }
    }

    pub fn units_per_chunk(mut self, units: usize) -> Self {
        self.units_per_chunk = units;
        self
    }

    /// Reject the 2nd, 4th, 6th... submit call
    pub fn reject_every_other(mut self) -> Self {
        self.reject_every_other = true;
        self
    }

    pub fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }
}

impl EncoderOpener for FakeEncoderOpener {
    type Encoder = FakeEncoder;

    fn open(&self, _config: &EncoderConfig) -> Result<FakeEncoder, EncoderError> {
        if self.fail_open {
            return Err(EncoderError::Init("fake codec unavailable".into()));
        }
        self.ledger.encoder_opens.fetch_add(1, Ordering::SeqCst);
        Ok(FakeEncoder {
            script: self.clone(),
            queue: VecDeque::new(),
            calls: 0,
            units: 0,
        })
    }
}

pub struct FakeEncoder {
    script: FakeEncoderOpener,
    queue: VecDeque<EncodedUnit>,
    calls: usize,
    units: u64,
}

impl AacEncoder for FakeEncoder {
    fn submit(&mut self, pcm: &[i16], pts_us: u64) -> Result<SubmitStatus, EncoderError> {
        let call = self.calls;
        self.calls += 1;
        if self.script.reject_every_other && call % 2 == 1 {
            return Ok(SubmitStatus::Rejected);
        }

        let ledger = &self.script.ledger;
        let accepted = {
            let mut accepted = ledger.accepted.lock();
            accepted.push(pcm.to_vec());
            accepted.len()
        };
        ledger.submitted_pts.lock().push(pts_us);

        for _ in 0..self.script.units_per_chunk {
            let payload = vec![self.units as u8; self.script.unit_len];
            self.queue.push_back(EncodedUnit::new(payload, self.units * 23_219));
            self.units += 1;
        }

        if let Some(limit) = *ledger.stop_after_accepted.lock() {
            if accepted >= limit {
                ledger.request_stop();
            }
        }
        Ok(SubmitStatus::Accepted)
    }

    fn poll_output(&mut self, _timeout: Duration) -> Result<Vec<EncodedUnit>, EncoderError> {
        Ok(self.queue.drain(..).collect())
    }

    fn close(&mut self) -> Result<(), EncoderError> {
        let ledger = &self.script.ledger;
        if ledger.record_close("encoder", &ledger.encoder_closes) {
            return Err(EncoderError::Output("fake close failure".into()));
        }
        Ok(())
    }
}

pub struct FakeConnector {
    ledger: Arc<Ledger>,
}

impl FakeConnector {
    pub fn new(ledger: &Arc<Ledger>) -> Self {
        Self {
            ledger: ledger.clone(),
        }
    }
}

impl Connector for FakeConnector {
    type Conn = FakeConn;

    fn connect(&self, host: &str, port: u16) -> Result<FakeConn, ConnectionError> {
        if self.ledger.fail_connect.load(Ordering::SeqCst) {
            return Err(ConnectionError::ConnectFailed(format!(
                "{}:{} refused",
                host, port
            )));
        }
        self.ledger.conn_opens.fetch_add(1, Ordering::SeqCst);
        Ok(FakeConn {
            ledger: self.ledger.clone(),
        })
    }
}

pub struct FakeConn {
    ledger: Arc<Ledger>,
}

impl Read for FakeConn {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Ok(0)
    }
}

impl Write for FakeConn {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut writes = self.ledger.writes.lock();
        if let Some(limit) = *self.ledger.fail_writes_after.lock() {
            if writes.len() >= limit {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "fake peer reset"));
            }
        }
        writes.push(buf.to_vec());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Connection for FakeConn {
    fn close(&mut self) -> io::Result<()> {
        let ledger = &self.ledger;
        if ledger.record_close("connection", &ledger.conn_closes) {
            return Err(io::Error::new(io::ErrorKind::Other, "fake close failure"));
        }
        Ok(())
    }
}
