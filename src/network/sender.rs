//! ADTS unit writer
//!
//! Writes one access unit at a time as `[7-byte header][payload]`, header
//! first, so units reach the wire strictly in the order they are handed in.

use std::io::Write;

use crate::codec::adts::AdtsFramer;
use crate::codec::EncodedUnit;
use crate::constants::ADTS_HEADER_LEN;
use crate::error::ConnectionError;

/// Frames encoded units onto an output stream
#[derive(Debug)]
pub struct AdtsSender {
    framer: AdtsFramer,
    units_sent: u64,
    bytes_sent: u64,
    last_pts: Option<u64>,
}

impl AdtsSender {
    /// Create a sender framing every unit with `framer`
    pub fn new(framer: AdtsFramer) -> Self {
        Self {
            framer,
            units_sent: 0,
            bytes_sent: 0,
            last_pts: None,
        }
    }

    /// Write one unit. Returns the number of bytes put on the wire.
    pub fn send<W: Write>(
        &mut self,
        out: &mut W,
        unit: &EncodedUnit,
    ) -> Result<usize, ConnectionError> {
        if let Some(last) = self.last_pts {
            if unit.pts_us < last {
                tracing::debug!("Unit pts went backwards: {} after {}", unit.pts_us, last);
            }
        }

        if !self.framer.fits(unit.len()) {
            return Err(ConnectionError::FrameTooLarge(unit.len()));
        }

        let header = self.framer.header(unit.len());
        out.write_all(&header)
            .and_then(|_| out.write_all(&unit.data))
            .map_err(|e| ConnectionError::SendFailed(e.to_string()))?;

        let written = ADTS_HEADER_LEN + unit.len();
        self.units_sent += 1;
        self.bytes_sent += written as u64;
        self.last_pts = Some(unit.pts_us);
        Ok(written)
    }

    /// Units written so far
    pub fn units_sent(&self) -> u64 {
        self.units_sent
    }

    /// Header and payload bytes written so far
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::adts::{parse_header, MAX_FRAME_LEN, MAX_PAYLOAD_LEN};
    use std::io;

    #[test]
    fn test_units_written_in_order() {
        let mut sender = AdtsSender::new(AdtsFramer::new(44100, 2).unwrap());
        let mut wire = Vec::new();

        for (i, len) in [10usize, 20, 5].into_iter().enumerate() {
            let unit = EncodedUnit::new(vec![i as u8; len], i as u64 * 23_219);
            assert_eq!(sender.send(&mut wire, &unit).unwrap(), len + 7);
        }

        let mut offset = 0;
        for (i, len) in [10usize, 20, 5].into_iter().enumerate() {
            let info = parse_header(&wire[offset..]).unwrap();
            assert_eq!(info.payload_len(), len);
            let payload = &wire[offset + 7..offset + 7 + len];
            assert!(payload.iter().all(|&b| b == i as u8));
            offset += 7 + len;
        }
        assert_eq!(offset, wire.len());
        assert_eq!(sender.units_sent(), 3);
        assert_eq!(sender.bytes_sent(), wire.len() as u64);
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_is_connection_error() {
        let mut sender = AdtsSender::new(AdtsFramer::new(44100, 2).unwrap());
        let result = sender.send(&mut Broken, &EncodedUnit::new(vec![0u8; 4], 0));
        assert!(matches!(result, Err(ConnectionError::SendFailed(_))));
        assert_eq!(sender.units_sent(), 0);
    }

    #[test]
    fn test_oversized_unit_is_refused_before_writing() {
        let mut sender = AdtsSender::new(AdtsFramer::new(44100, 2).unwrap());
        let mut wire = Vec::new();

        let largest = EncodedUnit::new(vec![0u8; MAX_PAYLOAD_LEN], 0);
        assert_eq!(sender.send(&mut wire, &largest).unwrap(), MAX_FRAME_LEN);
        assert_eq!(parse_header(&wire).unwrap().frame_len, MAX_FRAME_LEN);

        let oversized = EncodedUnit::new(vec![0u8; MAX_PAYLOAD_LEN + 1], 0);
        let result = sender.send(&mut wire, &oversized);
        assert!(matches!(
            result,
            Err(ConnectionError::FrameTooLarge(len)) if len == MAX_PAYLOAD_LEN + 1
        ));
        assert_eq!(wire.len(), MAX_FRAME_LEN);
        assert_eq!(sender.units_sent(), 1);
    }
}
