//! ADTS framing for raw AAC access units
//!
//! Each access unit written to the server is prefixed with a 7-byte ADTS
//! header (no CRC) so players can find frame boundaries in the byte stream.
//!
//! ```text
//!  byte 0    byte 1    byte 2    byte 3    byte 4    byte 5    byte 6
//! AAAAAAAA  AAAABCCD  EEFFFFGH  HHIJKLMM  MMMMMMMM  MMMOOOOO  OOOOOOPP
//!
//! A sync word 0xFFF      B MPEG version (1 = MPEG-2)   C layer (00)
//! D protection absent    E profile (object type - 1)   F sampling frequency index
//! G private bit          H channel configuration       I..L originality/copyright bits
//! M frame length (header + payload)                    O buffer fullness (0x7FF = VBR)
//! P raw data blocks in frame - 1
//! ```

use bytes::Bytes;
use std::io::{self, Read};

use crate::constants::ADTS_HEADER_LEN;
use crate::error::EncoderError;

/// ADTS sampling frequency table, indexed by the 4-bit header field
pub const SAMPLING_FREQUENCIES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Largest value the 13-bit frame length field can carry
pub const MAX_FRAME_LEN: usize = 0x1FFF;

/// Largest access unit one ADTS frame can carry
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - ADTS_HEADER_LEN;

const SYNC_WORD: u16 = 0xFFF;
const PROFILE_LC: u8 = 1;
const HEADER_LEN_WITH_CRC: usize = 9;

/// Look up the sampling frequency index for a sample rate
pub fn sampling_frequency_index(sample_rate: u32) -> Option<u8> {
    SAMPLING_FREQUENCIES
        .iter()
        .position(|&rate| rate == sample_rate)
        .map(|index| index as u8)
}

/// Builds ADTS headers for one fixed stream configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsFramer {
    frequency_index: u8,
    channel_config: u8,
}

impl AdtsFramer {
    /// Derive the fixed header fields from the stream parameters
    pub fn new(sample_rate: u32, channels: u16) -> Result<Self, EncoderError> {
        let frequency_index = sampling_frequency_index(sample_rate)
            .ok_or(EncoderError::UnsupportedSampleRate(sample_rate))?;

        // Channel configurations 1..=7 are the only ones expressible without a PCE
        if !(1..=7).contains(&channels) {
            return Err(EncoderError::UnsupportedChannels(channels));
        }

        Ok(Self {
            frequency_index,
            channel_config: channels as u8,
        })
    }

    /// Header for an access unit of `payload_len` bytes.
    ///
    /// `payload_len` must not exceed [`MAX_PAYLOAD_LEN`]; check with
    /// [`fits`](Self::fits) first when the unit size is not known to be bounded.
    pub fn header(&self, payload_len: usize) -> [u8; ADTS_HEADER_LEN] {
        let frame_len = payload_len + ADTS_HEADER_LEN;
        debug_assert!(frame_len <= MAX_FRAME_LEN, "ADTS frame too large: {}", frame_len);
        let frame_len = frame_len & MAX_FRAME_LEN;

        [
            0xFF,
            0xF9,
            (PROFILE_LC << 6) | (self.frequency_index << 2) | (self.channel_config >> 2),
            ((self.channel_config & 0x3) << 6) | (frame_len >> 11) as u8,
            ((frame_len >> 3) & 0xFF) as u8,
            (((frame_len & 0x7) << 5) as u8) | 0x1F,
            0xFC,
        ]
    }

    /// Whether a unit of `payload_len` bytes fits the 13-bit frame length field
    pub fn fits(&self, payload_len: usize) -> bool {
        payload_len <= MAX_PAYLOAD_LEN
    }

    /// Sample rate encoded in the frequency index
    pub fn sample_rate(&self) -> u32 {
        SAMPLING_FREQUENCIES[self.frequency_index as usize]
    }

    /// Channel configuration, which equals the channel count for 1..=7
    pub fn channels(&self) -> u16 {
        self.channel_config as u16
    }
}

/// Build a single header without keeping a framer around
pub fn header(
    payload_len: usize,
    sample_rate: u32,
    channels: u16,
) -> Result<[u8; ADTS_HEADER_LEN], EncoderError> {
    Ok(AdtsFramer::new(sample_rate, channels)?.header(payload_len))
}

/// Decoded ADTS header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeaderInfo {
    /// ID bit: set for MPEG-2, clear for MPEG-4
    pub mpeg2: bool,
    /// Set when no CRC follows the header
    pub protection_absent: bool,
    /// Audio object type minus one (1 = LC)
    pub profile: u8,
    /// Index into the sampling frequency table
    pub frequency_index: u8,
    /// Channel configuration (0 means a PCE carries it)
    pub channel_config: u8,
    /// Header plus payload
    pub frame_len: usize,
    /// 0x7FF signals a variable bitrate stream
    pub buffer_fullness: u16,
    /// Raw data blocks in the frame minus one
    pub raw_blocks: u8,
}

impl AdtsHeaderInfo {
    /// Header size including the CRC when present
    pub fn header_len(&self) -> usize {
        if self.protection_absent {
            ADTS_HEADER_LEN
        } else {
            HEADER_LEN_WITH_CRC
        }
    }

    /// Access unit size in bytes
    pub fn payload_len(&self) -> usize {
        self.frame_len.saturating_sub(self.header_len())
    }

    /// Sample rate, if the index is not reserved
    pub fn sample_rate(&self) -> Option<u32> {
        SAMPLING_FREQUENCIES.get(self.frequency_index as usize).copied()
    }
}

/// Parse the first 7 bytes of an ADTS frame
pub fn parse_header(bytes: &[u8]) -> Option<AdtsHeaderInfo> {
    if bytes.len() < ADTS_HEADER_LEN {
        return None;
    }

    let sync = ((bytes[0] as u16) << 4) | ((bytes[1] as u16) >> 4);
    if sync != SYNC_WORD {
        return None;
    }

    Some(AdtsHeaderInfo {
        mpeg2: bytes[1] & 0x08 != 0,
        protection_absent: bytes[1] & 0x01 != 0,
        profile: bytes[2] >> 6,
        frequency_index: (bytes[2] >> 2) & 0x0F,
        channel_config: ((bytes[2] & 0x01) << 2) | (bytes[3] >> 6),
        frame_len: (((bytes[3] & 0x03) as usize) << 11)
            | ((bytes[4] as usize) << 3)
            | ((bytes[5] as usize) >> 5),
        buffer_fullness: (((bytes[5] & 0x1F) as u16) << 6) | ((bytes[6] as u16) >> 2),
        raw_blocks: bytes[6] & 0x03,
    })
}

/// One frame pulled off an ADTS byte stream
#[derive(Debug, Clone)]
pub struct AdtsFrame {
    /// Parsed header fields
    pub info: AdtsHeaderInfo,
    /// Raw access unit, header (and CRC) stripped
    pub payload: Bytes,
}

/// Read the next complete ADTS frame from a stream.
///
/// Returns `Ok(None)` on a clean end of stream between frames.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Option<AdtsFrame>> {
    let mut head = [0u8; ADTS_HEADER_LEN];
    let filled = read_full(reader, &mut head)?;
    if filled == 0 {
        return Ok(None);
    }
    if filled < head.len() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "truncated ADTS header",
        ));
    }

    let info = parse_header(&head)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "lost ADTS sync"))?;
    if info.frame_len < info.header_len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("ADTS frame length {} shorter than header", info.frame_len),
        ));
    }

    if !info.protection_absent {
        let mut crc = [0u8; HEADER_LEN_WITH_CRC - ADTS_HEADER_LEN];
        reader.read_exact(&mut crc)?;
    }

    let mut payload = vec![0u8; info.payload_len()];
    reader.read_exact(&mut payload)?;

    Ok(Some(AdtsFrame {
        info,
        payload: Bytes::from(payload),
    }))
}

/// Fill `buf` until it is full or the reader hits EOF
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
