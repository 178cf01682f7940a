//! AAC encoding and ADTS framing
//!
//! The encoder is a capability trait so any backend can be plugged in;
//! the ffmpeg-backed encoder is the one shipped with the binary.

pub mod adts;
pub mod encoder;
pub mod ffmpeg;

pub use adts::AdtsFramer;
pub use encoder::{AacEncoder, EncodedUnit, EncoderConfig, EncoderOpener, SubmitStatus};
pub use ffmpeg::{FfmpegEncoder, FfmpegOpener};
