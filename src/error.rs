//! Error types for the streaming pipeline

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("A streaming session is already active")]
    SessionActive,

    #[error("Invalid server target: {0}")]
    InvalidTarget(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capture device errors
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Failed to release device: {0}")]
    CloseFailed(String),
}

/// AAC encoder errors
#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("Encoder initialization failed: {0}")]
    Init(String),

    #[error("Unsupported sample rate: {0} Hz")]
    UnsupportedSampleRate(u32),

    #[error("Unsupported channel count: {0}")]
    UnsupportedChannels(u16),

    #[error("Submit failed: {0}")]
    Submit(String),

    #[error("Output failed: {0}")]
    Output(String),

    #[error("Encoder is closed")]
    Closed,
}

/// Network connection errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Address resolution failed for {0}")]
    Resolve(String),

    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Server rejected source: {0}")]
    Rejected(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("Close failed: {0}")]
    CloseFailed(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
