//! Application configuration
//!
//! Loaded from a TOML file. Every section has defaults so a partial file
//! (or no file at all) still yields a usable configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Icecast server and mount
    pub server: ServerConfig,
    /// Capture settings
    pub audio: AudioConfig,
    /// Encoder settings
    pub encoder: EncoderSettings,
    /// Session and protocol settings
    pub stream: StreamSettings,
}

/// Icecast server coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host name or address
    pub host: String,
    /// Server TCP port
    pub port: u16,
    /// Mount point, with or without a leading slash
    pub mount: String,
    /// Source password
    pub password: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_SERVER_PORT,
            mount: "live.aac".to_string(),
            password: String::new(),
        }
    }
}

/// Which capture backend feeds the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureBackend {
    /// Default microphone through cpal (requires the `capture` feature)
    Cpal,
    /// Synthetic sine tone
    Tone,
}

/// Capture settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Where samples come from
    pub backend: CaptureBackend,
    /// Input device name; `None` picks the host default
    pub device: Option<String>,
    /// Capture sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
    /// Capture chunk size in interleaved samples
    pub chunk_samples: usize,
    /// Tone frequency for the `tone` backend
    pub tone_hz: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            backend: if cfg!(feature = "capture") {
                CaptureBackend::Cpal
            } else {
                CaptureBackend::Tone
            },
            device: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            chunk_samples: DEFAULT_CHUNK_SAMPLES,
            tone_hz: 440.0,
        }
    }
}

/// AAC encoder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    /// Target bitrate in bits per second
    pub bitrate: u32,
    /// Path or name of the ffmpeg executable
    pub ffmpeg_path: PathBuf,
    /// Chunks queued for the encoder before submissions are refused
    pub input_queue: usize,
    /// Encoded frames buffered before the encoder stalls
    pub output_queue: usize,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            bitrate: DEFAULT_BITRATE,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            input_queue: ENCODER_INPUT_QUEUE,
            output_queue: ENCODER_OUTPUT_QUEUE,
        }
    }
}

/// Session and protocol settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Value of the `Ice-Name` header
    pub ice_name: String,
    /// Encoder poll timeout in milliseconds
    pub poll_timeout_ms: u64,
    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Read and check the server's response to the source request
    pub verify_response: bool,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            ice_name: DEFAULT_ICE_NAME.to_string(),
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            verify_response: false,
        }
    }
}

impl StreamSettings {
    /// Poll timeout as a `Duration`
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Connect timeout as a `Duration`
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl AppConfig {
    /// Parse configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&text)
    }

    /// Load from the default location, falling back to defaults when absent
    pub fn load_or_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::info!("Loading configuration from {}", path.display());
                Self::load(path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Write configuration as TOML, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Platform config location, e.g. `~/.config/icecast-aac-streamer/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "icecast-aac-streamer")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Check values that would otherwise fail deep inside the pipeline
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(Error::Config("audio.sample_rate must be positive".into()));
        }
        if !(1..=2).contains(&self.audio.channels) {
            return Err(Error::Config(format!(
                "audio.channels must be 1 or 2, got {}",
                self.audio.channels
            )));
        }
        if self.audio.chunk_samples == 0
            || self.audio.chunk_samples % self.audio.channels as usize != 0
        {
            return Err(Error::Config(format!(
                "audio.chunk_samples must be a positive multiple of the channel count, got {}",
                self.audio.chunk_samples
            )));
        }
        if self.encoder.bitrate == 0 {
            return Err(Error::Config("encoder.bitrate must be positive".into()));
        }
        if self.encoder.input_queue == 0 || self.encoder.output_queue == 0 {
            return Err(Error::Config("encoder queues must hold at least one entry".into()));
        }
        if self.stream.ice_name.contains(['\r', '\n']) {
            return Err(Error::Config("stream.ice_name must be a single line".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.audio.sample_rate, 44_100);
        assert_eq!(config.audio.channels, 2);
        assert_eq!(config.encoder.bitrate, 128_000);
        assert!(!config.stream.verify_response);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [server]
            host = "radio.example.org"
            password = "hackme"

            [audio]
            backend = "tone"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.host, "radio.example.org");
        assert_eq!(config.server.port, DEFAULT_SERVER_PORT);
        assert_eq!(config.server.password, "hackme");
        assert_eq!(config.audio.backend, CaptureBackend::Tone);
        assert_eq!(config.audio.chunk_samples, DEFAULT_CHUNK_SAMPLES);
        assert_eq!(config.stream.poll_timeout(), Duration::from_millis(2));
    }

    #[test]
    fn test_rejects_odd_chunk_for_stereo() {
        let result = AppConfig::from_toml(
            r#"
            [audio]
            chunk_samples = 1023
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_multiline_ice_name() {
        let mut config = AppConfig::default();
        config.stream.ice_name = "evil\r\nIce-Public: 1".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("icecast-aac-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.toml");

        let mut config = AppConfig::default();
        config.server.mount = "studio".into();
        config.stream.verify_response = true;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);

        std::fs::remove_dir_all(dir).unwrap();
    }
}
