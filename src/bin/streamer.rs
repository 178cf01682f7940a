//! Icecast Streamer Application
//!
//! Captures audio, encodes it to AAC-LC and publishes it to an Icecast mount
//! until Ctrl+C.
//!
//! Usage: `streamer [config.toml]`. Without an argument the platform config
//! location is used, falling back to built-in defaults.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use icecast_aac_streamer::{
    audio::{SourceOpener, ToneOpener},
    codec::FfmpegOpener,
    config::{AppConfig, CaptureBackend},
    network::TcpConnector,
    session::{ServerTarget, SessionSettings, StreamingSession},
};

/// How often running totals are logged
const STATS_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Icecast AAC streamer");

    let config = match std::env::args().nth(1) {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path);
            AppConfig::load(&path)?
        }
        None => AppConfig::load_or_default()?,
    };

    let target = ServerTarget::from_config(&config.server)?;
    tracing::info!("Target mount: {}", target);

    match config.audio.backend {
        CaptureBackend::Tone => {
            let sources = ToneOpener::new(config.audio.tone_hz);
            stream(&config, target, sources).await
        }
        CaptureBackend::Cpal => {
            #[cfg(feature = "capture")]
            {
                use icecast_aac_streamer::audio::{list_input_devices, CpalOpener};

                println!("\n=== Available Input Devices ===");
                for device in list_input_devices() {
                    let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
                    println!("  {}{}", device.name, default_marker);
                    println!("    Sample rates: {:?}", device.sample_rates);
                    println!("    Channels: {:?}", device.channels);
                }
                println!();

                let sources = CpalOpener {
                    device: config.audio.device.clone(),
                    buffer_frames: None,
                };
                stream(&config, target, sources).await
            }
            #[cfg(not(feature = "capture"))]
            {
                anyhow::bail!(
                    "audio.backend = \"cpal\" needs a build with the `capture` feature; \
                     use backend = \"tone\" or rebuild with --features capture"
                )
            }
        }
    }
}

async fn stream<S>(config: &AppConfig, target: ServerTarget, sources: S) -> Result<()>
where
    S: SourceOpener + Send + Sync + 'static,
{
    let session = Arc::new(StreamingSession::new(
        SessionSettings::from_config(config),
        sources,
        FfmpegOpener::from_settings(&config.encoder),
        TcpConnector::new(config.stream.connect_timeout()),
    ));
    let control = session.control();

    // The pump blocks, so it gets a thread of its own
    let mut pump = tokio::task::spawn_blocking(move || session.run(&target));
    let mut stats_tick = tokio::time::interval(STATS_INTERVAL);
    stats_tick.tick().await;

    tracing::info!("Streaming - press Ctrl+C to stop");

    loop {
        tokio::select! {
            result = &mut pump => {
                return Ok(result??);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, stopping");
                let stopper = control.clone();
                tokio::task::spawn_blocking(move || stopper.stop()).await?;
                return Ok(pump.await??);
            }
            _ = stats_tick.tick() => {
                let stats = control.stats();
                tracing::info!(
                    "Stats: {} chunks captured, {} units sent, {:.1} KB sent, {} submit retries",
                    stats.chunks_read,
                    stats.units_sent,
                    stats.bytes_sent as f64 / 1024.0,
                    stats.submit_retries
                );
            }
        }
    }
}
