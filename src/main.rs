//! AuraShow capture - microphone streaming demo
//!
//! Registers the capture channel, subscribes a listener that logs input
//! levels, and streams until Ctrl-C.

use aurashow_capture::audio::AudioConfig;
use aurashow_capture::{
    AudioCaptureBridge, CaptureConfig, CaptureStreamHandler, EventChannel, InputDevice,
    MicrophoneInput, SyntheticInput, CAPTURE_CHANNEL,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aurashow_capture=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("AuraShow capture v{}", env!("CARGO_PKG_VERSION"));

    let devices = MicrophoneInput::list_devices();
    tracing::info!("Input devices: {:?}", devices);

    if std::env::var_os("AURASHOW_SYNTHETIC").is_some() {
        run(SyntheticInput::silence(44100, 1)).await
    } else {
        let config = AudioConfig {
            device_name: std::env::var("AURASHOW_INPUT_DEVICE").ok(),
        };
        run(MicrophoneInput::with_config(config)).await
    }
}

async fn run<D: InputDevice + 'static>(device: D) -> anyhow::Result<()> {
    let bridge = AudioCaptureBridge::new(device, CaptureConfig::default())?;
    let handler = Arc::new(CaptureStreamHandler::new(bridge));

    let channel = EventChannel::new(CAPTURE_CHANNEL);
    channel.set_stream_handler(Some(handler.clone()));

    let received = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&received);
    channel.listen(
        None,
        Arc::new(move |samples: Vec<f32>| {
            let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
            // Roughly once a second at 44.1kHz
            if n % 43 == 0 {
                let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
                tracing::info!("buffer #{}: {} frames, peak {:.3}", n, samples.len(), peak);
            }
        }),
    )?;

    tracing::info!(
        "Streaming on {} ({} frames per buffer), Ctrl-C to stop",
        channel.name(),
        handler.bridge().config().buffer_frames
    );
    tokio::signal::ctrl_c().await?;

    channel.cancel(None)?;
    let stats = handler.bridge().stats();
    tracing::info!(
        "Received {} buffers ({} dropped)",
        received.load(Ordering::Relaxed),
        stats.buffers_dropped
    );
    Ok(())
}
