//! Audio capture from microphone
//!
//! Uses cpal for cross-platform capture. The stream lives on a dedicated
//! thread because cpal streams are not `Send` on every platform.

use super::device::{InputDevice, InputFormat, InputTap, RawDataCallback, SampleFormat};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample, Stream, StreamConfig};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Audio configuration for capture
#[derive(Debug, Clone, Default)]
pub struct AudioConfig {
    /// Input device to open by name; `None` uses the system default input
    pub device_name: Option<String>,
}

/// Microphone capture errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MicrophoneError {
    #[error("No audio device found")]
    NoDevice,

    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Audio thread error: {0}")]
    ThreadError(String),
}

/// Commands to control the audio thread
enum AudioCommand {
    Stop,
}

/// Microphone input backed by the platform audio host
pub struct MicrophoneInput {
    config: AudioConfig,
}

impl MicrophoneInput {
    /// Default system input
    pub fn new() -> Self {
        Self::with_config(AudioConfig::default())
    }

    pub fn with_config(config: AudioConfig) -> Self {
        Self { config }
    }

    /// List available input devices
    pub fn list_devices() -> Vec<String> {
        let host = cpal::default_host();
        host.input_devices()
            .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
            .unwrap_or_default()
    }
}

impl Default for MicrophoneInput {
    fn default() -> Self {
        Self::new()
    }
}

impl InputDevice for MicrophoneInput {
    fn name(&self) -> String {
        self.config
            .device_name
            .clone()
            .unwrap_or_else(|| "default input".to_string())
    }

    fn open(&self, on_data: RawDataCallback) -> Result<Box<dyn InputTap>, MicrophoneError> {
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let device_name = self.config.device_name.clone();

        let thread_handle = thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || run_audio_capture(device_name, on_data, ready_tx, command_rx))
            .map_err(|e| MicrophoneError::ThreadError(e.to_string()))?;

        // The thread reports once the stream is playing, or why it is not.
        let format = match ready_rx.recv() {
            Ok(Ok(format)) => format,
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread_handle.join();
                return Err(MicrophoneError::ThreadError(
                    "audio thread exited before reporting".to_string(),
                ));
            }
        };

        Ok(Box::new(MicrophoneTap {
            command_tx,
            thread_handle: Some(thread_handle),
            format,
        }))
    }
}

/// Handle to a running microphone stream
struct MicrophoneTap {
    command_tx: mpsc::Sender<AudioCommand>,
    thread_handle: Option<JoinHandle<()>>,
    format: InputFormat,
}

impl InputTap for MicrophoneTap {
    fn format(&self) -> InputFormat {
        self.format
    }

    fn stop(&mut self) {
        let _ = self.command_tx.send(AudioCommand::Stop);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MicrophoneTap {
    fn drop(&mut self) {
        self.stop();
    }
}

fn find_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device, MicrophoneError> {
    match name {
        None => host.default_input_device().ok_or(MicrophoneError::NoDevice),
        Some(name) => host
            .input_devices()
            .map_err(|e| MicrophoneError::ConfigError(e.to_string()))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| MicrophoneError::DeviceNotFound(name.to_string())),
    }
}

/// Opens the device at its native format and starts the stream
fn open_stream(
    device_name: Option<&str>,
    on_data: RawDataCallback,
) -> Result<(Stream, InputFormat), MicrophoneError> {
    let host = cpal::default_host();
    let device = find_device(&host, device_name)?;

    tracing::info!("Audio device: {:?}", device.name());

    // Use the device's default configuration, no resampling
    let supported_config = device
        .default_input_config()
        .map_err(|e| MicrophoneError::ConfigError(e.to_string()))?;

    let sample_format = match supported_config.sample_format() {
        cpal::SampleFormat::F32 => SampleFormat::F32,
        cpal::SampleFormat::I16 => SampleFormat::I16,
        cpal::SampleFormat::U16 => SampleFormat::U16,
        other => return Err(MicrophoneError::UnsupportedFormat(format!("{:?}", other))),
    };

    let format = InputFormat {
        sample_rate: supported_config.sample_rate().0,
        channels: supported_config.channels(),
        sample_format,
    };
    let stream_config: StreamConfig = supported_config.into();

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, on_data)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, on_data)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, on_data)?,
    };

    stream
        .play()
        .map_err(|e| MicrophoneError::StreamError(e.to_string()))?;

    Ok((stream, format))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut on_data: RawDataCallback,
) -> Result<Stream, MicrophoneError>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let channels = config.channels;
    let mut converted: Vec<f32> = Vec::new();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                converted.clear();
                converted.extend(data.iter().map(|&s| s.to_sample::<f32>()));
                on_data(&converted, channels);
            },
            |err| {
                tracing::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| MicrophoneError::StreamError(e.to_string()))
}

/// Run audio capture (in a dedicated thread)
fn run_audio_capture(
    device_name: Option<String>,
    on_data: RawDataCallback,
    ready_tx: mpsc::Sender<Result<InputFormat, MicrophoneError>>,
    command_rx: mpsc::Receiver<AudioCommand>,
) {
    let stream = match open_stream(device_name.as_deref(), on_data) {
        Ok((stream, format)) => {
            tracing::info!("Audio capture started: {}", format);
            let _ = ready_tx.send(Ok(format));
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    // Wait for stop signal
    match command_rx.recv() {
        Ok(AudioCommand::Stop) | Err(mpsc::RecvError) => {}
    }

    if let Err(e) = stream.pause() {
        tracing::warn!("Failed to pause audio stream: {}", e);
    }
    drop(stream);
    tracing::info!("Audio capture stopped");
}
