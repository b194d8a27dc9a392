//! Input device abstraction
//!
//! A device is opened in a single step: either a fully started tap comes
//! back, or an error does. There is no half-initialized engine state.

use super::MicrophoneError;
use std::fmt;

/// Callback receiving raw interleaved `f32` data and its channel count.
///
/// Invoked on the device's real-time thread. Must not block.
pub type RawDataCallback = Box<dyn FnMut(&[f32], u16) + Send + 'static>;

/// Native sample format reported by a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    F32,
    I16,
    U16,
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampleFormat::F32 => "f32",
            SampleFormat::I16 => "i16",
            SampleFormat::U16 => "u16",
        };
        f.write_str(name)
    }
}

/// Format of an open input stream, as chosen by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz {}ch {}",
            self.sample_rate, self.channels, self.sample_format
        )
    }
}

/// A source of captured audio
pub trait InputDevice: Send + Sync {
    /// Human readable device name
    fn name(&self) -> String;

    /// Opens the device at its native format and starts streaming into `on_data`.
    fn open(&self, on_data: RawDataCallback) -> Result<Box<dyn InputTap>, MicrophoneError>;
}

/// A running tap on an input device
pub trait InputTap: Send {
    /// Format the device is delivering
    fn format(&self) -> InputFormat;

    /// Halts the device and removes the tap. Calling it twice is a no-op.
    fn stop(&mut self);
}
