//! AuraShow audio capture
//!
//! Taps the microphone and streams fixed-size mono `f32` buffers to a
//! single subscriber, delivered off the real-time audio thread.

pub mod audio;
pub mod bridge;
pub mod ipc;

pub use audio::{InputDevice, InputFormat, MicrophoneError, MicrophoneInput, SyntheticInput};
pub use bridge::{
    AudioCaptureBridge, BridgeError, CaptureConfig, CaptureStats, CaptureStatus, EventSink,
};
pub use ipc::{CaptureStreamHandler, ChannelError, EventChannel, StreamHandler, CAPTURE_CHANNEL};
