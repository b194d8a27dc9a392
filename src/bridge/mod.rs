//! Capture bridge
//!
//! Moves buffers from the real-time audio thread to a single consumer.

mod capture;
mod dispatch;
mod registration;

pub use capture::{AudioCaptureBridge, BridgeError, CaptureConfig, CaptureStatus};
pub use dispatch::CaptureStats;
pub use registration::EventSink;
