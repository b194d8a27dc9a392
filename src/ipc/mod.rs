//! Subscription protocol
//!
//! Exposes capture as a named event stream with a single listener.

mod channel;
mod handler;

pub use channel::{ChannelError, EventChannel, StreamHandler, CAPTURE_CHANNEL};
pub use handler::{CaptureStreamHandler, AUDIO_START_FAILED};
