//! Capture stream handler
//!
//! Adapts the subscription protocol onto an `AudioCaptureBridge`.

use super::channel::{ChannelError, StreamHandler};
use crate::audio::InputDevice;
use crate::bridge::{AudioCaptureBridge, EventSink};
use std::sync::Arc;

/// Error code for a capture that could not be started
pub const AUDIO_START_FAILED: &str = "AUDIO_START_FAILED";

/// Starts capture on listen, stops it on cancel
pub struct CaptureStreamHandler<D: InputDevice> {
    bridge: AudioCaptureBridge<D>,
}

impl<D: InputDevice> CaptureStreamHandler<D> {
    pub fn new(bridge: AudioCaptureBridge<D>) -> Self {
        Self { bridge }
    }

    pub fn bridge(&self) -> &AudioCaptureBridge<D> {
        &self.bridge
    }
}

impl<D: InputDevice> StreamHandler for CaptureStreamHandler<D> {
    fn on_listen(
        &self,
        _arguments: Option<&str>,
        sink: Arc<dyn EventSink>,
    ) -> Result<(), ChannelError> {
        self.bridge
            .start(sink)
            .map(|_| ())
            .map_err(|e| ChannelError::new(AUDIO_START_FAILED, e.to_string()))
    }

    fn on_cancel(&self, _arguments: Option<&str>) -> Result<(), ChannelError> {
        self.bridge.stop();
        Ok(())
    }
}
