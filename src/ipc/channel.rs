//! Event channel subscription protocol
//!
//! A named stream with at most one listener. The host side calls `listen`
//! and `cancel`; the registered `StreamHandler` does the work.

use crate::bridge::EventSink;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Name the capture stream is registered under
pub const CAPTURE_CHANNEL: &str = "com.aurashow.audio/capture";

/// Error returned across the channel boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ChannelError {
    pub code: String,
    pub message: String,
}

impl ChannelError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Handles subscriptions for one channel
pub trait StreamHandler: Send + Sync {
    /// A listener subscribed; events go to `sink` until `on_cancel`.
    fn on_listen(&self, arguments: Option<&str>, sink: Arc<dyn EventSink>)
        -> Result<(), ChannelError>;

    /// The listener went away.
    fn on_cancel(&self, arguments: Option<&str>) -> Result<(), ChannelError>;
}

/// Named event stream with a single listener
pub struct EventChannel {
    name: String,
    handler: Mutex<Option<Arc<dyn StreamHandler>>>,
    // No lock is held across handler calls, so a sink may cancel from
    // inside its own delivery.
    listening: AtomicBool,
}

impl EventChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handler: Mutex::new(None),
            listening: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Installs or removes the handler. An active listener is cancelled first.
    pub fn set_stream_handler(&self, handler: Option<Arc<dyn StreamHandler>>) {
        if let Err(e) = self.cancel(None) {
            tracing::warn!("[{}] cancel on handler change failed: {}", self.name, e);
        }
        *self.handler.lock() = handler;
    }

    /// Subscribes `sink`. A previous listener is cancelled first: last one wins.
    pub fn listen(
        &self,
        arguments: Option<&str>,
        sink: Arc<dyn EventSink>,
    ) -> Result<(), ChannelError> {
        let handler = self.handler()?;

        if self.listening.swap(false, Ordering::AcqRel) {
            tracing::debug!("[{}] replacing active listener", self.name);
            if let Err(e) = handler.on_cancel(None) {
                tracing::warn!("[{}] cancel of previous listener failed: {}", self.name, e);
            }
        }

        // Marked before the handler runs: the sink may cancel on its first event.
        self.listening.store(true, Ordering::Release);
        if let Err(e) = handler.on_listen(arguments, sink) {
            self.listening.store(false, Ordering::Release);
            return Err(e);
        }
        tracing::debug!("[{}] listening", self.name);
        Ok(())
    }

    /// Cancels the active listener. No-op without one.
    pub fn cancel(&self, arguments: Option<&str>) -> Result<(), ChannelError> {
        if !self.listening.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let handler = self.handler()?;
        handler.on_cancel(arguments)?;
        tracing::debug!("[{}] cancelled", self.name);
        Ok(())
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }

    fn handler(&self) -> Result<Arc<dyn StreamHandler>, ChannelError> {
        self.handler.lock().clone().ok_or_else(|| {
            ChannelError::new("NO_HANDLER", format!("no stream handler on {}", self.name))
        })
    }
}
