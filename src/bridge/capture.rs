//! Audio capture bridge
//!
//! Owns the capture session and the consumer registration. A session exists
//! exactly while a consumer is registered.

use super::dispatch::{CaptureStats, Delivery, MainContext, StatsCounters};
use super::registration::{EventSink, Registration};
use crate::audio::{
    FrameAssembler, InputDevice, InputFormat, InputTap, MicrophoneError, RawDataCallback,
};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;

/// Bridge configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Frames per delivered buffer
    pub buffer_frames: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            buffer_frames: 1024, // ~23ms @ 44.1kHz
        }
    }
}

/// Bridge errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Audio error: {0}")]
    Audio(#[from] MicrophoneError),

    #[error("Invalid buffer size: {0} frames")]
    InvalidBufferSize(usize),

    #[error("No tokio runtime to deliver buffers on")]
    NoRuntime,
}

/// Bridge state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureStatus {
    /// No consumer, no session
    Idle,
    /// Streaming to a consumer
    Capturing { device: String, format: InputFormat },
}

struct Session {
    token: u64,
    tap: Box<dyn InputTap>,
    format: InputFormat,
}

/// Streams fixed-size mono buffers from an input device to one consumer
///
/// The session lock is never held while the registration lock is taken,
/// so a sink may call `start` or `stop` from inside its own delivery.
pub struct AudioCaptureBridge<D: InputDevice> {
    device: D,
    config: CaptureConfig,
    registration: Arc<Registration>,
    stats: Arc<StatsCounters>,
    context: MainContext,
    session: Mutex<Option<Session>>,
}

impl<D: InputDevice> AudioCaptureBridge<D> {
    /// Creates an idle bridge delivering on the current tokio runtime.
    pub fn new(device: D, config: CaptureConfig) -> Result<Self, BridgeError> {
        let handle = Handle::try_current().map_err(|_| BridgeError::NoRuntime)?;
        Self::with_handle(device, config, handle)
    }

    /// Creates an idle bridge delivering on `handle`'s runtime.
    pub fn with_handle(
        device: D,
        config: CaptureConfig,
        handle: Handle,
    ) -> Result<Self, BridgeError> {
        if config.buffer_frames == 0 {
            return Err(BridgeError::InvalidBufferSize(config.buffer_frames));
        }

        let registration = Arc::new(Registration::new());
        let stats = Arc::new(StatsCounters::default());
        let context =
            MainContext::spawn(&handle, Arc::clone(&registration), Arc::clone(&stats));

        Ok(Self {
            device,
            config,
            registration,
            stats,
            context,
            session: Mutex::new(None),
        })
    }

    /// Starts streaming to `sink`, replacing any running session.
    pub fn start(&self, sink: Arc<dyn EventSink>) -> Result<InputFormat, BridgeError> {
        let previous = self.session.lock().take();
        if let Some(previous) = previous {
            tracing::debug!("Replacing running capture session");
            self.teardown(previous);
        }

        let token = self.registration.bind(sink);
        let tap = match self.device.open(self.buffer_callback(token)) {
            Ok(tap) => tap,
            Err(e) => {
                self.registration.unbind(token);
                tracing::error!("Failed to start audio capture: {}", e);
                return Err(e.into());
            }
        };

        let format = tap.format();
        let mut session = Session { token, tap, format };

        let replaced = {
            let mut current = self.session.lock();
            // A concurrent start bound another consumer meanwhile
            if !self.registration.is_live(token) {
                drop(current);
                tracing::debug!("Capture session superseded before it started");
                session.tap.stop();
                return Ok(format);
            }
            current.replace(session)
        };
        if let Some(replaced) = replaced {
            self.teardown(replaced);
        }

        tracing::info!(
            "Capture started on {}: {}, {} frames per buffer",
            self.device.name(),
            format,
            self.config.buffer_frames
        );
        Ok(format)
    }

    /// Stops streaming and unbinds the consumer. No-op when idle.
    pub fn stop(&self) {
        let previous = self.session.lock().take();
        match previous {
            Some(previous) => self.teardown(previous),
            None => tracing::debug!("Stop requested while idle"),
        }
    }

    pub fn is_running(&self) -> bool {
        self.session.lock().is_some()
    }

    pub fn status(&self) -> CaptureStatus {
        match self.session.lock().as_ref() {
            Some(session) => CaptureStatus::Capturing {
                device: self.device.name(),
                format: session.format,
            },
            None => CaptureStatus::Idle,
        }
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats.snapshot()
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Unbind first, so nothing queued from here on reaches the consumer.
    fn teardown(&self, mut session: Session) {
        self.registration.unbind(session.token);
        session.tap.stop();

        let stats = self.stats.snapshot();
        tracing::info!(
            "Capture stopped ({} captured, {} delivered, {} dropped)",
            stats.buffers_captured,
            stats.buffers_delivered,
            stats.buffers_dropped
        );
    }

    /// Per-session audio thread callback: frame, check liveness, enqueue.
    fn buffer_callback(&self, token: u64) -> RawDataCallback {
        let mut framer = FrameAssembler::new(self.config.buffer_frames);
        let registration = Arc::clone(&self.registration);
        let stats = Arc::clone(&self.stats);
        let tx = self.context.sender();

        Box::new(move |data: &[f32], channels: u16| {
            framer.push(data, channels, |samples| {
                stats.captured();
                let live = registration.is_live(token);
                if !live || tx.send(Delivery { token, samples }).is_err() {
                    stats.dropped();
                }
            });
        })
    }
}

impl<D: InputDevice> Drop for AudioCaptureBridge<D> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SyntheticInput;
    use crate::bridge::registration::MockEventSink;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{OnceLock, Weak};
    use tokio::sync::mpsc;
    use tokio::time::{sleep, timeout, Duration, Instant};

    fn channel_sink() -> (Arc<dyn EventSink>, mpsc::UnboundedReceiver<Vec<f32>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink: Arc<dyn EventSink> = Arc::new(move |samples: Vec<f32>| {
            let _ = tx.send(samples);
        });
        (sink, rx)
    }

    fn counting_sink() -> (Arc<dyn EventSink>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let sink: Arc<dyn EventSink> = Arc::new(move |_: Vec<f32>| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (sink, count)
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            sleep(Duration::from_millis(2)).await;
        }
    }

    struct FailingDevice;

    impl InputDevice for FailingDevice {
        fn name(&self) -> String {
            "broken".to_string()
        }

        fn open(&self, _: RawDataCallback) -> Result<Box<dyn InputTap>, MicrophoneError> {
            Err(MicrophoneError::NoDevice)
        }
    }

    /// Tracks how many taps are open at once
    struct CountingDevice {
        inner: SyntheticInput,
        open_taps: Arc<AtomicUsize>,
    }

    struct CountingTap {
        inner: Box<dyn InputTap>,
        open_taps: Option<Arc<AtomicUsize>>,
    }

    impl InputDevice for CountingDevice {
        fn name(&self) -> String {
            self.inner.name()
        }

        fn open(&self, on_data: RawDataCallback) -> Result<Box<dyn InputTap>, MicrophoneError> {
            let inner = self.inner.open(on_data)?;
            self.open_taps.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingTap {
                inner,
                open_taps: Some(Arc::clone(&self.open_taps)),
            }))
        }
    }

    impl InputTap for CountingTap {
        fn format(&self) -> InputFormat {
            self.inner.format()
        }

        fn stop(&mut self) {
            self.inner.stop();
            if let Some(open_taps) = self.open_taps.take() {
                open_taps.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn three_silent_buffers_then_cancel() {
        let device = SyntheticInput::silence(44100, 1).with_max_chunks(3);
        let bridge = AudioCaptureBridge::new(device, CaptureConfig::default()).unwrap();
        let (sink, mut rx) = channel_sink();

        let format = bridge.start(sink).unwrap();
        assert_eq!(format.sample_rate, 44100);
        assert_eq!(format.channels, 1);

        for _ in 0..3 {
            let buffer = timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(buffer.len(), 1024);
            assert!(buffer.iter().all(|&s| s == 0.0));
        }

        bridge.stop();
        sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(bridge.stats().buffers_delivered, 3);
        assert_eq!(bridge.status(), CaptureStatus::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn buffers_arrive_in_capture_order() {
        // Odd chunk size so buffers straddle driver callbacks
        let device = SyntheticInput::silence(48000, 2)
            .with_chunk_frames(300)
            .with_max_chunks(50)
            .with_generator(|frame| frame as f32)
            .unpaced();
        let bridge = AudioCaptureBridge::new(device, CaptureConfig::default()).unwrap();
        let (sink, mut rx) = channel_sink();

        bridge.start(sink).unwrap();

        // 50 * 300 = 15000 frames -> 14 full buffers
        for k in 0..14u32 {
            let buffer = timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(buffer.len(), 1024);
            let first = (k * 1024) as f32;
            assert_eq!(buffer[0], first);
            assert_eq!(buffer[1023], first + 1023.0);
        }

        bridge.stop();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn nothing_delivered_after_stop() {
        let device = SyntheticInput::silence(44100, 1).with_chunk_frames(64);
        let bridge = AudioCaptureBridge::new(device, CaptureConfig { buffer_frames: 64 }).unwrap();
        let (sink, count) = counting_sink();

        bridge.start(sink).unwrap();
        wait_until(|| count.load(Ordering::SeqCst) >= 5).await;

        bridge.stop();
        let at_stop = count.load(Ordering::SeqCst);
        sleep(Duration::from_millis(100)).await;

        assert_eq!(count.load(Ordering::SeqCst), at_stop);
        assert!(!bridge.is_running());
    }

    #[tokio::test]
    async fn stop_when_idle_is_noop() {
        let bridge =
            AudioCaptureBridge::new(SyntheticInput::silence(44100, 1), CaptureConfig::default())
                .unwrap();
        bridge.stop();
        bridge.stop();
        assert_eq!(bridge.status(), CaptureStatus::Idle);
        assert_eq!(bridge.stats(), CaptureStats::default());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn second_start_replaces_first_session() {
        let open_taps = Arc::new(AtomicUsize::new(0));
        let device = CountingDevice {
            inner: SyntheticInput::silence(44100, 1).with_chunk_frames(128),
            open_taps: Arc::clone(&open_taps),
        };
        let bridge = AudioCaptureBridge::new(device, CaptureConfig { buffer_frames: 128 }).unwrap();

        let (first, first_count) = counting_sink();
        let (second, second_count) = counting_sink();

        bridge.start(first).unwrap();
        wait_until(|| first_count.load(Ordering::SeqCst) >= 1).await;

        bridge.start(second).unwrap();
        let first_at_switch = first_count.load(Ordering::SeqCst);
        assert_eq!(open_taps.load(Ordering::SeqCst), 1);

        wait_until(|| second_count.load(Ordering::SeqCst) >= 3).await;
        assert_eq!(first_count.load(Ordering::SeqCst), first_at_switch);

        bridge.stop();
        assert_eq!(open_taps.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn start_failure_is_reported() {
        let bridge = AudioCaptureBridge::new(FailingDevice, CaptureConfig::default()).unwrap();
        let (sink, _count) = counting_sink();

        let result = bridge.start(sink);

        assert_eq!(result, Err(BridgeError::Audio(MicrophoneError::NoDevice)));
        assert!(!bridge.is_running());
        assert!(!bridge.registration.is_bound());
    }

    #[tokio::test]
    async fn zero_buffer_size_is_rejected() {
        let config = CaptureConfig { buffer_frames: 0 };
        let result = AudioCaptureBridge::new(SyntheticInput::silence(44100, 1), config);
        assert!(matches!(result, Err(BridgeError::InvalidBufferSize(0))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn mock_sink_sees_exact_buffers() {
        let device = SyntheticInput::silence(16000, 1)
            .with_chunk_frames(512)
            .with_max_chunks(4)
            .unpaced();
        let bridge = AudioCaptureBridge::new(device, CaptureConfig::default()).unwrap();

        let mut sink = MockEventSink::new();
        sink.expect_send()
            .withf(|samples| samples.len() == 1024)
            .times(2)
            .return_const(());

        bridge.start(Arc::new(sink)).unwrap();
        wait_until(|| bridge.stats().buffers_delivered == 2).await;
        bridge.stop();

        assert_eq!(bridge.stats().buffers_captured, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sink_can_stop_bridge_from_first_buffer() {
        let device = SyntheticInput::silence(44100, 1).with_chunk_frames(256);
        let config = CaptureConfig { buffer_frames: 256 };
        let bridge = Arc::new(AudioCaptureBridge::new(device, config).unwrap());
        let slot: Arc<OnceLock<Weak<AudioCaptureBridge<SyntheticInput>>>> =
            Arc::new(OnceLock::new());
        let _ = slot.set(Arc::downgrade(&bridge));

        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let sink_slot = Arc::clone(&slot);
        let sink: Arc<dyn EventSink> = Arc::new(move |_: Vec<f32>| {
            seen.fetch_add(1, Ordering::SeqCst);
            if let Some(bridge) = sink_slot.get().and_then(Weak::upgrade) {
                bridge.stop();
            }
        });

        bridge.start(sink).unwrap();
        wait_until(|| count.load(Ordering::SeqCst) >= 1 && !bridge.is_running()).await;

        sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bridge.status(), CaptureStatus::Idle);

        // The bridge is still usable afterwards
        bridge.stop();
        let (sink, mut rx) = channel_sink();
        bridge.start(sink).unwrap();
        let buffer = timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(buffer.len(), 256);
        bridge.stop();
    }

    #[test]
    fn new_outside_runtime_is_an_error() {
        let result = AudioCaptureBridge::new(SyntheticInput::silence(44100, 1), Default::default());
        assert!(matches!(result, Err(BridgeError::NoRuntime)));
    }

    #[test]
    fn with_handle_delivers_from_plain_thread() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let device = SyntheticInput::silence(44100, 1).with_max_chunks(2);
        let bridge =
            AudioCaptureBridge::with_handle(device, Default::default(), runtime.handle().clone())
                .unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        bridge
            .start(Arc::new(move |samples: Vec<f32>| {
                let _ = tx.send(samples.len());
            }))
            .unwrap();

        let len = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(len, 1024);
        bridge.stop();
        assert!(!bridge.is_running());
    }
}
