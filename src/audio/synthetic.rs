//! Software input device
//!
//! Produces generated frames on its own thread at the cadence a real
//! device would. Used by the demo binary when no microphone is wanted, and
//! by tests that need a deterministic source.

use super::device::{InputDevice, InputFormat, InputTap, RawDataCallback, SampleFormat};
use super::MicrophoneError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Maps an absolute frame index to a sample value
pub type FrameGenerator = Arc<dyn Fn(u64) -> f32 + Send + Sync>;

/// Deterministic input device
#[derive(Clone)]
pub struct SyntheticInput {
    format: InputFormat,
    chunk_frames: usize,
    max_chunks: Option<usize>,
    paced: bool,
    generator: FrameGenerator,
}

impl SyntheticInput {
    /// Silence at the given rate, 1024-frame chunks, paced in real time
    pub fn silence(sample_rate: u32, channels: u16) -> Self {
        Self {
            format: InputFormat {
                sample_rate,
                channels,
                sample_format: SampleFormat::F32,
            },
            chunk_frames: 1024,
            max_chunks: None,
            paced: true,
            generator: Arc::new(|_| 0.0),
        }
    }

    pub fn with_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(u64) -> f32 + Send + Sync + 'static,
    {
        self.generator = Arc::new(generator);
        self
    }

    /// Frames per driver callback
    pub fn with_chunk_frames(mut self, chunk_frames: usize) -> Self {
        self.chunk_frames = chunk_frames;
        self
    }

    /// Stop producing after `max_chunks` callbacks
    pub fn with_max_chunks(mut self, max_chunks: usize) -> Self {
        self.max_chunks = Some(max_chunks);
        self
    }

    /// Produce chunks back to back instead of in real time
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    fn chunk_period(&self) -> Duration {
        Duration::from_secs_f64(self.chunk_frames as f64 / self.format.sample_rate as f64)
    }
}

impl InputDevice for SyntheticInput {
    fn name(&self) -> String {
        format!("synthetic ({})", self.format)
    }

    fn open(&self, mut on_data: RawDataCallback) -> Result<Box<dyn InputTap>, MicrophoneError> {
        if self.chunk_frames == 0 || self.format.channels == 0 || self.format.sample_rate == 0 {
            return Err(MicrophoneError::ConfigError(format!(
                "invalid synthetic format {} with {} frames per chunk",
                self.format, self.chunk_frames
            )));
        }

        let running = Arc::new(AtomicBool::new(true));
        let source = self.clone();
        let thread_running = Arc::clone(&running);

        let thread_handle = thread::Builder::new()
            .name("synthetic-capture".into())
            .spawn(move || {
                let channels = source.format.channels;
                let period = source.chunk_period();
                let mut chunk = vec![0.0f32; source.chunk_frames * channels as usize];
                let mut frame_index: u64 = 0;
                let mut produced = 0usize;

                while thread_running.load(Ordering::Acquire) {
                    if source.max_chunks.is_some_and(|max| produced >= max) {
                        break;
                    }

                    for frame in chunk.chunks_mut(channels as usize) {
                        frame.fill((source.generator)(frame_index));
                        frame_index += 1;
                    }
                    on_data(&chunk, channels);
                    produced += 1;

                    if source.paced {
                        thread::sleep(period);
                    }
                }

                tracing::debug!("Synthetic input produced {} chunks", produced);
            })
            .map_err(|e| MicrophoneError::ThreadError(e.to_string()))?;

        Ok(Box::new(SyntheticTap {
            running,
            thread_handle: Some(thread_handle),
            format: self.format,
        }))
    }
}

struct SyntheticTap {
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    format: InputFormat,
}

impl InputTap for SyntheticTap {
    fn format(&self) -> InputFormat {
        self.format
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SyntheticTap {
    fn drop(&mut self) {
        self.stop();
    }
}
