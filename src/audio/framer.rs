//! Fixed-size framing of captured audio
//!
//! Devices hand over whatever chunk size their driver picked. Consumers
//! get buffers of exactly `frames` samples taken from the first channel.

use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};

/// Accumulates first-channel samples and emits full buffers
pub struct FrameAssembler {
    frames: usize,
    producer: HeapProd<f32>,
    consumer: HeapCons<f32>,
}

impl FrameAssembler {
    /// `frames` must be non-zero
    pub fn new(frames: usize) -> Self {
        let rb = HeapRb::<f32>::new(frames);
        let (producer, consumer) = rb.split();
        Self {
            frames,
            producer,
            consumer,
        }
    }

    /// Pushes interleaved data, calling `emit` once per completed buffer.
    ///
    /// Runs on the audio thread: one allocation per emitted buffer, no locks.
    pub fn push<F>(&mut self, data: &[f32], channels: u16, mut emit: F)
    where
        F: FnMut(Vec<f32>),
    {
        if data.is_empty() || channels == 0 {
            return;
        }

        for frame in data.chunks(channels as usize) {
            let _ = self.producer.try_push(frame[0]);

            if self.consumer.occupied_len() >= self.frames {
                let mut buffer = vec![0.0; self.frames];
                self.consumer.pop_slice(&mut buffer);
                emit(buffer);
            }
        }
    }

    /// Frames waiting for the next full buffer
    pub fn pending(&self) -> usize {
        self.consumer.occupied_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_only_full_buffers() {
        let mut framer = FrameAssembler::new(4);
        let mut out = Vec::new();

        framer.push(&[1.0, 2.0, 3.0], 1, |b| out.push(b));
        assert!(out.is_empty());
        assert_eq!(framer.pending(), 3);

        framer.push(&[4.0, 5.0, 6.0, 7.0, 8.0, 9.0], 1, |b| out.push(b));
        assert_eq!(out, vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]]);
        assert_eq!(framer.pending(), 1);
    }

    #[test]
    fn keeps_first_channel_of_interleaved_data() {
        let mut framer = FrameAssembler::new(3);
        let mut out = Vec::new();

        // L/R pairs: left carries the signal
        framer.push(&[0.1, -1.0, 0.2, -1.0, 0.3, -1.0], 2, |b| out.push(b));
        assert_eq!(out, vec![vec![0.1, 0.2, 0.3]]);
    }

    #[test]
    fn skips_empty_data() {
        let mut framer = FrameAssembler::new(2);
        let mut calls = 0;

        framer.push(&[], 1, |_| calls += 1);
        framer.push(&[1.0, 2.0], 0, |_| calls += 1);
        assert_eq!(calls, 0);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn large_chunk_yields_many_buffers() {
        let mut framer = FrameAssembler::new(1024);
        let data: Vec<f32> = (0..4096).map(|i| i as f32).collect();
        let mut out = Vec::new();

        framer.push(&data, 1, |b| out.push(b));
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|b| b.len() == 1024));
        assert_eq!(out[3][0], 3072.0);
    }
}
