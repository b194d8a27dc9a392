//! Delivery context
//!
//! Buffers captured on the audio thread are queued here and handed to the
//! consumer by one task, in arrival order. The queue is unbounded: a slow
//! consumer makes it grow.

use super::registration::Registration;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A captured buffer tagged with the registration it was captured for
#[derive(Debug)]
pub(crate) struct Delivery {
    pub token: u64,
    pub samples: Vec<f32>,
}

/// Snapshot of the bridge counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Full buffers assembled on the audio thread
    pub buffers_captured: u64,
    /// Buffers handed to a consumer
    pub buffers_delivered: u64,
    /// Buffers discarded because no live consumer matched
    pub buffers_dropped: u64,
}

#[derive(Default)]
pub(crate) struct StatsCounters {
    captured: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl StatsCounters {
    pub fn captured(&self) {
        self.captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CaptureStats {
        CaptureStats {
            buffers_captured: self.captured.load(Ordering::Relaxed),
            buffers_delivered: self.delivered.load(Ordering::Relaxed),
            buffers_dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// The single context consumers are called on
pub(crate) struct MainContext {
    tx: mpsc::UnboundedSender<Delivery>,
    task: JoinHandle<()>,
}

impl MainContext {
    /// Spawns the delivery task on `handle`'s runtime.
    pub fn spawn(
        handle: &Handle,
        registration: Arc<Registration>,
        stats: Arc<StatsCounters>,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Delivery>();

        let task = handle.spawn(async move {
            while let Some(delivery) = rx.recv().await {
                // Re-checked under the slot lock: the consumer may have
                // cancelled while this buffer was queued.
                if registration.deliver(delivery.token, delivery.samples) {
                    stats.delivered();
                } else {
                    stats.dropped();
                    tracing::trace!("Dropped late buffer (token {})", delivery.token);
                }
            }
        });

        Self { tx, task }
    }

    /// Handle for the audio thread. `send` on it never blocks.
    pub fn sender(&self) -> mpsc::UnboundedSender<Delivery> {
        self.tx.clone()
    }
}

impl Drop for MainContext {
    fn drop(&mut self) {
        self.task.abort();
    }
}
