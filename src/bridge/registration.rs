//! Single consumer registration
//!
//! The audio thread only ever reads `active` (one atomic load). The sink
//! slot behind the lock is touched by subscribe/unsubscribe and by the
//! delivery task, never by the audio thread.
//!
//! The slot lock is reentrant and stays held while a sink runs, so a sink
//! may unbind itself (or rebind) from inside `send`, while unbinding from
//! any other thread waits for the running delivery to return.

use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Receiver of captured sample buffers
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    /// Called on the delivery context, once per buffer, in capture order
    fn send(&self, samples: Vec<f32>);
}

impl<F> EventSink for F
where
    F: Fn(Vec<f32>) + Send + Sync,
{
    fn send(&self, samples: Vec<f32>) {
        self(samples)
    }
}

struct Bound {
    token: u64,
    sink: Arc<dyn EventSink>,
}

/// At most one bound sink; binding again replaces the previous one
pub(crate) struct Registration {
    next_token: AtomicU64,
    // 0 means nothing bound
    active: AtomicU64,
    slot: ReentrantMutex<RefCell<Option<Bound>>>,
}

impl Registration {
    pub fn new() -> Self {
        Self {
            next_token: AtomicU64::new(0),
            active: AtomicU64::new(0),
            slot: ReentrantMutex::new(RefCell::new(None)),
        }
    }

    /// Binds `sink` and returns the token its buffers must carry
    pub fn bind(&self, sink: Arc<dyn EventSink>) -> u64 {
        let slot = self.slot.lock();
        let token = self.next_token.fetch_add(1, Ordering::Relaxed) + 1;
        *slot.borrow_mut() = Some(Bound { token, sink });
        self.active.store(token, Ordering::Release);
        tracing::debug!("Consumer bound (token {})", token);
        token
    }

    /// Unbinds the sink bound under `token`. Returns whether it was bound.
    ///
    /// From another thread this waits for an in-progress delivery to
    /// finish; once it returns no delivery to that sink can start.
    pub fn unbind(&self, token: u64) -> bool {
        let slot = self.slot.lock();
        let unbound = {
            let mut bound = slot.borrow_mut();
            if !bound.as_ref().is_some_and(|b| b.token == token) {
                return false;
            }
            self.active.store(0, Ordering::Release);
            bound.take()
        };
        // Sink dropped outside the borrow
        drop(unbound);
        tracing::debug!("Consumer unbound (token {})", token);
        true
    }

    /// Lock-free liveness check for the audio thread
    pub fn is_live(&self, token: u64) -> bool {
        token != 0 && self.active.load(Ordering::Acquire) == token
    }

    #[cfg(test)]
    pub fn is_bound(&self) -> bool {
        self.active.load(Ordering::Acquire) != 0
    }

    /// Hands `samples` to the sink bound under `token`, if it still is.
    pub fn deliver(&self, token: u64, samples: Vec<f32>) -> bool {
        let slot = self.slot.lock();
        // Borrow ends here, lock stays held: the sink may unbind or rebind.
        let sink = match slot.borrow().as_ref() {
            Some(bound) if bound.token == token => Arc::clone(&bound.sink),
            _ => return false,
        };
        sink.send(samples);
        true
    }
}
