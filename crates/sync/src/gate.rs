//! Bounded admission gate with FIFO-fair waiters.
//!
//! Limits how many units of work run at once. Freed slots are handed
//! directly to the longest-waiting caller, so the active-holder count never
//! transiently drops below the number of granted slots between release and
//! pickup.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

/// Counting admission primitive. Cloning shares the same gate.
#[derive(Clone)]
pub struct BoundedGate {
    inner: Arc<GateInner>,
}

struct GateInner {
    limit: usize,
    state: Mutex<GateState>,
}

#[derive(Default)]
struct GateState {
    active: usize,
    waiters: VecDeque<oneshot::Sender<GatePermit>>,
}

/// A granted slot. Dropping the permit releases the slot on every exit path,
/// including errors and cancellation of the surrounding future.
pub struct GatePermit {
    inner: Arc<GateInner>,
}

impl BoundedGate {
    /// Create a gate admitting at most `limit` concurrent holders.
    ///
    /// # Panics
    /// Panics if `limit` is 0.
    pub fn new(limit: usize) -> Self {
        assert!(limit > 0, "gate limit must be positive");
        Self {
            inner: Arc::new(GateInner {
                limit,
                state: Mutex::new(GateState::default()),
            }),
        }
    }

    /// Acquire a slot, suspending FIFO-fairly while the gate is at capacity.
    pub async fn acquire(&self) -> GatePermit {
        let rx = {
            let mut state = self.inner.state.lock().unwrap();
            if state.active < self.inner.limit {
                state.active += 1;
                return GatePermit {
                    inner: Arc::clone(&self.inner),
                };
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };
        // The slot arrives directly from a releasing holder.
        rx.await
            .expect("gate state dropped while a waiter was queued")
    }

    /// Run `work` inside an acquired slot. The slot is released on every exit
    /// path: normal completion, an error result, or cancellation.
    pub async fn run<F>(&self, work: F) -> F::Output
    where
        F: Future,
    {
        let _permit = self.acquire().await;
        work.await
    }

    /// Number of currently granted slots.
    pub fn active(&self) -> usize {
        self.inner.state.lock().unwrap().active
    }

    /// Number of callers still waiting for a slot.
    pub fn waiting(&self) -> usize {
        self.inner
            .state
            .lock()
            .unwrap()
            .waiters
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    /// Configured admission limit.
    pub fn limit(&self) -> usize {
        self.inner.limit
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock().unwrap();
        while let Some(tx) = state.waiters.pop_front() {
            let permit = GatePermit {
                inner: Arc::clone(&self.inner),
            };
            match tx.send(permit) {
                // Direct hand-off: the active count is unchanged.
                Ok(()) => return,
                // Waiter gave up (cancelled). The slot stays owned by this
                // release call, so the returned permit must not run its Drop.
                Err(permit) => std::mem::forget(permit),
            }
        }
        state.active -= 1;
    }
}

impl std::fmt::Debug for BoundedGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedGate")
            .field("limit", &self.limit())
            .field("active", &self.active())
            .field("waiting", &self.waiting())
            .finish()
    }
}
