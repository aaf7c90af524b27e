//! Default [`AdmissionQueue`]: bounded concurrency, highest priority first.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::trace;
use volley_core::{AdmissionQueue, Cancelled};

/// Number of units of work run at once by [`OperationQueue::default`].
pub const DEFAULT_CAPACITY: usize = 4;

/// Priority queue admitting at most `capacity` units of work at once.
///
/// Waiting units are admitted in descending priority; units with equal
/// priority are admitted in the order they were queued. Cloning yields a
/// handle to the same queue.
#[derive(Clone)]
pub struct OperationQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    capacity: usize,
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    running: usize,
    waiting: BinaryHeap<Waiting>,
    sequence: u64,
}

struct Waiting {
    priority: i32,
    sequence: u64,
    admit: oneshot::Sender<Slot>,
}

impl Ord for Waiting {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for Waiting {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Waiting {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for Waiting {}

/// A running slot. Dropping it admits the next waiting unit.
struct Slot {
    queue: Option<Arc<QueueInner>>,
}

impl Slot {
    fn new(queue: Arc<QueueInner>) -> Self {
        Self { queue: Some(queue) }
    }

    fn disarm(&mut self) {
        self.queue = None;
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        if let Some(queue) = self.queue.take() {
            queue.release();
        }
    }
}

impl QueueInner {
    async fn acquire(self: &Arc<Self>, priority: i32, cancel: &CancellationToken) -> Result<Slot, Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        let admitted = {
            let mut state = self.state.lock();
            if state.running < self.capacity {
                state.running += 1;
                return Ok(Slot::new(Arc::clone(self)));
            }
            let (admit, admitted) = oneshot::channel();
            let sequence = state.sequence;
            state.sequence += 1;
            state.waiting.push(Waiting {
                priority,
                sequence,
                admit,
            });
            trace!(priority, waiting = state.waiting.len(), "queue full, unit waiting");
            admitted
        };

        tokio::select! {
            biased;
            slot = admitted => slot.map_err(|_| Cancelled),
            _ = cancel.cancelled() => Err(Cancelled),
        }
    }

    /// Hands the slot to the best live waiter, or frees it.
    fn release(self: &Arc<Self>) {
        let mut state = self.state.lock();
        while let Some(waiting) = state.waiting.pop() {
            match waiting.admit.send(Slot::new(Arc::clone(self))) {
                Ok(()) => return,
                // The waiter was cancelled; its slot must not re-enter release.
                Err(mut slot) => slot.disarm(),
            }
        }
        state.running -= 1;
    }
}

impl OperationQueue {
    /// Creates a queue running at most `capacity` units at once.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                capacity: capacity.max(1),
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    /// Returns the concurrency bound.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Returns the number of units currently running.
    pub fn running(&self) -> usize {
        self.inner.state.lock().running
    }

    /// Returns the number of queued units, including cancelled ones not yet
    /// skipped.
    pub fn waiting(&self) -> usize {
        self.inner.state.lock().waiting.len()
    }
}

impl Default for OperationQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl fmt::Debug for OperationQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("OperationQueue")
            .field("capacity", &self.inner.capacity)
            .field("running", &state.running)
            .field("waiting", &state.waiting.len())
            .finish()
    }
}

impl AdmissionQueue for OperationQueue {
    fn enqueue<F, T>(
        &self,
        priority: i32,
        cancel: CancellationToken,
        work: F,
    ) -> BoxFuture<'static, Result<T, Cancelled>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            let _slot = inner.acquire(priority, &cancel).await?;
            Ok(work.await)
        })
    }
}
