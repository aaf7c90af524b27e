//! In-flight request registry.
//!
//! When several callers ask for the same resource at once, one of them starts
//! the transport call and the others wait on it. Each in-flight call is an
//! [`InflightRequest`]: a reference-counted entry whose single outcome is
//! broadcast to every caller that joined it.
//!
//! ## Cancellation protocol
//!
//! A caller cancelling must never cancel the call for the others, so a
//! cancellation only drops that caller's reference. The call itself is
//! cancelled (the entry's private token fires and the shared outcome becomes
//! [`DispatchError::Cancelled`]) only when the last reference is released.
//!
//! ## Removal
//!
//! An entry leaves the [`Registry`] either when its last reference is released
//! or when its unit of work finishes, whichever comes first. Both paths remove
//! by identity, so a late cleanup of an old entry never removes a newer entry
//! that has since been registered under the same key.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use volley_core::CacheKey;

use crate::DispatchError;

/// Outcome broadcast to every caller of one dispatch.
pub type Outcome<S, E> = Result<S, DispatchError<E>>;

/// Shared state of one in-progress deduplicated dispatch.
pub struct InflightRequest<S, E> {
    key: CacheKey,
    refs: AtomicUsize,
    token: CancellationToken,
    outcome: watch::Sender<Option<Outcome<S, E>>>,
}

impl<S, E> InflightRequest<S, E>
where
    S: Clone,
{
    fn new(key: CacheKey) -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            key,
            refs: AtomicUsize::new(1),
            token: CancellationToken::new(),
            outcome,
        }
    }

    /// Returns the dedup key of the entry.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Returns the token handed to the unit of work.
    ///
    /// It fires only once every joined caller has cancelled.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns the number of callers currently waiting on the entry.
    pub fn ref_count(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    /// Returns `true` once an outcome has been published.
    pub fn is_complete(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Publishes the outcome. Only the first call has an effect.
    ///
    /// Returns `true` if this call published the outcome.
    pub fn complete(&self, outcome: Outcome<S, E>) -> bool {
        self.outcome.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(outcome);
                true
            } else {
                false
            }
        })
    }

    /// Waits for the outcome.
    pub async fn outcome(&self) -> Outcome<S, E> {
        let mut receiver = self.outcome.subscribe();
        match receiver.wait_for(Option::is_some).await {
            Ok(slot) => slot.clone().unwrap_or(Err(DispatchError::Cancelled)),
            Err(_) => Err(DispatchError::Cancelled),
        }
    }

    fn add_ref(&self) {
        self.refs.fetch_add(1, Ordering::AcqRel);
    }

    /// Drops one reference, returning `true` if it was the last one.
    fn release_ref(&self) -> bool {
        self.refs.fetch_sub(1, Ordering::AcqRel) == 1
    }
}

impl<S, E> fmt::Debug for InflightRequest<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InflightRequest")
            .field("key", &self.key)
            .field("refs", &self.refs.load(Ordering::Relaxed))
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

/// Result of [`Registry::join_or_create`].
#[derive(Debug)]
pub enum Admission<S, E> {
    /// The caller joined an entry that is already in flight.
    Joined(Arc<InflightRequest<S, E>>),
    /// The caller created the entry and must start its unit of work.
    Created(Arc<InflightRequest<S, E>>),
}

/// Map of in-flight entries by dedup key.
///
/// Joining (lookup plus reference increment, or insert) and releasing
/// (reference decrement plus removal) run under the write lock of the key's
/// shard, so each is one critical section and they never interleave for the
/// same key.
pub struct Registry<S, E> {
    entries: DashMap<CacheKey, Arc<InflightRequest<S, E>>>,
}

impl<S, E> Registry<S, E>
where
    S: Clone,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Joins the entry registered under `key`, or registers a new one.
    pub fn join_or_create(&self, key: CacheKey) -> Admission<S, E> {
        match self.entries.entry(key) {
            Entry::Occupied(occupied) => {
                let entry = Arc::clone(occupied.get());
                entry.add_ref();
                Admission::Joined(entry)
            }
            Entry::Vacant(vacant) => {
                let entry = Arc::new(InflightRequest::new(vacant.key().clone()));
                vacant.insert(Arc::clone(&entry));
                Admission::Created(entry)
            }
        }
    }

    /// Releases one caller's reference.
    ///
    /// When this was the last reference the entry is removed, its token is
    /// cancelled and the shared outcome becomes cancellation. Returns `true`
    /// in that case.
    pub fn release(&self, entry: &Arc<InflightRequest<S, E>>) -> bool {
        let last = match self.entries.entry(entry.key().clone()) {
            Entry::Occupied(occupied) if Arc::ptr_eq(occupied.get(), entry) => {
                let last = entry.release_ref();
                if last {
                    occupied.remove();
                }
                last
            }
            _ => entry.release_ref(),
        };

        if last {
            entry.token.cancel();
            entry.complete(Err(DispatchError::Cancelled));
        }
        last
    }

    /// Removes `entry` if it is still the one registered under its key.
    ///
    /// Idempotent; returns `true` if this call removed it.
    pub fn remove(&self, entry: &Arc<InflightRequest<S, E>>) -> bool {
        self.entries
            .remove_if(entry.key(), |_, current| Arc::ptr_eq(current, entry))
            .is_some()
    }

    /// Returns the entry registered under `key`.
    pub fn get(&self, key: &str) -> Option<Arc<InflightRequest<S, E>>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns the number of in-flight entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S, E> Default for Registry<S, E>
where
    S: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S, E> fmt::Debug for Registry<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// One caller waiting on an entry.
///
/// Dropping the waiter before it has observed the outcome releases its
/// reference, so dropping the caller's future counts as cancellation.
pub(crate) struct Waiter<'a, S, E>
where
    S: Clone,
{
    registry: &'a Registry<S, E>,
    entry: Arc<InflightRequest<S, E>>,
    released: bool,
}

impl<'a, S, E> Waiter<'a, S, E>
where
    S: Clone,
{
    pub(crate) fn new(registry: &'a Registry<S, E>, entry: Arc<InflightRequest<S, E>>) -> Self {
        Self {
            registry,
            entry,
            released: false,
        }
    }

    /// Waits for the shared outcome or for `cancel`, whichever comes first.
    pub(crate) async fn wait(mut self, cancel: &CancellationToken) -> Outcome<S, E> {
        let cancelled = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            outcome = self.entry.outcome() => Some(outcome),
        };

        match cancelled {
            Some(outcome) => {
                self.released = true;
                outcome
            }
            None => {
                self.released = true;
                self.registry.release(&self.entry);
                Err(DispatchError::Cancelled)
            }
        }
    }
}

impl<S, E> Drop for Waiter<'_, S, E>
where
    S: Clone,
{
    fn drop(&mut self) {
        if !self.released {
            self.registry.release(&self.entry);
        }
    }
}

/// Cleanup of one unit of work.
///
/// Removes the entry from the registry and publishes an outcome on every exit
/// path. When dropped without [`finish`](Completion::finish), e.g. because the
/// work panicked, waiters observe cancellation.
pub(crate) struct Completion<S, E>
where
    S: Clone,
{
    registry: Arc<Registry<S, E>>,
    entry: Arc<InflightRequest<S, E>>,
}

impl<S, E> Completion<S, E>
where
    S: Clone,
{
    pub(crate) fn new(registry: Arc<Registry<S, E>>, entry: Arc<InflightRequest<S, E>>) -> Self {
        Self { registry, entry }
    }

    pub(crate) fn entry(&self) -> &Arc<InflightRequest<S, E>> {
        &self.entry
    }

    /// Removes the entry, then publishes `outcome` to its waiters.
    pub(crate) fn finish(self, outcome: Outcome<S, E>) -> bool {
        self.registry.remove(&self.entry);
        self.entry.complete(outcome)
    }
}

impl<S, E> Drop for Completion<S, E>
where
    S: Clone,
{
    fn drop(&mut self) {
        self.registry.remove(&self.entry);
        self.entry.complete(Err(DispatchError::Cancelled));
    }
}
