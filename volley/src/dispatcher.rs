//! The request dispatcher.
//!
//! A [`Dispatcher`] wraps a [`Transport`] and adds four things to it:
//!
//! - **deduplication**: concurrent dedupable requests with the same
//!   [`CacheKey`] share one transport call,
//! - **admission**: every transport call runs through an [`AdmissionQueue`]
//!   at the dispatcher's priority,
//! - **byte budget**: once the bytes read exceed the configured limit, new
//!   requests are refused with [`DispatchError::BudgetExhausted`],
//! - **cache save**: every successful deduplicated fetch is handed to a
//!   [`RequestCache`] before callers see it.
//!
//! ## Request flow
//!
//! ```text
//! send(request, cancel)
//!   ├─ budget exhausted ─────────────► Err(BudgetExhausted)
//!   ├─ not dedupable ────────────────► transport.send (no queue, no cache)
//!   └─ registry.join_or_create(key)
//!        ├─ Joined  ─┐
//!        └─ Created ─┼─ spawn: queue → transport → charge → buffer → cache.save
//!                    └─ wait for the shared outcome, or for `cancel`
//! ```
//!
//! The unit of work runs on its own task, so a creator that cancels does not
//! take the call down with it: the call is only cancelled once every caller
//! that joined it has cancelled.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{Instrument, debug, info_span, warn};
use volley_core::{
    AdmissionQueue, CacheKey, CancellationToken, DispatchRequest, DispatchResponse, Priority,
    RequestCache, Transport,
};

use crate::budget::ByteBudget;
use crate::inflight::{Admission, Completion, InflightRequest, Outcome, Registry, Waiter};
use crate::queue::OperationQueue;
use crate::{DispatchError, metrics};

/// Cache shared by the dispatchers of one application.
pub type SharedCache<Head, Shared> = Arc<dyn RequestCache<Head, Shared>>;

type HeadOf<Req> = <Req as DispatchRequest>::Head;
type SharedOf<Res> = <Res as DispatchResponse>::Shared;

/// Where a dispatch ended up. Used as a tracing field and metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// Refused because the byte budget is spent.
    Rejected,
    /// Forwarded without deduplication.
    Bypassed,
    /// Joined an in-flight request.
    Joined,
    /// Started a new in-flight request.
    Dispatching,
    /// Received a successful response.
    Completed,
    /// Cancelled by the caller, or by every caller of the shared request.
    Cancelled,
    /// The transport, body or cache failed.
    Failed,
}

impl DispatchState {
    /// Returns the state name.
    pub const fn as_str(self) -> &'static str {
        match self {
            DispatchState::Rejected => "rejected",
            DispatchState::Bypassed => "bypassed",
            DispatchState::Joined => "joined",
            DispatchState::Dispatching => "dispatching",
            DispatchState::Completed => "completed",
            DispatchState::Cancelled => "cancelled",
            DispatchState::Failed => "failed",
        }
    }

    fn of<S, E>(outcome: &Result<S, DispatchError<E>>) -> Self {
        match outcome {
            Ok(_) => DispatchState::Completed,
            Err(DispatchError::Cancelled) => DispatchState::Cancelled,
            Err(DispatchError::BudgetExhausted) => DispatchState::Rejected,
            Err(_) => DispatchState::Failed,
        }
    }
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deduplicating, priority-scheduled, byte-budgeted front for a transport.
///
/// Cloning yields a handle to the same dispatcher: clones share the in-flight
/// registry, the byte budget, the queue and the cache.
pub struct Dispatcher<T, Req, Q = OperationQueue>
where
    T: Transport<Req>,
    T::Response: DispatchResponse,
    Req: DispatchRequest,
{
    inner: Arc<Inner<T, Req, Q>>,
}

struct Inner<T, Req, Q>
where
    T: Transport<Req>,
    T::Response: DispatchResponse,
    Req: DispatchRequest,
{
    transport: Mutex<T>,
    class: Priority,
    priority: i32,
    budget: ByteBudget,
    queue: Arc<Q>,
    cache: Option<SharedCache<HeadOf<Req>, SharedOf<T::Response>>>,
    registry: Arc<Registry<SharedOf<T::Response>, T::Error>>,
}

impl<T, Req> Dispatcher<T, Req, OperationQueue>
where
    T: Transport<Req>,
    T::Response: DispatchResponse,
    Req: DispatchRequest,
{
    /// Starts building a dispatcher around `transport`.
    ///
    /// Defaults: [`Priority::UserInitiated`], no offset, no byte limit, a
    /// private [`OperationQueue`] and no cache.
    pub fn builder(transport: T) -> DispatcherBuilder<T, Req, OperationQueue> {
        DispatcherBuilder::new(transport)
    }

    /// Creates a dispatcher with default settings.
    pub fn new(transport: T) -> Self {
        Self::builder(transport).build()
    }
}

impl<T, Req, Q> Dispatcher<T, Req, Q>
where
    T: Transport<Req> + Clone + Send + 'static,
    T::Response: DispatchResponse + 'static,
    T::Error: fmt::Debug + Send + Sync + 'static,
    Req: DispatchRequest + Send + 'static,
    Q: AdmissionQueue + 'static,
{
    /// Sends `request`, sharing the transport call with any concurrent caller
    /// of the same dedup key.
    ///
    /// Cancelling `cancel`, or dropping the returned future, only withdraws
    /// this caller. The underlying call is cancelled once every caller that
    /// joined it has withdrawn.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::BudgetExhausted`] if the byte budget is spent,
    /// - [`DispatchError::Cancelled`] if this caller cancelled, or the unit
    ///   of work was cancelled before it finished,
    /// - [`DispatchError::Transport`], [`DispatchError::Body`] or
    ///   [`DispatchError::Cache`] if the shared call failed. Every caller of
    ///   the call observes the same error.
    pub async fn send(
        &self,
        request: Req,
        cancel: CancellationToken,
    ) -> Result<T::Response, DispatchError<T::Error>> {
        let class = self.inner.class.as_str();

        if self.inner.budget.is_exhausted() {
            debug!(
                state = %DispatchState::Rejected,
                remaining = ?self.inner.budget.remaining(),
                "byte budget exhausted, request not dispatched"
            );
            metrics::record_state(class, DispatchState::Rejected);
            return Err(DispatchError::BudgetExhausted);
        }

        if !request.is_dedupable() {
            debug!(state = %DispatchState::Bypassed, "request is not dedupable, forwarding");
            let outcome = self.inner.bypass(request, cancel).await;
            metrics::record_state(class, DispatchState::of(&outcome));
            return outcome;
        }

        let key = request.dedup_key();
        let entry = match self.inner.registry.join_or_create(key) {
            Admission::Joined(entry) => {
                debug!(
                    key = %entry.key(),
                    state = %DispatchState::Joined,
                    refs = entry.ref_count(),
                    "joined in-flight request"
                );
                entry
            }
            Admission::Created(entry) => {
                debug!(
                    key = %entry.key(),
                    state = %DispatchState::Dispatching,
                    priority = self.inner.priority,
                    "dispatching request"
                );
                self.spawn(Arc::clone(&entry), request);
                entry
            }
        };

        let outcome = Waiter::new(&self.inner.registry, entry)
            .wait(&cancel)
            .await;
        let state = DispatchState::of(&outcome);
        debug!(%state, "dispatch finished");
        metrics::record_state(class, state);
        outcome.map(T::Response::from_shared)
    }

    fn spawn(
        &self,
        entry: Arc<InflightRequest<SharedOf<T::Response>, T::Error>>,
        request: Req,
    ) {
        let inner = Arc::clone(&self.inner);
        let span = info_span!(
            "volley.fetch",
            key = %entry.key(),
            class = %inner.class,
            priority = inner.priority,
        );
        let gauge = metrics::InflightGuard::new(inner.class.as_str());
        let completion = Completion::new(Arc::clone(&inner.registry), entry);

        tokio::spawn(
            async move {
                let _gauge = gauge;
                let token = completion.entry().token().clone();
                let key = completion.entry().key().clone();

                let work = Arc::clone(&inner).fetch(request, key, token.clone());
                let outcome = match inner.queue.enqueue(inner.priority, token, work).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(DispatchError::Cancelled),
                };

                match &outcome {
                    Ok(_) => debug!("fetch completed"),
                    Err(error) if error.is_cancellation() => debug!("fetch cancelled"),
                    Err(error) => warn!(?error, "fetch failed"),
                }
                completion.finish(outcome);
            }
            .instrument(span),
        );
    }
}

impl<T, Req, Q> Dispatcher<T, Req, Q>
where
    T: Transport<Req>,
    T::Response: DispatchResponse,
    Req: DispatchRequest,
{
    /// Returns the traffic class of the dispatcher.
    pub fn class(&self) -> Priority {
        self.inner.class
    }

    /// Returns the numeric priority units of work are queued at.
    pub fn priority(&self) -> i32 {
        self.inner.priority
    }

    /// Replaces the byte budget. `None` removes the limit.
    ///
    /// Typically called when the application resumes from suspend.
    pub fn reset_limit(&self, max_bytes: Option<i64>) {
        debug!(?max_bytes, "byte budget reset");
        self.inner.budget.reset(max_bytes);
    }

    /// Returns the remaining byte budget, or `None` when unlimited.
    pub fn remaining_bytes(&self) -> Option<i64> {
        self.inner.budget.remaining()
    }

    /// Returns the number of deduplicated requests currently in flight.
    pub fn inflight_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Returns `true` if a request with `key` is in flight.
    pub fn is_inflight(&self, key: &CacheKey) -> bool {
        self.inner.registry.get(key.as_str()).is_some()
    }

    /// Returns the admission queue.
    pub fn queue(&self) -> &Arc<Q> {
        &self.inner.queue
    }

    /// Returns the cache, if one is configured.
    pub fn cache(&self) -> Option<&SharedCache<HeadOf<Req>, SharedOf<T::Response>>> {
        self.inner.cache.as_ref()
    }
}

impl<T, Req, Q> Inner<T, Req, Q>
where
    T: Transport<Req> + Clone + Send + 'static,
    T::Response: DispatchResponse + 'static,
    T::Error: fmt::Debug + Send + Sync + 'static,
    Req: DispatchRequest + Send + 'static,
    Q: AdmissionQueue + 'static,
{
    async fn bypass(
        &self,
        request: Req,
        cancel: CancellationToken,
    ) -> Result<T::Response, DispatchError<T::Error>> {
        let mut transport = self.transport.lock().clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DispatchError::Cancelled),
            response = transport.send(request, cancel.clone()) => {
                response.map_err(DispatchError::transport)
            }
        }
    }

    /// The unit of work of one deduplicated request.
    async fn fetch(
        self: Arc<Self>,
        request: Req,
        key: CacheKey,
        token: CancellationToken,
    ) -> Outcome<SharedOf<T::Response>, T::Error> {
        let head = self.cache.as_ref().map(|_| request.head());
        let mut transport = self.transport.lock().clone();
        let started = Instant::now();

        let response = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(DispatchError::Cancelled),
            response = transport.send(request, token.clone()) => {
                response.map_err(DispatchError::transport)?
            }
        };

        let length = response.content_length();
        if let Some(length) = length {
            self.budget.charge(length);
            debug!(length, remaining = ?self.budget.remaining(), "charged byte budget");
        }

        let shared = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(DispatchError::Cancelled),
            shared = response.into_shared() => {
                shared.map_err(|error| DispatchError::Body(Arc::new(error)))?
            }
        };
        metrics::record_fetch(self.class.as_str(), started.elapsed(), length);

        if let (Some(cache), Some(head)) = (self.cache.as_ref(), head.as_ref()) {
            cache.save(head, &shared, &key, token.clone()).await?;
            debug!(%key, "response saved to cache");
        }

        Ok(shared)
    }
}

impl<T, Req, Q> Clone for Dispatcher<T, Req, Q>
where
    T: Transport<Req>,
    T::Response: DispatchResponse,
    Req: DispatchRequest,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, Req, Q> fmt::Debug for Dispatcher<T, Req, Q>
where
    T: Transport<Req>,
    T::Response: DispatchResponse,
    Req: DispatchRequest,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("class", &self.inner.class)
            .field("priority", &self.inner.priority)
            .field("remaining_bytes", &self.inner.budget.remaining())
            .field("inflight", &self.inner.registry.len())
            .field("cache", &self.inner.cache.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder<T, Req, Q = OperationQueue>
where
    T: Transport<Req>,
    T::Response: DispatchResponse,
    Req: DispatchRequest,
{
    transport: T,
    class: Priority,
    offset: i32,
    max_bytes: Option<i64>,
    queue: Arc<Q>,
    cache: Option<SharedCache<HeadOf<Req>, SharedOf<T::Response>>>,
    _request: PhantomData<fn(Req)>,
}

impl<T, Req> DispatcherBuilder<T, Req, OperationQueue>
where
    T: Transport<Req>,
    T::Response: DispatchResponse,
    Req: DispatchRequest,
{
    fn new(transport: T) -> Self {
        Self {
            transport,
            class: Priority::default(),
            offset: 0,
            max_bytes: None,
            queue: Arc::new(OperationQueue::default()),
            cache: None,
            _request: PhantomData,
        }
    }
}

impl<T, Req, Q> DispatcherBuilder<T, Req, Q>
where
    T: Transport<Req>,
    T::Response: DispatchResponse,
    Req: DispatchRequest,
{
    /// Sets the traffic class.
    pub fn priority(mut self, class: Priority) -> Self {
        self.class = class;
        self
    }

    /// Sets the offset added to the class's base priority.
    pub fn offset(mut self, offset: i32) -> Self {
        self.offset = offset;
        self
    }

    /// Sets the byte budget. `None` means unlimited.
    pub fn max_bytes(mut self, max_bytes: Option<i64>) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Sets the cache saved to after every successful deduplicated fetch.
    pub fn cache(mut self, cache: SharedCache<HeadOf<Req>, SharedOf<T::Response>>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the cache if `cache` is `Some`, leaves it unset otherwise.
    pub fn maybe_cache(
        mut self,
        cache: Option<SharedCache<HeadOf<Req>, SharedOf<T::Response>>>,
    ) -> Self {
        self.cache = cache;
        self
    }

    /// Sets the admission queue, typically one shared between dispatchers.
    pub fn queue<NQ>(self, queue: Arc<NQ>) -> DispatcherBuilder<T, Req, NQ> {
        DispatcherBuilder {
            transport: self.transport,
            class: self.class,
            offset: self.offset,
            max_bytes: self.max_bytes,
            queue,
            cache: self.cache,
            _request: PhantomData,
        }
    }

    /// Builds the dispatcher.
    pub fn build(self) -> Dispatcher<T, Req, Q> {
        let priority = self.class.with_offset(self.offset);
        debug!(
            class = %self.class,
            priority,
            max_bytes = ?self.max_bytes,
            cache = self.cache.is_some(),
            "dispatcher created"
        );
        Dispatcher {
            inner: Arc::new(Inner {
                transport: Mutex::new(self.transport),
                class: self.class,
                priority,
                budget: ByteBudget::new(self.max_bytes),
                queue: self.queue,
                cache: self.cache,
                registry: Arc::new(Registry::new()),
            }),
        }
    }
}
