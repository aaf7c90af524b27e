//! One dispatcher per traffic class, sharing a queue and a cache.

use std::fmt;
use std::sync::Arc;

use tracing::debug;
use volley_core::{DispatchRequest, DispatchResponse, Priority, Transport};

use crate::config::{ConfigError, NetCacheConfig};
use crate::dispatcher::{Dispatcher, SharedCache};
use crate::queue::OperationQueue;

type CacheOf<T, Req> = SharedCache<
    <Req as DispatchRequest>::Head,
    <<T as Transport<Req>>::Response as DispatchResponse>::Shared,
>;

/// The standard set of dispatchers of an application.
///
/// All four dispatchers run their units of work through one
/// [`OperationQueue`], so user-initiated traffic overtakes background and
/// speculative traffic that is still waiting. Build it once and pass it
/// where it is needed.
///
/// ```rust,ignore
/// let net = NetCache::new(transport, &NetCacheConfig::default(), Some(cache))?;
/// net.speculative().send(request, CancellationToken::new()).await?;
/// ```
pub struct NetCache<T, Req, Q = OperationQueue>
where
    T: Transport<Req>,
    T::Response: DispatchResponse,
    Req: DispatchRequest,
{
    speculative: Dispatcher<T, Req, Q>,
    user_initiated: Dispatcher<T, Req, Q>,
    background: Dispatcher<T, Req, Q>,
    explicit: Dispatcher<T, Req, Q>,
    queue: Arc<Q>,
}

impl<T, Req> NetCache<T, Req, OperationQueue>
where
    T: Transport<Req> + Clone,
    T::Response: DispatchResponse,
    Req: DispatchRequest,
{
    /// Builds the dispatchers over a new [`OperationQueue`] bounded by
    /// `config.concurrency`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingCache`] if a class requires a cache and `cache`
    /// is `None`.
    pub fn new(
        transport: T,
        config: &NetCacheConfig,
        cache: Option<CacheOf<T, Req>>,
    ) -> Result<Self, ConfigError> {
        let queue = Arc::new(OperationQueue::new(usize::from(config.concurrency.get())));
        Self::with_queue(transport, config, cache, queue)
    }
}

impl<T, Req, Q> NetCache<T, Req, Q>
where
    T: Transport<Req> + Clone,
    T::Response: DispatchResponse,
    Req: DispatchRequest,
{
    /// Builds the dispatchers over an existing queue.
    ///
    /// `config.concurrency` is ignored.
    pub fn with_queue(
        transport: T,
        config: &NetCacheConfig,
        cache: Option<CacheOf<T, Req>>,
        queue: Arc<Q>,
    ) -> Result<Self, ConfigError> {
        let build = |class: Priority| -> Result<Dispatcher<T, Req, Q>, ConfigError> {
            let settings = config.class(class);
            let cache = settings
                .use_cache(class, cache.is_some())?
                .then(|| cache.clone())
                .flatten();
            Ok(Dispatcher::builder(transport.clone())
                .priority(class)
                .offset(settings.offset)
                .max_bytes(settings.max_bytes)
                .maybe_cache(cache)
                .queue(Arc::clone(&queue))
                .build())
        };

        let net = Self {
            speculative: build(Priority::Speculative)?,
            user_initiated: build(Priority::UserInitiated)?,
            background: build(Priority::Background)?,
            explicit: build(Priority::Explicit)?,
            queue: Arc::clone(&queue),
        };
        debug!(cache = cache.is_some(), "net cache created");
        Ok(net)
    }

    /// Dispatcher for prefetching, with a byte budget by default.
    pub fn speculative(&self) -> &Dispatcher<T, Req, Q> {
        &self.speculative
    }

    /// Dispatcher for requests triggered by the user.
    pub fn user_initiated(&self) -> &Dispatcher<T, Req, Q> {
        &self.user_initiated
    }

    /// Dispatcher for background work.
    pub fn background(&self) -> &Dispatcher<T, Req, Q> {
        &self.background
    }

    /// Dispatcher at the explicit base priority plus its configured offset.
    pub fn explicit(&self) -> &Dispatcher<T, Req, Q> {
        &self.explicit
    }

    /// Returns the dispatcher of `class`.
    pub fn get(&self, class: Priority) -> &Dispatcher<T, Req, Q> {
        match class {
            Priority::Speculative => &self.speculative,
            Priority::UserInitiated => &self.user_initiated,
            Priority::Background => &self.background,
            Priority::Explicit => &self.explicit,
        }
    }

    /// Resets the speculative byte budget, typically when the application
    /// resumes from suspend.
    pub fn reset_speculative_limit(&self, max_bytes: Option<i64>) {
        self.speculative.reset_limit(max_bytes);
    }

    /// Returns the shared queue.
    pub fn queue(&self) -> &Arc<Q> {
        &self.queue
    }
}

impl<T, Req, Q> fmt::Debug for NetCache<T, Req, Q>
where
    T: Transport<Req>,
    T::Response: DispatchResponse,
    Req: DispatchRequest,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetCache")
            .field("speculative", &self.speculative)
            .field("user_initiated", &self.user_initiated)
            .field("background", &self.background)
            .field("explicit", &self.explicit)
            .finish_non_exhaustive()
    }
}
