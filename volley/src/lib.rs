#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Consumable byte budget.
///
/// [`ByteBudget`](budget::ByteBudget) stops a dispatcher from fetching once a
/// number of response bytes has been read, until it is reset.
pub mod budget;

/// Error types for dispatching.
///
/// Defines [`DispatchError`] which covers:
/// - Cancellation and budget exhaustion
/// - Transport failures
/// - Body buffering and cache-save failures
pub mod error;

/// Request deduplication.
///
/// The [`Registry`](inflight::Registry) maps dedup keys to in-flight requests
/// whose single outcome is broadcast to every caller that joined them.
pub mod inflight;

/// Bounded, priority-ordered admission of units of work.
pub mod queue;

/// The dispatcher orchestrating budget, deduplication, admission and cache.
pub mod dispatcher;

/// Serde configuration of the standard dispatchers.
pub mod config;

/// The standard set of per-class dispatchers.
pub mod netcache;

/// Metrics collection.
///
/// When the `metrics` feature is enabled, this module records:
/// - Dispatches by terminal state and class
/// - In-flight request count
/// - Transport call duration and charged bytes
pub mod metrics;

pub use budget::ByteBudget;
pub use config::{ClassConfig, ConfigError, NetCacheConfig, QueueCapacity};
pub use dispatcher::{DispatchState, Dispatcher, DispatcherBuilder, SharedCache};
pub use error::DispatchError;
pub use netcache::NetCache;
pub use queue::{DEFAULT_CAPACITY, OperationQueue};

pub use volley_core::{
    AdmissionQueue, BoxError, CacheError, CacheKey, CancellationToken, Cancelled, DispatchRequest,
    DispatchResponse, Priority, Raw, RequestCache, Transport, compute_priority,
};

/// The `volley` prelude.
///
/// ```rust
/// use volley::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{CancellationToken, DispatchError, Dispatcher, NetCache, Priority};
}
