//! Requests the dispatcher can merge.

use crate::CacheKey;

/// Trait for request types the dispatcher can deduplicate.
///
/// The dispatcher only needs the semantic identity of a request: whether it is
/// safe to share its response between callers, and the key under which equal
/// requests meet. The request itself is moved into the transport, so a
/// cloneable [`Head`](DispatchRequest::Head) is captured up front for the
/// cache-save callback.
pub trait DispatchRequest {
    /// Cloneable description of the request handed to the cache.
    type Head: Clone + Send + Sync + 'static;

    /// Returns `true` when concurrent equal requests may share one response.
    ///
    /// For HTTP this holds for `GET`, `HEAD` and `OPTIONS`. Other requests
    /// bypass deduplication and caching entirely.
    fn is_dedupable(&self) -> bool;

    /// Derives the dedup key. Also used as the cache key.
    fn dedup_key(&self) -> CacheKey;

    /// Captures the request head.
    fn head(&self) -> Self::Head;
}
