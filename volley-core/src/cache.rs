//! Pluggable cache for response bodies.
//!
//! This is a simple body store keyed by [`CacheKey`]. It is intentionally
//! *not* designed to follow HTTP caching rules: a client application usually
//! wants to override those anyway. The dispatcher calls
//! [`save`](RequestCache::save) after every successful deduplicated fetch and
//! the offline handler calls [`fetch`](RequestCache::fetch) instead of touching
//! the network.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{CacheError, CacheKey, Raw};

/// Store for response bodies.
///
/// `Head` is the captured request description and `Res` the buffered response
/// type of the protocol binding in use.
#[async_trait]
pub trait RequestCache<Head, Res>: Send + Sync {
    /// Saves the response. The body is already fully buffered, so
    /// implementations do not have to worry about consuming a stream.
    async fn save(
        &self,
        request: &Head,
        response: &Res,
        key: &CacheKey,
        cancel: CancellationToken,
    ) -> Result<(), CacheError>;

    /// Loads the body saved under `key`.
    ///
    /// Returns `Ok(None)` when the lookup succeeded but nothing was stored.
    async fn fetch(
        &self,
        request: &Head,
        key: &CacheKey,
        cancel: CancellationToken,
    ) -> Result<Option<Raw>, CacheError>;
}

#[async_trait]
impl<Head, Res, C> RequestCache<Head, Res> for Arc<C>
where
    Head: Sync,
    Res: Sync,
    C: RequestCache<Head, Res> + ?Sized,
{
    async fn save(
        &self,
        request: &Head,
        response: &Res,
        key: &CacheKey,
        cancel: CancellationToken,
    ) -> Result<(), CacheError> {
        self.as_ref().save(request, response, key, cancel).await
    }

    async fn fetch(
        &self,
        request: &Head,
        key: &CacheKey,
        cancel: CancellationToken,
    ) -> Result<Option<Raw>, CacheError> {
        self.as_ref().fetch(request, key, cancel).await
    }
}
