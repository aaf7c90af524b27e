//! Responses that can be broadcast to many waiters.
//!
//! A response body is usually a single-read stream, while a deduplicated
//! dispatch has to hand the same response to every caller that joined it. The
//! [`DispatchResponse`] trait bridges the two: the dispatcher converts the
//! transport's response into a cloneable [`Shared`](DispatchResponse::Shared)
//! form once (buffering the body), broadcasts that, and every waiter rebuilds
//! its own response from it.

use async_trait::async_trait;

use crate::BoxError;

/// Trait for response types the dispatcher can share between waiters.
///
/// # Associated Types
///
/// - `Shared` - The buffered, cloneable representation broadcast to waiters
///   and passed to the cache-save callback
#[async_trait]
pub trait DispatchResponse: Sized + Send {
    /// Buffered, cloneable representation of the response.
    type Shared: Clone + Send + Sync + 'static;

    /// Returns the declared length of the body, if known before reading it.
    fn content_length(&self) -> Option<u64>;

    /// Reads the whole body and rebuilds an equivalent response over it.
    async fn into_shared(self) -> Result<Self::Shared, BoxError>;

    /// Rebuilds a response for one waiter from the shared representation.
    fn from_shared(shared: Self::Shared) -> Self;
}
