//! The network-facing seam of the dispatcher.

use std::future::Future;

use tokio_util::sync::CancellationToken;

/// Trait for the underlying network handler the dispatcher wraps.
/// This trait is framework-agnostic and can be implemented for any async client.
///
/// Implementations should observe `cancel` and abandon the call when it fires.
/// The dispatcher also stops polling the returned future at that point, so a
/// transport that ignores the token is still cancelled, just less promptly.
///
/// # Examples
///
/// ```rust,ignore
/// use volley_core::{CancellationToken, Transport};
/// use std::future::Ready;
///
/// #[derive(Clone)]
/// struct StaticTransport {
///     response: MyResponse,
/// }
///
/// impl Transport<MyRequest> for StaticTransport {
///     type Response = MyResponse;
///     type Error = std::convert::Infallible;
///     type Future = Ready<Result<MyResponse, Self::Error>>;
///
///     fn send(&mut self, _req: MyRequest, _cancel: CancellationToken) -> Self::Future {
///         std::future::ready(Ok(self.response.clone()))
///     }
/// }
/// ```
pub trait Transport<Req> {
    /// The response type returned by the transport
    type Response;

    /// The error type returned by the transport
    type Error;

    /// The future that resolves to the response
    type Future: Future<Output = Result<Self::Response, Self::Error>> + Send;

    /// Send the request, abandoning it when `cancel` fires
    fn send(&mut self, req: Req, cancel: CancellationToken) -> Self::Future;
}
