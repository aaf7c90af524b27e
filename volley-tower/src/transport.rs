//! Transport adapter for bridging Tower services to volley.
//!
//! This module provides [`TowerTransport`], an adapter that implements
//! volley's [`Transport`] trait for Tower services. The dispatcher calls it
//! for every request that actually goes to the network.
//!
//! Users typically don't interact with this module directly: it's used
//! internally by [`DispatchService`](crate::DispatchService). It is public so
//! that a [`NetCache`](volley::NetCache) can be built over a Tower client.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::ready;
use http::{Request, Response};
use http_body::Body as HttpBody;
use pin_project::pin_project;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tower::Service;
use tower::util::{Oneshot, ServiceExt};
use volley_core::{BoxError, Cancelled, Transport};
use volley_http::{DispatchableHttpRequest, DispatchableHttpResponse};

/// Future returned by [`TowerTransport::send`].
///
/// Drives the service to readiness, calls it, and resolves to a
/// [`Cancelled`] error as soon as the token fires.
#[pin_project]
pub struct TowerTransportFuture<S, ReqBody, ResBody>
where
    S: Service<Request<ReqBody>>,
{
    #[pin]
    cancelled: WaitForCancellationFutureOwned,
    #[pin]
    inner: Oneshot<S, Request<ReqBody>>,
    _body: PhantomData<fn() -> ResBody>,
}

impl<S, ReqBody, ResBody> Future for TowerTransportFuture<S, ReqBody, ResBody>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Error: Into<BoxError>,
    ResBody: HttpBody,
{
    type Output = Result<DispatchableHttpResponse<ResBody>, BoxError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        if this.cancelled.poll(cx).is_ready() {
            return Poll::Ready(Err(Box::new(Cancelled)));
        }
        match ready!(this.inner.poll(cx)) {
            Ok(response) => Poll::Ready(Ok(DispatchableHttpResponse::passthrough(response))),
            Err(error) => Poll::Ready(Err(error.into())),
        }
    }
}

/// Adapter that implements volley's [`Transport`] trait for Tower services.
///
/// # Type Parameters
///
/// * `S` - The Tower service being adapted
/// * `ReqBody` - Request body type
/// * `ResBody` - Response body type
pub struct TowerTransport<S, ReqBody, ResBody> {
    service: S,
    _phantom: PhantomData<fn(ReqBody) -> ResBody>,
}

impl<S, ReqBody, ResBody> TowerTransport<S, ReqBody, ResBody> {
    /// Creates a new transport wrapping the given service.
    pub fn new(service: S) -> Self {
        Self {
            service,
            _phantom: PhantomData,
        }
    }

    /// Returns the wrapped service.
    pub fn into_inner(self) -> S {
        self.service
    }
}

impl<S, ReqBody, ResBody> Clone for TowerTransport<S, ReqBody, ResBody>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self::new(self.service.clone())
    }
}

impl<S, ReqBody, ResBody> fmt::Debug for TowerTransport<S, ReqBody, ResBody> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TowerTransport").finish_non_exhaustive()
    }
}

impl<S, ReqBody, ResBody> Transport<DispatchableHttpRequest<ReqBody>>
    for TowerTransport<S, ReqBody, ResBody>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Into<BoxError>,
    ReqBody: Send + 'static,
    ResBody: HttpBody + Send + 'static,
{
    type Response = DispatchableHttpResponse<ResBody>;
    type Error = BoxError;
    type Future = TowerTransportFuture<S, ReqBody, ResBody>;

    fn send(&mut self, req: DispatchableHttpRequest<ReqBody>, cancel: CancellationToken) -> Self::Future {
        TowerTransportFuture {
            cancelled: cancel.cancelled_owned(),
            inner: self.service.clone().oneshot(req.into_request()),
            _body: PhantomData,
        }
    }
}
