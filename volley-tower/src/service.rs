use std::fmt;
use std::task::{Context, Poll};

use http::{Request, Response};
use http_body::Body as HttpBody;
use tower::Service;
use volley::{AdmissionQueue, DispatchError, Dispatcher, OperationQueue};
use volley_core::{BoxError, CancellationToken};
use volley_http::{BufferedBody, DispatchableHttpRequest};

use crate::future::DispatchServiceFuture;
use crate::transport::TowerTransport;

/// Dispatcher over a Tower service.
pub type HttpDispatcher<S, ReqBody, ResBody, Q = OperationQueue> =
    Dispatcher<TowerTransport<S, ReqBody, ResBody>, DispatchableHttpRequest<ReqBody>, Q>;

/// Tower service running every request through a [`Dispatcher`].
///
/// Concurrent `GET`, `HEAD` and `OPTIONS` requests with the same dedup key
/// share one call of the inner service. Other methods are forwarded as they
/// are.
///
/// A [`CancellationToken`] found in the request extensions cancels the
/// request. Dropping the response future has the same effect.
pub struct DispatchService<S, ReqBody, ResBody, Q = OperationQueue>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Into<BoxError>,
    ReqBody: Send + 'static,
    ResBody: HttpBody + Send + 'static,
    ResBody::Error: Into<BoxError>,
    ResBody::Data: Send,
{
    dispatcher: HttpDispatcher<S, ReqBody, ResBody, Q>,
}

impl<S, ReqBody, ResBody, Q> DispatchService<S, ReqBody, ResBody, Q>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Into<BoxError>,
    ReqBody: Send + 'static,
    ResBody: HttpBody + Send + 'static,
    ResBody::Error: Into<BoxError>,
    ResBody::Data: Send,
{
    /// Wraps an existing dispatcher, e.g. one of a [`NetCache`](volley::NetCache).
    pub fn from_dispatcher(dispatcher: HttpDispatcher<S, ReqBody, ResBody, Q>) -> Self {
        Self { dispatcher }
    }

    /// Returns the dispatcher requests are sent through.
    pub fn dispatcher(&self) -> &HttpDispatcher<S, ReqBody, ResBody, Q> {
        &self.dispatcher
    }
}

impl<S, ReqBody, ResBody, Q> Clone for DispatchService<S, ReqBody, ResBody, Q>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Into<BoxError>,
    ReqBody: Send + 'static,
    ResBody: HttpBody + Send + 'static,
    ResBody::Error: Into<BoxError>,
    ResBody::Data: Send,
{
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl<S, ReqBody, ResBody, Q> fmt::Debug for DispatchService<S, ReqBody, ResBody, Q>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Into<BoxError>,
    ReqBody: Send + 'static,
    ResBody: HttpBody + Send + 'static,
    ResBody::Error: Into<BoxError>,
    ResBody::Data: Send,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchService")
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

impl<S, ReqBody, ResBody, Q> Service<Request<ReqBody>> for DispatchService<S, ReqBody, ResBody, Q>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Into<BoxError>,
    ReqBody: Send + 'static,
    ResBody: HttpBody + Send + 'static,
    ResBody::Error: Into<BoxError>,
    ResBody::Data: Send,
    Q: AdmissionQueue + 'static,
{
    type Response = Response<BufferedBody<ResBody>>;
    type Error = DispatchError<BoxError>;
    type Future = DispatchServiceFuture<ResBody>;

    // Readiness of the inner service is driven per call by the transport.
    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let dispatcher = self.dispatcher.clone();
        let cancel = request
            .extensions()
            .get::<CancellationToken>()
            .cloned()
            .unwrap_or_default();
        let request = DispatchableHttpRequest::from_request(request);

        DispatchServiceFuture::new(Box::pin(async move {
            dispatcher.send(request, cancel).await
        }))
    }
}
