use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Future;
use futures::future::BoxFuture;
use futures::ready;
use http::Response;
use http_body::Body as HttpBody;
use pin_project::pin_project;
use volley::DispatchError;
use volley_core::BoxError;
use volley_http::{BufferedBody, DispatchableHttpResponse};

type DispatchOutcome<ResBody> = Result<DispatchableHttpResponse<ResBody>, DispatchError<BoxError>>;

/// Future returned by [`DispatchService`](crate::DispatchService).
///
/// Resolves the dispatch and turns the dispatchable response back into an
/// HTTP response. Dropping it withdraws this caller from the shared request.
#[pin_project]
pub struct DispatchServiceFuture<ResBody>
where
    ResBody: HttpBody,
{
    #[pin]
    inner: BoxFuture<'static, DispatchOutcome<ResBody>>,
}

impl<ResBody> DispatchServiceFuture<ResBody>
where
    ResBody: HttpBody,
{
    pub fn new(inner: BoxFuture<'static, DispatchOutcome<ResBody>>) -> Self {
        Self { inner }
    }
}

impl<ResBody> Future for DispatchServiceFuture<ResBody>
where
    ResBody: HttpBody,
{
    type Output = Result<Response<BufferedBody<ResBody>>, DispatchError<BoxError>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let outcome = ready!(this.inner.poll(cx));
        Poll::Ready(outcome.map(DispatchableHttpResponse::into_response))
    }
}
