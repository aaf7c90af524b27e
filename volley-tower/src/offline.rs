use std::fmt;
use std::marker::PhantomData;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::future::BoxFuture;
use http::{Request, Response};
use http_body::Body as HttpBody;
use http_body_util::Empty;
use tower::Service;
use tracing::debug;
use volley_core::{CacheError, CancellationToken};
use volley_http::{BufferedBody, RequestHead, offline_response};

use crate::layer::HttpCache;

/// Tower service answering requests from the cache alone.
///
/// The key is derived exactly as the dispatcher derives it, so anything a
/// dispatcher saved can be served here. A hit is returned as `200 OK` with the
/// cached body and a miss as `503 Service Unavailable`. The network is never
/// touched.
pub struct OfflineService<ResBody = Empty<Bytes>> {
    cache: HttpCache,
    _body: PhantomData<fn() -> ResBody>,
}

impl<ResBody> OfflineService<ResBody> {
    pub fn new(cache: HttpCache) -> Self {
        Self {
            cache,
            _body: PhantomData,
        }
    }
}

impl<ResBody> Clone for OfflineService<ResBody> {
    fn clone(&self) -> Self {
        Self::new(self.cache.clone())
    }
}

impl<ResBody> fmt::Debug for OfflineService<ResBody> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OfflineService").finish_non_exhaustive()
    }
}

impl<ReqBody, ResBody> Service<Request<ReqBody>> for OfflineService<ResBody>
where
    ResBody: HttpBody + Send + 'static,
{
    type Response = Response<BufferedBody<ResBody>>;
    type Error = CacheError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let cache = self.cache.clone();
        let (parts, _) = request.into_parts();
        let cancel = parts
            .extensions
            .get::<CancellationToken>()
            .cloned()
            .unwrap_or_default();
        let head = RequestHead::from_parts(&parts);

        Box::pin(async move {
            let key = head.key();
            let body = cache.fetch(&head, &key, cancel).await?;
            debug!(%key, hit = body.is_some(), "offline lookup");
            Ok(offline_response(body))
        })
    }
}
