use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use http::{Request, Response};
use http_body::Body as HttpBody;
use tower::{Layer, Service};
use volley::{Dispatcher, OperationQueue};
use volley_core::{BoxError, Priority, RequestCache};
use volley_http::{RequestHead, SharedHttpResponse};

use crate::service::DispatchService;
use crate::transport::TowerTransport;

/// Cache of HTTP response bodies, shared between layers and offline services.
pub type HttpCache = Arc<dyn RequestCache<RequestHead, SharedHttpResponse>>;

/// Tower layer wrapping a service in a [`DispatchService`].
///
/// Every application of the layer builds a fresh dispatcher, with its own
/// in-flight registry and byte budget. Layers built with the same queue share
/// the concurrency bound.
pub struct Dispatch<ReqBody, ResBody, Q = OperationQueue> {
    class: Priority,
    offset: i32,
    max_bytes: Option<i64>,
    queue: Arc<Q>,
    cache: Option<HttpCache>,
    _body: PhantomData<fn(ReqBody) -> ResBody>,
}

impl<ReqBody, ResBody> Dispatch<ReqBody, ResBody, OperationQueue> {
    /// Starts building a layer.
    pub fn builder() -> DispatchBuilder<ReqBody, ResBody, OperationQueue> {
        DispatchBuilder::default()
    }
}

impl<ReqBody, ResBody, Q> Clone for Dispatch<ReqBody, ResBody, Q> {
    fn clone(&self) -> Self {
        Self {
            class: self.class,
            offset: self.offset,
            max_bytes: self.max_bytes,
            queue: Arc::clone(&self.queue),
            cache: self.cache.clone(),
            _body: PhantomData,
        }
    }
}

impl<ReqBody, ResBody, Q> fmt::Debug for Dispatch<ReqBody, ResBody, Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("class", &self.class)
            .field("offset", &self.offset)
            .field("max_bytes", &self.max_bytes)
            .field("cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl<S, ReqBody, ResBody, Q> Layer<S> for Dispatch<ReqBody, ResBody, Q>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Into<BoxError>,
    ReqBody: Send + 'static,
    ResBody: HttpBody + Send + 'static,
    ResBody::Error: Into<BoxError>,
    ResBody::Data: Send,
{
    type Service = DispatchService<S, ReqBody, ResBody, Q>;

    fn layer(&self, inner: S) -> Self::Service {
        let dispatcher = Dispatcher::builder(TowerTransport::new(inner))
            .priority(self.class)
            .offset(self.offset)
            .max_bytes(self.max_bytes)
            .maybe_cache(self.cache.clone())
            .queue(Arc::clone(&self.queue))
            .build();
        DispatchService::from_dispatcher(dispatcher)
    }
}

/// Builder for [`Dispatch`].
pub struct DispatchBuilder<ReqBody, ResBody, Q = OperationQueue> {
    class: Priority,
    offset: i32,
    max_bytes: Option<i64>,
    queue: Arc<Q>,
    cache: Option<HttpCache>,
    _body: PhantomData<fn(ReqBody) -> ResBody>,
}

impl<ReqBody, ResBody> Default for DispatchBuilder<ReqBody, ResBody, OperationQueue> {
    fn default() -> Self {
        Self {
            class: Priority::default(),
            offset: 0,
            max_bytes: None,
            queue: Arc::new(OperationQueue::default()),
            cache: None,
            _body: PhantomData,
        }
    }
}

impl<ReqBody, ResBody, Q> DispatchBuilder<ReqBody, ResBody, Q> {
    pub fn priority(self, class: Priority) -> Self {
        DispatchBuilder { class, ..self }
    }

    pub fn offset(self, offset: i32) -> Self {
        DispatchBuilder { offset, ..self }
    }

    pub fn max_bytes(self, max_bytes: Option<i64>) -> Self {
        DispatchBuilder { max_bytes, ..self }
    }

    pub fn cache(self, cache: HttpCache) -> Self {
        DispatchBuilder {
            cache: Some(cache),
            ..self
        }
    }

    /// Replaces the private default queue, typically with one shared by
    /// several layers.
    pub fn queue<NQ>(self, queue: Arc<NQ>) -> DispatchBuilder<ReqBody, ResBody, NQ> {
        DispatchBuilder {
            class: self.class,
            offset: self.offset,
            max_bytes: self.max_bytes,
            queue,
            cache: self.cache,
            _body: PhantomData,
        }
    }

    pub fn build(self) -> Dispatch<ReqBody, ResBody, Q> {
        Dispatch {
            class: self.class,
            offset: self.offset,
            max_bytes: self.max_bytes,
            queue: self.queue,
            cache: self.cache,
            _body: PhantomData,
        }
    }
}
