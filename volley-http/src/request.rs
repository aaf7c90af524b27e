use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version};
use volley_core::{CacheKey, DispatchRequest};

use crate::key::derive_key;

/// Methods whose concurrent calls may share one response.
pub fn is_dedupable_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Cloneable description of an HTTP request, handed to the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    /// The request method.
    pub method: Method,
    /// The request URI.
    pub uri: Uri,
    /// The HTTP version.
    pub version: Version,
    /// The request headers.
    pub headers: HeaderMap,
}

impl RequestHead {
    /// Captures the head of `parts`.
    pub fn from_parts(parts: &Parts) -> Self {
        Self {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            version: parts.version,
            headers: parts.headers.clone(),
        }
    }

    /// Derives the dedup key of the request.
    pub fn key(&self) -> CacheKey {
        derive_key(&self.method, &self.uri, &self.headers)
    }
}

/// An HTTP request as seen by the dispatcher.
#[derive(Debug)]
pub struct DispatchableHttpRequest<ReqBody> {
    parts: Parts,
    body: ReqBody,
}

impl<ReqBody> DispatchableHttpRequest<ReqBody> {
    pub fn from_request(request: Request<ReqBody>) -> Self {
        let (parts, body) = request.into_parts();
        Self { parts, body }
    }

    pub fn into_request(self) -> Request<ReqBody> {
        Request::from_parts(self.parts, self.body)
    }

    pub fn parts(&self) -> &Parts {
        &self.parts
    }

    pub fn into_parts(self) -> (Parts, ReqBody) {
        (self.parts, self.body)
    }
}

impl<ReqBody> From<Request<ReqBody>> for DispatchableHttpRequest<ReqBody> {
    fn from(request: Request<ReqBody>) -> Self {
        Self::from_request(request)
    }
}

impl<ReqBody> DispatchRequest for DispatchableHttpRequest<ReqBody> {
    type Head = RequestHead;

    fn is_dedupable(&self) -> bool {
        is_dedupable_method(&self.parts.method)
    }

    fn dedup_key(&self) -> CacheKey {
        derive_key(&self.parts.method, &self.parts.uri, &self.parts.headers)
    }

    fn head(&self) -> RequestHead {
        RequestHead::from_parts(&self.parts)
    }
}
