use async_trait::async_trait;
use bytes::Bytes;
use http::header::CONTENT_LENGTH;
use http::response::Parts;
use http::{HeaderMap, Response, StatusCode, Version};
use http_body::Body as HttpBody;
use serde::{Deserialize, Serialize};
use volley_core::{BoxError, DispatchResponse, Raw};

use crate::body::BufferedBody;

/// An HTTP response as seen by the dispatcher.
#[derive(Debug)]
pub struct DispatchableHttpResponse<ResBody>
where
    ResBody: HttpBody,
{
    pub parts: Parts,
    pub body: BufferedBody<ResBody>,
}

impl<ResBody> DispatchableHttpResponse<ResBody>
where
    ResBody: HttpBody,
{
    pub fn from_response(response: Response<BufferedBody<ResBody>>) -> Self {
        let (parts, body) = response.into_parts();
        Self { parts, body }
    }

    /// Wraps a transport response whose body has not been read.
    pub fn passthrough(response: Response<ResBody>) -> Self {
        let (parts, body) = response.into_parts();
        Self {
            parts,
            body: BufferedBody::Passthrough(body),
        }
    }

    pub fn into_response(self) -> Response<BufferedBody<ResBody>> {
        Response::from_parts(self.parts, self.body)
    }
}

/// A fully buffered response: status, version, headers and body.
///
/// This is what every caller of a deduplicated request receives a copy of,
/// and what the cache is given to save.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SharedHttpResponse {
    #[serde(with = "http_serde::status_code")]
    status: StatusCode,
    #[serde(with = "http_serde::version")]
    version: Version,
    #[serde(with = "http_serde::header_map")]
    headers: HeaderMap,
    body: Bytes,
}

impl SharedHttpResponse {
    pub fn new(status: StatusCode, version: Version, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            version,
            headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Rebuilds a response over the buffered body.
    pub fn into_response<B>(self) -> Response<BufferedBody<B>>
    where
        B: HttpBody,
    {
        let mut response = Response::new(BufferedBody::Complete(Some(self.body)));
        *response.status_mut() = self.status;
        *response.version_mut() = self.version;
        *response.headers_mut() = self.headers;
        response
    }
}

#[async_trait]
impl<ResBody> DispatchResponse for DispatchableHttpResponse<ResBody>
where
    ResBody: HttpBody + Send + 'static,
    ResBody::Error: Into<BoxError>,
    ResBody::Data: Send,
{
    type Shared = SharedHttpResponse;

    fn content_length(&self) -> Option<u64> {
        self.parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok())
            .or_else(|| self.body.size_hint().exact())
    }

    async fn into_shared(self) -> Result<SharedHttpResponse, BoxError> {
        let body = self.body.collect().await.map_err(Into::<BoxError>::into)?;
        Ok(SharedHttpResponse {
            status: self.parts.status,
            version: self.parts.version,
            headers: self.parts.headers,
            body,
        })
    }

    fn from_shared(shared: SharedHttpResponse) -> Self {
        Self::from_response(shared.into_response())
    }
}

/// Builds the response served when offline: `200 OK` over the cached body,
/// or `503 Service Unavailable` when nothing was cached.
pub fn offline_response<B>(body: Option<Raw>) -> Response<BufferedBody<B>>
where
    B: HttpBody,
{
    match body {
        Some(body) => Response::new(BufferedBody::Complete(Some(body))),
        None => {
            let mut response = Response::new(BufferedBody::Complete(None));
            *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
            response
        }
    }
}
