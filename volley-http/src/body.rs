//! Response bodies handed back by the dispatcher.
//!
//! ## Body States
//!
//! - **Complete**: the body was read into memory because the response was
//!   shared between several callers (or came from the cache)
//! - **Passthrough**: the body was never read; the request bypassed
//!   deduplication and the transport's stream is forwarded as is

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use http_body::{Body as HttpBody, Frame, SizeHint};
use pin_project::pin_project;

/// A body that is either fully buffered or the untouched transport stream.
#[pin_project(project = BufferedBodyProj)]
pub enum BufferedBody<B>
where
    B: HttpBody,
{
    /// Body was fully read into memory.
    ///
    /// The `Option` is used to yield the data once, then return `None` on subsequent polls.
    Complete(Option<Bytes>),

    /// Body was passed through without reading.
    Passthrough(#[pin] B),
}

impl<B> BufferedBody<B>
where
    B: HttpBody,
{
    /// Creates a complete body over `bytes`.
    pub fn complete(bytes: impl Into<Bytes>) -> Self {
        BufferedBody::Complete(Some(bytes.into()))
    }

    /// Returns the buffered bytes, if the body is complete and not yet polled.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            BufferedBody::Complete(bytes) => bytes.as_ref(),
            BufferedBody::Passthrough(_) => None,
        }
    }

    /// Returns `true` if the body was buffered.
    pub fn is_complete(&self) -> bool {
        matches!(self, BufferedBody::Complete(_))
    }

    /// Collects the entire body into bytes.
    pub async fn collect(self) -> Result<Bytes, B::Error> {
        use http_body_util::BodyExt;

        match self {
            BufferedBody::Complete(Some(bytes)) => Ok(bytes),
            BufferedBody::Complete(None) => Ok(Bytes::new()),
            BufferedBody::Passthrough(body) => Ok(body.collect().await?.to_bytes()),
        }
    }
}

impl<B> HttpBody for BufferedBody<B>
where
    B: HttpBody,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            BufferedBodyProj::Complete(data) => Poll::Ready(data.take().map(|bytes| Ok(Frame::data(bytes)))),
            BufferedBodyProj::Passthrough(body) => match body.poll_frame(cx) {
                Poll::Ready(Some(Ok(frame))) => {
                    let frame = frame.map_data(|mut data| data.copy_to_bytes(data.remaining()));
                    Poll::Ready(Some(Ok(frame)))
                }
                Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            },
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            BufferedBody::Complete(Some(bytes)) => SizeHint::with_exact(bytes.len() as u64),
            BufferedBody::Complete(None) => SizeHint::with_exact(0),
            BufferedBody::Passthrough(body) => body.size_hint(),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            BufferedBody::Complete(None) => true,
            BufferedBody::Complete(Some(_)) => false,
            BufferedBody::Passthrough(body) => body.is_end_stream(),
        }
    }
}

impl<B> fmt::Debug for BufferedBody<B>
where
    B: HttpBody,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferedBody::Complete(Some(bytes)) => f
                .debug_tuple("Complete")
                .field(&format!("{} bytes", bytes.len()))
                .finish(),
            BufferedBody::Complete(None) => f.debug_tuple("Complete").field(&"consumed").finish(),
            BufferedBody::Passthrough(_) => f.debug_tuple("Passthrough").field(&"...").finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::{BodyExt, Full};

    use super::*;

    #[tokio::test]
    async fn test_complete_yields_once() {
        let mut body: BufferedBody<Full<Bytes>> = BufferedBody::complete("hello");
        assert_eq!(body.size_hint().exact(), Some(5));
        assert!(!body.is_end_stream());

        let frame = body.frame().await.unwrap().unwrap();
        assert_eq!(frame.into_data().unwrap(), Bytes::from_static(b"hello"));
        assert!(body.frame().await.is_none());
        assert!(body.is_end_stream());
    }

    #[tokio::test]
    async fn test_passthrough_collects_stream() {
        let body = BufferedBody::Passthrough(Full::new(Bytes::from_static(b"streamed")));
        assert!(!body.is_complete());
        assert_eq!(body.collect().await.unwrap(), Bytes::from_static(b"streamed"));
    }
}
