//! Scriptable transport used by the integration tests.
//!
//! [`MockTransport`] records every call it receives together with the
//! cancellation token the dispatcher handed it. A gated transport holds every
//! call until the test releases it, which is how tests keep requests in
//! flight while they join, cancel or queue more of them.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use futures::future::BoxFuture;
use http::header::CONTENT_LENGTH;
use http::{Method, Request, Response, Uri};
use http_body_util::Full;
use parking_lot::Mutex;
use tokio::sync::{Semaphore, watch};
use volley_core::{BoxError, CancellationToken, Cancelled, Transport};
use volley_http::{DispatchableHttpRequest, DispatchableHttpResponse};

/// Body type of mock requests and responses.
pub type Body = Full<Bytes>;
pub type MockRequest = DispatchableHttpRequest<Body>;
pub type MockResponse = DispatchableHttpResponse<Body>;

/// Header carrying the sequence number of the call that produced a response.
pub const CALL_HEADER: &str = "x-mock-call";

/// Builds a mock request.
pub fn request(method: Method, uri: &str) -> MockRequest {
    DispatchableHttpRequest::from_request(
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::default())
            .unwrap(),
    )
}

/// Builds a mock `GET` request.
pub fn get(uri: &str) -> MockRequest {
    request(Method::GET, uri)
}

/// One call received by the transport.
#[derive(Debug, Clone)]
pub struct Call {
    pub method: Method,
    pub uri: Uri,
    pub token: CancellationToken,
}

#[derive(Debug, Default)]
pub struct TransportCounters {
    pub calls: AtomicUsize,
    pub running: AtomicUsize,
    pub max_running: AtomicUsize,
    pub completed: AtomicUsize,
}

#[derive(Debug)]
struct State {
    counters: TransportCounters,
    gated: bool,
    gate: Semaphore,
    started: watch::Sender<usize>,
    calls: Mutex<Vec<Call>>,
    body: Mutex<Option<Bytes>>,
    failure: Mutex<Option<String>>,
}

/// Decrements the running counter when the call ends or is dropped.
struct Running(Arc<State>);

impl Drop for Running {
    fn drop(&mut self) {
        self.0.counters.running.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Debug)]
pub struct MockTransport {
    state: Arc<State>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// A transport answering every call immediately.
    pub fn new() -> Self {
        Self::build(false)
    }

    /// A transport holding every call until [`release`](Self::release).
    pub fn gated() -> Self {
        Self::build(true)
    }

    fn build(gated: bool) -> Self {
        let (started, _) = watch::channel(0);
        Self {
            state: Arc::new(State {
                counters: TransportCounters::default(),
                gated,
                gate: Semaphore::new(0),
                started,
                calls: Mutex::new(Vec::new()),
                body: Mutex::new(None),
                failure: Mutex::new(None),
            }),
        }
    }

    /// Answers every call with `body` instead of echoing the request line.
    pub fn with_body(self, body: impl Into<Bytes>) -> Self {
        *self.state.body.lock() = Some(body.into());
        self
    }

    /// Fails every call with `message`.
    pub fn failing(self, message: &str) -> Self {
        *self.state.failure.lock() = Some(message.to_owned());
        self
    }

    /// Lets `count` held calls complete.
    pub fn release(&self, count: usize) {
        self.state.gate.add_permits(count);
    }

    /// Waits until at least `count` calls have started.
    pub async fn wait_for_calls(&self, count: usize) {
        let mut started = self.state.started.subscribe();
        // The sender lives as long as the transport, so this cannot fail.
        let _ = started.wait_for(|started| *started >= count).await;
    }

    pub fn call_count(&self) -> usize {
        self.state.counters.calls.load(Ordering::SeqCst)
    }

    pub fn running(&self) -> usize {
        self.state.counters.running.load(Ordering::SeqCst)
    }

    pub fn max_running(&self) -> usize {
        self.state.counters.max_running.load(Ordering::SeqCst)
    }

    pub fn completed_count(&self) -> usize {
        self.state.counters.completed.load(Ordering::SeqCst)
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.state.calls.lock().clone()
    }

    /// Paths of every call received so far, in order.
    pub fn paths(&self) -> Vec<String> {
        self.state
            .calls
            .lock()
            .iter()
            .map(|call| call.uri.path().to_owned())
            .collect()
    }

    fn begin(&self, method: &Method, uri: &Uri, token: &CancellationToken) -> (usize, Running) {
        let counters = &self.state.counters;
        let number = counters.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let running = counters.running.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_running.fetch_max(running, Ordering::SeqCst);

        self.state.calls.lock().push(Call {
            method: method.clone(),
            uri: uri.clone(),
            token: token.clone(),
        });
        self.state.started.send_modify(|started| *started += 1);
        (number, Running(Arc::clone(&self.state)))
    }
}

impl Transport<MockRequest> for MockTransport {
    type Response = MockResponse;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<MockResponse, BoxError>>;

    fn send(&mut self, req: MockRequest, cancel: CancellationToken) -> Self::Future {
        let transport = self.clone();
        Box::pin(async move {
            let parts = req.parts();
            let (method, uri) = (parts.method.clone(), parts.uri.clone());
            let (number, _running) = transport.begin(&method, &uri, &cancel);
            let state = &transport.state;

            if state.gated {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Box::new(Cancelled) as BoxError),
                    permit = state.gate.acquire() => permit?.forget(),
                }
            }
            state.counters.completed.fetch_add(1, Ordering::SeqCst);

            if let Some(message) = state.failure.lock().clone() {
                return Err(message.into());
            }
            let body = state
                .body
                .lock()
                .clone()
                .unwrap_or_else(|| Bytes::from(format!("{method} {uri}")));
            let response = Response::builder()
                .header(CONTENT_LENGTH, body.len())
                .header(CALL_HEADER, number)
                .body(Full::new(body))?;
            Ok(DispatchableHttpResponse::passthrough(response))
        })
    }
}
