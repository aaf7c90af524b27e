use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::Method;
use http::header::ACCEPT;
use pretty_assertions::assert_eq;
use volley::{CancellationToken, DispatchError, Dispatcher, OperationQueue, Priority};
use volley_core::DispatchRequest;
use volley_http::RequestHead;
use volley_test::{CALL_HEADER, MockCache, MockRequest, MockResponse, MockTransport, get, request};

type TestDispatcher = Dispatcher<MockTransport, MockRequest>;

const URL: &str = "https://example.com/resource";

/// Lets spawned units of work run on the current-thread runtime.
async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

async fn body(response: MockResponse) -> Bytes {
    response.body.collect().await.unwrap()
}

fn call_number(response: &MockResponse) -> &str {
    response.parts.headers[CALL_HEADER].to_str().unwrap()
}

#[tokio::test]
async fn concurrent_identical_requests_share_one_call() {
    let transport = MockTransport::gated();
    let dispatcher = TestDispatcher::new(transport.clone());

    let (a, b, c, ()) = tokio::join!(
        dispatcher.send(get(URL), CancellationToken::new()),
        dispatcher.send(get(URL), CancellationToken::new()),
        dispatcher.send(get(URL), CancellationToken::new()),
        async {
            transport.wait_for_calls(1).await;
            transport.release(1);
        },
    );

    assert_eq!(transport.call_count(), 1);
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
    assert_eq!(call_number(&a), "1");
    assert_eq!(call_number(&b), "1");
    assert_eq!(call_number(&c), "1");
    let expected = Bytes::from(format!("GET {URL}"));
    assert_eq!(body(a).await, expected);
    assert_eq!(body(b).await, expected);
    assert_eq!(body(c).await, expected);
    assert_eq!(dispatcher.inflight_count(), 0);
}

#[tokio::test]
async fn distinct_keys_are_not_merged() {
    let transport = MockTransport::new();
    let dispatcher = TestDispatcher::new(transport.clone());

    let (a, b) = tokio::join!(
        dispatcher.send(get("https://example.com/a"), CancellationToken::new()),
        dispatcher.send(get("https://example.com/b"), CancellationToken::new()),
    );

    assert_eq!(transport.call_count(), 2);
    assert_eq!(body(a.unwrap()).await, Bytes::from("GET https://example.com/a"));
    assert_eq!(body(b.unwrap()).await, Bytes::from("GET https://example.com/b"));
}

#[tokio::test]
async fn headers_outside_the_key_do_not_split_requests() {
    let transport = MockTransport::new();
    let dispatcher = TestDispatcher::new(transport.clone());

    let with_cookie = || {
        let mut request = http::Request::get(URL)
            .header("cookie", "session=1")
            .body(Default::default())
            .unwrap();
        request.headers_mut().insert("x-request-id", "7".parse().unwrap());
        MockRequest::from_request(request)
    };
    let with_accept = || {
        MockRequest::from_request(
            http::Request::get(URL)
                .header(ACCEPT, "application/json")
                .body(Default::default())
                .unwrap(),
        )
    };
    assert_eq!(with_cookie().dedup_key(), get(URL).dedup_key());
    assert_ne!(with_accept().dedup_key(), get(URL).dedup_key());

    let (a, b, c) = tokio::join!(
        dispatcher.send(get(URL), CancellationToken::new()),
        dispatcher.send(with_cookie(), CancellationToken::new()),
        dispatcher.send(with_accept(), CancellationToken::new()),
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn completed_requests_are_not_reused() {
    let transport = MockTransport::new();
    let dispatcher = TestDispatcher::new(transport.clone());

    let first = dispatcher.send(get(URL), CancellationToken::new()).await.unwrap();
    assert!(!dispatcher.is_inflight(&get(URL).dedup_key()));
    let second = dispatcher.send(get(URL), CancellationToken::new()).await.unwrap();

    assert_eq!(transport.call_count(), 2);
    assert_eq!(call_number(&first), "1");
    assert_eq!(call_number(&second), "2");
}

#[tokio::test]
async fn cancelling_one_caller_keeps_the_shared_call() {
    let transport = MockTransport::gated();
    let dispatcher = TestDispatcher::new(transport.clone());
    let creator = CancellationToken::new();

    let (a, b, ()) = tokio::join!(
        dispatcher.send(get(URL), creator.clone()),
        dispatcher.send(get(URL), CancellationToken::new()),
        async {
            transport.wait_for_calls(1).await;
            creator.cancel();
            settle().await;
            assert!(!transport.calls()[0].token.is_cancelled());
            transport.release(1);
        },
    );

    assert!(matches!(a, Err(DispatchError::Cancelled)));
    assert_eq!(body(b.unwrap()).await, Bytes::from(format!("GET {URL}")));
    assert_eq!(transport.call_count(), 1);
    assert!(!transport.calls()[0].token.is_cancelled());
}

#[tokio::test]
async fn cancelling_every_caller_cancels_the_call() {
    let transport = MockTransport::gated();
    let dispatcher = TestDispatcher::new(transport.clone());
    let first = CancellationToken::new();
    let second = CancellationToken::new();

    let (a, b, ()) = tokio::join!(
        dispatcher.send(get(URL), first.clone()),
        dispatcher.send(get(URL), second.clone()),
        async {
            transport.wait_for_calls(1).await;
            first.cancel();
            second.cancel();
        },
    );

    assert!(matches!(a, Err(DispatchError::Cancelled)));
    assert!(matches!(b, Err(DispatchError::Cancelled)));
    assert_eq!(dispatcher.inflight_count(), 0);
    assert!(transport.calls()[0].token.is_cancelled());

    settle().await;
    assert_eq!(transport.completed_count(), 0);
    assert_eq!(transport.running(), 0);

    // A fresh request after a full cancellation starts a new call.
    transport.release(1);
    let response = dispatcher.send(get(URL), CancellationToken::new()).await.unwrap();
    assert_eq!(call_number(&response), "2");
}

#[tokio::test]
async fn dropping_the_future_withdraws_the_caller() {
    let transport = MockTransport::gated();
    let dispatcher = TestDispatcher::new(transport.clone());

    let dropped = tokio::time::timeout(
        Duration::from_millis(20),
        dispatcher.send(get(URL), CancellationToken::new()),
    )
    .await;
    assert!(dropped.is_err());

    assert_eq!(dispatcher.inflight_count(), 0);
    assert!(transport.calls()[0].token.is_cancelled());
}

#[tokio::test]
async fn cancelled_before_send() {
    let transport = MockTransport::new();
    let dispatcher = TestDispatcher::new(transport.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = dispatcher.send(get(URL), cancel).await;
    assert!(matches!(outcome, Err(DispatchError::Cancelled)));

    settle().await;
    assert_eq!(transport.call_count(), 0);
    assert_eq!(dispatcher.inflight_count(), 0);
}

#[test]
fn runtime_shutdown_before_the_fetch_runs_releases_waiters() {
    let transport = MockTransport::new();
    let dispatcher = TestDispatcher::new(transport.clone());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let mut waiting = runtime.block_on(async {
        let mut send = Box::pin(dispatcher.send(get(URL), CancellationToken::new()));
        let pending = std::future::poll_fn(|cx| {
            std::task::Poll::Ready(send.as_mut().poll(cx).is_pending())
        })
        .await;
        assert!(pending);
        send
    });
    assert_eq!(dispatcher.inflight_count(), 1);

    // Dropping the runtime drops the spawned fetch before its first poll.
    drop(runtime);
    assert_eq!(dispatcher.inflight_count(), 0);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let outcome = runtime.block_on(async {
        tokio::time::timeout(Duration::from_secs(1), waiting.as_mut())
            .await
            .unwrap()
    });
    assert!(matches!(outcome, Err(DispatchError::Cancelled)));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn transport_failure_reaches_every_caller() {
    let transport = MockTransport::new().failing("connection reset");
    let dispatcher = TestDispatcher::new(transport.clone());

    let (a, b) = tokio::join!(
        dispatcher.send(get(URL), CancellationToken::new()),
        dispatcher.send(get(URL), CancellationToken::new()),
    );

    assert_eq!(transport.call_count(), 1);
    for outcome in [a, b] {
        let error = outcome.unwrap_err();
        assert_eq!(
            error.transport_error().map(ToString::to_string).as_deref(),
            Some("connection reset")
        );
    }
    assert_eq!(dispatcher.inflight_count(), 0);
}

#[tokio::test]
async fn budget_stops_requests_once_crossed() {
    let transport = MockTransport::new().with_body(vec![0u8; 100]);
    let dispatcher = TestDispatcher::builder(transport.clone())
        .priority(Priority::Speculative)
        .max_bytes(Some(150))
        .build();

    dispatcher.send(get("https://example.com/1"), CancellationToken::new()).await.unwrap();
    assert_eq!(dispatcher.remaining_bytes(), Some(50));

    // The response crossing the budget is still delivered.
    dispatcher.send(get("https://example.com/2"), CancellationToken::new()).await.unwrap();
    assert_eq!(dispatcher.remaining_bytes(), Some(-50));

    let rejected = dispatcher.send(get("https://example.com/3"), CancellationToken::new()).await;
    assert!(matches!(rejected, Err(DispatchError::BudgetExhausted)));
    assert!(rejected.unwrap_err().is_cancellation());
    assert_eq!(transport.call_count(), 2);

    dispatcher.reset_limit(Some(1_000));
    dispatcher.send(get("https://example.com/3"), CancellationToken::new()).await.unwrap();
    assert_eq!(dispatcher.remaining_bytes(), Some(900));

    dispatcher.reset_limit(None);
    assert_eq!(dispatcher.remaining_bytes(), None);
}

#[tokio::test]
async fn exhausted_budget_rejects_every_method() {
    let transport = MockTransport::new();
    let dispatcher = TestDispatcher::builder(transport.clone())
        .max_bytes(Some(-1))
        .build();

    for method in [Method::GET, Method::POST] {
        let outcome = dispatcher.send(request(method, URL), CancellationToken::new()).await;
        assert!(matches!(outcome, Err(DispatchError::BudgetExhausted)));
    }
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn bypassed_requests_are_not_charged() {
    let transport = MockTransport::new().with_body(vec![0u8; 100]);
    let dispatcher = TestDispatcher::builder(transport.clone())
        .max_bytes(Some(50))
        .build();

    dispatcher.send(request(Method::POST, URL), CancellationToken::new()).await.unwrap();
    assert_eq!(dispatcher.remaining_bytes(), Some(50));
}

#[tokio::test]
async fn only_idempotent_reads_are_deduplicated_and_saved() {
    let cache = MockCache::new();
    let transport = MockTransport::new();
    let dispatcher = TestDispatcher::builder(transport.clone())
        .cache(cache.shared())
        .build();

    for method in [Method::GET, Method::HEAD, Method::OPTIONS] {
        let (a, b) = tokio::join!(
            dispatcher.send(request(method.clone(), URL), CancellationToken::new()),
            dispatcher.send(request(method.clone(), URL), CancellationToken::new()),
        );
        a.unwrap();
        b.unwrap();
    }
    assert_eq!(transport.call_count(), 3);
    assert_eq!(cache.save_count(), 3);

    for method in [
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::from_bytes(b"WHATEVER").unwrap(),
    ] {
        let (a, b) = tokio::join!(
            dispatcher.send(request(method.clone(), URL), CancellationToken::new()),
            dispatcher.send(request(method.clone(), URL), CancellationToken::new()),
        );
        a.unwrap();
        b.unwrap();
    }
    assert_eq!(transport.call_count(), 3 + 8);
    assert_eq!(cache.save_count(), 3);
}

#[tokio::test]
async fn cache_receives_head_and_full_body() {
    let cache = MockCache::new();
    let transport = MockTransport::new().with_body("x".repeat(64 * 1024));
    let dispatcher = TestDispatcher::builder(transport.clone())
        .cache(cache.shared())
        .build();

    let request = MockRequest::from_request(
        http::Request::get(URL)
            .header(ACCEPT, "text/html")
            .body(Default::default())
            .unwrap(),
    );
    let key = request.dedup_key();
    let response = dispatcher.send(request, CancellationToken::new()).await.unwrap();

    let saved = cache.entry(&key).unwrap();
    assert_eq!(saved.head.method, Method::GET);
    assert_eq!(saved.head.uri.to_string(), URL);
    assert_eq!(saved.head.headers[ACCEPT], "text/html");
    assert_eq!(saved.head.key(), key);
    assert_eq!(saved.response.status(), http::StatusCode::OK);
    assert_eq!(saved.response.headers()[CALL_HEADER], "1");
    assert_eq!(saved.response.body().len(), 64 * 1024);
    assert_eq!(body(response).await, saved.response.body().clone());
}

#[tokio::test]
async fn cache_failure_fails_the_dispatch() {
    let cache = MockCache::new();
    cache.fail_saves();
    let transport = MockTransport::new();
    let dispatcher = TestDispatcher::builder(transport.clone())
        .cache(cache.shared())
        .build();

    let (a, b) = tokio::join!(
        dispatcher.send(get(URL), CancellationToken::new()),
        dispatcher.send(get(URL), CancellationToken::new()),
    );
    assert!(matches!(a, Err(DispatchError::Cache(_))));
    assert!(matches!(b, Err(DispatchError::Cache(_))));
    assert_eq!(cache.save_count(), 1);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn cache_is_not_consulted_on_dispatch() {
    let cache = MockCache::new();
    let head = RequestHead::from_parts(get(URL).parts());
    cache.insert_body(head, Bytes::from_static(b"stale"));
    let transport = MockTransport::new();
    let dispatcher = TestDispatcher::builder(transport.clone())
        .cache(cache.shared())
        .build();

    let response = dispatcher.send(get(URL), CancellationToken::new()).await.unwrap();
    assert_eq!(body(response).await, Bytes::from(format!("GET {URL}")));
    assert_eq!(cache.fetch_count(), 0);
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn queue_bounds_concurrent_calls() {
    let transport = MockTransport::gated();
    let dispatcher = TestDispatcher::new(transport.clone());
    assert_eq!(dispatcher.queue().capacity(), 4);

    let handles = (0..5)
        .map(|n| {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher
                    .send(get(&format!("https://example.com/{n}")), CancellationToken::new())
                    .await
            })
        })
        .collect::<Vec<_>>();

    transport.wait_for_calls(4).await;
    settle().await;
    assert_eq!(transport.call_count(), 4);
    assert_eq!(dispatcher.queue().running(), 4);
    assert_eq!(dispatcher.queue().waiting(), 1);

    transport.release(1);
    transport.wait_for_calls(5).await;
    transport.release(4);

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(transport.max_running(), 4);
    assert_eq!(dispatcher.queue().running(), 0);
}

#[tokio::test]
async fn shared_queue_admits_higher_priorities_first() {
    let transport = MockTransport::gated();
    let queue = Arc::new(OperationQueue::new(1));
    let dispatcher = |class: Priority| {
        TestDispatcher::builder(transport.clone())
            .priority(class)
            .queue(Arc::clone(&queue))
            .build()
    };
    let explicit = dispatcher(Priority::Explicit);
    let speculative = dispatcher(Priority::Speculative);
    let background = dispatcher(Priority::Background);
    let user = dispatcher(Priority::UserInitiated);

    let blocker = tokio::spawn({
        let explicit = explicit.clone();
        async move {
            explicit
                .send(get("https://example.com/block"), CancellationToken::new())
                .await
        }
    });
    transport.wait_for_calls(1).await;

    let mut handles = Vec::new();
    for (dispatcher, path) in [(speculative, "/s"), (background, "/b"), (user, "/u")] {
        handles.push(tokio::spawn(async move {
            dispatcher
                .send(get(&format!("https://example.com{path}")), CancellationToken::new())
                .await
        }));
    }
    settle().await;
    assert_eq!(queue.waiting(), 3);

    transport.release(4);
    blocker.await.unwrap().unwrap();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(transport.paths(), vec!["/block", "/u", "/b", "/s"]);
}

#[tokio::test]
async fn request_cancelled_while_queued_never_runs() {
    let transport = MockTransport::gated();
    let queue = Arc::new(OperationQueue::new(1));
    let dispatcher = TestDispatcher::builder(transport.clone())
        .queue(Arc::clone(&queue))
        .build();

    let blocker = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move {
            dispatcher
                .send(get("https://example.com/block"), CancellationToken::new())
                .await
        }
    });
    transport.wait_for_calls(1).await;

    let cancel = CancellationToken::new();
    let queued = tokio::spawn({
        let dispatcher = dispatcher.clone();
        let cancel = cancel.clone();
        async move {
            dispatcher
                .send(get("https://example.com/queued"), cancel)
                .await
        }
    });
    settle().await;
    assert_eq!(queue.waiting(), 1);

    cancel.cancel();
    assert!(matches!(queued.await.unwrap(), Err(DispatchError::Cancelled)));

    transport.release(1);
    blocker.await.unwrap().unwrap();
    settle().await;
    assert_eq!(transport.paths(), vec!["/block"]);
    assert_eq!(queue.running(), 0);
}

#[tokio::test]
async fn priority_offset_is_applied() {
    let dispatcher = TestDispatcher::builder(MockTransport::new())
        .priority(Priority::Background)
        .offset(5)
        .build();
    assert_eq!(dispatcher.class(), Priority::Background);
    assert_eq!(dispatcher.priority(), 25);

    let default = TestDispatcher::new(MockTransport::new());
    assert_eq!(default.class(), Priority::UserInitiated);
    assert_eq!(default.priority(), 100);
}
