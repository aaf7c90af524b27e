use http::Method;
use pretty_assertions::assert_eq;
use volley::{CancellationToken, DispatchError, Dispatcher, Priority};
use volley_core::DispatchRequest;
use volley_test::tracing::TraceCollector;
use volley_test::{MockRequest, MockTransport, get, request};

type TestDispatcher = Dispatcher<MockTransport, MockRequest>;

const URL: &str = "https://example.com/observed";

#[tokio::test]
async fn fetch_span_carries_key_and_class() {
    let collector = TraceCollector::new();
    let _guard = collector.install();

    let dispatcher = TestDispatcher::builder(MockTransport::new())
        .priority(Priority::Background)
        .offset(3)
        .build();
    let key = get(URL).dedup_key();
    dispatcher.send(get(URL), CancellationToken::new()).await.unwrap();

    let span = collector.span("volley.fetch").unwrap();
    assert_eq!(span.field("key"), Some(key.as_str()));
    assert_eq!(span.field("class"), Some("background"));
    assert_eq!(span.field("priority"), Some("23"));
}

#[tokio::test]
async fn events_report_dispatch_states() {
    let collector = TraceCollector::new();
    let _guard = collector.install();

    let dispatcher = TestDispatcher::builder(MockTransport::new())
        .max_bytes(Some(0))
        .build();

    let (a, b) = tokio::join!(
        dispatcher.send(get(URL), CancellationToken::new()),
        dispatcher.send(get(URL), CancellationToken::new()),
    );
    a.unwrap();
    b.unwrap();
    dispatcher
        .send(request(Method::POST, URL), CancellationToken::new())
        .await
        .unwrap_err();

    let states = collector.states();
    assert_eq!(
        states,
        vec![
            "dispatching",
            "joined",
            "completed",
            "completed",
            "rejected",
        ]
    );
}

#[tokio::test]
async fn bypass_is_reported() {
    let collector = TraceCollector::new();
    let _guard = collector.install();

    let dispatcher = TestDispatcher::new(MockTransport::new().failing("boom"));
    let outcome = dispatcher
        .send(request(Method::PUT, URL), CancellationToken::new())
        .await;
    assert!(matches!(outcome, Err(DispatchError::Transport(_))));
    assert_eq!(collector.states(), vec!["bypassed"]);
}
