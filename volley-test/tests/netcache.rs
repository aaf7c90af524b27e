use std::sync::Arc;

use bytes::Bytes;
use pretty_assertions::assert_eq;
use volley::{CancellationToken, ConfigError, NetCache, NetCacheConfig, Priority};
use volley_core::DispatchRequest;
use volley_test::{MockCache, MockRequest, MockTransport, get};

type TestNetCache = NetCache<MockTransport, MockRequest>;

#[test]
fn default_classes() {
    let net = TestNetCache::new(MockTransport::new(), &NetCacheConfig::default(), None).unwrap();

    assert_eq!(net.speculative().priority(), 10);
    assert_eq!(net.user_initiated().priority(), 100);
    assert_eq!(net.background().priority(), 20);
    assert_eq!(net.explicit().priority(), 0);

    assert_eq!(net.speculative().remaining_bytes(), Some(5 * 1024 * 1024));
    for class in [Priority::UserInitiated, Priority::Background, Priority::Explicit] {
        assert_eq!(net.get(class).remaining_bytes(), None, "{class}");
        assert_eq!(net.get(class).class(), class);
    }
    assert_eq!(net.queue().capacity(), 4);
}

#[test]
fn classes_share_one_queue() {
    let net = TestNetCache::new(MockTransport::new(), &NetCacheConfig::default(), None).unwrap();
    for class in [
        Priority::Speculative,
        Priority::UserInitiated,
        Priority::Background,
        Priority::Explicit,
    ] {
        assert!(Arc::ptr_eq(net.get(class).queue(), net.queue()), "{class}");
    }
}

#[test]
fn config_from_yaml() {
    let yaml = r#"
concurrency: 8
speculative:
  max_bytes: 1024
explicit:
  offset: 5
background:
  cache: false
"#;
    let config: NetCacheConfig = serde_saphyr::from_str(yaml).unwrap();
    let cache = MockCache::new();
    let net = TestNetCache::new(MockTransport::new(), &config, Some(cache.shared())).unwrap();

    assert_eq!(net.queue().capacity(), 8);
    assert_eq!(net.speculative().remaining_bytes(), Some(1024));
    assert_eq!(net.explicit().priority(), 5);
    assert!(net.background().cache().is_none());
    assert!(net.user_initiated().cache().is_some());
    assert!(net.speculative().cache().is_some());
}

#[test]
fn required_cache_is_checked_when_building() {
    let yaml = "user_initiated:\n  cache: true\n";
    let config: NetCacheConfig = serde_saphyr::from_str(yaml).unwrap();

    let error = TestNetCache::new(MockTransport::new(), &config, None).unwrap_err();
    assert_eq!(
        error,
        ConfigError::MissingCache {
            class: Priority::UserInitiated
        }
    );

    let cache = MockCache::new();
    assert!(TestNetCache::new(MockTransport::new(), &config, Some(cache.shared())).is_ok());
}

#[tokio::test]
async fn every_class_saves_to_the_shared_cache() {
    let cache = MockCache::new();
    let transport = MockTransport::new();
    let net = TestNetCache::new(transport.clone(), &NetCacheConfig::default(), Some(cache.shared()))
        .unwrap();

    for (n, class) in [
        Priority::Speculative,
        Priority::UserInitiated,
        Priority::Background,
        Priority::Explicit,
    ]
    .into_iter()
    .enumerate()
    {
        let request = get(&format!("https://example.com/{n}"));
        let key = request.dedup_key();
        net.get(class).send(request, CancellationToken::new()).await.unwrap();
        assert!(cache.entry(&key).is_some(), "{class}");
    }
    assert_eq!(cache.save_count(), 4);
    assert_eq!(transport.call_count(), 4);
}

#[tokio::test]
async fn dedup_is_per_dispatcher() {
    let transport = MockTransport::new();
    let net = TestNetCache::new(transport.clone(), &NetCacheConfig::default(), None).unwrap();

    let (a, b) = tokio::join!(
        net.user_initiated().send(get("https://example.com/x"), CancellationToken::new()),
        net.background().send(get("https://example.com/x"), CancellationToken::new()),
    );
    a.unwrap();
    b.unwrap();
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn speculative_budget_can_be_reset() {
    let transport = MockTransport::new().with_body(Bytes::from(vec![0u8; 64]));
    let config = NetCacheConfig {
        speculative: volley::ClassConfig {
            max_bytes: Some(32),
            ..Default::default()
        },
        ..Default::default()
    };
    let net = TestNetCache::new(transport.clone(), &config, None).unwrap();

    net.speculative()
        .send(get("https://example.com/1"), CancellationToken::new())
        .await
        .unwrap();
    let rejected = net
        .speculative()
        .send(get("https://example.com/2"), CancellationToken::new())
        .await;
    assert!(rejected.unwrap_err().is_cancellation());

    // Other classes are unaffected.
    net.user_initiated()
        .send(get("https://example.com/2"), CancellationToken::new())
        .await
        .unwrap();

    net.reset_speculative_limit(Some(32));
    net.speculative()
        .send(get("https://example.com/3"), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(transport.call_count(), 3);
}
