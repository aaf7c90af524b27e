use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use volley_core::{CacheError, CacheKey, CancellationToken, Raw, RequestCache};
use volley_http::{RequestHead, SharedHttpResponse};
use volley_tower::HttpCache;

/// What the dispatcher handed to [`RequestCache::save`].
#[derive(Debug, Clone)]
pub struct SavedEntry {
    pub head: RequestHead,
    pub response: SharedHttpResponse,
}

#[derive(Debug, Default)]
pub struct CacheCounters {
    pub save_count: AtomicUsize,
    pub fetch_count: AtomicUsize,
    pub fetch_hit_count: AtomicUsize,
    pub fetch_miss_count: AtomicUsize,
}

#[derive(Clone, Debug, Default)]
pub struct MockCache {
    pub entries: Arc<DashMap<CacheKey, SavedEntry>>,
    pub counters: Arc<CacheCounters>,
    fail_saves: Arc<AtomicBool>,
}

impl MockCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following save fail.
    pub fn fail_saves(&self) {
        self.fail_saves.store(true, Ordering::SeqCst);
    }

    /// Returns the cache as the trait object dispatchers and layers take.
    pub fn shared(&self) -> HttpCache {
        Arc::new(self.clone())
    }

    pub fn entry(&self, key: &CacheKey) -> Option<SavedEntry> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Stores `body` under `key` as if a `200 OK` had been saved.
    pub fn insert_body(&self, head: RequestHead, body: Raw) {
        let key = head.key();
        let response = SharedHttpResponse::new(
            http::StatusCode::OK,
            http::Version::HTTP_11,
            http::HeaderMap::new(),
            body,
        );
        self.entries.insert(key, SavedEntry { head, response });
    }

    pub fn save_count(&self) -> usize {
        self.counters.save_count.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.counters.fetch_count.load(Ordering::SeqCst)
    }

    pub fn fetch_hit_count(&self) -> usize {
        self.counters.fetch_hit_count.load(Ordering::SeqCst)
    }

    pub fn fetch_miss_count(&self) -> usize {
        self.counters.fetch_miss_count.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RequestCache<RequestHead, SharedHttpResponse> for MockCache {
    async fn save(
        &self,
        request: &RequestHead,
        response: &SharedHttpResponse,
        key: &CacheKey,
        cancel: CancellationToken,
    ) -> Result<(), CacheError> {
        self.counters.save_count.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(CacheError::Cancelled);
        }
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(CacheError::internal("cache unavailable"));
        }
        self.entries.insert(
            key.clone(),
            SavedEntry {
                head: request.clone(),
                response: response.clone(),
            },
        );
        Ok(())
    }

    async fn fetch(
        &self,
        _request: &RequestHead,
        key: &CacheKey,
        cancel: CancellationToken,
    ) -> Result<Option<Raw>, CacheError> {
        self.counters.fetch_count.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(CacheError::Cancelled);
        }
        let body = self.entries.get(key).map(|entry| entry.response.body().clone());
        let counter = match body {
            Some(_) => &self.counters.fetch_hit_count,
            None => &self.counters.fetch_miss_count,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(body)
    }
}
