//! Dedup and cache keys.
//!
//! A [`CacheKey`] identifies "the same logical request". The dispatcher uses it
//! to merge concurrent requests and the cache stores bodies under it, so the
//! same value flows through both paths.
//!
//! Keys are opaque strings. Protocol bindings decide how they are derived; the
//! HTTP binding hashes a fixed set of request fields and renders the hash
//! behind a namespace prefix:
//!
//! ```
//! use volley_core::CacheKey;
//!
//! let key = CacheKey::from_hash("VolleyCache_", 0xdead_beef);
//! assert_eq!(key.as_str(), "VolleyCache_deadbeef");
//! assert_eq!(format!("{}", key), "VolleyCache_deadbeef");
//! ```
//!
//! ## Performance
//!
//! [`CacheKey`] wraps an `Arc<str>`, so cloning a key only increments a
//! reference count.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// A key identifying an in-flight request and its cached body.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    inner: Arc<str>,
}

impl CacheKey {
    /// Creates a key from an already rendered string.
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self { inner: key.into() }
    }

    /// Creates a key by rendering `hash` as lowercase hex behind `prefix`.
    pub fn from_hash(prefix: &str, hash: u64) -> Self {
        Self::new(format!("{prefix}{hash:x}"))
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.inner
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CacheKey").field(&&*self.inner).finish()
    }
}

impl Borrow<str> for CacheKey {
    fn borrow(&self) -> &str {
        &self.inner
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.inner
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self::new(key)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_from_hash_renders_hex() {
        assert_eq!(CacheKey::from_hash("p_", 255).as_str(), "p_ff");
        assert_eq!(CacheKey::from_hash("", 0).as_str(), "0");
    }

    #[test]
    fn test_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(CacheKey::from("abc"), 1);
        assert_eq!(map.get("abc"), Some(&1));
    }

    #[test]
    fn test_clone_shares_storage() {
        let key = CacheKey::from("shared");
        let clone = key.clone();
        assert!(std::ptr::eq(key.as_str(), clone.as_str()));
    }
}
