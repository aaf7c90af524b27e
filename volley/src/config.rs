//! Serde configuration of a [`NetCache`](crate::NetCache).
//!
//! ```yaml
//! concurrency: 4
//! speculative:
//!   max_bytes: 5242880
//! background:
//!   offset: 5
//!   cache: false
//! ```
//!
//! Every field is optional. Per class, `cache` is tri-state: absent means
//! "use the cache if one is supplied", `true` requires one and `false` never
//! saves.

use bounded_integer::bounded_integer;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use volley_core::Priority;

use crate::queue::DEFAULT_CAPACITY;

/// Default byte budget of the speculative dispatcher (5 MiB).
pub const DEFAULT_SPECULATIVE_LIMIT: i64 = 5 * 1024 * 1024;

bounded_integer! {
    /// Number of units of work the shared operation queue runs at once (1-1024).
    #[repr(u16)]
    pub struct QueueCapacity { 1..=1024 }
}

fn default_capacity() -> QueueCapacity {
    QueueCapacity::new_saturating(DEFAULT_CAPACITY as u16)
}

/// Settings of one traffic class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassConfig {
    /// Offset added to the class's base priority.
    pub offset: i32,
    /// Byte budget; `None` means unlimited.
    pub max_bytes: Option<i64>,
    /// Whether responses are saved to the cache.
    pub cache: Option<bool>,
}

impl ClassConfig {
    /// Default settings of the speculative class.
    pub fn speculative() -> Self {
        Self {
            max_bytes: Some(DEFAULT_SPECULATIVE_LIMIT),
            ..Self::default()
        }
    }

    /// Resolves whether this class saves to the cache given whether one is
    /// available.
    pub(crate) fn use_cache(&self, class: Priority, available: bool) -> Result<bool, ConfigError> {
        match (self.cache, available) {
            (Some(true), false) => Err(ConfigError::MissingCache { class }),
            (Some(false), _) => Ok(false),
            (_, available) => Ok(available),
        }
    }
}

/// Configuration of the four standard dispatchers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetCacheConfig {
    /// Bound of the operation queue shared by all classes.
    pub concurrency: QueueCapacity,
    /// Prefetching of data the user may never look at.
    pub speculative: ClassConfig,
    /// Requests triggered by the user.
    pub user_initiated: ClassConfig,
    /// Background work.
    pub background: ClassConfig,
    /// Requests with caller-chosen priority.
    pub explicit: ClassConfig,
}

impl NetCacheConfig {
    /// Returns the settings of `class`.
    pub fn class(&self, class: Priority) -> &ClassConfig {
        match class {
            Priority::Speculative => &self.speculative,
            Priority::UserInitiated => &self.user_initiated,
            Priority::Background => &self.background,
            Priority::Explicit => &self.explicit,
        }
    }
}

impl Default for NetCacheConfig {
    fn default() -> Self {
        Self {
            concurrency: default_capacity(),
            speculative: ClassConfig::speculative(),
            user_initiated: ClassConfig::default(),
            background: ClassConfig::default(),
            explicit: ClassConfig::default(),
        }
    }
}

/// Invalid configuration, reported when building.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The class requires a cache but none was supplied.
    #[error("{class} dispatcher is configured with `cache: true` but no cache was supplied")]
    MissingCache {
        /// The offending class.
        class: Priority,
    },
}
