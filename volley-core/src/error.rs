//! Error types shared by all volley crates.

use thiserror::Error;

/// Boxed error used where the concrete error type is erased.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Marker error for work that was cancelled before or while it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation was cancelled")]
pub struct Cancelled;

/// Error type for cache store interactions.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Internal store error: storage, serialization or connection failure.
    #[error(transparent)]
    Internal(BoxError),

    /// The operation observed its cancellation token and gave up.
    #[error("cache operation was cancelled")]
    Cancelled,
}

impl CacheError {
    /// Wraps any error as [`CacheError::Internal`].
    pub fn internal<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        CacheError::Internal(error.into())
    }
}

impl From<Cancelled> for CacheError {
    fn from(_: Cancelled) -> Self {
        CacheError::Cancelled
    }
}
