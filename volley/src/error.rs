use std::sync::Arc;

use thiserror::Error;
use volley_core::{BoxError, CacheError, Cancelled};

/// Outcome error of a dispatch.
///
/// One dispatch may be observed by many callers, so the error is cloneable:
/// payloads that are not `Clone` themselves are shared through [`Arc`].
///
/// The variants fall into three groups:
/// - **cancellation**: [`Cancelled`](DispatchError::Cancelled) and
///   [`BudgetExhausted`](DispatchError::BudgetExhausted), see
///   [`is_cancellation`](DispatchError::is_cancellation). Budget exhaustion
///   means "we chose not to fetch", not "the fetch failed".
/// - **transport failure**: the wrapped transport's error, verbatim.
/// - **response handling**: buffering the body or saving it to the cache failed.
///
/// Nothing is retried by the dispatcher; retries belong to the transport or
/// the caller.
#[derive(Debug, Error)]
pub enum DispatchError<E> {
    /// The caller cancelled, or every caller of a shared dispatch did.
    #[error("request was cancelled")]
    Cancelled,

    /// The dispatcher's byte budget is spent; the request was not sent.
    #[error("byte budget exhausted, request was not dispatched")]
    BudgetExhausted,

    /// The transport failed.
    #[error("transport error: {0}")]
    Transport(Arc<E>),

    /// Reading the response body into memory failed.
    #[error("failed to buffer response body: {0}")]
    Body(Arc<BoxError>),

    /// The cache-save callback failed.
    #[error("failed to save response to cache: {0}")]
    Cache(Arc<CacheError>),
}

impl<E> DispatchError<E> {
    /// Wraps a transport error.
    pub fn transport(error: E) -> Self {
        DispatchError::Transport(Arc::new(error))
    }

    /// Returns `true` for cancellation-class outcomes.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            DispatchError::Cancelled | DispatchError::BudgetExhausted
        )
    }

    /// Returns the transport error, if this is one.
    pub fn transport_error(&self) -> Option<&E> {
        match self {
            DispatchError::Transport(error) => Some(error.as_ref()),
            _ => None,
        }
    }
}

impl<E> Clone for DispatchError<E> {
    fn clone(&self) -> Self {
        match self {
            DispatchError::Cancelled => DispatchError::Cancelled,
            DispatchError::BudgetExhausted => DispatchError::BudgetExhausted,
            DispatchError::Transport(error) => DispatchError::Transport(Arc::clone(error)),
            DispatchError::Body(error) => DispatchError::Body(Arc::clone(error)),
            DispatchError::Cache(error) => DispatchError::Cache(Arc::clone(error)),
        }
    }
}

impl<E> From<Cancelled> for DispatchError<E> {
    fn from(_: Cancelled) -> Self {
        DispatchError::Cancelled
    }
}

impl<E> From<CacheError> for DispatchError<E> {
    fn from(error: CacheError) -> Self {
        match error {
            CacheError::Cancelled => DispatchError::Cancelled,
            error => DispatchError::Cache(Arc::new(error)),
        }
    }
}
