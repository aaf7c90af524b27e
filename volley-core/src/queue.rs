//! Admission of units of work.

use std::future::Future;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::Cancelled;

/// Bounded-concurrency, priority-ordered executor for units of work.
///
/// The dispatcher tags every unit of work with a numeric priority and a
/// cancellation token and leaves scheduling fairness to the queue.
/// Implementations decide the ordering; the default `OperationQueue` in the
/// `volley` crate admits higher priorities first.
///
/// # Contract
///
/// - at most a bounded number of units run at once,
/// - a unit whose token fires before it is admitted never starts and resolves
///   to [`Cancelled`],
/// - once admitted, the unit runs to completion; the unit itself is expected
///   to observe the token.
pub trait AdmissionQueue: Send + Sync {
    /// Queues `work` and resolves to its output once it has been admitted and
    /// has finished.
    fn enqueue<F, T>(
        &self,
        priority: i32,
        cancel: CancellationToken,
        work: F,
    ) -> BoxFuture<'static, Result<T, Cancelled>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static;
}
