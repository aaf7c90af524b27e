//! Consumable byte budget.
//!
//! A limiting dispatcher only allows a certain number of bytes to be read
//! before refusing all further requests. This is designed for prefetching data
//! the user may or may not look at later: once the budget is spent, fetching
//! stops until the application resets it, typically when it resumes from
//! suspend.
//!
//! The budget may be crossed: the response that drives it below zero is still
//! delivered, only the requests after it are refused.

use std::sync::atomic::{AtomicI64, Ordering};

/// Sentinel stored when no limit is set.
const UNLIMITED: i64 = i64::MIN;

/// Lock-free byte counter shared by all completions of one dispatcher.
#[derive(Debug)]
pub struct ByteBudget {
    remaining: AtomicI64,
}

impl ByteBudget {
    /// Creates a budget of `limit` bytes, or an unlimited one for `None`.
    pub fn new(limit: Option<i64>) -> Self {
        Self {
            remaining: AtomicI64::new(Self::encode(limit)),
        }
    }

    /// Creates an unlimited budget.
    pub fn unlimited() -> Self {
        Self::new(None)
    }

    /// Replaces the budget. `None` removes the limit.
    pub fn reset(&self, limit: Option<i64>) {
        self.remaining.store(Self::encode(limit), Ordering::Release);
    }

    /// Subtracts `bytes` from the budget if one is set.
    pub fn charge(&self, bytes: u64) {
        let bytes = i64::try_from(bytes).unwrap_or(i64::MAX);
        // Err only means the budget is unlimited.
        let _ = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != UNLIMITED).then(|| current.saturating_sub(bytes).max(UNLIMITED + 1))
            });
    }

    /// Returns `true` iff a budget is set and it is below zero.
    pub fn is_exhausted(&self) -> bool {
        self.remaining().is_some_and(|remaining| remaining < 0)
    }

    /// Returns the remaining bytes, or `None` when unlimited.
    pub fn remaining(&self) -> Option<i64> {
        match self.remaining.load(Ordering::Acquire) {
            UNLIMITED => None,
            remaining => Some(remaining),
        }
    }

    fn encode(limit: Option<i64>) -> i64 {
        limit.map_or(UNLIMITED, |limit| limit.max(UNLIMITED + 1))
    }
}

impl Default for ByteBudget {
    fn default() -> Self {
        Self::unlimited()
    }
}
