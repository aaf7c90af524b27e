#![warn(missing_docs)]
//! # volley-core
//!
//! Core traits and types for the volley request dispatcher.
//!
//! This crate provides the protocol-agnostic abstractions the dispatcher in
//! the `volley` crate is built on. Protocol bindings (like `volley-http`) and
//! integrations (like `volley-tower`) implement these traits.
//!
//! ## Architecture
//!
//! The dispatcher merges concurrent requests for the same resource into a
//! single transport call, runs that call through a bounded, priority-ordered
//! admission queue and optionally hands the buffered response to a cache.
//! This crate provides the traits the dispatcher uses to:
//!
//! - **Rank** traffic ([`Priority`])
//! - **Identify** the same logical request ([`CacheKey`], [`DispatchRequest`])
//! - **Share** one response between many waiters ([`DispatchResponse`])
//! - **Call** the network ([`Transport`])
//! - **Admit** work with bounded concurrency ([`AdmissionQueue`])
//! - **Persist** and restore response bodies ([`RequestCache`])
//!
//! Cancellation is cooperative and expressed with
//! [`CancellationToken`](tokio_util::sync::CancellationToken) throughout.

pub mod cache;
pub mod error;
pub mod key;
pub mod priority;
pub mod queue;
pub mod request;
pub mod response;
pub mod transport;

pub use cache::RequestCache;
pub use error::{BoxError, CacheError, Cancelled};
pub use key::CacheKey;
pub use priority::{Priority, compute_priority};
pub use queue::AdmissionQueue;
pub use request::DispatchRequest;
pub use response::DispatchResponse;
pub use tokio_util::sync::CancellationToken;
pub use transport::Transport;

/// Raw byte data type used for cached response bodies.
/// Using `Bytes` provides efficient zero-copy cloning via reference counting.
pub type Raw = bytes::Bytes;
