//! Tower middleware integration for the volley request dispatcher.
//!
//! This crate provides [`Dispatch`], a Tower [`Layer`] that puts a
//! [`Dispatcher`](volley::Dispatcher) in front of any HTTP client service:
//! concurrent identical `GET`, `HEAD` and `OPTIONS` requests share one call,
//! calls run through a bounded priority queue, a byte budget can stop
//! speculative traffic, and buffered responses can be saved to a cache.
//!
//! # Core Concepts
//!
//! - **[`Dispatch`]**: A Tower [`Layer`] producing [`DispatchService`].
//!   Use [`Dispatch::builder()`] to configure and construct the layer.
//!
//! - **[`DispatchService`]**: The service itself. It can also wrap a
//!   dispatcher built elsewhere, e.g. one of a [`NetCache`](volley::NetCache)
//!   over a [`TowerTransport`].
//!
//! - **[`OfflineService`]**: Answers requests from the cache alone.
//!
//! [`Layer`]: tower::Layer
//!
//! # Quick Start
//!
//! ```ignore
//! use volley::Priority;
//! use volley_tower::Dispatch;
//! use tower::{ServiceBuilder, service_fn};
//!
//! let layer: Dispatch<Full<Bytes>, Full<Bytes>> = Dispatch::builder()
//!     .priority(Priority::Background)
//!     .cache(cache)
//!     .build();
//!
//! let service = ServiceBuilder::new()
//!     .layer(layer)
//!     .service(client);
//! ```
//!
//! # Cancellation
//!
//! Put a [`CancellationToken`](volley_core::CancellationToken) in the request
//! extensions to cancel a request from outside. Dropping the response future
//! cancels it as well. Either way only this caller is withdrawn: the shared
//! call stops once every caller that joined it has withdrawn.

mod future;
pub mod layer;
mod offline;
mod service;
pub mod transport;

pub use future::DispatchServiceFuture;
pub use layer::{Dispatch, DispatchBuilder, HttpCache};
pub use offline::OfflineService;
pub use service::{DispatchService, HttpDispatcher};
pub use transport::{TowerTransport, TowerTransportFuture};
