//! HTTP bindings for the volley dispatcher.
//!
//! - [`DispatchableHttpRequest`] decides which requests may be merged and
//!   derives their dedup key ([`derive_key`])
//! - [`DispatchableHttpResponse`] buffers a response into a cloneable
//!   [`SharedHttpResponse`] so one fetch can be handed to many callers
//! - [`offline_response`] turns a cache lookup into a response

pub mod body;
pub mod key;
mod request;
mod response;

pub use body::BufferedBody;
pub use key::{KEY_PREFIX, derive_key};
pub use request::{DispatchableHttpRequest, RequestHead, is_dedupable_method};
pub use response::{DispatchableHttpResponse, SharedHttpResponse, offline_response};
