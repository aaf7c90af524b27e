#![doc = include_str!("../README.md")]

pub mod mock_cache;
pub mod mock_transport;
pub mod tracing;

pub use mock_cache::{MockCache, SavedEntry};
pub use mock_transport::{CALL_HEADER, MockRequest, MockResponse, MockTransport, get, request};
