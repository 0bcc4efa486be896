//! HTTP transport abstraction layer.
//!
//! - reqwest-backed transport for production
//! - Mock transport for testing

pub mod http;
pub mod mock;
pub mod traits;

pub use http::ReqwestTransport;
pub use mock::MockTransport;
pub use traits::{HttpRequest, HttpResponse, Method, Transport, TransportError};
